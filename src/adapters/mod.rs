// Adapters layer: concrete implementations for external systems.

pub mod upstream;

pub use upstream::{adapter_for, ContentsAdapter, PromptAdapter, UpstreamAdapter};
