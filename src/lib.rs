pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use config::ServerConfig;
pub use core::{
    gate::{router, CredentialPolicy, IngressGate},
    proxy::EnhancementProxy,
    rate_limit::FixedWindowRateLimiter,
    ConfigProvider, TextEnhancer,
};
pub use utils::error::{EnhanceError, Result};
