pub mod gate;
pub mod prompt;
pub mod proxy;
pub mod rate_limit;

pub use crate::domain::model::{Credential, EnhanceRequest, EnhanceResponse, RateLimitDecision};
pub use crate::domain::ports::{Clock, ConfigProvider, RateLimiter, TextEnhancer};
pub use crate::utils::error::Result;
