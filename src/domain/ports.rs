use crate::domain::model::{Credential, CredentialMode, RateLimitDecision, UpstreamSchema};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Turns validated text into improved text.
#[async_trait]
pub trait TextEnhancer: Send + Sync {
    async fn enhance(&self, text: &str, credential: &Credential) -> Result<String>;
}

/// Counts a request against a client's quota and reports whether it may proceed.
pub trait RateLimiter: Send + Sync {
    fn check(&self, client: &str) -> RateLimitDecision;

    fn now(&self) -> DateTime<Utc>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub trait ConfigProvider: Send + Sync {
    fn upstream_endpoint(&self) -> &str;
    fn upstream_schema(&self) -> UpstreamSchema;
    fn upstream_timeout(&self) -> Duration;
    fn window_duration(&self) -> Duration;
    fn max_requests_per_window(&self) -> u32;
    fn credential_mode(&self) -> CredentialMode;
    fn server_credential(&self) -> Option<&Credential>;
    fn trust_proxy(&self) -> bool;
}
