use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::utils::error::{EnhanceError, Result};

/// Opaque upstream API key. Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl FromStr for Credential {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl<'de> Deserialize<'de> for Credential {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(Credential)
    }
}

/// Request/response schema spoken by the upstream generative-text API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamSchema {
    /// `contents[].parts[].text` in, `candidates[].content.parts[].text` out.
    #[default]
    Contents,
    /// Older flat shape: `prompt.text` in, `candidates[].output` out.
    Prompt,
}

impl FromStr for UpstreamSchema {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "contents" => Ok(Self::Contents),
            "prompt" => Ok(Self::Prompt),
            other => Err(format!(
                "unknown upstream schema '{}', expected 'contents' or 'prompt'",
                other
            )),
        }
    }
}

impl fmt::Display for UpstreamSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contents => f.write_str("contents"),
            Self::Prompt => f.write_str("prompt"),
        }
    }
}

/// Where the upstream credential comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialMode {
    /// One key held by the server process; `apiKey` in requests is ignored.
    #[default]
    Server,
    /// Each request carries its own `apiKey`; the server key, if any, is a fallback.
    Caller,
}

impl FromStr for CredentialMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server" => Ok(Self::Server),
            "caller" => Ok(Self::Caller),
            other => Err(format!(
                "unknown credential mode '{}', expected 'server' or 'caller'",
                other
            )),
        }
    }
}

impl fmt::Display for CredentialMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => f.write_str("server"),
            Self::Caller => f.write_str("caller"),
        }
    }
}

/// A validated `POST /api/enhance` payload.
#[derive(Debug, Clone)]
pub struct EnhanceRequest {
    pub text: String,
    pub api_key: Option<Credential>,
}

impl EnhanceRequest {
    /// Parses a raw request body. Anything that does not carry a non-blank
    /// string `text` is a validation error, including bodies that are not JSON.
    pub fn from_json_body(body: &[u8]) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|_| EnhanceError::ValidationError)?;

        let text = value
            .get("text")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(EnhanceError::ValidationError)?;

        let api_key = value
            .get("apiKey")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(Credential::new);

        Ok(Self {
            text: text.to_string(),
            api_key,
        })
    }
}

/// Wire shape of every `/api/enhance` response: `{"enhanced": ..}` or `{"error": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnhanceResponse {
    Enhanced(String),
    Error(String),
}

/// Per-client fixed-window counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitState {
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

/// Outcome of a single rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Whole seconds until the window resets, rounded up so a client that
    /// waits this long never lands back inside the current window.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_at - now).num_milliseconds().max(0);
        ((millis + 999) / 1000) as u64
    }
}
