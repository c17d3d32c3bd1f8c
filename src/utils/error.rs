use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::domain::model::EnhanceResponse;

pub const NO_TEXT_MESSAGE: &str = "No text provided.";
pub const NO_API_KEY_MESSAGE: &str = "No API key provided.";
pub const QUOTA_EXCEEDED_MESSAGE: &str =
    "Too many enhancement requests from this IP, please try again later.";
pub const ENHANCEMENT_FAILED_MESSAGE: &str = "Enhancement failed.";
pub const PAYLOAD_TOO_LARGE_MESSAGE: &str = "Request body too large.";

#[derive(Error, Debug)]
pub enum EnhanceError {
    #[error("No text provided.")]
    ValidationError,

    #[error("No API key provided.")]
    MissingCredentialError,

    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLargeError { limit: usize },

    #[error("Rate limit exceeded for client {client}")]
    QuotaExceededError { client: String },

    #[error("API request failed: {0}")]
    ApiError(reqwest::Error),

    #[error("Upstream returned status {status}: {body}")]
    UpstreamStatusError { status: u16, body: String },

    #[error("Malformed upstream response: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },
}

// reqwest includes the request URL in its Display output, and the legacy
// upstream schema carries the credential in the query string.
impl From<reqwest::Error> for EnhanceError {
    fn from(err: reqwest::Error) -> Self {
        EnhanceError::ApiError(err.without_url())
    }
}

impl EnhanceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            EnhanceError::ValidationError | EnhanceError::MissingCredentialError => {
                StatusCode::BAD_REQUEST
            }
            EnhanceError::PayloadTooLargeError { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            EnhanceError::QuotaExceededError { .. } => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The only text a client ever sees for this error.
    pub fn client_message(&self) -> &'static str {
        match self {
            EnhanceError::ValidationError => NO_TEXT_MESSAGE,
            EnhanceError::MissingCredentialError => NO_API_KEY_MESSAGE,
            EnhanceError::PayloadTooLargeError { .. } => PAYLOAD_TOO_LARGE_MESSAGE,
            EnhanceError::QuotaExceededError { .. } => QUOTA_EXCEEDED_MESSAGE,
            _ => ENHANCEMENT_FAILED_MESSAGE,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            EnhanceError::MissingConfigError { field } if field == "api_key" => {
                "Set GEMINI_API_KEY (or --api-key), or run with --credential-mode caller".to_string()
            }
            EnhanceError::MissingConfigError { field } => {
                format!("Provide a value for '{}' via flag, environment or config file", field)
            }
            EnhanceError::InvalidConfigValueError { field, .. } => {
                format!("Check the value configured for '{}'", field)
            }
            EnhanceError::ConfigError { .. } | EnhanceError::IoError(_) => {
                "Check that the config file exists and is valid TOML".to_string()
            }
            _ => "Check the upstream API status and credentials".to_string(),
        }
    }
}

impl IntoResponse for EnhanceError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(EnhanceResponse::Error(self.client_message().to_string())),
        )
            .into_response()
    }
}

pub type Result<T> = std::result::Result<T, EnhanceError>;
