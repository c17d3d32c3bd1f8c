//! Ingress gate for `POST /api/enhance`.
//!
//! Every request is counted against its client's window first, then its body
//! is validated, and only then is the enhancer called.

use crate::domain::model::{Credential, CredentialMode, EnhanceRequest, EnhanceResponse, RateLimitDecision};
use crate::domain::ports::{ConfigProvider, RateLimiter, TextEnhancer};
use crate::utils::error::{EnhanceError, Result};
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{ConnectInfo, DefaultBodyLimit, State};
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const ENHANCE_PATH: &str = "/api/enhance";

/// Largest request body `/api/enhance` will buffer.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Decides which upstream credential a request is served with.
#[derive(Debug, Clone)]
pub enum CredentialPolicy {
    ServerHeld(Credential),
    CallerSupplied { fallback: Option<Credential> },
}

impl CredentialPolicy {
    pub fn from_config<C: ConfigProvider>(config: &C) -> Result<Self> {
        let server_key = config.server_credential().filter(|c| !c.is_blank()).cloned();

        match config.credential_mode() {
            CredentialMode::Server => server_key
                .map(CredentialPolicy::ServerHeld)
                .ok_or_else(|| EnhanceError::MissingConfigError {
                    field: "api_key".to_string(),
                }),
            CredentialMode::Caller => Ok(CredentialPolicy::CallerSupplied {
                fallback: server_key,
            }),
        }
    }

    pub fn resolve(&self, supplied: Option<Credential>) -> Result<Credential> {
        match self {
            CredentialPolicy::ServerHeld(key) => Ok(key.clone()),
            CredentialPolicy::CallerSupplied { fallback } => supplied
                .or_else(|| fallback.clone())
                .ok_or(EnhanceError::MissingCredentialError),
        }
    }
}

pub struct IngressGate {
    enhancer: Arc<dyn TextEnhancer>,
    limiter: Arc<dyn RateLimiter>,
    credentials: CredentialPolicy,
    trust_proxy: bool,
}

impl IngressGate {
    pub fn new(
        enhancer: Arc<dyn TextEnhancer>,
        limiter: Arc<dyn RateLimiter>,
        credentials: CredentialPolicy,
    ) -> Self {
        Self {
            enhancer,
            limiter,
            credentials,
            trust_proxy: false,
        }
    }

    pub fn with_trust_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }

    /// Runs one request from `client` through throttle, validation and enhancement.
    pub async fn handle(&self, client: &str, body: &[u8]) -> Response {
        self.handle_payload(client, Ok(body)).await
    }

    /// Like [`handle`](Self::handle), for a body that may have failed to arrive.
    /// The request is still counted before the body error is reported.
    pub async fn handle_payload(&self, client: &str, body: Result<&[u8]>) -> Response {
        let decision = self.limiter.check(client);

        let mut response = match self.process(client, &decision, body).await {
            Ok(enhanced) => {
                (StatusCode::OK, Json(EnhanceResponse::Enhanced(enhanced))).into_response()
            }
            Err(e) => e.into_response(),
        };

        self.apply_rate_limit_headers(response.headers_mut(), &decision);
        response
    }

    async fn process(
        &self,
        client: &str,
        decision: &RateLimitDecision,
        body: Result<&[u8]>,
    ) -> Result<String> {
        if !decision.allowed {
            tracing::warn!("Rate limit exceeded for {}", client);
            return Err(EnhanceError::QuotaExceededError {
                client: client.to_string(),
            });
        }

        let body = body.inspect_err(|e| {
            tracing::warn!("Rejected body from {}: {}", client, e);
        })?;
        let request = EnhanceRequest::from_json_body(body).inspect_err(|_| {
            tracing::debug!("Rejected request from {}: no text", client);
        })?;
        let credential = self.credentials.resolve(request.api_key)?;

        tracing::info!(
            "Enhancing {} chars for {} ({} left in window)",
            request.text.chars().count(),
            client,
            decision.remaining
        );

        self.enhancer.enhance(&request.text, &credential).await
    }

    fn apply_rate_limit_headers(&self, headers: &mut HeaderMap, decision: &RateLimitDecision) {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
        headers.insert(
            X_RATELIMIT_RESET,
            HeaderValue::from(decision.reset_at.timestamp()),
        );

        if !decision.allowed {
            let retry_after = decision.retry_after_secs(self.limiter.now());
            headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
        }
    }

    /// Rate-limit key for a request: the peer IP, or the first `X-Forwarded-For`
    /// hop when running behind a trusted reverse proxy.
    pub fn client_key(&self, headers: &HeaderMap, peer: SocketAddr) -> String {
        if self.trust_proxy {
            let forwarded = headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|ip| !ip.is_empty());

            if let Some(ip) = forwarded {
                return ip.to_string();
            }
        }
        peer.ip().to_string()
    }
}

pub fn router(gate: Arc<IngressGate>) -> Router {
    Router::new()
        .route(ENHANCE_PATH, post(enhance).fallback(method_not_allowed))
        .route("/health", get(health_check))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(gate)
}

async fn enhance(
    State(gate): State<Arc<IngressGate>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Response {
    let client = gate.client_key(&headers, peer);
    let body = body.as_deref().map_err(body_rejection_error);
    gate.handle_payload(&client, body).await
}

fn body_rejection_error(rejection: &BytesRejection) -> EnhanceError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        EnhanceError::PayloadTooLargeError {
            limit: MAX_BODY_BYTES,
        }
    } else {
        tracing::debug!("Failed to read request body: {}", rejection);
        EnhanceError::ValidationError
    }
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok"
    }))
}

async fn method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(EnhanceResponse::Error("Method not allowed.".to_string())),
    )
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(EnhanceResponse::Error("Not found.".to_string())),
    )
}
