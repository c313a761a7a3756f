//! Crate-wide error taxonomy.
//!
//! Grounded on `src/server.rs`'s `ServerError` (a thin `anyhow::Error` wrapper convertible to an
//! HTTP response) and `src/tools/mod.rs`'s `ToolOutput` (a structured success/error result rather
//! than a propagated exception). This file gives every adapter boundary in the orchestration
//! layer a single closed set of error *kinds* per spec §7, instead of letting `anyhow::Error`
//! leak past a component boundary.

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// The six error kinds named in spec §7. Every external-call failure observed anywhere in the
/// orchestration layer is mapped into one of these before it crosses a component boundary.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Network error, 429, 5xx, timeout. Never fatal to a turn by itself — the caller retries or
    /// skips the failing provider.
    #[error("temporary failure calling {provider}: {message}")]
    Transient { provider: String, message: String },

    /// Missing credential, missing scope, provider-side 403. The adapter is effectively disabled
    /// for the turn; surfaced with actionable guidance.
    #[error("{provider} is not configured: {message}")]
    PermanentConfig { provider: String, message: String },

    /// Every model in the LLM Router's resolved fallback chain was exhausted or unavailable.
    #[error("quota exhausted across the configured model chain: {message}")]
    QuotaExhausted { message: String },

    /// Mailer OAuth credential was revoked server-side; the user must reconnect.
    #[error("mailer credential revoked: {message}")]
    AuthRevoked { message: String },

    /// Caller supplied an unknown action prefix / unknown model / malformed file. No state
    /// change is made.
    #[error("invalid request: {message}")]
    Validation { message: String },

    /// An internal invariant would be violated by proceeding (e.g. sending without a verified
    /// recruiter email). The operation refuses rather than failing silently.
    #[error("refused: {message}")]
    InvariantViolation { message: String },
}

impl OrchestrationError {
    pub fn transient(provider: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Transient { provider: provider.into(), message: message.to_string() }
    }

    pub fn permanent_config(provider: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::PermanentConfig { provider: provider.into(), message: message.to_string() }
    }

    pub fn quota_exhausted(message: impl fmt::Display) -> Self {
        Self::QuotaExhausted { message: message.to_string() }
    }

    pub fn auth_revoked(message: impl fmt::Display) -> Self {
        Self::AuthRevoked { message: message.to_string() }
    }

    pub fn validation(message: impl fmt::Display) -> Self {
        Self::Validation { message: message.to_string() }
    }

    pub fn invariant_violation(message: impl fmt::Display) -> Self {
        Self::InvariantViolation { message: message.to_string() }
    }

    /// A short label for logs/metrics — never shown to the user verbatim.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transient { .. } => "transient",
            Self::PermanentConfig { .. } => "permanent_config",
            Self::QuotaExhausted { .. } => "quota_exhausted",
            Self::AuthRevoked { .. } => "auth_revoked",
            Self::Validation { .. } => "validation",
            Self::InvariantViolation { .. } => "invariant_violation",
        }
    }

    /// Whether the LLM Router should try the next model in the chain on this error.
    pub fn is_retryable_in_chain(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

impl IntoResponse for OrchestrationError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Transient { .. } => StatusCode::BAD_GATEWAY,
            Self::PermanentConfig { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::QuotaExhausted { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::AuthRevoked { .. } => StatusCode::UNAUTHORIZED,
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::InvariantViolation { .. } => StatusCode::CONFLICT,
        };
        let kind = self.kind();
        let body = ErrorBody { error: self.to_string(), kind };
        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, OrchestrationError>;
