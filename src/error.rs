use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::provider::ProviderError;
use crate::validate::ValidationError;

/// Message returned for failures whose detail is withheld in production.
pub const GENERIC_FAILURE: &str = "Failed to analyze post";

/// Every way an analysis request can fail. Each variant maps to one status
/// and one client-facing message; no partial result is ever returned.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,
    #[error("Request too large")]
    PayloadTooLarge,
    #[error("Invalid JSON in request body")]
    InvalidJson,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Authentication failed with the AI service")]
    UpstreamAuth,
    #[error("AI service rate limit exceeded. Please try again later.")]
    UpstreamRateLimited,
    #[error("GROQ API key not configured")]
    MissingCredential,
    #[error("Invalid response from GROQ API")]
    InvalidUpstreamResponse,
    #[error("{message}")]
    Unclassified {
        status: Option<u16>,
        message: String,
    },
}

impl From<ProviderError> for AnalyzeError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Status { status: 401, .. } => AnalyzeError::UpstreamAuth,
            ProviderError::Status { status: 429, .. } => AnalyzeError::UpstreamRateLimited,
            ProviderError::EmptyCompletion => AnalyzeError::InvalidUpstreamResponse,
            ProviderError::Status { status, message } => AnalyzeError::Unclassified {
                status: Some(status),
                message,
            },
            ProviderError::Transport(message) => AnalyzeError::Unclassified {
                status: None,
                message,
            },
        }
    }
}

impl AnalyzeError {
    pub fn status(&self) -> StatusCode {
        match self {
            AnalyzeError::RateLimited | AnalyzeError::UpstreamRateLimited => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AnalyzeError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AnalyzeError::InvalidJson | AnalyzeError::Validation(_) => StatusCode::BAD_REQUEST,
            AnalyzeError::UpstreamAuth => StatusCode::UNAUTHORIZED,
            AnalyzeError::MissingCredential | AnalyzeError::InvalidUpstreamResponse => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            // Provider status passes through when it is an error status.
            AnalyzeError::Unclassified { status, .. } => status
                .and_then(|s| StatusCode::from_u16(s).ok())
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    /// Text placed in the `error` field. Upstream and unclassified detail is
    /// only included when `expose_detail` is set.
    pub fn public_message(&self, expose_detail: bool) -> String {
        match self {
            AnalyzeError::InvalidUpstreamResponse | AnalyzeError::Unclassified { .. }
                if !expose_detail =>
            {
                GENERIC_FAILURE.to_string()
            }
            AnalyzeError::Unclassified { message, .. } if message.is_empty() => {
                GENERIC_FAILURE.to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn to_response(&self, expose_detail: bool) -> Response {
        let body = ErrorResponse {
            error: self.public_message(expose_detail),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
