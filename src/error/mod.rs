use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type for limiter operations
pub type Result<T> = std::result::Result<T, LimiterError>;

/// Limiter error types
///
/// A denied rate-limit decision is not an error; it is a normal
/// [`Decision`](crate::rate_limit::Decision) with `allowed == false`.
#[derive(Error, Debug)]
pub enum LimiterError {
    /// Invalid tier table or settings. Raised at startup, never per request.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The shared counter store could not answer in time or at all.
    #[error("Rate limit backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Admin access required")]
    Forbidden,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LimiterError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            LimiterError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            LimiterError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            LimiterError::Unauthorized => StatusCode::UNAUTHORIZED,
            LimiterError::Forbidden => StatusCode::FORBIDDEN,
            LimiterError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<redis::RedisError> for LimiterError {
    fn from(err: redis::RedisError) -> Self {
        LimiterError::BackendUnavailable(err.to_string())
    }
}

impl IntoResponse for LimiterError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
