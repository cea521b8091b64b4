use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Stable, machine-readable error codes returned next to the message.
pub mod error_code {
    pub const INVALID_BATCH: &str = "INVALID_BATCH";
    pub const INVALID_FEATURE: &str = "INVALID_FEATURE";
    pub const DUPLICATE_BATCH: &str = "DUPLICATE_BATCH";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const INTERNAL: &str = "INTERNAL";
}

#[derive(Debug, Error)]
pub enum FactoryError {
    /// Bad batch shape or step budget.
    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    /// Bad feature entry inside an otherwise well-formed batch.
    #[error("invalid feature: {0}")]
    InvalidFeature(String),

    #[error("batch {0} already exists")]
    DuplicateBatch(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// The task driving a batch panicked or was cancelled.
    #[error("batch execution failed: {0}")]
    Execution(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl FactoryError {
    pub fn error_code(&self) -> &'static str {
        match self {
            FactoryError::InvalidBatch(_) => error_code::INVALID_BATCH,
            FactoryError::InvalidFeature(_) => error_code::INVALID_FEATURE,
            FactoryError::DuplicateBatch(_) => error_code::DUPLICATE_BATCH,
            FactoryError::NotFound(_) => error_code::NOT_FOUND,
            _ => error_code::INTERNAL,
        }
    }

    /// HTTP status used when the error reaches the endpoint layer.
    pub fn status_code(&self) -> StatusCode {
        match self {
            FactoryError::InvalidBatch(_) | FactoryError::InvalidFeature(_) => {
                StatusCode::BAD_REQUEST
            }
            FactoryError::DuplicateBatch(_) => StatusCode::CONFLICT,
            FactoryError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for FactoryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = serde_json::json!({
            "error": self.to_string(),
            "code": self.error_code(),
        });
        (status, axum::Json(body)).into_response()
    }
}
