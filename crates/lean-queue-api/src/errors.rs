//! Error types for the HTTP service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use lean_queue_core::QueueError;
use tracing::{error, warn};

/// Request handler errors with HTTP status code mapping
///
/// - `400 Bad Request`: the caller sent something unusable (malformed JSON,
///   missing or non-numeric parameters, empty fields)
/// - `401 Unauthorized`: missing or unknown API key
/// - `404 Not Found`: lookup of an unknown message ID
/// - `500 Internal Server Error`: the store failed or returned a corrupt row
///
/// Storage failures are logged in full server-side; the client only sees a
/// generic message.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request body could not be parsed
    #[error("Invalid request body: {message}")]
    InvalidBody { message: String },

    /// Required query or path parameter was not supplied
    #[error("Missing required parameter: {name}")]
    MissingParameter { name: String },

    /// Parameter was supplied but could not be parsed
    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },

    /// Missing or unrecognized API key
    #[error("Invalid or missing API key")]
    Unauthorized,

    /// Point lookup for something that does not exist
    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    /// Failure reported by the queue service
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl ApiError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidBody { .. }
            | Self::MissingParameter { .. }
            | Self::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Queue(QueueError::InvalidArgument(_)) => StatusCode::BAD_REQUEST,
            Self::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let (message, retry_after) = match &self {
            Self::Queue(e @ QueueError::StorageUnavailable { .. }) => {
                error!(error = %e, "Storage failure while handling request");
                (
                    "Storage temporarily unavailable. Please try again later.".to_string(),
                    Some(5),
                )
            }
            Self::Queue(e @ QueueError::CorruptRecord { .. }) => {
                error!(error = %e, "Corrupt record encountered");
                (
                    "Internal server error occurred. Please try again later.".to_string(),
                    None,
                )
            }
            Self::InvalidBody { .. } => {
                warn!(error = %self, "Rejected malformed request body");
                (self.to_string(), None)
            }
            _ => (self.to_string(), None),
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let mut response = (status, Json(body)).into_response();

        if let Some(retry_seconds) = retry_after {
            if let Ok(header_value) = retry_seconds.to_string().parse() {
                response.headers_mut().insert("Retry-After", header_value);
            }
        }

        response
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] QueueError),
}

impl ServiceError {
    /// Whether restarting the server could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::BindFailed { .. } | Self::Configuration(_) => false,
            Self::ServerFailed { .. } => true,
            Self::Storage(e) => e.is_transient(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration loading failed: {message}")]
    Load { message: String },
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;
