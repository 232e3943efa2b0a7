use axum::{Json, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde::Serialize;
use sqlx::Error as SqlxError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error as ThisError;
use tracing::error;

#[derive(Debug, ThisError)]
pub enum AdminError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error while {op} {}: {source}", .path.display())]
    File {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Upload error: {0}")]
    Upload(String),
}

impl AdminError {
    /// Build a mapper that attaches the failing operation and path to an I/O error.
    pub fn file(op: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| AdminError::File { op, path, source }
    }

    /// Transient failures worth another attempt. Caller mistakes never are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdminError::Io(_)
                | AdminError::File { .. }
                | AdminError::Database(_)
                | AdminError::Timeout(_)
        )
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AdminError::Validation(_) | AdminError::Json(_) | AdminError::Upload(_) => {
                StatusCode::BAD_REQUEST
            }
            AdminError::NotFound(_) => StatusCode::NOT_FOUND,
            AdminError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AdminError::Io(_) | AdminError::File { .. } | AdminError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn message(&self) -> &'static str {
        match self {
            AdminError::Validation(_) => "Invalid request.",
            AdminError::NotFound(_) => "Resource not found.",
            AdminError::Io(_) | AdminError::File { .. } => "A filesystem operation failed.",
            AdminError::Database(_) => "A database operation failed.",
            AdminError::Timeout(_) => "The operation timed out.",
            AdminError::Json(_) => "Malformed JSON payload.",
            AdminError::Upload(_) => "Malformed upload.",
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = %status, error = %self, "request failed");
        }
        let body = ApiErrorBody {
            error: self.message().to_string(),
            details: Some(self.to_string()),
            timestamp: Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}

/// Standardized API error response body
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_mistakes_are_not_retried() {
        assert!(!AdminError::Validation("empty".into()).is_retryable());
        assert!(!AdminError::NotFound("backup x".into()).is_retryable());
        assert!(AdminError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(AdminError::Database(SqlxError::PoolClosed).is_retryable());
    }

    #[test]
    fn file_errors_carry_path() {
        let err = AdminError::file("copying", "/tmp/x.sqlite")(std::io::Error::other("disk full"));
        let text = err.to_string();
        assert!(text.contains("copying"));
        assert!(text.contains("/tmp/x.sqlite"));
        assert!(text.contains("disk full"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
