//! Handler errors rendered as `{"error": {"code", "message"}}`.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mlvault_protocol::{ArchiveError, ErrorBody, ErrorCode, KeyError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Missing field, malformed form, or a path escaping its root (400).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Message is logged, never returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidRequest(_) => ErrorCode::InvalidRequest,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    pub fn missing_field(field: &str) -> Self {
        Self::InvalidRequest(format!("missing form field `{}`", field))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let status =
            StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = match &self {
            Self::Internal(_) => {
                tracing::error!(error = %self, "internal server error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorBody::new(code, message))).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::Internal(err.to_string()),
        }
    }
}

impl From<KeyError> for AppError {
    fn from(err: KeyError) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        Self::InvalidRequest(err.body_text())
    }
}

impl From<ArchiveError> for AppError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::EscapingEntry(_) => Self::InvalidRequest(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(AppError::NotFound("x".into()).code(), ErrorCode::NotFound);
        assert_eq!(
            AppError::missing_field("name").code(),
            ErrorCode::InvalidRequest
        );
        assert_eq!(AppError::Internal("x".into()).code(), ErrorCode::Internal);
    }

    #[test]
    fn test_io_not_found_maps_to_404() {
        let err = AppError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn test_internal_message_hidden() {
        let response = AppError::Internal("disk on fire".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_escaping_archive_is_client_error() {
        let err = AppError::from(ArchiveError::EscapingEntry("../x".into()));
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }
}
