//! Error payloads returned by the blob service.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error codes carried in error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Missing form field, malformed query, or a key that escapes the store root.
    InvalidRequest,
    /// The requested object or asset version does not exist.
    NotFound,
    /// Upload exceeds the configured maximum size.
    PayloadTooLarge,
    /// Server-side failure (I/O, archive creation).
    Internal,
}

impl ErrorCode {
    /// HTTP status code associated with this error code.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest => 400,
            Self::NotFound => 404,
            Self::PayloadTooLarge => 413,
            Self::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest => write!(f, "INVALID_REQUEST"),
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::PayloadTooLarge => write!(f, "PAYLOAD_TOO_LARGE"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// Error details.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiError {
    /// Error code from the registry above.
    pub code: ErrorCode,
    /// Human-readable, single-line message.
    pub message: String,
}

/// Envelope for error responses: `{"error": {"code": ..., "message": ...}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub error: ApiError,
}

impl ErrorBody {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ApiError {
                code,
                message: message.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::InvalidRequest).unwrap();
        assert_eq!(json, "\"INVALID_REQUEST\"");
        let json = serde_json::to_string(&ErrorCode::NotFound).unwrap();
        assert_eq!(json, "\"NOT_FOUND\"");
    }

    #[test]
    fn test_display_matches_serde() {
        for code in [
            ErrorCode::InvalidRequest,
            ErrorCode::NotFound,
            ErrorCode::PayloadTooLarge,
            ErrorCode::Internal,
        ] {
            let serialized = serde_json::to_string(&code).unwrap();
            assert_eq!(serialized.trim_matches('"'), code.to_string());
        }
    }

    #[test]
    fn test_error_body_roundtrip_shape() {
        let body = ErrorBody::new(ErrorCode::NotFound, "object not found: dev/x");
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["error"]["code"], "NOT_FOUND");
        assert_eq!(value["error"]["message"], "object not found: dev/x");
    }

    #[test]
    fn test_http_status() {
        assert_eq!(ErrorCode::NotFound.http_status(), 404);
        assert_eq!(ErrorCode::Internal.http_status(), 500);
    }
}
