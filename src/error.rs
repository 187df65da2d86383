//! Error taxonomy for the asset store.
//!
//! Drivers, the provider and the manager all return [`AssetError`]. Driver
//! errors travel through the provider unmodified, so callers can match on
//! [`AssetError::ObjectNotFound`] to implement "create if missing" flows.

use std::io;

/// Errors returned by the asset store core.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    /// The object or asset version does not exist. Definitive, never retried.
    #[error("object not found: {object_name} (bucket `{bucket}`)")]
    ObjectNotFound { bucket: String, object_name: String },

    /// `new` was called for an exact version that already has a manifest.
    #[error("asset `{name}` version `{version}` already exists, use `update` instead")]
    AlreadyExists { name: String, version: String },

    /// The backend for this driver kind is not compiled in or not configured.
    #[error("driver not installed: {0}")]
    DriverUnavailable(String),

    /// Malformed asset name, version, object key or remote URL.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// Network timeout, connection failure or retryable HTTP status.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Non-retryable HTTP failure.
    #[error("HTTP {status} for {url}: {message}")]
    Http {
        status: u16,
        url: String,
        message: String,
    },

    /// The operation needed confirmation and did not get it.
    #[error("aborted: {0}")]
    Aborted(String),

    /// Objects that were uploaded are missing from the destination.
    #[error("push incomplete, missing remote objects: {}", missing.join(", "))]
    PushIncomplete { missing: Vec<String> },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AssetError {
    /// Build an `ObjectNotFound` error.
    pub fn not_found(bucket: impl Into<String>, object_name: impl Into<String>) -> Self {
        Self::ObjectNotFound {
            bucket: bucket.into(),
            object_name: object_name.into(),
        }
    }

    /// Build an `InvalidReference` error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidReference(message.into())
    }

    /// Build an HTTP error, classifying retryable statuses as transient.
    pub fn from_status(status: u16, url: impl Into<String>, message: impl Into<String>) -> Self {
        let url = url.into();
        let message = message.into();
        if status >= 500 || status == 408 || status == 429 {
            Self::Transient(format!("HTTP {} for {}: {}", status, url, message))
        } else {
            Self::Http {
                status,
                url,
                message,
            }
        }
    }

    /// Whether a retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Whether this is a definitive "does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ObjectNotFound { .. })
    }
}

impl From<mlvault_protocol::KeyError> for AssetError {
    fn from(error: mlvault_protocol::KeyError) -> Self {
        Self::InvalidReference(error.to_string())
    }
}

impl From<mlvault_protocol::ArchiveError> for AssetError {
    fn from(error: mlvault_protocol::ArchiveError) -> Self {
        match error {
            mlvault_protocol::ArchiveError::Io(e) => Self::Io(e),
            mlvault_protocol::ArchiveError::Walk(e) => Self::Walk(e),
            escaping => Self::InvalidReference(escaping.to_string()),
        }
    }
}

/// Result alias used throughout the crate.
pub type AssetResult<T> = Result<T, AssetError>;
