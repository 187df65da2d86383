//! Object key validation.
//!
//! Keys are `/`-separated relative paths. Both the filesystem-backed
//! driver and the blob server map keys straight onto directories, so a
//! key must never be able to climb out of its root.

/// Reasons a key is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("object key is empty")]
    Empty,

    #[error("object key must be relative: {0}")]
    Absolute(String),

    #[error("object key contains an invalid segment: {0}")]
    InvalidSegment(String),
}

/// Validate a full object key (e.g. `dev/model/0.1/weights.bin`).
pub fn validate_key(key: &str) -> Result<(), KeyError> {
    if key.is_empty() {
        return Err(KeyError::Empty);
    }
    if key.starts_with('/') || key.contains('\\') || has_drive_prefix(key) {
        return Err(KeyError::Absolute(key.to_string()));
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(KeyError::InvalidSegment(key.to_string()));
        }
    }
    Ok(())
}

/// Validate a listing prefix. Unlike keys, a prefix may be empty and may
/// end with `/`.
pub fn validate_prefix(prefix: &str) -> Result<(), KeyError> {
    let trimmed = prefix.strip_suffix('/').unwrap_or(prefix);
    if trimmed.is_empty() {
        return Ok(());
    }
    validate_key(trimmed)
}

/// Percent-encode one path component, including `/`.
pub fn encode_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

/// Percent-encode a key for use in a URL path, keeping `/` separators.
pub fn encode_key(key: &str) -> String {
    key.split('/')
        .map(encode_component)
        .collect::<Vec<_>>()
        .join("/")
}

fn has_drive_prefix(key: &str) -> bool {
    let bytes = key.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
