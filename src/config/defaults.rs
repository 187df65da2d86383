//! Built-in defaults (layer 1)

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Storage backend (default: "local")
    pub storage_provider: String,

    /// Bucket; for the local backend a directory (default: ~/.mlvault/store)
    pub storage_bucket: String,

    /// Environment prefix (default: "dev")
    pub storage_prefix: String,

    /// Versioning system (default: "major.minor")
    pub versioning_system: String,

    /// Local cache root (default: ~/.mlvault/cache)
    pub cache_dir: String,

    /// HTTP timeout for network backends in seconds (default: 30)
    pub http_timeout_seconds: u64,

    /// Attempts per network call, first one included (default: 3)
    pub retry_max_attempts: u64,

    /// First retry delay in milliseconds (default: 200)
    pub retry_initial_backoff_ms: u64,

    /// Retry delay cap in milliseconds (default: 5000)
    pub retry_max_backoff_ms: u64,
}

fn home_path(relative: &str) -> String {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(relative)
        .display()
        .to_string()
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            storage_provider: "local".to_string(),
            storage_bucket: home_path(".mlvault/store"),
            storage_prefix: "dev".to_string(),
            versioning_system: "major.minor".to_string(),
            cache_dir: home_path(".mlvault/cache"),
            http_timeout_seconds: 30,
            retry_max_attempts: 3,
            retry_initial_backoff_ms: 200,
            retry_max_backoff_ms: 5000,
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "storage": {
                "provider": self.storage_provider,
                "bucket": self.storage_bucket,
                "prefix": self.storage_prefix
            },
            "versioning": {
                "system": self.versioning_system
            },
            "cache": {
                "dir": self.cache_dir
            },
            "http_timeout_seconds": self.http_timeout_seconds,
            "retry": {
                "max_attempts": self.retry_max_attempts,
                "initial_backoff_ms": self.retry_initial_backoff_ms,
                "max_backoff_ms": self.retry_max_backoff_ms
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let defaults = BuiltinDefaults::default();
        assert_eq!(defaults.storage_provider, "local");
        assert_eq!(defaults.storage_prefix, "dev");
        assert_eq!(defaults.versioning_system, "major.minor");
        assert_eq!(defaults.http_timeout_seconds, 30);
        assert!(defaults.storage_bucket.ends_with("store"));
        assert!(defaults.cache_dir.ends_with("cache"));
    }

    #[test]
    fn test_to_value() {
        let value = BuiltinDefaults::default().to_value();
        assert_eq!(value["storage"]["provider"], "local");
        assert_eq!(value["retry"]["max_attempts"], 3);
        assert_eq!(value["versioning"]["system"], "major.minor");
    }
}
