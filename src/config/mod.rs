//! Layered configuration
//!
//! Layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. TOML file (`--config`)
//! 3. `MLVAULT_*` environment variables
//! 4. CLI flags
//!
//! Nothing here is global: callers build an [`EffectiveConfig`] and pass
//! the typed [`AssetsConfig`] into the provider and manager they construct.

mod defaults;
mod effective;
mod merge;

pub use defaults::BuiltinDefaults;
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig, ENV_VARS};
pub use merge::{deep_merge, merge_layers, set_path};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::driver::{DriverKind, DriverSettings};
use crate::error::AssetError;
use crate::guard::Confirm;
use crate::manager::AssetsManager;
use crate::provider::StorageProvider;
use crate::retry::RetryPolicy;
use crate::versioning::VersioningSystem;

/// Environment prefixes a store may be partitioned into.
pub const ALLOWED_ENVS: &[&str] = &["dev", "preprod", "prod"];

/// Storage section.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageSettings {
    pub provider: DriverKind,
    pub bucket: String,
    pub prefix: String,
    pub rest_url: Option<String>,
    pub gcs_token: Option<String>,
}

/// Typed view of the merged configuration.
#[derive(Debug, Clone)]
pub struct AssetsConfig {
    pub storage: StorageSettings,
    pub versioning: VersioningSystem,
    pub cache_dir: PathBuf,
    pub http_timeout: Duration,
    pub retry: RetryPolicy,
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

fn u64_at(value: &Value, pointer: &str, default: u64) -> Result<u64, ConfigError> {
    match value.pointer(pointer) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::String(s)) => s.parse().map_err(|_| {
            ConfigError::ValidationError(format!("{} must be an integer, got `{}`", pointer, s))
        }),
        Some(v) => v.as_u64().ok_or_else(|| {
            ConfigError::ValidationError(format!("{} must be a non-negative integer", pointer))
        }),
    }
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

impl AssetsConfig {
    /// Extract typed settings from a merged config value.
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let defaults = BuiltinDefaults::default();

        let provider: DriverKind = str_at(value, "/storage/provider")
            .unwrap_or(defaults.storage_provider.as_str())
            .parse()
            .map_err(|e: AssetError| ConfigError::ValidationError(e.to_string()))?;
        let versioning: VersioningSystem = str_at(value, "/versioning/system")
            .unwrap_or(defaults.versioning_system.as_str())
            .parse()
            .map_err(|e: AssetError| ConfigError::ValidationError(e.to_string()))?;

        let storage = StorageSettings {
            provider,
            bucket: str_at(value, "/storage/bucket")
                .unwrap_or(defaults.storage_bucket.as_str())
                .to_string(),
            prefix: str_at(value, "/storage/prefix")
                .unwrap_or(defaults.storage_prefix.as_str())
                .to_string(),
            rest_url: str_at(value, "/storage/rest_url").map(str::to_string),
            gcs_token: str_at(value, "/storage/gcs_token").map(str::to_string),
        };

        let timeout = u64_at(value, "/http_timeout_seconds", defaults.http_timeout_seconds)?;
        let retry = RetryPolicy::new(
            u64_at(value, "/retry/max_attempts", defaults.retry_max_attempts)? as u32,
            Duration::from_millis(u64_at(
                value,
                "/retry/initial_backoff_ms",
                defaults.retry_initial_backoff_ms,
            )?),
            Duration::from_millis(u64_at(
                value,
                "/retry/max_backoff_ms",
                defaults.retry_max_backoff_ms,
            )?),
        );

        Ok(Self {
            storage,
            versioning,
            cache_dir: expand_home(str_at(value, "/cache/dir").unwrap_or(defaults.cache_dir.as_str())),
            http_timeout: Duration::from_secs(timeout),
            retry,
        })
    }

    /// Driver settings for the configured backend.
    pub fn driver_settings(&self) -> Result<DriverSettings, AssetError> {
        let bucket = match self.storage.provider {
            DriverKind::Local => expand_home(&self.storage.bucket).display().to_string(),
            DriverKind::Gcs => self.storage.bucket.clone(),
            DriverKind::Rest => self.storage.rest_url.clone().ok_or_else(|| {
                AssetError::Config(
                    "storage.rest_url (MLVAULT_REST_URL) is required for the rest provider"
                        .to_string(),
                )
            })?,
        };
        Ok(DriverSettings::new(self.storage.provider, bucket)
            .with_token(self.storage.gcs_token.clone())
            .with_timeout(self.http_timeout)
            .with_retry(self.retry))
    }

    /// Build a provider for `prefix` (defaults to `storage.prefix`).
    pub fn build_provider(
        &self,
        prefix: Option<&str>,
        confirm: Arc<dyn Confirm>,
    ) -> Result<StorageProvider, AssetError> {
        let prefix = prefix.unwrap_or(self.storage.prefix.as_str());
        if !ALLOWED_ENVS.contains(&prefix) {
            return Err(AssetError::Config(format!(
                "storage prefix must be one of {} (got `{}`)",
                ALLOWED_ENVS.join(", "),
                prefix
            )));
        }
        let driver = self.driver_settings()?.build()?;
        Ok(StorageProvider::new(driver, prefix)?
            .with_versioning(self.versioning)
            .with_confirm(confirm))
    }

    /// Build a manager over the configured cache directory.
    pub fn build_manager(
        &self,
        prefix: Option<&str>,
        confirm: Arc<dyn Confirm>,
    ) -> Result<AssetsManager, AssetError> {
        Ok(AssetsManager::new(
            self.build_provider(prefix, confirm)?,
            self.cache_dir.clone(),
        ))
    }
}
