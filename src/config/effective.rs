//! Effective configuration with provenance
//!
//! Captures the merged configuration (secrets redacted), where each layer
//! came from, and the typed [`AssetsConfig`] extracted before redaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use super::defaults::BuiltinDefaults;
use super::merge::{merge_layers, set_path};
use super::{AssetsConfig, ALLOWED_ENVS};
use crate::error::AssetError;

/// Environment variables and the config paths they set.
pub const ENV_VARS: &[(&str, &str)] = &[
    ("MLVAULT_STORAGE_PROVIDER", "storage.provider"),
    ("MLVAULT_STORAGE_BUCKET", "storage.bucket"),
    ("MLVAULT_STORAGE_PREFIX", "storage.prefix"),
    ("MLVAULT_REST_URL", "storage.rest_url"),
    ("MLVAULT_GCS_TOKEN", "storage.gcs_token"),
    ("MLVAULT_VERSIONING_SYSTEM", "versioning.system"),
    ("MLVAULT_CACHE_DIR", "cache.dir"),
];

/// Origin of a configuration layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Env,
    Cli,
}

/// A contributing config source with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (file layer only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the raw file bytes (file layer only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    /// Variables that contributed (env layer only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<String>,
}

impl ConfigSource {
    fn new(origin: ConfigOrigin) -> Self {
        Self {
            origin,
            path: None,
            digest: None,
            variables: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    /// When this config was computed
    pub created_at: DateTime<Utc>,

    /// The merged configuration, secrets redacted
    pub config: Value,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,

    /// Redacted key paths
    pub redactions: Vec<String>,

    /// Typed settings, built from the unredacted merge
    #[serde(skip)]
    pub settings: AssetsConfig,
}

/// Keys that contain secrets and should be redacted
const SECRET_KEYS: &[&str] = &["password", "token", "secret", "private_key", "api_key", "credential"];

impl EffectiveConfig {
    /// Merge builtin defaults, an optional TOML file, environment
    /// variables (looked up through `env`) and CLI overrides.
    pub fn build<F>(
        config_path: Option<&Path>,
        env: F,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![ConfigSource::new(ConfigOrigin::Builtin)];

        if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::IoError(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            let (value, digest) = Self::load_toml_file(path)?;
            layers.push(value);
            sources.push(ConfigSource {
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
                ..ConfigSource::new(ConfigOrigin::File)
            });
        }

        let (env_layer, variables) = Self::env_layer(env);
        if !variables.is_empty() {
            layers.push(env_layer);
            sources.push(ConfigSource {
                variables,
                ..ConfigSource::new(ConfigOrigin::Env)
            });
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource::new(ConfigOrigin::Cli));
        }

        let mut merged = merge_layers(layers);
        Self::validate_config(&merged)?;
        let settings = AssetsConfig::from_value(&merged)?;
        let redactions = Self::redact_secrets(&mut merged);

        Ok(Self {
            created_at: Utc::now(),
            config: merged,
            sources,
            redactions,
            settings,
        })
    }

    /// Build from the process environment.
    pub fn from_process_env(
        config_path: Option<&Path>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        Self::build(config_path, |key| std::env::var(key).ok(), cli_overrides)
    }

    fn env_layer<F>(env: F) -> (Value, Vec<String>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut layer = Value::Object(serde_json::Map::new());
        let mut used = Vec::new();
        for (var, path) in ENV_VARS {
            if let Some(value) = env(var).filter(|v| !v.is_empty()) {
                set_path(&mut layer, path, Value::String(value));
                used.push(var.to_string());
            }
        }
        (layer, used)
    }

    /// Load and parse a TOML file, returning the value and digest
    fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
        let bytes = fs::read(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        let contents = String::from_utf8(bytes)
            .map_err(|e| ConfigError::ParseError(format!("Invalid UTF-8: {}", e)))?;
        let toml_value: toml::Value = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

        Ok((Self::toml_to_json(toml_value), digest))
    }

    fn toml_to_json(toml: toml::Value) -> Value {
        match toml {
            toml::Value::String(s) => Value::String(s),
            toml::Value::Integer(i) => Value::Number(i.into()),
            toml::Value::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            toml::Value::Boolean(b) => Value::Bool(b),
            toml::Value::Datetime(dt) => Value::String(dt.to_string()),
            toml::Value::Array(arr) => Value::Array(arr.into_iter().map(Self::toml_to_json).collect()),
            toml::Value::Table(table) => Value::Object(
                table
                    .into_iter()
                    .map(|(k, v)| (k, Self::toml_to_json(v)))
                    .collect(),
            ),
        }
    }

    fn redact_secrets(value: &mut Value) -> Vec<String> {
        let mut redactions = Vec::new();
        Self::redact_recursive(value, String::new(), &mut redactions);
        redactions
    }

    fn redact_recursive(value: &mut Value, path: String, redactions: &mut Vec<String>) {
        match value {
            Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    let current_path = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", path, key)
                    };

                    let is_secret = SECRET_KEYS.iter().any(|s| key_lower.contains(s));
                    if is_secret && !val.is_object() && !val.is_array() && !val.is_null() {
                        *val = Value::String("[REDACTED]".to_string());
                        redactions.push(current_path);
                    } else {
                        Self::redact_recursive(val, current_path, redactions);
                    }
                }
            }
            Value::Array(arr) => {
                for (i, val) in arr.iter_mut().enumerate() {
                    Self::redact_recursive(val, format!("{}[{}]", path, i), redactions);
                }
            }
            _ => {}
        }
    }

    fn validate_config(config: &Value) -> Result<(), ConfigError> {
        let timeout = config.get("http_timeout_seconds");
        if let Some(value) = timeout {
            match value.as_u64() {
                Some(t) if t > 0 && t <= 600 => {}
                _ => {
                    return Err(ConfigError::ValidationError(
                        "http_timeout_seconds must be in (0, 600]".to_string(),
                    ))
                }
            }
        }

        if let Some(prefix) = config.pointer("/storage/prefix") {
            let prefix = prefix.as_str().unwrap_or_default();
            if !ALLOWED_ENVS.contains(&prefix) {
                return Err(ConfigError::ValidationError(format!(
                    "storage.prefix must be one of {} (got `{}`)",
                    ALLOWED_ENVS.join(", "),
                    prefix
                )));
            }
        }

        if let Some(attempts) = config.pointer("/retry/max_attempts") {
            if !matches!(attempts.as_u64(), Some(n) if (1..=20).contains(&n)) {
                return Err(ConfigError::ValidationError(
                    "retry.max_attempts must be in [1, 20]".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Get a config value by path (dot-separated)
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.config;
        for part in path.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(|v| v.as_u64())
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|v| v.as_str())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for AssetError {
    fn from(error: ConfigError) -> Self {
        AssetError::Config(error.to_string())
    }
}
