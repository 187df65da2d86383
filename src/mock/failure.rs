//! Failure injection for the mock driver

use std::collections::HashMap;
use std::time::Duration;

use crate::error::AssetError;

/// Driver operations that can be counted and failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverOp {
    Upload,
    Download,
    Delete,
    Exists,
    List,
}

/// What an injected failure looks like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeout / connection reset / 5xx.
    Transient,
    /// Definitive HTTP failure with this status.
    Http(u16),
}

/// Failure configuration for an operation
#[derive(Debug, Clone)]
pub struct FailureConfig {
    pub kind: FailureKind,
    /// Error message to return
    pub message: String,
    /// Delay to add before responding
    pub delay: Option<Duration>,
    /// Number of times to fail before succeeding (None = always fail)
    pub fail_count: Option<u32>,
}

impl FailureConfig {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
            delay: None,
            fail_count: None,
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Http(status),
            message: message.into(),
            delay: None,
            fail_count: None,
        }
    }

    /// Set the number of times to fail before succeeding
    pub fn with_fail_count(mut self, count: u32) -> Self {
        self.fail_count = Some(count);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn to_error(&self, object_name: &str) -> AssetError {
        match self.kind {
            FailureKind::Transient => {
                AssetError::Transient(format!("{} ({})", self.message, object_name))
            }
            FailureKind::Http(status) => AssetError::Http {
                status,
                url: format!("mock://{}", object_name),
                message: self.message.clone(),
            },
        }
    }
}

/// Per-operation failure injector
#[derive(Debug, Default)]
pub struct FailureInjector {
    configs: HashMap<DriverOp, FailureConfig>,
    /// Calls seen per operation since injection (for fail_count tracking)
    call_counts: HashMap<DriverOp, u32>,
}

impl FailureInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(&mut self, op: DriverOp, config: FailureConfig) {
        self.configs.insert(op, config);
        self.call_counts.insert(op, 0);
    }

    pub fn clear(&mut self) {
        self.configs.clear();
        self.call_counts.clear();
    }

    pub fn clear_op(&mut self, op: DriverOp) {
        self.configs.remove(&op);
        self.call_counts.remove(&op);
    }

    /// Returns the failure to apply to this call, if any.
    pub fn check(&mut self, op: DriverOp) -> Option<&FailureConfig> {
        let config = self.configs.get(&op)?;
        let count = self.call_counts.entry(op).or_insert(0);
        *count += 1;

        if let Some(fail_limit) = config.fail_count {
            if *count > fail_limit {
                return None;
            }
        }
        Some(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_injector_basic() {
        let mut injector = FailureInjector::new();
        assert!(injector.check(DriverOp::Exists).is_none());

        injector.inject(DriverOp::Upload, FailureConfig::http(403, "forbidden"));
        let config = injector.check(DriverOp::Upload).unwrap();
        assert!(matches!(
            config.to_error("k"),
            AssetError::Http { status: 403, .. }
        ));
    }

    #[test]
    fn test_injector_fail_count() {
        let mut injector = FailureInjector::new();
        injector.inject(
            DriverOp::Download,
            FailureConfig::transient("reset").with_fail_count(2),
        );
        assert!(injector.check(DriverOp::Download).is_some());
        assert!(injector.check(DriverOp::Download).is_some());
        assert!(injector.check(DriverOp::Download).is_none());
    }

    #[test]
    fn test_injector_clear() {
        let mut injector = FailureInjector::new();
        injector.inject(DriverOp::Delete, FailureConfig::transient("x"));
        assert!(injector.check(DriverOp::Delete).is_some());
        injector.clear_op(DriverOp::Delete);
        assert!(injector.check(DriverOp::Delete).is_none());
    }
}
