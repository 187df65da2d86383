//! In-memory storage driver for tests
//!
//! [`MockDriver`] keeps objects in a map, counts every call per operation,
//! and can inject failures (with `fail_count` semantics) or silently drop
//! uploads to simulate a destination that lags behind the writer. When a
//! [`RetryPolicy`] is attached, every call is routed through it the way
//! network drivers do.

mod failure;

pub use failure::{DriverOp, FailureConfig, FailureInjector, FailureKind};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::thread;

use crate::driver::{remove_stale_destination, write_atomically, ObjectIter, StorageDriver};
use crate::error::AssetError;
use crate::retry::RetryPolicy;

#[derive(Debug, Default)]
struct MockState {
    objects: BTreeMap<String, Vec<u8>>,
    calls: HashMap<DriverOp, usize>,
    failures: FailureInjector,
    dropped_uploads: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct MockDriver {
    bucket: String,
    state: Mutex<MockState>,
    retry: Option<RetryPolicy>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            bucket: "mock-bucket".to_string(),
            ..Self::default()
        }
    }

    /// Route every call through `retry`.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the state from the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn inject(&self, op: DriverOp, config: FailureConfig) {
        self.state().failures.inject(op, config);
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Accept uploads of `object_name` without storing them.
    pub fn drop_uploads_of(&self, object_name: impl Into<String>) {
        self.state().dropped_uploads.insert(object_name.into());
    }

    pub fn calls(&self, op: DriverOp) -> usize {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state().calls.values().sum()
    }

    pub fn reset_calls(&self) {
        self.state().calls.clear();
    }

    pub fn put_bytes(&self, object_name: &str, data: impl Into<Vec<u8>>) {
        self.state().objects.insert(object_name.to_string(), data.into());
    }

    pub fn get_bytes(&self, object_name: &str) -> Option<Vec<u8>> {
        self.state().objects.get(object_name).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state().objects.keys().cloned().collect()
    }

    /// Count the call, then apply any injected failure.
    fn enter(&self, op: DriverOp, object_name: &str) -> Result<(), AssetError> {
        let failure = {
            let mut state = self.state();
            *state.calls.entry(op).or_insert(0) += 1;
            state.failures.check(op).cloned()
        };
        match failure {
            Some(config) => {
                if let Some(delay) = config.delay {
                    thread::sleep(delay);
                }
                Err(config.to_error(object_name))
            }
            None => Ok(()),
        }
    }

    fn run<T, F>(&self, operation: &str, op: F) -> Result<T, AssetError>
    where
        F: FnMut() -> Result<T, AssetError>,
    {
        match &self.retry {
            Some(retry) => retry.run(operation, op),
            None => {
                let mut op = op;
                op()
            }
        }
    }
}

impl StorageDriver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn upload_object(&self, file_path: &Path, object_name: &str) -> Result<(), AssetError> {
        self.run("upload_object", || {
            self.enter(DriverOp::Upload, object_name)?;
            let data = fs::read(file_path)?;
            let mut state = self.state();
            state.objects.remove(object_name);
            if !state.dropped_uploads.contains(object_name) {
                state.objects.insert(object_name.to_string(), data);
            }
            Ok(())
        })
    }

    fn download_object(
        &self,
        object_name: &str,
        destination_path: &Path,
    ) -> Result<(), AssetError> {
        self.run("download_object", || {
            self.enter(DriverOp::Download, object_name)?;
            let data = self.get_bytes(object_name);
            match data {
                Some(bytes) => {
                    write_atomically(destination_path, &mut bytes.as_slice())?;
                    Ok(())
                }
                None => {
                    remove_stale_destination(destination_path)?;
                    Err(AssetError::not_found(&self.bucket, object_name))
                }
            }
        })
    }

    fn delete_object(&self, object_name: &str) -> Result<(), AssetError> {
        self.run("delete_object", || {
            self.enter(DriverOp::Delete, object_name)?;
            match self.state().objects.remove(object_name) {
                Some(_) => Ok(()),
                None => Err(AssetError::not_found(&self.bucket, object_name)),
            }
        })
    }

    fn exists(&self, object_name: &str) -> Result<bool, AssetError> {
        self.run("exists", || {
            self.enter(DriverOp::Exists, object_name)?;
            Ok(self.state().objects.contains_key(object_name))
        })
    }

    fn iterate_objects<'a>(&'a self, prefix: &str) -> ObjectIter<'a> {
        let result = self.run("iterate_objects", || {
            self.enter(DriverOp::List, prefix)?;
            Ok(self
                .state()
                .objects
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect::<Vec<_>>())
        });
        match result {
            Ok(keys) => Box::new(keys.into_iter().map(Ok)),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    fn get_object_uri(&self, object_name: &str) -> String {
        format!("mock://{}/{}", self.bucket, object_name)
    }
}
