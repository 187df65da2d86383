//! Storage drivers
//!
//! A driver exposes one physical backend as a flat key/value object store.
//! Drivers know nothing about assets, versions or manifests; that is the
//! provider's job. Available backends:
//! - [`LocalStorageDriver`]: a directory on the local filesystem
//! - [`RestStorageDriver`]: the `mlvault-server` blob service
//! - `GcsStorageDriver`: Google Cloud Storage (cargo feature `gcs`)

mod local;
mod remote_url;
mod rest;

#[cfg(feature = "gcs")]
mod gcs;

pub use local::LocalStorageDriver;
pub use remote_url::RemoteUrl;
pub use rest::RestStorageDriver;

#[cfg(feature = "gcs")]
pub use gcs::GcsStorageDriver;

use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::AssetError;
use crate::retry::RetryPolicy;

/// Prefix of in-flight temp files; listings skip these.
pub(crate) const TEMP_PREFIX: &str = ".mlvault-tmp-";

/// Lazy, fallible sequence of object keys.
pub type ObjectIter<'a> = Box<dyn Iterator<Item = Result<String, AssetError>> + 'a>;

/// Object-level capability set shared by every backend.
pub trait StorageDriver: Send + Sync + fmt::Debug {
    /// Short backend name (`local`, `gcs`, `rest`, ...).
    fn name(&self) -> &'static str;

    /// Backend location shown to users (directory, bucket or endpoint).
    fn bucket(&self) -> &str;

    /// Store `file_path` at `object_name`, replacing any existing object.
    fn upload_object(&self, file_path: &Path, object_name: &str) -> Result<(), AssetError>;

    /// Write the object to `destination_path`.
    ///
    /// A missing object yields [`AssetError::ObjectNotFound`] and leaves no
    /// file at `destination_path`.
    fn download_object(&self, object_name: &str, destination_path: &Path)
        -> Result<(), AssetError>;

    fn delete_object(&self, object_name: &str) -> Result<(), AssetError>;

    fn exists(&self, object_name: &str) -> Result<bool, AssetError>;

    /// Every key starting with `prefix` (plain string prefix).
    fn iterate_objects<'a>(&'a self, prefix: &str) -> ObjectIter<'a>;

    /// Locator for external consumers.
    fn get_object_uri(&self, object_name: &str) -> String;
}

/// Backend selector, resolved once when a driver is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriverKind {
    #[default]
    Local,
    Gcs,
    Rest,
}

impl FromStr for DriverKind {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" | "file" => Ok(DriverKind::Local),
            "gcs" | "gs" => Ok(DriverKind::Gcs),
            "rest" | "http" | "https" => Ok(DriverKind::Rest),
            "s3" => Err(AssetError::DriverUnavailable(
                "the s3 storage provider is not supported (use local, gcs or rest)".to_string(),
            )),
            other => Err(AssetError::invalid(format!(
                "unknown storage provider `{}` (expected local, gcs or rest)",
                other
            ))),
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverKind::Local => write!(f, "local"),
            DriverKind::Gcs => write!(f, "gcs"),
            DriverKind::Rest => write!(f, "rest"),
        }
    }
}

/// Everything needed to build a driver.
#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub kind: DriverKind,
    /// Local directory, GCS bucket name, or blob-service base URL.
    pub bucket: String,
    /// Bearer token for cloud backends.
    pub token: Option<String>,
    /// Per-request timeout for network backends.
    pub timeout: Duration,
    /// Retry policy for network backends.
    pub retry: RetryPolicy,
}

impl DriverSettings {
    pub fn new(kind: DriverKind, bucket: impl Into<String>) -> Self {
        Self {
            kind,
            bucket: bucket.into(),
            token: None,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build the driver. Backends that are not compiled in fail here with
    /// [`AssetError::DriverUnavailable`].
    pub fn build(&self) -> Result<Arc<dyn StorageDriver>, AssetError> {
        match self.kind {
            DriverKind::Local => Ok(Arc::new(LocalStorageDriver::new(&self.bucket)?)),
            DriverKind::Rest => Ok(Arc::new(RestStorageDriver::new(
                &self.bucket,
                self.timeout,
                self.retry,
            )?)),
            DriverKind::Gcs => {
                #[cfg(feature = "gcs")]
                {
                    Ok(Arc::new(GcsStorageDriver::new(
                        &self.bucket,
                        self.token.clone(),
                        self.timeout,
                        self.retry,
                    )?))
                }
                #[cfg(not(feature = "gcs"))]
                {
                    Err(AssetError::DriverUnavailable(
                        "GCS driver not installed, rebuild mlvault with `--features gcs`"
                            .to_string(),
                    ))
                }
            }
        }
    }
}

/// Copy `reader` into `destination` through a temp file in the same
/// directory, so the destination only ever holds complete content.
pub(crate) fn write_atomically(destination: &Path, reader: &mut dyn Read) -> Result<u64, AssetError> {
    let parent = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let mut temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(&parent)?;
    let written = io::copy(reader, temp.as_file_mut())?;
    temp.as_file().sync_all()?;
    temp.persist(destination).map_err(|e| AssetError::Io(e.error))?;
    Ok(written)
}

/// Remove a destination left over from an earlier attempt.
pub(crate) fn remove_stale_destination(destination: &Path) -> Result<(), AssetError> {
    match fs::remove_file(destination) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AssetError::Io(e)),
    }
}

/// Download `object_name` into `destination_dir/asset`. When no such
/// object exists, treat `object_name` as a directory prefix and download
/// every object below it, preserving the relative layout.
pub fn download_object_or_prefix(
    driver: &dyn StorageDriver,
    object_name: &str,
    destination_dir: &Path,
) -> Result<PathBuf, AssetError> {
    let asset_path = destination_dir.join("asset");
    match driver.download_object(object_name, &asset_path) {
        Ok(()) => return Ok(asset_path),
        Err(e) if e.is_not_found() => {
            let prefix = format!("{}/", object_name.trim_end_matches('/'));
            let keys = driver
                .iterate_objects(&prefix)
                .collect::<Result<Vec<_>, _>>()?;
            if keys.is_empty() {
                return Err(e);
            }
            fs::create_dir_all(&asset_path)?;
            for key in keys {
                let relative = &key[prefix.len()..];
                tracing::debug!(object = %key, "downloading prefix member");
                driver.download_object(&key, &asset_path.join(relative))?;
            }
            Ok(asset_path)
        }
        Err(e) => Err(e),
    }
}
