//! mlvault - versioned asset store for ML models
//!
//! Assets are named, versioned bundles of files (model weights, configs)
//! pushed to a storage backend under an environment prefix and fetched
//! back into a local cache. The layers, bottom-up:
//!
//! - [`driver`]: object-level access to a backend (local directory, GCS,
//!   REST blob service)
//! - [`provider`]: asset/version semantics over a driver (manifests, key
//!   layout, push and listing)
//! - [`manager`]: version resolution and the local cache

pub mod config;
pub mod driver;
pub mod error;
pub mod guard;
pub mod logging;
pub mod manager;
pub mod manifest;
pub mod mock;
pub mod provider;
pub mod reference;
pub mod rest_client;
pub mod retry;
pub mod versioning;

pub use config::{AssetsConfig, EffectiveConfig};
pub use driver::{DriverKind, DriverSettings, LocalStorageDriver, RemoteUrl, StorageDriver};
pub use error::{AssetError, AssetResult};
pub use guard::{AssumeYes, Confirm, NonInteractive, TerminalPrompt};
pub use manager::{AssetInfo, AssetsManager, FetchedAsset};
pub use manifest::AssetManifest;
pub use provider::{PushReport, StorageProvider};
pub use reference::AssetSpec;
pub use retry::RetryPolicy;
pub use versioning::{VersioningPolicy, VersioningSystem};
