//! Asset-level operations on top of a [`StorageDriver`].
//!
//! A provider binds one driver to one environment prefix. Remote layout:
//!
//! ```text
//! {env}/{name}/{version}/{relative_path}   one object per file
//! {env}/.meta/{name}/{version}.meta        manifest, written last
//! ```
//!
//! Asset names must start with an alphanumeric character, so the `.meta`
//! subtree can never collide with an asset.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;

use crate::driver::StorageDriver;
use crate::error::AssetError;
use crate::guard::{self, Confirm, NonInteractive};
use crate::manifest::{self, AssetManifest, SourceFile};
use crate::reference::validate_name;
use crate::versioning::{VersioningPolicy, VersioningSystem};

const META_DIR: &str = ".meta";
const META_SUFFIX: &str = ".meta";

/// Outcome of a push (real or dry run).
#[derive(Debug, Clone, PartialEq)]
pub struct PushReport {
    pub name: String,
    pub version: String,
    /// Manifest written (or, for a dry run, the one that would be written).
    pub manifest: AssetManifest,
    /// Remote objects from a previous push that were (or would be) deleted.
    pub removed: Vec<String>,
    pub dry_run: bool,
}

/// Human-facing summary of where a provider writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescription {
    pub driver: String,
    pub bucket: String,
    pub prefix: String,
    pub versioning: String,
}

impl std::fmt::Display for ProviderDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, " - storage driver = `{}`", self.driver)?;
        writeln!(f, " - driver bucket = `{}`", self.bucket)?;
        writeln!(f, " - prefix = `{}`", self.prefix)?;
        write!(f, " - versioning system = `{}`", self.versioning)
    }
}

#[derive(Debug, Clone)]
pub struct StorageProvider {
    driver: Arc<dyn StorageDriver>,
    prefix: String,
    versioning: VersioningSystem,
    confirm: Arc<dyn Confirm>,
}

impl StorageProvider {
    /// Bind `driver` to the environment `prefix`.
    pub fn new(driver: Arc<dyn StorageDriver>, prefix: impl Into<String>) -> Result<Self, AssetError> {
        let prefix = prefix.into();
        if prefix.is_empty() || prefix.contains('/') || prefix.starts_with('.') {
            return Err(AssetError::Config(format!(
                "invalid storage prefix `{}`",
                prefix
            )));
        }
        Ok(Self {
            driver,
            prefix,
            versioning: VersioningSystem::default(),
            confirm: Arc::new(NonInteractive),
        })
    }

    pub fn with_versioning(mut self, versioning: VersioningSystem) -> Self {
        self.versioning = versioning;
        self
    }

    /// Who answers the large-push question. Defaults to [`NonInteractive`].
    pub fn with_confirm(mut self, confirm: Arc<dyn Confirm>) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn driver(&self) -> &dyn StorageDriver {
        self.driver.as_ref()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn versioning(&self) -> VersioningSystem {
        self.versioning
    }

    pub fn policy(&self) -> &'static dyn VersioningPolicy {
        self.versioning.policy()
    }

    pub fn describe(&self) -> ProviderDescription {
        ProviderDescription {
            driver: self.driver.name().to_string(),
            bucket: self.driver.bucket().to_string(),
            prefix: self.prefix.clone(),
            versioning: self.versioning.to_string(),
        }
    }

    // --- Keys ---------------------------------------------------------------

    pub fn version_prefix(&self, name: &str, version: &str) -> String {
        format!("{}/{}/{}/", self.prefix, name, version)
    }

    pub fn object_key(&self, name: &str, version: &str, relative: &str) -> String {
        format!("{}/{}/{}/{}", self.prefix, name, version, relative)
    }

    pub fn manifest_key(&self, name: &str, version: &str) -> String {
        format!("{}/{}/{}/{}{}", self.prefix, META_DIR, name, version, META_SUFFIX)
    }

    fn meta_prefix(&self) -> String {
        format!("{}/{}/", self.prefix, META_DIR)
    }

    /// Locator of a version for external consumers.
    pub fn get_object_uri(&self, name: &str, version: &str) -> String {
        self.driver
            .get_object_uri(self.version_prefix(name, version).trim_end_matches('/'))
    }

    // --- Pushes -------------------------------------------------------------

    /// Push a brand-new `(name, version)`. Fails with `AlreadyExists` when a
    /// manifest for that exact pair is present.
    pub fn new_asset(
        &self,
        asset_path: &Path,
        name: &str,
        version: &str,
        dry_run: bool,
    ) -> Result<PushReport, AssetError> {
        self.validate(name, version)?;
        if self.driver.exists(&self.manifest_key(name, version))? {
            return Err(AssetError::AlreadyExists {
                name: name.to_string(),
                version: version.to_string(),
            });
        }
        tracing::info!(name, version, prefix = %self.prefix, dry_run, "pushing new asset");
        self.push(asset_path, name, version, dry_run)
    }

    /// Push `version` of an asset that already has at least one version.
    /// A name with no versions fails with `ObjectNotFound`, so callers can
    /// redirect to [`new_asset`](Self::new_asset).
    pub fn update(
        &self,
        asset_path: &Path,
        name: &str,
        version: &str,
        dry_run: bool,
    ) -> Result<PushReport, AssetError> {
        self.validate(name, version)?;
        if self.get_versions_info(name)?.is_empty() {
            return Err(AssetError::not_found(
                self.driver.bucket(),
                format!("{}/{}/{}", self.prefix, META_DIR, name),
            ));
        }
        tracing::info!(name, version, prefix = %self.prefix, dry_run, "pushing asset update");
        self.push(asset_path, name, version, dry_run)
    }

    fn validate(&self, name: &str, version: &str) -> Result<(), AssetError> {
        validate_name(name)?;
        if !self.policy().is_valid(version) {
            return Err(AssetError::invalid(format!(
                "`{}` is not a valid {} version",
                version,
                self.policy().name()
            )));
        }
        Ok(())
    }

    fn push(
        &self,
        asset_path: &Path,
        name: &str,
        version: &str,
        dry_run: bool,
    ) -> Result<PushReport, AssetError> {
        let n_files = manifest::count_files(asset_path)?;
        guard::check_file_count(n_files, self.confirm.as_ref())?;

        let (kind, files) = manifest::collect_source(asset_path)?;
        let new_keys: HashSet<String> = files
            .iter()
            .map(|f| self.object_key(name, version, &f.relative))
            .collect();

        let mut removed: Vec<String> = self
            .driver
            .iterate_objects(&self.version_prefix(name, version))
            .filter(|key| !matches!(key, Ok(k) if new_keys.contains(k)))
            .collect::<Result<_, _>>()?;
        removed.sort();

        if dry_run {
            for file in &files {
                tracing::info!(
                    file = %file.relative,
                    object = %self.object_key(name, version, &file.relative),
                    "dry run: would upload"
                );
            }
            for key in &removed {
                tracing::info!(object = %key, "dry run: would delete stale object");
            }
            return Ok(PushReport {
                name: name.to_string(),
                version: version.to_string(),
                manifest: AssetManifest::new(&files, kind),
                removed,
                dry_run: true,
            });
        }

        for file in &files {
            let key = self.object_key(name, version, &file.relative);
            tracing::debug!(file = %file.path.display(), object = %key, "uploading");
            self.driver.upload_object(&file.path, &key)?;
        }
        for key in &removed {
            tracing::debug!(object = %key, "deleting stale object");
            self.driver.delete_object(key)?;
        }

        let confirmed = self.confirm_destination(name, version, &files)?;
        let manifest = AssetManifest::new(&confirmed, kind);
        self.write_manifest(name, version, &manifest)?;

        tracing::info!(
            name,
            version,
            files = manifest.contents.len(),
            removed = removed.len(),
            "push complete"
        );
        Ok(PushReport {
            name: name.to_string(),
            version: version.to_string(),
            manifest,
            removed,
            dry_run: false,
        })
    }

    /// Check the destination for every pushed key; the manifest lists what
    /// is actually there, and anything missing fails the push.
    fn confirm_destination(
        &self,
        name: &str,
        version: &str,
        files: &[SourceFile],
    ) -> Result<Vec<SourceFile>, AssetError> {
        let mut confirmed = Vec::with_capacity(files.len());
        let mut missing = Vec::new();
        for file in files {
            let key = self.object_key(name, version, &file.relative);
            if self.driver.exists(&key)? {
                confirmed.push(file.clone());
            } else {
                missing.push(key);
            }
        }
        if !missing.is_empty() {
            return Err(AssetError::PushIncomplete { missing });
        }
        Ok(confirmed)
    }

    fn write_manifest(
        &self,
        name: &str,
        version: &str,
        manifest: &AssetManifest,
    ) -> Result<(), AssetError> {
        let temp = tempfile::NamedTempFile::new()?;
        manifest.write_to_file(temp.path())?;
        self.driver
            .upload_object(temp.path(), &self.manifest_key(name, version))
    }

    // --- Reads --------------------------------------------------------------

    /// Version tokens with a manifest, in listing order (unsorted).
    pub fn get_versions_info(&self, name: &str) -> Result<Vec<String>, AssetError> {
        validate_name(name)?;
        let prefix = format!("{}{}/", self.meta_prefix(), name);
        let mut versions = Vec::new();
        for key in self.driver.iterate_objects(&prefix) {
            let key = key?;
            let rest = &key[prefix.len()..];
            if rest.contains('/') {
                continue;
            }
            if let Some(version) = rest.strip_suffix(META_SUFFIX) {
                versions.push(version.to_string());
            }
        }
        Ok(versions)
    }

    /// Lazily yield `(name, versions)` for every asset under the prefix.
    /// An empty store yields nothing.
    pub fn iterate_assets(
        &self,
    ) -> impl Iterator<Item = Result<(String, Vec<String>), AssetError>> + '_ {
        let prefix = self.meta_prefix();
        let mut seen = BTreeSet::new();
        self.driver
            .iterate_objects(&prefix)
            .filter_map(move |key| {
                let key = match key {
                    Ok(key) => key,
                    Err(e) => return Some(Err(e)),
                };
                let (name, file) = key[prefix.len()..].rsplit_once('/')?;
                if !file.ends_with(META_SUFFIX) || !seen.insert(name.to_string()) {
                    return None;
                }
                Some(
                    self.get_versions_info(name)
                        .map(|versions| (name.to_string(), versions)),
                )
            })
    }

    /// Load the manifest of `(name, version)`.
    pub fn get_asset_meta(&self, name: &str, version: &str) -> Result<AssetManifest, AssetError> {
        let temp_dir = tempfile::tempdir()?;
        let local = temp_dir.path().join("manifest.json");
        self.driver
            .download_object(&self.manifest_key(name, version), &local)?;
        AssetManifest::from_file(&local)
    }

    /// Download every file listed in `manifest` into `destination_dir`.
    pub fn download_version(
        &self,
        name: &str,
        version: &str,
        manifest: &AssetManifest,
        destination_dir: &Path,
    ) -> Result<(), AssetError> {
        for relative in &manifest.contents {
            let key = self.object_key(name, version, relative);
            tracing::debug!(object = %key, "downloading");
            self.driver
                .download_object(&key, &destination_dir.join(relative))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::LocalStorageDriver;
    use std::fs;
    use tempfile::TempDir;

    fn provider(bucket: &TempDir) -> StorageProvider {
        let driver = Arc::new(LocalStorageDriver::new(bucket.path()).unwrap());
        StorageProvider::new(driver, "dev").unwrap()
    }

    #[test]
    fn test_keys() {
        let bucket = TempDir::new().unwrap();
        let p = provider(&bucket);
        assert_eq!(p.object_key("cv/resnet", "1.2", "sub/w.bin"), "dev/cv/resnet/1.2/sub/w.bin");
        assert_eq!(p.manifest_key("cv/resnet", "1.2"), "dev/.meta/cv/resnet/1.2.meta");
        assert_eq!(p.version_prefix("m", "0.0"), "dev/m/0.0/");
    }

    #[test]
    fn test_invalid_prefix() {
        let bucket = TempDir::new().unwrap();
        let driver = Arc::new(LocalStorageDriver::new(bucket.path()).unwrap());
        assert!(StorageProvider::new(driver.clone(), "").is_err());
        assert!(StorageProvider::new(driver, "a/b").is_err());
    }

    #[test]
    fn test_nested_names_do_not_leak_versions() {
        let bucket = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("f"), "x").unwrap();
        let p = provider(&bucket);

        p.new_asset(src.path(), "a", "0.0", false).unwrap();
        p.new_asset(src.path(), "a/b", "1.0", false).unwrap();

        assert_eq!(p.get_versions_info("a").unwrap(), vec!["0.0"]);
        assert_eq!(p.get_versions_info("a/b").unwrap(), vec!["1.0"]);
    }

    #[test]
    fn test_describe() {
        let bucket = TempDir::new().unwrap();
        let d = provider(&bucket).describe();
        assert_eq!(d.driver, "local");
        assert_eq!(d.prefix, "dev");
        assert_eq!(d.versioning, "major.minor");
        assert!(d.to_string().contains(" - prefix = `dev`"));
    }

    #[test]
    fn test_rejects_invalid_version() {
        let bucket = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        let err = provider(&bucket)
            .new_asset(src.path(), "m", "v1", false)
            .unwrap_err();
        assert!(matches!(err, AssetError::InvalidReference(_)));
    }
}
