//! Resolve asset references to local paths through an on-disk cache.
//!
//! Cache layout under `cache_root`:
//!
//! ```text
//! {env}/{name}/{version}/...          materialized files
//! {env}/{name}/.{version}.meta.json   copy of the manifest
//! ```
//!
//! A version directory only ever appears through a rename of a fully
//! downloaded staging directory, so its existence is the cache-hit test.
//! Concurrent fetches of the same version are not coordinated; the last
//! rename wins.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use walkdir::WalkDir;

use crate::error::AssetError;
use crate::manifest::{file_sha256, AssetManifest};
use crate::provider::StorageProvider;
use crate::reference::AssetSpec;

/// Local details of one materialized file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileInfo {
    /// Path relative to the version directory.
    pub path: String,
    pub size: u64,
    pub human_size: String,
    pub sha256: String,
    pub modified_at: DateTime<Utc>,
}

/// Everything known about a fetched version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetInfo {
    pub name: String,
    pub version: String,
    pub env: String,
    pub manifest: AssetManifest,
    pub files: Vec<FileInfo>,
}

/// Result of [`AssetsManager::fetch_asset`].
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedAsset {
    /// Version directory, or the file itself for single-file assets.
    pub path: PathBuf,
    pub version: String,
    /// Whether the result came from the cache without backend access.
    pub from_cache: bool,
    pub info: Option<AssetInfo>,
}

#[derive(Debug, Clone)]
pub struct AssetsManager {
    provider: StorageProvider,
    cache_root: PathBuf,
}

impl AssetsManager {
    pub fn new(provider: StorageProvider, cache_root: impl Into<PathBuf>) -> Self {
        Self {
            provider,
            cache_root: cache_root.into(),
        }
    }

    pub fn provider(&self) -> &StorageProvider {
        &self.provider
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    fn asset_cache_dir(&self, name: &str) -> PathBuf {
        self.cache_root.join(self.provider.prefix()).join(name)
    }

    /// `{cache_root}/{env}/{name}/{version}`
    pub fn cache_path(&self, name: &str, version: &str) -> PathBuf {
        self.asset_cache_dir(name).join(version)
    }

    fn cached_manifest_path(&self, name: &str, version: &str) -> PathBuf {
        self.asset_cache_dir(name).join(format!(".{}.meta.json", version))
    }

    /// Exact version for `spec`. Pinned references need no backend call;
    /// anything else lists the remote versions.
    pub fn resolve_version(&self, spec: &AssetSpec) -> Result<String, AssetError> {
        let policy = self.provider.policy();
        if let Some(version) = spec.version.as_deref() {
            if policy.is_valid(version) {
                return Ok(version.to_string());
            }
        }

        let versions = self.provider.get_versions_info(&spec.name)?;
        policy
            .latest(spec.version.as_deref(), &versions)?
            .ok_or_else(|| {
                let wanted = match &spec.version {
                    Some(v) => format!("{}/{}:{}", self.provider.prefix(), spec.name, v),
                    None => format!("{}/{}", self.provider.prefix(), spec.name),
                };
                AssetError::not_found(self.provider.driver().bucket(), wanted)
            })
    }

    /// Resolve `reference` (`name[:version]`) to a local path, downloading
    /// into the cache when needed.
    pub fn fetch_asset(
        &self,
        reference: &str,
        return_info: bool,
        force_download: bool,
    ) -> Result<FetchedAsset, AssetError> {
        let spec = AssetSpec::parse_with(reference, self.provider.policy())?;
        let version = self.resolve_version(&spec)?;
        let version_dir = self.cache_path(&spec.name, &version);

        let (manifest, from_cache) = if version_dir.is_dir() && !force_download {
            tracing::debug!(asset = %spec.name, version = %version, "cache hit");
            (self.cached_manifest(&spec.name, &version, &version_dir)?, true)
        } else {
            (self.download(&spec.name, &version, &version_dir)?, false)
        };

        let path = if manifest.is_single_file() && !manifest.contents.is_empty() {
            version_dir.join(&manifest.contents[0])
        } else {
            version_dir.clone()
        };

        let info = if return_info {
            Some(AssetInfo {
                name: spec.name.clone(),
                version: version.clone(),
                env: self.provider.prefix().to_string(),
                files: file_infos(&version_dir, &manifest.contents)?,
                manifest,
            })
        } else {
            None
        };

        Ok(FetchedAsset {
            path,
            version,
            from_cache,
            info,
        })
    }

    fn download(
        &self,
        name: &str,
        version: &str,
        version_dir: &Path,
    ) -> Result<AssetManifest, AssetError> {
        let manifest = self.provider.get_asset_meta(name, version)?;
        let parent = self.asset_cache_dir(name);
        fs::create_dir_all(&parent)?;

        tracing::info!(asset = name, version, files = manifest.contents.len(), "downloading asset");
        let staging = tempfile::Builder::new()
            .prefix(&format!(".{}.staging-", version))
            .tempdir_in(&parent)?;
        self.provider
            .download_version(name, version, &manifest, staging.path())?;

        let problems = manifest.verify_local(staging.path())?;
        if !problems.is_empty() {
            let details: Vec<String> = problems.iter().map(|p| p.to_string()).collect();
            return Err(AssetError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("downloaded {}:{} failed verification: {}", name, version, details.join("; ")),
            )));
        }

        if version_dir.exists() {
            fs::remove_dir_all(version_dir)?;
        }
        fs::rename(staging.path(), version_dir)?;
        manifest.write_to_file(&self.cached_manifest_path(name, version))?;
        Ok(manifest)
    }

    /// Manifest for a cached version, read locally. Caches populated
    /// without a manifest copy fall back to a directory listing.
    fn cached_manifest(
        &self,
        name: &str,
        version: &str,
        version_dir: &Path,
    ) -> Result<AssetManifest, AssetError> {
        let path = self.cached_manifest_path(name, version);
        if path.is_file() {
            return AssetManifest::from_file(&path);
        }
        let mut contents = Vec::new();
        for entry in WalkDir::new(version_dir).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() {
                if let Ok(rel) = entry.path().strip_prefix(version_dir) {
                    contents.push(to_slash(rel));
                }
            }
        }
        contents.sort();
        Ok(AssetManifest {
            contents,
            ..AssetManifest::default()
        })
    }

    /// Versions of `name` present in the local cache, ascending.
    pub fn cached_versions(&self, name: &str) -> Result<Vec<String>, AssetError> {
        let dir = self.asset_cache_dir(name);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let policy = self.provider.policy();
        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if policy.is_valid(&file_name) {
                versions.push(file_name);
            }
        }
        policy.sort(&versions)
    }
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn file_infos(version_dir: &Path, contents: &[String]) -> Result<Vec<FileInfo>, AssetError> {
    contents
        .iter()
        .map(|relative| {
            let full = version_dir.join(relative);
            let meta = fs::metadata(&full)?;
            Ok(FileInfo {
                path: relative.clone(),
                size: meta.len(),
                human_size: human_readable_size(meta.len()),
                sha256: file_sha256(&full)?,
                modified_at: DateTime::<Utc>::from(meta.modified()?),
            })
        })
        .collect()
}

/// Binary-prefixed size with four significant digits, e.g. `1.5 KB`.
pub fn human_readable_size(size: u64) -> String {
    const SUFFIXES: [&str; 7] = ["Bytes", "KB", "MB", "GB", "TB", "PB", "EB"];
    let order = if size == 0 {
        0
    } else {
        (63 - size.leading_zeros() as usize) / 10
    };
    let value = size as f64 / (1u64 << (order * 10)) as f64;

    let int_digits = if value < 1.0 { 1 } else { value.log10().floor() as i32 + 1 };
    let decimals = (4 - int_digits).max(0) as usize;
    let mut text = format!("{:.*}", decimals, value);
    if text.contains('.') {
        text = text.trim_end_matches('0').trim_end_matches('.').to_string();
    }
    format!("{} {}", text, SUFFIXES[order])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_readable_size() {
        assert_eq!(human_readable_size(0), "0 Bytes");
        assert_eq!(human_readable_size(1), "1 Bytes");
        assert_eq!(human_readable_size(1023), "1023 Bytes");
        assert_eq!(human_readable_size(1024), "1 KB");
        assert_eq!(human_readable_size(1536), "1.5 KB");
        assert_eq!(human_readable_size(1_000_000), "976.6 KB");
        assert_eq!(human_readable_size(5 * 1024 * 1024 * 1024), "5 GB");
    }

    #[test]
    fn test_to_slash() {
        assert_eq!(to_slash(Path::new("a/b/c.txt")), "a/b/c.txt");
    }
}
