//! Per-version asset manifest (`{env}/.meta/{name}/{version}.meta`).
//!
//! The manifest is the commit marker of a push: it is written last, and a
//! version without one does not exist as far as readers are concerned.
//! `contents` is the sorted list of relative paths that were confirmed
//! present at the destination; `metadata` is free-form on read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::AssetError;

/// Whether the pushed source was a single file or a directory tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    File,
    Directory,
}

/// Size and digest of one pushed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub size: u64,
    pub sha256: String,
}

/// Optional metadata. Unknown keys are kept so manifests written by other
/// tools survive a read-modify-write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pushed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_kind: Option<AssetKind>,

    /// Relative path → size/digest, for files confirmed at the destination.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, FileRecord>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Manifest document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetManifest {
    /// Sorted relative paths of the version's files.
    pub contents: Vec<String>,

    #[serde(default)]
    pub metadata: ManifestMetadata,
}

/// A file found under a push source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// `/`-separated path relative to the asset root.
    pub relative: String,
    pub path: PathBuf,
    pub size: u64,
    pub sha256: String,
}

/// Local integrity problem found when checking a materialized version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    MissingFile { path: String },
    SizeMismatch { path: String, expected: u64, actual: u64 },
    HashMismatch { path: String, expected: String, actual: String },
}

impl std::fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityError::MissingFile { path } => write!(f, "missing file: {}", path),
            IntegrityError::SizeMismatch { path, expected, actual } => {
                write!(f, "size mismatch for {}: expected {}, got {}", path, expected, actual)
            }
            IntegrityError::HashMismatch { path, expected, actual } => {
                write!(f, "sha256 mismatch for {}: expected {}, got {}", path, expected, actual)
            }
        }
    }
}

impl AssetManifest {
    /// Build a manifest for the files confirmed at the destination.
    pub fn new(confirmed: &[SourceFile], kind: AssetKind) -> Self {
        let files: BTreeMap<String, FileRecord> = confirmed
            .iter()
            .map(|f| {
                (
                    f.relative.clone(),
                    FileRecord {
                        size: f.size,
                        sha256: f.sha256.clone(),
                    },
                )
            })
            .collect();

        Self {
            contents: files.keys().cloned().collect(),
            metadata: ManifestMetadata {
                pushed_at: Some(Utc::now()),
                asset_kind: Some(kind),
                files,
                extra: serde_json::Map::new(),
            },
        }
    }

    /// Single-file assets resolve to the file, not the version directory.
    pub fn is_single_file(&self) -> bool {
        match self.metadata.asset_kind {
            Some(kind) => kind == AssetKind::File,
            None => self.contents.len() == 1 && !self.contents[0].contains('/'),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut manifest: Self = serde_json::from_str(json)?;
        manifest.contents.sort();
        manifest.contents.dedup();
        Ok(manifest)
    }

    pub fn write_to_file(&self, path: &Path) -> Result<(), AssetError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn from_file(path: &Path) -> Result<Self, AssetError> {
        let json = fs::read_to_string(path)?;
        Ok(Self::from_json(&json)?)
    }

    /// Check a materialized version directory against `contents` and,
    /// where recorded, the per-file size and digest.
    pub fn verify_local(&self, version_dir: &Path) -> Result<Vec<IntegrityError>, AssetError> {
        let mut errors = Vec::new();
        for path in &self.contents {
            let full = version_dir.join(path);
            if !full.is_file() {
                errors.push(IntegrityError::MissingFile { path: path.clone() });
                continue;
            }
            let Some(record) = self.metadata.files.get(path) else {
                continue;
            };
            let actual = fs::metadata(&full)?.len();
            if actual != record.size {
                errors.push(IntegrityError::SizeMismatch {
                    path: path.clone(),
                    expected: record.size,
                    actual,
                });
                continue;
            }
            let digest = file_sha256(&full)?;
            if digest != record.sha256 {
                errors.push(IntegrityError::HashMismatch {
                    path: path.clone(),
                    expected: record.sha256.clone(),
                    actual: digest,
                });
            }
        }
        Ok(errors)
    }
}

/// Streaming SHA-256 of a file, hex encoded.
pub fn file_sha256(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Collect the files of a push source. A regular file is a single-file
/// asset named after itself; a directory contributes every regular file
/// below it (symlinks are not followed). Sorted by relative path.
pub fn collect_source(asset_path: &Path) -> Result<(AssetKind, Vec<SourceFile>), AssetError> {
    let meta = fs::metadata(asset_path)?;
    if meta.is_file() {
        let relative = asset_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| AssetError::invalid(format!("no file name in {}", asset_path.display())))?;
        let file = SourceFile {
            relative,
            path: asset_path.to_path_buf(),
            size: meta.len(),
            sha256: file_sha256(asset_path)?,
        };
        return Ok((AssetKind::File, vec![file]));
    }

    let mut files: BTreeMap<String, SourceFile> = BTreeMap::new();
    for entry in WalkDir::new(asset_path)
        .follow_links(false)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let rel_path = path.strip_prefix(asset_path).map_err(|_| {
            AssetError::invalid(format!("{} is not within {}", path.display(), asset_path.display()))
        })?;
        let relative = rel_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        files.insert(
            relative.clone(),
            SourceFile {
                relative,
                path: path.to_path_buf(),
                size: entry.metadata()?.len(),
                sha256: file_sha256(path)?,
            },
        );
    }

    Ok((AssetKind::Directory, files.into_values().collect()))
}

/// Number of regular files under `asset_path` (1 for a plain file).
pub fn count_files(asset_path: &Path) -> Result<usize, AssetError> {
    if asset_path.is_file() {
        return Ok(1);
    }
    let mut count = 0;
    for entry in WalkDir::new(asset_path).follow_links(false) {
        if entry?.file_type().is_file() {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("b.txt"), "bravo").unwrap();
        fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        fs::write(dir.path().join("sub/c.bin"), [0u8, 1, 2]).unwrap();
        dir
    }

    #[test]
    fn test_collect_source_directory() {
        let dir = sample_dir();
        let (kind, files) = collect_source(dir.path()).unwrap();
        assert_eq!(kind, AssetKind::Directory);
        let names: Vec<_> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub/c.bin"]);
        assert_eq!(files[2].size, 3);
        assert_eq!(files[0].sha256.len(), 64);
    }

    #[test]
    fn test_collect_source_single_file() {
        let dir = sample_dir();
        let (kind, files) = collect_source(&dir.path().join("a.txt")).unwrap();
        assert_eq!(kind, AssetKind::File);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative, "a.txt");
    }

    #[test]
    fn test_count_files() {
        let dir = sample_dir();
        assert_eq!(count_files(dir.path()).unwrap(), 3);
        assert_eq!(count_files(&dir.path().join("a.txt")).unwrap(), 1);
    }

    #[test]
    fn test_manifest_json() {
        let dir = sample_dir();
        let (kind, files) = collect_source(dir.path()).unwrap();
        let manifest = AssetManifest::new(&files, kind);
        assert_eq!(manifest.contents, vec!["a.txt", "b.txt", "sub/c.bin"]);

        let parsed = AssetManifest::from_json(&manifest.to_json().unwrap()).unwrap();
        assert_eq!(parsed, manifest);
        assert!(!parsed.is_single_file());
    }

    #[test]
    fn test_minimal_manifest_is_accepted() {
        let parsed =
            AssetManifest::from_json(r#"{"contents": ["z.txt", "a.txt"], "owner": "x"}"#).unwrap();
        assert_eq!(parsed.contents, vec!["a.txt", "z.txt"]);
        assert!(parsed.metadata.files.is_empty());
        assert!(!parsed.is_single_file());

        let single = AssetManifest::from_json(r#"{"contents": ["model.bin"]}"#).unwrap();
        assert!(single.is_single_file());
    }

    #[test]
    fn test_unknown_metadata_preserved() {
        let json = r#"{"contents": [], "metadata": {"trained_on": "imagenet"}}"#;
        let parsed = AssetManifest::from_json(json).unwrap();
        assert_eq!(parsed.metadata.extra["trained_on"], "imagenet");
        assert!(parsed.to_json().unwrap().contains("trained_on"));
    }

    #[test]
    fn test_verify_local() {
        let dir = sample_dir();
        let (kind, files) = collect_source(dir.path()).unwrap();
        let manifest = AssetManifest::new(&files, kind);
        assert!(manifest.verify_local(dir.path()).unwrap().is_empty());

        fs::write(dir.path().join("a.txt"), "ALPHA").unwrap();
        fs::remove_file(dir.path().join("b.txt")).unwrap();
        let errors = manifest.verify_local(dir.path()).unwrap();
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], IntegrityError::HashMismatch { .. }));
        assert!(matches!(errors[1], IntegrityError::MissingFile { .. }));
    }
}
