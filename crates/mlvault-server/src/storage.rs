//! Filesystem layout under the store and deploy roots.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use mlvault_protocol::{validate_key, validate_prefix};
use walkdir::WalkDir;

use crate::error::AppError;

/// Prefix of in-flight upload files; never listed.
pub const UPLOAD_TEMP_PREFIX: &str = ".upload-";

/// Path of `key` below `root`, rejecting keys that escape it.
pub fn object_path(root: &Path, key: &str) -> Result<PathBuf, AppError> {
    validate_key(key)?;
    Ok(root.join(key))
}

/// `{root}/{env}/{name}/{version}`
pub fn version_dir(root: &Path, env: &str, name: &str, version: &str) -> Result<PathBuf, AppError> {
    for (field, value) in [("env", env), ("name", name), ("version", version)] {
        if value.is_empty() {
            return Err(AppError::missing_field(field));
        }
    }
    object_path(root, &format!("{}/{}/{}", env, name, version))
}

/// Write `data` to `dest` through a sibling temp file.
pub fn write_atomically(dest: &Path, data: &[u8]) -> Result<(), AppError> {
    let parent = dest
        .parent()
        .ok_or_else(|| AppError::InvalidRequest(format!("no parent for {}", dest.display())))?;
    fs::create_dir_all(parent)?;
    if dest.is_dir() {
        return Err(AppError::InvalidRequest(format!(
            "{} is a directory",
            dest.display()
        )));
    }
    let mut temp = tempfile::Builder::new()
        .prefix(UPLOAD_TEMP_PREFIX)
        .tempfile_in(parent)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(dest).map_err(|e| AppError::from(e.error))?;
    Ok(())
}

/// Every key below `root` starting with `prefix`, sorted.
pub fn list_keys(root: &Path, prefix: &str) -> Result<Vec<String>, AppError> {
    validate_prefix(prefix)?;
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut keys = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| AppError::Internal(e.to_string()))?;
        if !entry.file_type().is_file()
            || entry
                .file_name()
                .to_string_lossy()
                .starts_with(UPLOAD_TEMP_PREFIX)
        {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let key = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        if key.starts_with(prefix) {
            keys.push(key);
        }
    }
    keys.sort();
    Ok(keys)
}

/// Remove `path` whether it is a file or a directory tree.
pub fn remove_path(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}
