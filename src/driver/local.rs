//! Filesystem-backed driver: the bucket is a directory and keys are
//! relative paths below it.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use mlvault_protocol::{validate_key, validate_prefix};
use walkdir::WalkDir;

use super::{remove_stale_destination, write_atomically, ObjectIter, StorageDriver, TEMP_PREFIX};
use crate::error::AssetError;

#[derive(Debug, Clone)]
pub struct LocalStorageDriver {
    root: PathBuf,
    display: String,
}

impl LocalStorageDriver {
    /// Open (creating if needed) the bucket directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, AssetError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        let display = root.display().to_string();
        Ok(Self { root, display })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, object_name: &str) -> Result<PathBuf, AssetError> {
        validate_key(object_name)?;
        Ok(self.root.join(object_name))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

impl StorageDriver for LocalStorageDriver {
    fn name(&self) -> &'static str {
        "local"
    }

    fn bucket(&self) -> &str {
        &self.display
    }

    fn upload_object(&self, file_path: &Path, object_name: &str) -> Result<(), AssetError> {
        let target = self.object_path(object_name)?;
        if target.is_file() {
            fs::remove_file(&target)?;
        }
        let mut source = File::open(file_path)?;
        let bytes = write_atomically(&target, &mut source)?;
        tracing::debug!(object = object_name, bytes, "stored object");
        Ok(())
    }

    fn download_object(
        &self,
        object_name: &str,
        destination_path: &Path,
    ) -> Result<(), AssetError> {
        let source = self.object_path(object_name)?;
        let mut file = match File::open(&source) {
            Ok(f) if source.is_file() => f,
            Ok(_) => {
                remove_stale_destination(destination_path)?;
                return Err(AssetError::not_found(&self.display, object_name));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::error!(bucket = %self.display, object = object_name, "object not found");
                remove_stale_destination(destination_path)?;
                return Err(AssetError::not_found(&self.display, object_name));
            }
            Err(e) => return Err(AssetError::Io(e)),
        };
        write_atomically(destination_path, &mut file)?;
        Ok(())
    }

    fn delete_object(&self, object_name: &str) -> Result<(), AssetError> {
        let target = self.object_path(object_name)?;
        match fs::remove_file(&target) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(AssetError::not_found(&self.display, object_name))
            }
            Err(e) => Err(AssetError::Io(e)),
        }
    }

    fn exists(&self, object_name: &str) -> Result<bool, AssetError> {
        Ok(self.object_path(object_name)?.is_file())
    }

    fn iterate_objects<'a>(&'a self, prefix: &str) -> ObjectIter<'a> {
        if let Err(e) = validate_prefix(prefix) {
            return Box::new(std::iter::once(Err(e.into())));
        }

        // Walk the deepest directory the prefix fully names, then filter.
        let walk_root = match prefix.rfind('/') {
            Some(idx) => self.root.join(&prefix[..idx]),
            None => self.root.clone(),
        };
        if !walk_root.is_dir() {
            return Box::new(std::iter::empty());
        }

        let prefix = prefix.to_string();
        let iter = WalkDir::new(walk_root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(move |entry| match entry {
                Err(e) => Some(Err(AssetError::Walk(e))),
                Ok(entry) => {
                    if !entry.file_type().is_file()
                        || entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX)
                    {
                        return None;
                    }
                    let key = self.key_for(entry.path())?;
                    key.starts_with(&prefix).then_some(Ok(key))
                }
            });
        Box::new(iter)
    }

    fn get_object_uri(&self, object_name: &str) -> String {
        self.root.join(object_name).display().to_string()
    }
}
