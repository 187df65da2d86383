//! Gzip-compressed tar archives for whole asset versions.
//!
//! `clone` streams a version directory server → client and `deploy`
//! ships one client → server, both in this format. Entries are written in
//! sorted order with normalized headers; unpacking refuses any entry that
//! would land outside the destination.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder, EntryType, Header};
use walkdir::WalkDir;

/// Archive failures.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("archive entry escapes destination: {0}")]
    EscapingEntry(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Write every regular file below `root` as a tar.gz to `writer`.
/// Returns the number of files archived.
pub fn pack_directory<W: Write>(root: &Path, writer: W) -> Result<usize, ArchiveError> {
    let encoder = GzEncoder::new(writer, Compression::default());
    let mut builder = Builder::new(encoder);
    let mut count = 0;

    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel_path = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| ArchiveError::EscapingEntry(entry.path().display().to_string()))?;

        let mut file = File::open(entry.path())?;
        let size = file.metadata()?.len();

        let mut header = Header::new_gnu();
        header.set_path(rel_path)?;
        header.set_size(size);
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        header.set_cksum();
        builder.append(&header, &mut file)?;
        count += 1;
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?.flush()?;
    Ok(count)
}

/// Unpack a tar.gz stream into `destination`. Returns the relative paths
/// of the files written, sorted.
pub fn unpack_archive<R: Read>(reader: R, destination: &Path) -> Result<Vec<String>, ArchiveError> {
    fs::create_dir_all(destination)?;
    let mut archive = Archive::new(GzDecoder::new(reader));
    let mut written = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let rel_path = entry.path()?.into_owned();
        let target = safe_join(destination, &rel_path)?;

        match entry.header().entry_type() {
            EntryType::Directory => fs::create_dir_all(&target)?,
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                entry.unpack(&target)?;
                written.push(to_key(&rel_path));
            }
            // Links and special files are never produced by `pack_directory`.
            _ => {}
        }
    }

    written.sort();
    Ok(written)
}

fn safe_join(root: &Path, rel_path: &Path) -> Result<PathBuf, ArchiveError> {
    let mut out = root.to_path_buf();
    for component in rel_path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return Err(ArchiveError::EscapingEntry(rel_path.display().to_string())),
        }
    }
    if out == root {
        return Err(ArchiveError::EscapingEntry(String::new()));
    }
    Ok(out)
}

fn to_key(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
