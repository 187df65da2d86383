//! `GET /clone`: a whole version directory as a tar.gz stream.
//!
//! The archive is built into a temp file which lives as long as the
//! response body; dropping the body (completed or aborted) deletes it.

use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures::stream;
use mlvault_protocol::{pack_directory, CloneQuery, ARCHIVE_CONTENT_TYPE};
use tempfile::TempPath;
use tokio::io::AsyncReadExt;

use super::blocking;
use crate::error::AppError;
use crate::storage;
use crate::AppState;

const CHUNK_SIZE: usize = 64 * 1024;

pub async fn clone_version(
    State(state): State<AppState>,
    Query(query): Query<CloneQuery>,
) -> Result<Response, AppError> {
    let dir = storage::version_dir(&state.config.root, &query.env, &query.name, &query.version)?;
    if !dir.is_dir() {
        return Err(AppError::NotFound(format!(
            "{}/{}/{}",
            query.env, query.name, query.version
        )));
    }

    let (archive, count) = blocking(move || {
        let mut temp = tempfile::NamedTempFile::new()?;
        let count = pack_directory(&dir, temp.as_file_mut())?;
        Ok((temp.into_temp_path(), count))
    })
    .await?;
    tracing::info!(
        name = %query.name,
        version = %query.version,
        env = %query.env,
        files = count,
        "cloning version"
    );

    let file = tokio::fs::File::open(&archive).await?;
    let filename = format!(
        "{}-{}.tar.gz",
        query.name.replace('/', "_"),
        query.version
    );

    Ok((
        [
            (header::CONTENT_TYPE, ARCHIVE_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        Body::from_stream(archive_stream(file, archive)),
    )
        .into_response())
}

/// Chunks of `file`; `archive` is removed once the stream is dropped.
fn archive_stream(
    file: tokio::fs::File,
    archive: TempPath,
) -> impl futures::Stream<Item = std::io::Result<Bytes>> {
    stream::unfold(Some((file, archive)), |state| async move {
        let (mut file, archive) = state?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        match file.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Bytes::from(buf)), Some((file, archive))))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
}
