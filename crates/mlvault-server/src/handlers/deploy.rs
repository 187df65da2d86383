//! `POST /deploy`: unpack an uploaded tar.gz into the deploy root.

use std::fs;

use axum::extract::{Multipart, State};
use axum::Json;
use mlvault_protocol::{unpack_archive, validate_key, DeployFields, StatusResponse};

use super::{blocking, require, text_field};
use crate::error::AppError;
use crate::storage;
use crate::AppState;

pub async fn deploy(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<StatusResponse>, AppError> {
    let mut name = None;
    let mut version = None;
    let mut target = None;
    let mut data = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some(DeployFields::NAME) => name = Some(text_field(field).await?),
            Some(DeployFields::VERSION) => version = Some(text_field(field).await?),
            Some(DeployFields::TARGET) => target = Some(text_field(field).await?),
            Some(DeployFields::FILE) => data = Some(field.bytes().await?),
            _ => {}
        }
    }

    let name = require(name, DeployFields::NAME)?;
    let version = require(version, DeployFields::VERSION)?;
    let target = require(target, DeployFields::TARGET)?;
    let data = data.ok_or_else(|| AppError::missing_field(DeployFields::FILE))?;
    validate_key(&target)?;

    let deploy_root = state.config.deploy_root.clone();
    let dest = storage::version_dir(&deploy_root, &target, &name, &version)?;
    let relative = format!("{}/{}/{}", target, name, version);

    let files = blocking(move || {
        fs::create_dir_all(&deploy_root)?;
        let staging = tempfile::Builder::new()
            .prefix(".deploy-")
            .tempdir_in(&deploy_root)?;
        let files = unpack_archive(data.as_ref(), staging.path())?;

        if dest.exists() {
            storage::remove_path(&dest)?;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(staging.path(), &dest)?;
        Ok(files)
    })
    .await?;

    tracing::info!(target = %relative, files = files.len(), "deployed asset");
    Ok(Json(StatusResponse::ok(format!(
        "deployed {} files to {}",
        files.len(),
        relative
    ))))
}
