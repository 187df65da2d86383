//! `POST /push`: one file of an asset version per request.

use axum::extract::{Multipart, State};
use axum::Json;
use mlvault_protocol::{PushFields, StatusResponse};

use super::{blocking, require, text_field};
use crate::error::AppError;
use crate::storage;
use crate::AppState;

pub async fn push(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<StatusResponse>, AppError> {
    let mut name = None;
    let mut version = None;
    let mut env = None;
    let mut filename = None;
    let mut data = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some(PushFields::NAME) => name = Some(text_field(field).await?),
            Some(PushFields::VERSION) => version = Some(text_field(field).await?),
            Some(PushFields::ENV) => env = Some(text_field(field).await?),
            Some(PushFields::FILENAME) => filename = Some(text_field(field).await?),
            Some(PushFields::FILE) => {
                if filename.is_none() {
                    filename = field.file_name().map(str::to_string);
                }
                data = Some(field.bytes().await?);
            }
            _ => {}
        }
    }

    let name = require(name, PushFields::NAME)?;
    let version = require(version, PushFields::VERSION)?;
    let env = require(env, PushFields::ENV)?;
    let filename = require(filename, PushFields::FILENAME)?;
    let data = data.ok_or_else(|| AppError::missing_field(PushFields::FILE))?;

    storage::version_dir(&state.config.root, &env, &name, &version)?;
    let key = format!("{}/{}/{}/{}", env, name, version, filename);
    let dest = storage::object_path(&state.config.root, &key)?;

    let size = data.len();
    blocking(move || storage::write_atomically(&dest, &data)).await?;
    tracing::info!(key = %key, size, "pushed file");

    Ok(Json(StatusResponse::ok(format!("written {}", key))))
}
