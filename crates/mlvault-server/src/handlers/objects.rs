//! Raw object API backing the REST storage driver.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use mlvault_protocol::{ObjectList, ObjectListQuery, StatusResponse};

use super::blocking;
use crate::error::AppError;
use crate::storage;
use crate::AppState;

pub async fn list_objects(
    State(state): State<AppState>,
    Query(query): Query<ObjectListQuery>,
) -> Result<Json<ObjectList>, AppError> {
    let root = state.config.root.clone();
    let keys = blocking(move || storage::list_keys(&root, &query.prefix)).await?;
    Ok(Json(ObjectList { keys }))
}

pub async fn get_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let path = storage::object_path(&state.config.root, &key)?;
    if !path.is_file() {
        return Err(AppError::NotFound(key));
    }
    let data = tokio::fs::read(&path).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], data))
}

pub async fn head_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode, AppError> {
    let path = storage::object_path(&state.config.root, &key)?;
    Ok(if path.is_file() {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    })
}

pub async fn put_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<Json<StatusResponse>, AppError> {
    let path = storage::object_path(&state.config.root, &key)?;
    let size = body.len();
    blocking(move || storage::write_atomically(&path, &body)).await?;
    tracing::debug!(key = %key, size, "stored object");
    Ok(Json(StatusResponse::ok(format!("stored {}", key))))
}

pub async fn delete_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    let path = storage::object_path(&state.config.root, &key)?;
    if !path.is_file() {
        return Err(AppError::NotFound(key));
    }
    tokio::fs::remove_file(&path).await?;
    tracing::debug!(key = %key, "deleted object");
    Ok(Json(StatusResponse::ok(format!("deleted {}", key))))
}
