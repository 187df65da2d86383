//! Route handlers.

pub mod clone;
pub mod deploy;
pub mod objects;
pub mod push;

use axum::extract::multipart::Field;

use crate::error::AppError;

/// Run blocking filesystem work off the async workers.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("blocking task failed: {}", e)))?
}

pub(crate) async fn text_field(field: Field<'_>) -> Result<String, AppError> {
    Ok(field.text().await?.trim().to_string())
}

pub(crate) fn require(value: Option<String>, field: &str) -> Result<String, AppError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::missing_field(field))
}
