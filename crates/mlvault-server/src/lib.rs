//! mlvault blob service
//!
//! A small HTTP service storing asset files on local disk:
//!
//! - `POST /push`, `GET /clone`, `POST /deploy` for whole-version workflows
//! - `/objects/{key}` and `/objects?prefix=` for the REST storage driver
//!
//! Wire types come from `mlvault-protocol`, shared with the client side.

pub mod config;
pub mod error;
pub mod handlers;
pub mod storage;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use mlvault_protocol::{CLONE_PATH, DEPLOY_PATH, HEALTH_PATH, OBJECTS_PATH, PUSH_PATH};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub use config::ServerConfig;
pub use error::AppError;

#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

/// Assemble the router.
pub fn app(state: AppState) -> Router {
    let limit = state.config.max_upload_bytes;
    let object_route = format!("{}/*key", OBJECTS_PATH);

    Router::new()
        .route(HEALTH_PATH, get(|| async { "ok" }))
        .route(PUSH_PATH, post(handlers::push::push))
        .route(CLONE_PATH, get(handlers::clone::clone_version))
        .route(DEPLOY_PATH, post(handlers::deploy::deploy))
        .route(OBJECTS_PATH, get(handlers::objects::list_objects))
        .route(
            &object_route,
            get(handlers::objects::get_object)
                .head(handlers::objects::head_object)
                .put(handlers::objects::put_object)
                .delete(handlers::objects::delete_object),
        )
        .layer(DefaultBodyLimit::max(limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on an already bound listener until the task is dropped.
pub async fn serve(listener: TcpListener, config: ServerConfig) -> std::io::Result<()> {
    config.prepare()?;
    axum::serve(listener, app(AppState::new(config))).await
}
