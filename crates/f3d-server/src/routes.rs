use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use crate::state::AppState;

mod files;
mod job;

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(job::service_info))
        .route("/health", get(job::health))
        .route("/generate", post(job::generate))
        .route("/files/{job_id}/{filename}", get(files::download))
}
