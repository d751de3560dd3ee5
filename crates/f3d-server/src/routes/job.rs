use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use f3d_core::{GenerationRequest, JobStatus};

use crate::error::ApiError;
use crate::schemas::{HealthResponse, ServiceInfo};
use crate::state::AppState;

pub async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo::current())
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let healthy = state.healthy();
    Json(HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        message: if healthy {
            "API is running".to_string()
        } else {
            "Pipeline not loaded".to_string()
        },
        accelerator_available: state.accelerator_available,
        model_loaded: state.model_loaded,
        timestamp: Utc::now(),
    })
}

/// Submit a generation request and wait for it to finish. Minutes-scale; the
/// engine gate serializes concurrent submissions. A pipeline failure still
/// carries the job id in the body, just with a failed status and a 500.
/// A client that disconnects mid-run does not cancel the job; the detached
/// lifecycle inside [`f3d_core::JobOrchestrator::submit`] finishes it.
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let orchestrator = state
        .orchestrator
        .as_ref()
        .ok_or(ApiError::EngineUnavailable)?;
    let result = orchestrator.submit(request).await?;
    let status = if result.status == JobStatus::Failed {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    Ok((status, Json(result)))
}
