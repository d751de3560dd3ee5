use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::schemas::ErrorResponse;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] f3d_core::Error),

    #[error("pipeline not loaded")]
    EngineUnavailable,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Core(f3d_core::Error::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Core(f3d_core::Error::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::EngineUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}
