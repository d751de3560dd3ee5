use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use f3d_core::{Error, JobId};
use tokio_util::io::ReaderStream;

use crate::error::ApiError;
use crate::state::AppState;

/// Stream an artifact file. The filename must be one of the job's recorded
/// artifacts; anything else (including traversal attempts) is a 404, so the
/// route can never expose files outside the job's own set.
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path((job_id, filename)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let job_id: JobId = job_id
        .parse()
        .map_err(|_| Error::not_found(format!("job {job_id}")))?;
    let job = state.registry.get(&job_id).await?;
    if !job.has_artifact_file(&filename) {
        return Err(Error::not_found(format!("file {filename} for job {job_id}")).into());
    }

    let path = state.store.resolve(&job_id, &filename).await?;
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| Error::not_found(format!("file {filename} for job {job_id}")))?;
    let body = Body::from_stream(ReaderStream::new(file));

    let response = Response::builder()
        .header(header::CONTENT_TYPE, media_type(&filename))
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(body)
        .map_err(|e| Error::artifact(format!("failed to build download response: {e}")))?;
    Ok(response.into_response())
}

fn media_type(filename: &str) -> &'static str {
    match filename.rsplit_once('.').map(|(_, ext)| ext) {
        Some("glb") => "model/gltf-binary",
        Some("mp4") => "video/mp4",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_types_by_extension() {
        assert_eq!(media_type("a_mesh.glb"), "model/gltf-binary");
        assert_eq!(media_type("a_preview.mp4"), "video/mp4");
        assert_eq!(media_type("a_gaussian.ply"), "application/octet-stream");
        assert_eq!(media_type("noext"), "application/octet-stream");
    }
}
