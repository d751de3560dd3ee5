use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::request::{GenerationRequest, OutputFormat};

pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// The concrete files a job can produce. Kind determines the deterministic
/// filename and the media type served on download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    GaussianPly,
    MeshGlb,
    PreviewVideo,
}

impl ArtifactKind {
    pub fn for_format(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Gaussian => Self::GaussianPly,
            OutputFormat::Mesh => Self::MeshGlb,
            OutputFormat::Video => Self::PreviewVideo,
        }
    }

    pub fn filename(&self, job_id: &JobId) -> String {
        match self {
            Self::GaussianPly => format!("{job_id}_gaussian.ply"),
            Self::MeshGlb => format!("{job_id}_mesh.glb"),
            Self::PreviewVideo => format!("{job_id}_preview.mp4"),
        }
    }
}

/// Counts reported by the pipeline for one run. `num_radiance_fields` covers
/// the internal-only representation that is never written to a file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub formats_generated: Vec<String>,
    pub num_gaussians: usize,
    pub num_meshes: usize,
    pub num_radiance_fields: usize,
}

/// One generation request's full lifecycle record. Created by the
/// orchestrator, mutated only through the registry, reclaimed by the
/// retention sweeper once terminal and older than the retention window.
///
/// An artifact entry of `None` means the format was requested but the
/// pipeline yielded no data for it: degraded, not failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub request: GenerationRequest,
    /// Seed actually used, resolved at submission when the request omits one.
    pub seed: u64,
    pub artifacts: BTreeMap<ArtifactKind, Option<String>>,
    pub model_info: ModelInfo,
    pub error: Option<String>,
    pub warnings: Vec<String>,
}

impl Job {
    pub fn new(request: GenerationRequest, seed: u64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            created_at: now,
            completed_at: None,
            request,
            seed,
            artifacts: BTreeMap::new(),
            model_info: ModelInfo::default(),
            error: None,
            warnings: Vec::new(),
        }
    }

    /// True when `filename` is one of this job's recorded artifact files.
    /// Downloads are checked against this set, never against the directory
    /// contents.
    pub fn has_artifact_file(&self, filename: &str) -> bool {
        self.artifacts
            .values()
            .any(|f| f.as_deref() == Some(filename))
    }

    pub fn expired(&self, window: chrono::Duration, now: DateTime<Utc>) -> bool {
        match self.completed_at {
            Some(done) if self.status.is_terminal() => now - done > window,
            _ => false,
        }
    }
}

/// What `submit` hands back to the caller: the job id, terminal status, and
/// download references for every produced artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: JobId,
    pub status: JobStatus,
    pub message: String,
    pub prompt: String,
    pub seed: u64,
    pub generation_time_seconds: f64,
    /// Artifact kind to download path (`/files/{job_id}/{filename}`).
    /// `null` marks a requested format that produced no data.
    pub files: BTreeMap<ArtifactKind, Option<String>>,
    pub model_info: ModelInfo,
}

impl JobResult {
    pub fn from_job(job: &Job, elapsed_seconds: f64) -> Self {
        let files = job
            .artifacts
            .iter()
            .map(|(kind, filename)| {
                let reference = filename
                    .as_ref()
                    .map(|name| format!("/files/{}/{}", job.id, name));
                (*kind, reference)
            })
            .collect();
        let message = match job.status {
            JobStatus::Succeeded => "3D asset generated successfully".to_string(),
            JobStatus::Failed => job
                .error
                .clone()
                .unwrap_or_else(|| "generation failed".to_string()),
            JobStatus::Pending | JobStatus::Running => "generation in progress".to_string(),
        };
        Self {
            job_id: job.id,
            status: job.status,
            message,
            prompt: job.request.prompt.clone(),
            seed: job.seed,
            generation_time_seconds: elapsed_seconds,
            files,
            model_info: job.model_info.clone(),
        }
    }
}
