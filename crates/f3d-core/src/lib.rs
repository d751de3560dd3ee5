//! Core of the forge3d generation service: job lifecycle and artifact
//! management around an opaque text-to-3D pipeline.

pub mod engine;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod registry;
pub mod request;
pub mod store;
pub mod sweeper;

pub use engine::{GenerationEngine, OutputSet, VideoEncoder};
pub use error::{Error, Result};
pub use job::{ArtifactKind, Job, JobId, JobResult, JobStatus};
pub use orchestrator::JobOrchestrator;
pub use registry::JobRegistry;
pub use request::{GenerationRequest, MAX_SEED, OutputFormat};
pub use store::ArtifactStore;
pub use sweeper::{RetentionSweeper, SweepHandle};
