use std::sync::Arc;

use f3d_core::{ArtifactStore, JobOrchestrator, JobRegistry};

/// Shared service context, constructed once at startup and handed to every
/// handler. `orchestrator` is `None` when the engine failed to initialize:
/// health reports unhealthy and `/generate` answers 503, while status and
/// download routes keep working.
pub struct AppState {
    pub orchestrator: Option<Arc<JobOrchestrator>>,
    pub registry: JobRegistry,
    pub store: ArtifactStore,
    pub model_loaded: bool,
    pub accelerator_available: bool,
}

impl AppState {
    pub fn healthy(&self) -> bool {
        self.model_loaded
    }
}
