//! HTTP front end for the forge3d generation core.

use std::sync::Arc;

use axum::Router;
use f3d_core::{ArtifactStore, JobOrchestrator, JobRegistry, RetentionSweeper};
use tracing::error;

pub mod config;
pub mod error;
pub mod routes;
pub mod schemas;
pub mod state;
pub mod synthetic;

use config::ServerConfig;
use state::AppState;
use synthetic::{SyntheticEngine, SyntheticVideoEncoder};

/// Build the shared service context: registry, store, sweeper worker, and
/// the orchestrator around the engine. An engine that fails to initialize
/// leaves the service up but unhealthy.
pub fn build_state(config: &ServerConfig) -> anyhow::Result<Arc<AppState>> {
    let registry = JobRegistry::new();
    let store = ArtifactStore::new(&config.storage_root)?;
    let sweep = RetentionSweeper::new(registry.clone(), store.clone(), config.retention_window())
        .spawn(config.sweep_interval());

    let state = match SyntheticEngine::initialize(&config.device) {
        Ok(engine) => {
            let accelerator_available = engine.accelerator_available();
            let orchestrator = JobOrchestrator::new(
                registry.clone(),
                store.clone(),
                Arc::new(engine),
                Arc::new(SyntheticVideoEncoder),
                sweep,
            );
            AppState {
                orchestrator: Some(Arc::new(orchestrator)),
                registry,
                store,
                model_loaded: true,
                accelerator_available,
            }
        }
        Err(e) => {
            error!(error = %e, "engine initialization failed; serving unhealthy");
            AppState {
                orchestrator: None,
                registry,
                store,
                model_loaded: false,
                accelerator_available: false,
            }
        }
    };
    Ok(Arc::new(state))
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new().merge(routes::api_routes()).with_state(state)
}
