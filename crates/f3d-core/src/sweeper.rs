use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::registry::JobRegistry;
use crate::store::ArtifactStore;

/// Reclaims storage for jobs past the retention window: artifact directory
/// first, then the registry record. A crash between the two leaves at worst
/// an orphaned record pointing at nothing, which the next sweep removes.
///
/// Known limitation: a download racing a sweep may observe the file
/// disappearing mid-read. Retention is hours-scale and downloads
/// seconds-scale, so the race is accepted rather than coordinated.
pub struct RetentionSweeper {
    registry: JobRegistry,
    store: ArtifactStore,
    window: Duration,
}

impl RetentionSweeper {
    pub fn new(registry: JobRegistry, store: ArtifactStore, window: Duration) -> Self {
        Self {
            registry,
            store,
            window,
        }
    }

    /// Remove every expired terminal job. Returns the number of records
    /// removed. Per-job failures are logged and skipped; a job whose
    /// artifacts cannot be deleted keeps its record so a later sweep can
    /// retry.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let expired = self.registry.list_expired(self.window, now).await;
        let mut removed = 0;
        for job in expired {
            if let Err(e) = self.store.delete_job_dir(&job.id).await {
                warn!(job_id = %job.id, error = %e, "failed to delete artifact directory");
                continue;
            }
            if self.registry.remove(&job.id).await.is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "retention sweep reclaimed expired jobs");
        }
        removed
    }

    /// Spawn the sweeper as a background worker. It sweeps on every trigger
    /// (the orchestrator fires one per job completion) and on a fixed
    /// interval when one is configured. The worker exits when every trigger
    /// handle is dropped.
    pub fn spawn(self, interval: Option<std::time::Duration>) -> SweepHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        tokio::spawn(async move {
            let mut ticker = interval.map(tokio::time::interval);
            if let Some(t) = ticker.as_mut() {
                // The first tick fires immediately; skip it.
                t.tick().await;
            }
            loop {
                match ticker.as_mut() {
                    Some(t) => {
                        tokio::select! {
                            msg = rx.recv() => {
                                if msg.is_none() {
                                    break;
                                }
                            }
                            _ = t.tick() => {}
                        }
                    }
                    None => {
                        if rx.recv().await.is_none() {
                            break;
                        }
                    }
                }
                self.sweep(Utc::now()).await;
            }
        });
        SweepHandle { tx }
    }
}

/// Fire-and-forget trigger for the spawned sweeper worker.
#[derive(Clone)]
pub struct SweepHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl SweepHandle {
    pub fn trigger(&self) {
        // A closed channel means the worker is gone during shutdown; there
        // is nothing useful to do with the error.
        let _ = self.tx.send(());
    }
}
