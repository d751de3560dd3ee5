use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::job::{Job, JobId};

/// In-memory table of all known jobs, the single source of truth for what
/// jobs exist and what state they are in. Cloning the registry clones the
/// handle, not the table.
///
/// All mutation funnels through [`update`](Self::update) under the write
/// lock, so readers never observe a half-updated record.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, job: Job) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        // Ids are random v4 and never reused; a collision here is a bug.
        if jobs.contains_key(&job.id) {
            return Err(Error::validation(format!("job {} already exists", job.id)));
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    pub async fn get(&self, id: &JobId) -> Result<Job> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("job {id}")))
    }

    /// Apply `mutate` to the record under the write lock and return the
    /// updated copy.
    pub async fn update<F>(&self, id: &JobId, mutate: F) -> Result<Job>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("job {id}")))?;
        mutate(job);
        Ok(job.clone())
    }

    /// Remove a record. Returns the removed job, `None` if it was already
    /// gone.
    pub async fn remove(&self, id: &JobId) -> Option<Job> {
        self.jobs.write().await.remove(id)
    }

    /// Terminal jobs whose completion timestamp is older than the retention
    /// window. Never returns a job that is still pending or running.
    pub async fn list_expired(&self, window: Duration, now: DateTime<Utc>) -> Vec<Job> {
        self.jobs
            .read()
            .await
            .values()
            .filter(|job| job.expired(window, now))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}
