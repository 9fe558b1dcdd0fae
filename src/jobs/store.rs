//! In-memory job registry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::JobError;
use crate::jobs::{Job, JobId};

/// Process-lifetime map of jobs. Nothing is evicted.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Arc<Job>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, job: Arc<Job>) {
        self.jobs.write().await.insert(job.id.clone(), job);
    }

    pub async fn get(&self, id: &JobId) -> Result<Arc<Job>, JobError> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| JobError::NotFound { id: id.clone() })
    }

    /// All jobs, newest first.
    pub async fn list(&self) -> Vec<Arc<Job>> {
        let mut jobs: Vec<_> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    pub async fn running_count(&self) -> usize {
        let jobs: Vec<_> = self.jobs.read().await.values().cloned().collect();
        let mut count = 0;
        for job in jobs {
            if !job.is_finished().await {
                count += 1;
            }
        }
        count
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}
