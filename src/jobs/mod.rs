//! Job tracking: one background conversation per job, observable while it runs.

mod job;
mod manager;
mod store;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use job::{Job, JobSnapshot, JobStatus};
pub use manager::{JobManager, JobRequest};
pub use store::JobStore;

/// Opaque job identifier: the first 12 hex digits of a v4 UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(hex[..12].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
