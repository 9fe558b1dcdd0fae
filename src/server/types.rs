//! Request and response DTOs for the job API.

use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::commands::CommandInfo;
use crate::jobs::{JobId, JobSnapshot, JobStatus};

// --- Submission ---

/// Form body of `POST /submit`. `ep_url` and `cwd` are accepted as aliases.
#[derive(Debug, Deserialize)]
pub struct SubmitForm {
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default, alias = "ep_url")]
    pub prompt: String,
    #[serde(default, alias = "cwd")]
    pub working_dir: String,
}

fn default_command() -> String {
    "api-implement".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
}

/// JSON body of `POST /api/v1/run`.
#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub command: String,
    pub prompt: String,
    #[serde(default)]
    pub working_dir: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub command: String,
    pub working_dir: String,
    pub output: String,
    pub cost_usd: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl From<JobSnapshot> for RunResponse {
    fn from(snap: JobSnapshot) -> Self {
        Self {
            job_id: snap.id,
            status: snap.status,
            command: snap.command,
            working_dir: snap.working_dir.display().to_string(),
            output: snap.output.unwrap_or_default(),
            cost_usd: snap.cost_usd.and_then(|c| c.to_f64()).unwrap_or(0.0),
            input_tokens: snap.input_tokens,
            output_tokens: snap.output_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiImplementQuery {
    pub ep_url: String,
    #[serde(default)]
    pub cwd: String,
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub cursor: Option<usize>,
}

// --- Status ---

/// Body of `GET /status/{id}` and of the terminal `complete` stream event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub command: String,
    pub prompt: String,
    pub working_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub message_count: usize,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
}

impl From<JobSnapshot> for StatusResponse {
    fn from(snap: JobSnapshot) -> Self {
        Self {
            job_id: snap.id,
            status: snap.status,
            command: snap.command,
            prompt: snap.prompt,
            working_dir: snap.working_dir.display().to_string(),
            output: snap.output,
            error: snap.error,
            cost_usd: snap.cost_usd.and_then(|c| c.to_f64()),
            input_tokens: snap.input_tokens,
            output_tokens: snap.output_tokens,
            message_count: snap.message_count,
            created_at: snap.created_at.to_rfc3339(),
            finished_at: snap.finished_at.map(|t| t.to_rfc3339()),
        }
    }
}

// --- Catalog ---

#[derive(Debug, Serialize)]
pub struct CommandListResponse {
    pub commands: Vec<&'static CommandInfo>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub running_jobs: usize,
    pub stream_connections: u64,
}

// --- Errors ---

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}
