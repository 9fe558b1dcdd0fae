//! A tracked job and its point-in-time snapshot.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, watch};
use tokio_util::sync::CancellationToken;

use crate::agent::{AgentRunResult, ConversationMessage};
use crate::jobs::JobId;

/// Lifecycle status. Leaves `Running` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Success,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Running => write!(f, "running"),
            JobStatus::Success => write!(f, "success"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Fields fixed when the job finishes.
#[derive(Debug, Clone, Default)]
struct Completion {
    output: String,
    error: Option<String>,
    cost_usd: Decimal,
    input_tokens: u64,
    output_tokens: u64,
    finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    completion: Option<Completion>,
}

/// Read-only view of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub command: String,
    pub prompt: String,
    pub working_dir: PathBuf,
    pub status: JobStatus,
    pub output: Option<String>,
    pub error: Option<String>,
    pub cost_usd: Option<Decimal>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// One job: immutable inputs, an append-only transcript, and a status that
/// becomes terminal once.
///
/// Every append and the final transition bump a watch counter, so readers
/// block on [`Job::subscribe`] instead of polling.
#[derive(Debug)]
pub struct Job {
    pub id: JobId,
    pub command: String,
    pub prompt: String,
    pub working_dir: PathBuf,
    pub created_at: DateTime<Utc>,
    messages: RwLock<Vec<ConversationMessage>>,
    state: RwLock<JobState>,
    progress: watch::Sender<u64>,
    cancel: CancellationToken,
}

impl Job {
    pub fn new(command: impl Into<String>, prompt: impl Into<String>, working_dir: PathBuf) -> Self {
        let (progress, _) = watch::channel(0);
        Self {
            id: JobId::new(),
            command: command.into(),
            prompt: prompt.into(),
            working_dir,
            created_at: Utc::now(),
            messages: RwLock::new(Vec::new()),
            state: RwLock::new(JobState {
                status: JobStatus::Running,
                completion: None,
            }),
            progress,
            cancel: CancellationToken::new(),
        }
    }

    /// Receiver that changes whenever a message is appended or the job ends.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.progress.subscribe()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Append to the transcript. Ignored once the job is terminal.
    pub async fn push_message(&self, message: ConversationMessage) {
        if self.status().await.is_terminal() {
            tracing::warn!(job_id = %self.id, "Dropping message for finished job");
            return;
        }
        self.messages.write().await.push(message);
        self.progress.send_modify(|v| *v += 1);
    }

    /// Messages at index `cursor` and later.
    pub async fn messages_from(&self, cursor: usize) -> Vec<ConversationMessage> {
        let messages = self.messages.read().await;
        messages.get(cursor..).map(<[_]>::to_vec).unwrap_or_default()
    }

    pub async fn message_count(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn status(&self) -> JobStatus {
        self.state.read().await.status
    }

    pub async fn is_finished(&self) -> bool {
        self.status().await.is_terminal()
    }

    /// Record the run's outcome. Returns false if the job had already finished.
    pub async fn finish(&self, result: &AgentRunResult, cost_usd: Decimal) -> bool {
        let status = if result.success {
            JobStatus::Success
        } else {
            JobStatus::Failed
        };
        self.complete(
            status,
            Completion {
                output: result.output.clone(),
                error: result.error.clone(),
                cost_usd,
                input_tokens: result.input_tokens,
                output_tokens: result.output_tokens,
                finished_at: Some(Utc::now()),
            },
        )
        .await
    }

    /// Fail a job that never got as far as running a conversation.
    pub async fn fail(&self, error: impl Into<String>) -> bool {
        self.complete(
            JobStatus::Failed,
            Completion {
                error: Some(error.into()),
                finished_at: Some(Utc::now()),
                ..Completion::default()
            },
        )
        .await
    }

    async fn complete(&self, status: JobStatus, completion: Completion) -> bool {
        {
            let mut state = self.state.write().await;
            if state.status.is_terminal() {
                return false;
            }
            state.status = status;
            state.completion = Some(completion);
        }
        self.progress.send_modify(|v| *v += 1);
        tracing::info!(job_id = %self.id, status = %status, "Job finished");
        true
    }

    pub async fn snapshot(&self) -> JobSnapshot {
        let message_count = self.message_count().await;
        let state = self.state.read().await;
        let completion = state.completion.clone();

        JobSnapshot {
            id: self.id.clone(),
            command: self.command.clone(),
            prompt: self.prompt.clone(),
            working_dir: self.working_dir.clone(),
            status: state.status,
            output: completion
                .as_ref()
                .map(|c| c.output.clone())
                .filter(|o| !o.is_empty()),
            error: completion.as_ref().and_then(|c| c.error.clone()),
            cost_usd: completion.as_ref().map(|c| c.cost_usd),
            input_tokens: completion.as_ref().map_or(0, |c| c.input_tokens),
            output_tokens: completion.as_ref().map_or(0, |c| c.output_tokens),
            message_count,
            created_at: self.created_at,
            finished_at: completion.and_then(|c| c.finished_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn result(success: bool) -> AgentRunResult {
        AgentRunResult {
            output: "partial".into(),
            success,
            error: (!success).then(|| "boom".to_string()),
            messages: Vec::new(),
            input_tokens: 10,
            output_tokens: 2,
        }
    }

    #[tokio::test]
    async fn test_finish_is_once() {
        let job = Job::new("review", "look", PathBuf::from("/tmp"));
        assert_eq!(job.status().await, JobStatus::Running);

        assert!(job.finish(&result(false), dec!(0.01)).await);
        assert!(!job.finish(&result(true), dec!(0.02)).await);

        let snap = job.snapshot().await;
        assert_eq!(snap.status, JobStatus::Failed);
        assert_eq!(snap.error.as_deref(), Some("boom"));
        assert_eq!(snap.output.as_deref(), Some("partial"));
        assert_eq!(snap.cost_usd, Some(dec!(0.01)));
        assert!(snap.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_no_appends_after_terminal() {
        let job = Job::new("review", "look", PathBuf::from("/tmp"));
        job.push_message(ConversationMessage::User {
            content: "look".into(),
        })
        .await;
        job.fail("nope").await;
        job.push_message(ConversationMessage::Text {
            content: "late".into(),
        })
        .await;

        assert_eq!(job.message_count().await, 1);
        assert_eq!(job.messages_from(1).await, Vec::new());
        assert_eq!(job.messages_from(5).await, Vec::new());
    }

    #[tokio::test]
    async fn test_progress_notifies() {
        let job = Job::new("review", "look", PathBuf::from("/tmp"));
        let mut rx = job.subscribe();

        job.push_message(ConversationMessage::Text {
            content: "hi".into(),
        })
        .await;
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);
    }
}
