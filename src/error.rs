//! Error types shared across the service.

use std::path::PathBuf;
use std::time::Duration;

use crate::jobs::JobId;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}")]
    MissingRequired { key: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors returned by a model provider.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Request to {provider} failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Rate limited by {provider}, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Response from {provider} was withheld by content filtering")]
    ContentFiltered { provider: String },

    #[error("Authentication with {provider} failed")]
    AuthFailed { provider: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

impl LlmError {
    /// Whether an identical request could succeed later.
    ///
    /// The conversation engine never retries on its own; this is exposed for
    /// callers that wrap a run in their own retry policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RequestFailed { .. } | LlmError::RateLimited { .. }
        )
    }
}

/// Errors surfaced by the job manager to external callers.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job not found: {id}")]
    NotFound { id: JobId },

    #[error("Unknown command: {command}. Available: {available}")]
    UnknownCommand { command: String, available: String },

    #[error("Working directory does not exist: {}", path.display())]
    InvalidWorkingDir { path: PathBuf },

    #[error("Invalid prompt: {reason}")]
    InvalidPrompt { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let transport = LlmError::RequestFailed {
            provider: "vertex".into(),
            reason: "connection reset".into(),
        };
        let limited = LlmError::RateLimited {
            provider: "vertex".into(),
            retry_after: Some(Duration::from_secs(5)),
        };
        let filtered = LlmError::ContentFiltered {
            provider: "vertex".into(),
        };
        let auth = LlmError::AuthFailed {
            provider: "vertex".into(),
        };

        assert!(transport.is_retryable());
        assert!(limited.is_retryable());
        assert!(!filtered.is_retryable());
        assert!(!auth.is_retryable());
    }

    #[test]
    fn test_job_error_messages() {
        let err = JobError::InvalidWorkingDir {
            path: PathBuf::from("/does/not/exist"),
        };
        assert_eq!(
            err.to_string(),
            "Working directory does not exist: /does/not/exist"
        );

        let err = JobError::NotFound {
            id: JobId::from("abc123"),
        };
        assert_eq!(err.to_string(), "Job not found: abc123");
    }
}
