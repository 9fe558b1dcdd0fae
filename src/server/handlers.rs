use std::path::PathBuf;
use std::sync::OnceLock;

use axum::extract::{Form, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::Sse;
use axum::response::{IntoResponse, Response};
use axum::Json;
use regex::Regex;

use crate::error::JobError;
use crate::jobs::{JobId, JobRequest, JobStatus};
use crate::server::AppState;
use crate::server::types::{
    ApiImplementQuery, CommandListResponse, ErrorBody, HealthResponse, RunRequest, RunResponse,
    StatusResponse, StreamQuery, SubmitForm, SubmitResponse,
};

const EP_URL_PATTERN: &str = r"^https://github\.com/openshift/enhancements/pull/\d+/?$";

/// Errors returned to HTTP callers as `{"detail": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Job(#[from] JobError),

    #[error("{0}")]
    BadRequest(String),

    #[error("Too many open streams, try again later")]
    StreamLimit,

    #[error("Agent execution failed: {0}")]
    RunFailed(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Job(JobError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Job(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::StreamLimit => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::RunFailed(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }
        (
            status,
            Json(ErrorBody {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}

fn validate_ep_url(url: &str) -> Result<(), ApiError> {
    static EP_URL: OnceLock<Option<Regex>> = OnceLock::new();
    let valid = EP_URL
        .get_or_init(|| Regex::new(EP_URL_PATTERN).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(url));
    if valid {
        Ok(())
    } else {
        Err(ApiError::BadRequest(
            "Invalid enhancement PR URL. Expected format: https://github.com/openshift/enhancements/pull/<number>"
                .to_string(),
        ))
    }
}

/// Empty means the server's own working directory.
fn resolve_working_dir(raw: &str) -> Result<PathBuf, ApiError> {
    if raw.trim().is_empty() {
        std::env::current_dir()
            .map_err(|e| ApiError::Internal(format!("Cannot determine working directory: {}", e)))
    } else {
        Ok(PathBuf::from(raw.trim()))
    }
}

/// `Last-Event-ID` wins over `?cursor=`; both name the next index to send.
fn resolve_cursor(headers: &HeaderMap, query: &StreamQuery) -> usize {
    headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok())
        .map(|last| last.saturating_add(1))
        .or(query.cursor)
        .unwrap_or(0)
}

pub(super) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        running_jobs: state.jobs.store().running_count().await,
        stream_connections: state.streams.connection_count(),
    })
}

pub(super) async fn list_commands(State(state): State<AppState>) -> Json<CommandListResponse> {
    Json(CommandListResponse {
        commands: state.jobs.catalog().all().iter().collect(),
    })
}

pub(super) async fn submit(
    State(state): State<AppState>,
    Form(form): Form<SubmitForm>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let working_dir = resolve_working_dir(&form.working_dir)?;
    let job_id = state
        .jobs
        .submit(JobRequest {
            command: form.command,
            prompt: form.prompt,
            working_dir,
        })
        .await?;
    Ok(Json(SubmitResponse { job_id }))
}

pub(super) async fn status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let snapshot = state.jobs.status(&JobId::from(job_id)).await?;
    Ok(Json(snapshot.into()))
}

pub(super) async fn cancel(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let snapshot = state.jobs.cancel(&JobId::from(job_id)).await?;
    Ok(Json(snapshot.into()))
}

pub(super) async fn stream(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let job = state.jobs.get(&JobId::from(job_id)).await?;
    let cursor = resolve_cursor(&headers, &query);
    let events = state
        .streams
        .subscribe_sse(job, cursor)
        .ok_or(ApiError::StreamLimit)?;
    Ok(Sse::new(events).into_response())
}

pub(super) async fn run(
    State(state): State<AppState>,
    Json(req): Json<RunRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let working_dir = resolve_working_dir(req.working_dir.as_deref().unwrap_or_default())?;
    let snapshot = state
        .jobs
        .run_to_completion(JobRequest {
            command: req.command,
            prompt: req.prompt,
            working_dir,
        })
        .await?;

    if snapshot.status != JobStatus::Success {
        return Err(ApiError::RunFailed(
            snapshot.error.unwrap_or_else(|| "unknown error".to_string()),
        ));
    }
    Ok(Json(snapshot.into()))
}

pub(super) async fn api_implement(
    State(state): State<AppState>,
    Query(query): Query<ApiImplementQuery>,
) -> Result<Json<RunResponse>, ApiError> {
    validate_ep_url(&query.ep_url)?;
    let working_dir = resolve_working_dir(&query.cwd)?;

    let snapshot = state
        .jobs
        .run_to_completion(JobRequest {
            command: "api-implement".to_string(),
            prompt: query.ep_url,
            working_dir,
        })
        .await?;

    if snapshot.status != JobStatus::Success {
        return Err(ApiError::RunFailed(
            snapshot.error.unwrap_or_else(|| "unknown error".to_string()),
        ));
    }
    Ok(Json(snapshot.into()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::agent::ConversationEngine;
    use crate::agent::testing::{ScriptedLlm, end_turn, tool_turn};
    use crate::commands::CommandCatalog;
    use crate::config::{AgentConfig, ContextConfig, PricingOverrides, ServerConfig, ToolsConfig};
    use crate::jobs::{JobManager, JobStore};
    use crate::llm::{LlmProvider, Pricing};
    use crate::server::{StreamGateway, router};

    fn test_state(llm: ScriptedLlm, plugins: &TempDir) -> AppState {
        let llm: Arc<dyn LlmProvider> = Arc::new(llm);
        let pricing = Pricing::for_model(llm.model_name(), &PricingOverrides::default());
        let engine = Arc::new(ConversationEngine::new(llm, &AgentConfig::default()));
        let catalog = CommandCatalog::new(&ContextConfig {
            plugins_dir: plugins.path().join("plugins"),
            root_dir: plugins.path().to_path_buf(),
        });
        let jobs = JobManager::new(
            Arc::new(JobStore::new()),
            catalog,
            engine,
            pricing,
            ToolsConfig::default(),
        );
        let streams = StreamGateway::new(&ServerConfig {
            keepalive: Duration::from_millis(50),
            ..ServerConfig::default()
        });
        AppState::new(Arc::new(jobs), Arc::new(streams))
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_text(resp: Response) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn submit_request(command: &str, dir: &std::path::Path) -> Request<Body> {
        let body = format!(
            "command={}&prompt={}&working_dir={}",
            command,
            "https%3A%2F%2Fgithub.com%2Fopenshift%2Fenhancements%2Fpull%2F1234",
            dir.display()
        );
        Request::builder()
            .method("POST")
            .uri("/submit")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let plugins = TempDir::new().unwrap();
        let app = router(test_state(ScriptedLlm::new(vec![]), &plugins));

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["running_jobs"], 0);
    }

    #[tokio::test]
    async fn commands_are_listed() {
        let plugins = TempDir::new().unwrap();
        let app = router(test_state(ScriptedLlm::new(vec![]), &plugins));

        let req = Request::builder()
            .uri("/api/v1/commands")
            .body(Body::empty())
            .unwrap();
        let json = body_json(app.oneshot(req).await.unwrap()).await;
        let names: Vec<_> = json["commands"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap().to_string())
            .collect();
        assert!(names.contains(&"api-implement".to_string()));
        assert_eq!(names.len(), 7);
    }

    #[tokio::test]
    async fn status_unknown_job_is_404() {
        let plugins = TempDir::new().unwrap();
        let app = router(test_state(ScriptedLlm::new(vec![]), &plugins));

        let req = Request::builder()
            .uri("/status/deadbeef0000")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["detail"], "Job not found: deadbeef0000");
    }

    #[tokio::test]
    async fn submit_rejects_missing_dir() {
        let plugins = TempDir::new().unwrap();
        let state = test_state(ScriptedLlm::new(vec![]), &plugins);
        let app = router(state.clone());

        let resp = app
            .oneshot(submit_request("api-implement", &plugins.path().join("nope")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let detail = body_json(resp).await["detail"].as_str().unwrap().to_string();
        assert!(detail.starts_with("Working directory does not exist"));
        assert!(state.jobs.store().is_empty().await);
    }

    #[tokio::test]
    async fn submit_rejects_unknown_command() {
        let plugins = TempDir::new().unwrap();
        let app = router(test_state(ScriptedLlm::new(vec![]), &plugins));

        let resp = app
            .oneshot(submit_request("deploy", plugins.path()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn submit_then_status_then_stream() {
        let plugins = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        let llm = ScriptedLlm::new(vec![
            Ok(tool_turn(&[("bash", "toolu_1")], 10, 5)),
            Ok(end_turn("all done", 10, 5)),
        ]);
        let state = test_state(llm, &plugins);
        let app = router(state.clone());

        let resp = app
            .clone()
            .oneshot(submit_request("api-implement", repo.path()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let job_id = body_json(resp).await["job_id"]
            .as_str()
            .unwrap()
            .to_string();
        assert_eq!(job_id.len(), 12);

        state.jobs.wait(&JobId::from(job_id.as_str())).await.unwrap();

        let req = Request::builder()
            .uri(format!("/status/{}", job_id))
            .body(Body::empty())
            .unwrap();
        let json = body_json(app.clone().oneshot(req).await.unwrap()).await;
        assert_eq!(json["status"], "success");
        assert_eq!(json["output"], "all done");
        assert_eq!(json["input_tokens"], 20);
        assert_eq!(json["message_count"], 5);

        let req = Request::builder()
            .uri(format!("/stream/{}", job_id))
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_text(resp).await;
        assert_eq!(body.matches("event: message").count(), 5);
        assert_eq!(body.matches("event: complete").count(), 1);
        assert!(body.contains("id: 0"));
        assert!(body.contains("id: 4"));

        // Resuming after the last seen id replays only what follows it.
        let req = Request::builder()
            .uri(format!("/stream/{}", job_id))
            .header("Last-Event-ID", "3")
            .body(Body::empty())
            .unwrap();
        let body = body_text(app.oneshot(req).await.unwrap()).await;
        assert_eq!(body.matches("event: message").count(), 1);
        assert!(body.contains("id: 4"));
    }

    #[tokio::test]
    async fn stream_unknown_job_is_404() {
        let plugins = TempDir::new().unwrap();
        let app = router(test_state(ScriptedLlm::new(vec![]), &plugins));

        let req = Request::builder()
            .uri("/stream/missing")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn run_reports_failure_as_500() {
        let plugins = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        let llm = ScriptedLlm::new(vec![Err(crate::error::LlmError::RequestFailed {
            provider: "vertex".into(),
            reason: "boom".into(),
        })]);
        let app = router(test_state(llm, &plugins));

        let body = serde_json::json!({
            "command": "review",
            "prompt": "check it",
            "working_dir": repo.path(),
        });
        let req = Request::builder()
            .method("POST")
            .uri("/api/v1/run")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(resp).await["detail"],
            "Agent execution failed: Request to vertex failed: boom"
        );
    }

    #[tokio::test]
    async fn api_implement_validates_url() {
        let plugins = TempDir::new().unwrap();
        let app = router(test_state(ScriptedLlm::new(vec![]), &plugins));

        let req = Request::builder()
            .uri("/api/v1/oape-api-implement?ep_url=https%3A%2F%2Fexample.com%2Fpull%2F1")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(
            body_json(resp).await["detail"]
                .as_str()
                .unwrap()
                .starts_with("Invalid enhancement PR URL")
        );
    }

    #[tokio::test]
    async fn cancel_unknown_job_is_404() {
        let plugins = TempDir::new().unwrap();
        let app = router(test_state(ScriptedLlm::new(vec![]), &plugins));

        let req = Request::builder()
            .method("POST")
            .uri("/jobs/missing/cancel")
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.oneshot(req).await.unwrap().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn ep_url_pattern() {
        assert!(validate_ep_url("https://github.com/openshift/enhancements/pull/1234").is_ok());
        assert!(validate_ep_url("https://github.com/openshift/enhancements/pull/1234/").is_ok());
        assert!(validate_ep_url("https://github.com/openshift/enhancements/pull/abc").is_err());
        assert!(validate_ep_url("http://github.com/openshift/enhancements/pull/1").is_err());
    }

    #[test]
    fn cursor_prefers_last_event_id() {
        let mut headers = HeaderMap::new();
        assert_eq!(resolve_cursor(&headers, &StreamQuery { cursor: Some(2) }), 2);
        headers.insert("last-event-id", "7".parse().unwrap());
        assert_eq!(resolve_cursor(&headers, &StreamQuery { cursor: Some(2) }), 8);
        assert_eq!(resolve_cursor(&HeaderMap::new(), &StreamQuery { cursor: None }), 0);

        let mut headers = HeaderMap::new();
        headers.insert("last-event-id", usize::MAX.to_string().parse().unwrap());
        assert_eq!(
            resolve_cursor(&headers, &StreamQuery { cursor: None }),
            usize::MAX
        );
    }
}
