//! Claude on Google Cloud Vertex AI.
//!
//! Uses the Anthropic Messages format through Vertex's `rawPredict` endpoint.
//! Authentication is a bearer token, either supplied in config or minted by
//! the local `gcloud` CLI from application-default credentials.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::config::VertexConfig;
use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, ContentBlock, LlmProvider, MessagesRequest, MessagesResponse, StopReason, Usage,
};

const PROVIDER: &str = "vertex";

const ANTHROPIC_VERSION: &str = "vertex-2023-10-16";

/// gcloud tokens live for an hour; refresh a little early.
const TOKEN_TTL: Duration = Duration::from_secs(50 * 60);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Claude-on-Vertex provider.
pub struct VertexProvider {
    client: Client,
    config: VertexConfig,
    cached_token: Mutex<Option<(SecretString, Instant)>>,
}

impl VertexProvider {
    pub fn new(config: VertexConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            config,
            cached_token: Mutex::new(None),
        })
    }

    fn endpoint(&self) -> String {
        let host = if self.config.region == "global" {
            "aiplatform.googleapis.com".to_string()
        } else {
            format!("{}-aiplatform.googleapis.com", self.config.region)
        };
        format!(
            "https://{}/v1/projects/{}/locations/{}/publishers/anthropic/models/{}:rawPredict",
            host, self.config.project_id, self.config.region, self.config.model
        )
    }

    async fn access_token(&self) -> Result<String, LlmError> {
        if let Some(token) = &self.config.access_token {
            return Ok(token.expose_secret().to_string());
        }

        let mut cached = self.cached_token.lock().await;
        if let Some((token, minted_at)) = cached.as_ref()
            && minted_at.elapsed() < TOKEN_TTL
        {
            return Ok(token.expose_secret().to_string());
        }

        let output = Command::new("gcloud")
            .args(["auth", "print-access-token"])
            .output()
            .await
            .map_err(|e| {
                tracing::error!("Failed to run gcloud for an access token: {}", e);
                LlmError::AuthFailed {
                    provider: PROVIDER.to_string(),
                }
            })?;

        if !output.status.success() {
            tracing::error!(
                "gcloud auth print-access-token failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Err(LlmError::AuthFailed {
                provider: PROVIDER.to_string(),
            });
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        *cached = Some((SecretString::from(token.clone()), Instant::now()));
        Ok(token)
    }
}

#[async_trait]
impl LlmProvider for VertexProvider {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn create_message(&self, req: MessagesRequest) -> Result<MessagesResponse, LlmError> {
        let body = RawPredictRequest {
            anthropic_version: ANTHROPIC_VERSION,
            max_tokens: req.max_tokens,
            system: &req.system,
            messages: &req.messages,
            tools: req
                .tools
                .iter()
                .map(|t| WireTool {
                    name: &t.name,
                    description: &t.description,
                    input_schema: &t.input_schema,
                })
                .collect(),
        };

        let url = self.endpoint();
        let token = self.access_token().await?;

        tracing::debug!(
            model = %self.config.model,
            messages = req.messages.len(),
            "Sending request to Vertex"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Vertex request failed: {}", e);
                LlmError::RequestFailed {
                    provider: PROVIDER.to_string(),
                    reason: e.to_string(),
                }
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        let response_text = response.text().await.map_err(|e| LlmError::RequestFailed {
            provider: PROVIDER.to_string(),
            reason: format!("failed to read response body: {}", e),
        })?;

        tracing::debug!("Vertex response status: {}", status);

        if !status.is_success() {
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(LlmError::AuthFailed {
                    provider: PROVIDER.to_string(),
                });
            }
            if status.as_u16() == 429 {
                let retry_after = headers
                    .get("retry-after")
                    .and_then(|h| h.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs);

                return Err(LlmError::RateLimited {
                    provider: PROVIDER.to_string(),
                    retry_after,
                });
            }
            return Err(LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("HTTP {}: {}", status, response_text),
            });
        }

        let parsed: RawPredictResponse =
            serde_json::from_str(&response_text).map_err(|e| LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: format!("JSON parse error: {}. Raw: {}", e, response_text),
            })?;

        parsed.into_response()
    }
}

#[derive(Debug, Serialize)]
struct RawPredictRequest<'a> {
    anthropic_version: &'static str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawPredictResponse {
    #[serde(default)]
    content: Vec<serde_json::Value>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Usage,
}

impl RawPredictResponse {
    /// Convert to the provider-neutral response.
    ///
    /// Block types this crate does not model are dropped with a debug log
    /// rather than failing the whole turn.
    fn into_response(self) -> Result<MessagesResponse, LlmError> {
        let stop_reason = StopReason::parse(self.stop_reason.as_deref());

        let content: Vec<ContentBlock> = self
            .content
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<ContentBlock>(raw.clone()) {
                Ok(block) => Some(block),
                Err(e) => {
                    tracing::debug!("Skipping unrecognised content block ({}): {}", e, raw);
                    None
                }
            })
            .collect();

        if stop_reason == StopReason::Refusal && content.is_empty() {
            return Err(LlmError::ContentFiltered {
                provider: PROVIDER.to_string(),
            });
        }

        Ok(MessagesResponse {
            content,
            stop_reason,
            usage: self.usage,
        })
    }
}
