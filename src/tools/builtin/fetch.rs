//! URL fetch tool (HTTP/HTTPS GET only).

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;

use crate::tools::tool::{Tool, ToolError, ToolOutput, ToolParams};

/// Response bodies are cut off at this many bytes.
pub const MAX_RESPONSE_SIZE: usize = 500_000;

const USER_AGENT: &str = "OAPE-Agent/1.0 (OpenShift Operator Development Tool)";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct WebFetchParams {
    pub url: String,
}

impl ToolParams for WebFetchParams {
    const REQUIRED: &'static [&'static str] = &["url"];
}

/// Fetch content from a URL.
#[derive(Debug)]
pub struct WebFetchTool {
    client: Client,
    timeout: Duration,
}

impl WebFetchTool {
    pub fn new() -> Result<Self, ToolError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, ToolError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                ToolError::ExecutionFailed(format!("Failed to create HTTP client: {}", e))
            })?;
        Ok(Self { client, timeout })
    }

    fn map_request_error(&self, e: reqwest::Error) -> ToolError {
        if e.is_timeout() {
            ToolError::Timeout(self.timeout)
        } else if e.is_connect() || e.is_request() || e.is_builder() {
            ToolError::ExternalService {
                status: Some(0),
                message: format!("URL error: {}", e),
            }
        } else {
            ToolError::ExternalService {
                status: Some(500),
                message: format!("Fetch error: {}", e),
            }
        }
    }

    /// GET `url` and return its body as text.
    pub async fn fetch(&self, url: &str) -> Result<String, ToolError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ToolError::ExternalService {
                status: Some(400),
                message: format!("Invalid URL scheme. Must be http:// or https://: {}", url),
            });
        }

        tracing::info!(url = %url, "Fetching URL");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("HTTP error fetching {}: {}", url, status.as_u16());
            return Err(ToolError::ExternalService {
                status: Some(status.as_u16()),
                message: format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                ),
            });
        }

        if let Some(len) = response.content_length()
            && len > MAX_RESPONSE_SIZE as u64
        {
            return Err(ToolError::ExternalService {
                status: Some(413),
                message: format!(
                    "Response too large: {} bytes. Max: {} bytes.",
                    len, MAX_RESPONSE_SIZE
                ),
            });
        }

        // Servers may omit or understate Content-Length; stop reading at the cap.
        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.map_request_error(e))?;
            let remaining = MAX_RESPONSE_SIZE - body.len();
            body.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
            if body.len() >= MAX_RESPONSE_SIZE {
                break;
            }
        }

        Ok(decode_body(body))
    }
}

/// UTF-8 when valid, otherwise Latin-1 (every byte maps to one char).
fn decode_body(body: Vec<u8>) -> String {
    match String::from_utf8(body) {
        Ok(text) => text,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    type Params = WebFetchParams;

    fn name(&self) -> &'static str {
        "web_fetch"
    }

    fn description(&self) -> &'static str {
        "Fetch content from a URL (HTTP/HTTPS). \
         Use for GitHub raw content, API docs, etc."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to fetch."
                }
            },
            "required": WebFetchParams::REQUIRED
        })
    }

    async fn execute(&self, params: WebFetchParams) -> Result<ToolOutput, ToolError> {
        let text = self.fetch(&params.url).await?;
        Ok(ToolOutput::text(text))
    }
}
