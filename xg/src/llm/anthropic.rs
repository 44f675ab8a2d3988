//! Anthropic Claude API client implementation
//!
//! Implements the LlmClient trait for Anthropic's Messages API. Structured
//! output is obtained by declaring a single tool whose input schema is the
//! requested output schema and forcing the model to call it; the tool_use
//! input block is then the structured result.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{LlmClient, LlmError, StructuredRequest, StructuredResponse, TokenUsage};
use crate::config::LlmConfig;

/// Maximum number of retries for transient errors
const MAX_RETRIES: u32 = 3;

/// Initial backoff delay for retries
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504 | 529)
}

/// Anthropic Claude API client
pub struct AnthropicClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
}

impl AnthropicClient {
    /// Create a new client from configuration
    ///
    /// Reads the API key from the environment variable named in config.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(?config, "from_config: called");
        let api_key = config
            .get_api_key()
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let timeout = Duration::from_millis(config.timeout_ms);

        let http = Client::builder().timeout(timeout).build().map_err(LlmError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.clone(),
            http,
            max_tokens: config.max_tokens,
        })
    }

    /// Build the request body for the Anthropic API
    ///
    /// The output schema becomes the single declared tool and tool_choice
    /// forces the model to call it, so the response always carries one
    /// tool_use block with the structured object.
    fn build_request_body(&self, request: &StructuredRequest) -> serde_json::Value {
        debug!(model = %self.model, schema = %request.schema_name, "build_request_body: called");
        let model = if request.model.is_empty() {
            &self.model
        } else {
            &request.model
        };

        serde_json::json!({
            "model": model,
            "max_tokens": request.max_tokens.min(self.max_tokens),
            "system": request.system_prompt,
            "messages": [{
                "role": "user",
                "content": request.user_prompt,
            }],
            "tools": [{
                "name": request.schema_name,
                "description": format!("Record the {} result", request.schema_name),
                "input_schema": request.schema,
            }],
            "tool_choice": {
                "type": "tool",
                "name": request.schema_name,
            },
        })
    }

    /// Extract the structured value from the API response
    ///
    /// With forced tool_choice the response should contain exactly one
    /// tool_use block whose name matches the requested schema.
    fn parse_response(&self, schema_name: &str, api_response: AnthropicResponse) -> Result<StructuredResponse, LlmError> {
        debug!(?api_response.stop_reason, "parse_response: called");
        let usage = TokenUsage {
            input_tokens: api_response.usage.input_tokens,
            output_tokens: api_response.usage.output_tokens,
        };

        for block in api_response.content {
            if let AnthropicContentBlock::ToolUse { name, input, .. } = block {
                if name != schema_name {
                    debug!(%name, %schema_name, "parse_response: unexpected tool name");
                    return Err(LlmError::SchemaMismatch {
                        schema: schema_name.to_string(),
                        message: format!("Model called unexpected tool '{}'", name),
                    });
                }
                debug!(%name, "parse_response: tool_use block found");
                return Ok(StructuredResponse { value: input, usage });
            }
        }

        Err(LlmError::InvalidResponse(
            "Response contained no tool_use block".to_string(),
        ))
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn generate_structured(&self, request: StructuredRequest) -> Result<StructuredResponse, LlmError> {
        debug!(model = %self.model, schema = %request.schema_name, "generate_structured: called");
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_request_body(&request);

        let mut last_error = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let backoff = INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1);
                warn!(
                    attempt,
                    backoff_ms = backoff,
                    "generate_structured: retrying after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            let response = match self
                .http
                .post(url.clone())
                .header("x-api-key", self.api_key.clone())
                .header("anthropic-version", "2023-06-01")
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    debug!(attempt, error = %e, "generate_structured: network error");
                    last_error = Some(LlmError::Network(e));
                    continue;
                }
            };

            let status = response.status().as_u16();

            if status == 429 {
                debug!("generate_structured: rate limited (429)");
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(60);

                return Err(LlmError::RateLimited {
                    retry_after: Duration::from_secs(retry_after),
                });
            }

            if is_retryable_status(status) && attempt < MAX_RETRIES {
                let text = response.text().await.unwrap_or_default();
                debug!(attempt, status, "generate_structured: retryable error");
                last_error = Some(LlmError::ApiError { status, message: text });
                continue;
            }

            if !response.status().is_success() {
                debug!(%status, "generate_structured: API error");
                let text = response.text().await.unwrap_or_default();
                return Err(LlmError::ApiError { status, message: text });
            }

            debug!("generate_structured: success");
            let api_response: AnthropicResponse = response.json().await?;
            return self.parse_response(&request.schema_name, api_response);
        }

        Err(last_error.unwrap_or_else(|| LlmError::InvalidResponse("Max retries exceeded".to_string())))
    }
}

// Anthropic API response types

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    stop_reason: String,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text {
        #[allow(dead_code)]
        text: String,
    },
    #[serde(rename = "tool_use")]
    ToolUse {
        #[allow(dead_code)]
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}
