//! [`TextOracle`] over the chat-completions endpoint.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use timetable_core::{BoxFuture, OracleError, TextOracle};
use tracing::{debug, trace};

use crate::error::{ProviderError, ProviderResult};

use super::config::OpenAiConfig;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Structures multi-event cells with an OpenAI chat model.
pub struct OpenAiOracle {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiOracle {
    pub fn new(config: OpenAiConfig) -> ProviderResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(ProviderError::configuration("OpenAI API key is empty").with_provider("openai"));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                ProviderError::network(format!("Failed to create HTTP client: {}", e))
                    .with_provider("openai")
            })?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    async fn complete(&self, instruction: &str, payload: &str) -> Result<String, OracleError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: [
                Message {
                    role: "system",
                    content: instruction,
                },
                Message {
                    role: "user",
                    content: payload,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            top_p: self.config.top_p,
        };

        debug!(model = %self.config.model, chars = payload.len(), "requesting completion");
        let response = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| OracleError::transport(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| OracleError::transport(format!("failed to read response: {e}")))?;
        trace!(status = %status, body = %body, "completion response");

        if !status.is_success() {
            return Err(status_error(status, body));
        }

        parse_content(&body)
    }
}

/// Client errors other than 429 are rejections; everything else may pass.
fn status_error(status: StatusCode, body: String) -> OracleError {
    let detail = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|env| env.error.message)
        .unwrap_or(body);
    let message = format!("HTTP {status}: {detail}");
    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
        OracleError::rejected(message)
    } else {
        OracleError::transport(message)
    }
}

/// Pulls the first choice's content out of a completion body.
fn parse_content(body: &str) -> Result<String, OracleError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| OracleError::transport(format!("unexpected completion body: {e}")))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(OracleError::EmptyResponse)
}

impl TextOracle for OpenAiOracle {
    fn structure<'a>(
        &'a self,
        instruction: &'a str,
        payload: &'a str,
    ) -> BoxFuture<'a, Result<String, OracleError>> {
        Box::pin(self.complete(instruction, payload))
    }
}
