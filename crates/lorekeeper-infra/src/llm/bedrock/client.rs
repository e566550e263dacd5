//! BedrockProvider -- concrete [`LlmProvider`] implementation for AWS Bedrock.
//!
//! Sends requests to the AWS Bedrock Runtime API using Bearer token
//! authentication. Supports both non-streaming (`invoke`) and streaming
//! (`invoke-with-response-stream`) modes. The model id travels with each
//! request, so one provider serves both the planning and synthesis models.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is never logged
//! or included in `Debug` output.

use std::pin::Pin;
use std::time::Duration;

use futures_util::Stream;
use secrecy::{ExposeSecret, SecretString};

use lorekeeper_core::llm::provider::LlmProvider;
use lorekeeper_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, StopReason, StreamEvent,
    ToolCall, Usage,
};

use super::streaming::create_bedrock_stream;
use super::types::{BedrockMessage, BedrockRequest, BedrockResponse, BedrockTool, ContentBlock};

/// Shared HTTP client, bearer token and region for Bedrock Runtime calls.
#[derive(Clone)]
pub struct BedrockEndpoint {
    client: reqwest::Client,
    api_key: SecretString,
    region: String,
}

impl BedrockEndpoint {
    /// Prefix used to identify Bedrock API keys.
    const KEY_PREFIX: &'static str = "bedrock-api-key-";

    /// Build an endpoint from a Bedrock bearer token.
    ///
    /// If the key starts with `bedrock-api-key-`, the prefix is stripped and
    /// the remainder is used as the Bearer token. When the token embeds a
    /// credential scope with a region, that region wins over `region`.
    pub fn new(api_key: SecretString, region: String) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| LlmError::Provider {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        let raw_key = api_key.expose_secret().to_string();
        let token_part = raw_key.strip_prefix(Self::KEY_PREFIX).unwrap_or(&raw_key);
        let region = Self::detect_region_from_token(token_part).unwrap_or(region);

        Ok(Self {
            client,
            api_key: SecretString::from(token_part.to_string()),
            region,
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Try to extract the AWS region from a base64-encoded presigned URL token.
    ///
    /// The token decodes to a URL containing
    /// `X-Amz-Credential=<access-key>/<date>/<region>/bedrock/aws4_request`.
    fn detect_region_from_token(token: &str) -> Option<String> {
        use base64::Engine;
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(token)
            .ok()?;
        let text = String::from_utf8(decoded).ok()?;

        let cred_start = text.find("X-Amz-Credential=")?;
        let cred_value = &text[cred_start + "X-Amz-Credential=".len()..];
        let parts: Vec<&str> = cred_value.split('/').collect();
        if parts.len() >= 3 {
            let region = parts[2].split('&').next().unwrap_or(parts[2]);
            tracing::info!(region = %region, "Detected region from Bedrock bearer token");
            Some(region.to_string())
        } else {
            None
        }
    }

    /// Full Bedrock Runtime URL for `model_id` and `action`.
    pub fn url(&self, model_id: &str, action: &str) -> String {
        format!(
            "https://bedrock-runtime.{}.amazonaws.com/model/{}/{}",
            self.region,
            to_bedrock_model_id(model_id, &self.region),
            action
        )
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    /// POST a JSON body and return the successful response.
    pub async fn post_json<B: serde::Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key.expose_secret()))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::Provider {
                message: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %error_body, url = %url, "Bedrock API error response");
            return Err(error_for_status(status, error_body));
        }
        Ok(response)
    }
}

/// Map a non-success Bedrock HTTP status to an [`LlmError`].
pub(crate) fn error_for_status(status: reqwest::StatusCode, error_body: String) -> LlmError {
    match status.as_u16() {
        401 | 403 => LlmError::Provider {
            message: format!("Bedrock authentication failed (HTTP {status}): {error_body}"),
        },
        429 => LlmError::RateLimited {
            retry_after_ms: None,
        },
        529 => LlmError::Overloaded(error_body),
        s if s >= 500 => LlmError::Provider {
            message: format!("Bedrock server error HTTP {status}: {error_body}"),
        },
        _ => LlmError::Provider {
            message: format!("HTTP {status}: {error_body}"),
        },
    }
}

/// Convert a bare Claude model name to a Bedrock inference profile ID.
///
/// Ids that already contain a `.` (`us.anthropic.claude-...`,
/// `cohere.embed-english-v3`) are returned as-is.
///
/// ```text
/// ("claude-sonnet-4-5-20250929", "eu-west-1") → "eu.anthropic.claude-sonnet-4-5-20250929-v1:0"
/// ("us.anthropic.claude-3-5-haiku-20241022-v1:0", _) → unchanged
/// ```
pub fn to_bedrock_model_id(model: &str, region: &str) -> String {
    if model.contains('.') {
        model.to_string()
    } else {
        let region_prefix = region.split('-').next().unwrap_or("us");
        format!("{region_prefix}.anthropic.{model}-v1:0")
    }
}

fn parse_stop_reason(raw: Option<&str>) -> StopReason {
    raw.and_then(|s| s.parse().ok()).unwrap_or(StopReason::EndTurn)
}

/// AWS Bedrock Claude LLM provider.
pub struct BedrockProvider {
    endpoint: BedrockEndpoint,
}

impl BedrockProvider {
    /// The Anthropic API version for Bedrock.
    const API_VERSION: &'static str = "bedrock-2023-05-31";

    pub fn new(endpoint: BedrockEndpoint) -> Self {
        Self { endpoint }
    }

    /// Convert a generic [`CompletionRequest`] into a [`BedrockRequest`].
    fn to_bedrock_request(request: &CompletionRequest) -> BedrockRequest {
        let messages = request
            .messages
            .iter()
            .map(|m| BedrockMessage {
                role: m.role.to_string(),
                content: m.content.clone(),
            })
            .collect();

        let tools = request
            .tools
            .iter()
            .map(|t| BedrockTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.input_schema.clone(),
            })
            .collect();

        BedrockRequest {
            anthropic_version: Self::API_VERSION.to_string(),
            max_tokens: request.max_tokens,
            messages,
            system: request.system.clone(),
            temperature: request.temperature,
            top_p: request.top_p,
            top_k: request.top_k,
            tools,
            stop_sequences: request.stop_sequences.clone(),
        }
    }

    fn into_completion(resp: BedrockResponse) -> CompletionResponse {
        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in resp.content {
            match block {
                ContentBlock::Text { text } => content.push_str(&text),
                ContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall { id, name, input })
                }
            }
        }

        CompletionResponse {
            id: resp.id,
            content,
            tool_calls,
            model: resp.model,
            stop_reason: parse_stop_reason(resp.stop_reason.as_deref()),
            usage: Usage {
                input_tokens: resp.usage.input_tokens,
                output_tokens: resp.usage.output_tokens,
            },
        }
    }
}

// BedrockProvider intentionally does NOT derive Debug to prevent
// accidental exposure of the bearer token.

impl LlmProvider for BedrockProvider {
    fn name(&self) -> &str {
        "bedrock"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = Self::to_bedrock_request(request);
        let url = self.endpoint.url(&request.model, "invoke");

        tracing::debug!(url = %url, region = %self.endpoint.region, "Bedrock invoke request");

        let response = self.endpoint.post_json(&url, &body).await?;
        let bedrock_resp: BedrockResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Deserialization(format!("failed to parse response: {e}")))?;

        Ok(Self::into_completion(bedrock_resp))
    }

    fn stream(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>> {
        let body = Self::to_bedrock_request(&request);
        let url = self.endpoint.url(&request.model, "invoke-with-response-stream");

        create_bedrock_stream(self.endpoint.clone(), url, body)
    }
}
