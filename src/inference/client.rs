//! OpenAI-compatible inference client.
//!
//! Sends non-streaming chat completion requests and turns the reply into a
//! `CompletionResponse` of text and invocation segments.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use uuid::Uuid;

use crate::agent_core::completion::{CompletionResponse, CompletionService, ToolArguments};
use crate::agent_core::conversation::{build_chat_messages, ConversationMessage};

use super::config::CompletionConfig;
use super::errors::InferenceError;
use super::types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ToolDefinition};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// Client for the completion endpoint.
pub struct InferenceClient {
    http: HttpClient,
    config: CompletionConfig,
    api_key: Option<String>,
}

impl InferenceClient {
    /// Create a client from config. Does NOT check connectivity; that
    /// happens on the first request.
    pub fn from_config(config: CompletionConfig) -> Result<Self, InferenceError> {
        if config.base_url.trim().is_empty() {
            return Err(InferenceError::ConfigError {
                reason: "completion.base_url is empty".into(),
            });
        }
        if config.model.trim().is_empty() {
            return Err(InferenceError::ConfigError {
                reason: "completion.model is empty".into(),
            });
        }

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: config.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        let api_key = config.resolve_api_key();
        if api_key.is_none() {
            tracing::warn!(
                base_url = %config.base_url,
                "no API key configured, sending unauthenticated requests"
            );
        }

        Ok(Self {
            http,
            config,
            api_key,
        })
    }

    /// The model name sent with every request.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    // ─── Chat Completion (non-streaming) ─────────────────────────────────

    /// Send one chat completion request.
    pub async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<CompletionResponse, InferenceError> {
        let url = self.endpoint();
        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            tools,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        };

        // Log the request metadata (not the full body, it can be huge)
        tracing::info!(
            url = %url,
            model = %body.model,
            message_count = body.messages.len(),
            tool_count = body.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            max_tokens = body.max_tokens,
            "completion request"
        );

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    duration_secs: self.config.request_timeout_secs,
                }
            } else {
                InferenceError::ConnectionFailed {
                    endpoint: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let body_text = response
            .text()
            .await
            .map_err(|e| InferenceError::MalformedResponse {
                reason: format!("failed to read response body: {e}"),
            })?;

        parse_completion_response(&body_text)
    }
}

#[async_trait]
impl CompletionService for InferenceClient {
    async fn complete(
        &self,
        history: &[ConversationMessage],
        tools: &[ToolDefinition],
    ) -> Result<CompletionResponse, InferenceError> {
        let messages = build_chat_messages(history, self.config.system_prompt.as_deref());
        let tools = (!tools.is_empty()).then(|| tools.to_vec());
        self.chat_completion(messages, tools).await
    }
}

// ─── Response Parsing ────────────────────────────────────────────────────────

/// Parse a non-streaming chat completion body.
///
/// Text (if any) comes first, followed by tool calls in the order the model
/// listed them. Tool calls without an id get a synthetic `call_<uuid>`.
pub fn parse_completion_response(body: &str) -> Result<CompletionResponse, InferenceError> {
    let resp: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::MalformedResponse {
            reason: format!("failed to parse completion response: {e}"),
        })?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or(InferenceError::MalformedResponse {
            reason: "empty choices array".into(),
        })?;

    let mut response = CompletionResponse::default();
    if let Some(text) = choice.message.content.filter(|c| !c.trim().is_empty()) {
        response = response.with_text(&text);
    }

    for call in choice.message.tool_calls.unwrap_or_default() {
        let id = call
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("call_{}", Uuid::new_v4()));
        let arguments = parse_arguments(&call.function.arguments);
        response = response.with_invocation(&call.function.name, arguments, &id);
    }

    tracing::debug!(
        segments = response.segments.len(),
        finish_reason = choice.finish_reason.as_deref().unwrap_or("none"),
        "completion response parsed"
    );
    Ok(response)
}

/// Decode tool-call arguments. Unparsable input is kept verbatim so the
/// engine can report it against the tool.
fn parse_arguments(raw: &str) -> ToolArguments {
    if raw.trim().is_empty() {
        return ToolArguments::Parsed(serde_json::json!({}));
    }
    match serde_json::from_str(raw) {
        Ok(value) => ToolArguments::Parsed(value),
        Err(_) => ToolArguments::Unparsed(raw.to_string()),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
