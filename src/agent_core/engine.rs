//! ConversationEngine — the tool-calling loop for one query.
//!
//! ```text
//! AwaitingCompletion ──(no invocations)──────────────▶ Done
//!        ▲    │
//!        │    └──(invocations)──▶ HasToolCalls ──(round limit hit)──▶ Done
//!        └──────────(results appended)──────┘
//! ```
//!
//! Tool-scoped failures (unknown tool, bad arguments, provider errors) are
//! appended to history as tool results and the loop continues. Only a
//! completion service failure aborts the query.

use std::sync::Arc;

use crate::provider::catalog::ToolCatalog;
use crate::provider::errors::InvocationError;
use crate::provider::pool::ConnectionPool;
use crate::provider::types::InvocationResult;

use super::completion::{CompletionService, Invocation, ResponseSegment, ToolArguments};
use super::conversation::Conversation;
use super::errors::{AgentError, ToolCallError};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Default maximum number of tool rounds per query.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 10;

/// Tool results longer than this are truncated before entering history.
pub const MAX_TOOL_RESULT_CHARS: usize = 32 * 1024;

// ─── Types ──────────────────────────────────────────────────────────────────

/// Engine limits.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Completion rounds that may request tools before the loop is stopped.
    pub max_tool_rounds: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

/// Everything a query produced.
#[derive(Debug, Clone)]
pub struct QueryTranscript {
    /// User-visible segments in emission order: model text, tool trace
    /// lines and error notices.
    pub segments: Vec<String>,
    /// The full history exchanged with the completion service.
    pub conversation: Conversation,
    /// Number of rounds that executed tools.
    pub tool_rounds: usize,
}

impl QueryTranscript {
    /// The segments joined one per line.
    pub fn final_text(&self) -> String {
        self.segments.join("\n")
    }
}

// ─── ConversationEngine ─────────────────────────────────────────────────────

/// Drives one query through the completion service and the providers.
#[derive(Clone)]
pub struct ConversationEngine {
    pool: Arc<ConnectionPool>,
    catalog: Arc<ToolCatalog>,
    completion: Arc<dyn CompletionService>,
    config: EngineConfig,
}

impl ConversationEngine {
    pub fn new(
        pool: Arc<ConnectionPool>,
        catalog: Arc<ToolCatalog>,
        completion: Arc<dyn CompletionService>,
        config: EngineConfig,
    ) -> Self {
        Self {
            pool,
            catalog,
            completion,
            config,
        }
    }

    /// Answer `user_text`, invoking tools as the model requests them.
    ///
    /// Returns every output segment joined one per line.
    pub async fn process_query(&self, user_text: &str) -> Result<String, AgentError> {
        self.run(user_text).await.map(|t| t.final_text())
    }

    /// Like `process_query`, but returns the full transcript.
    pub async fn run(&self, user_text: &str) -> Result<QueryTranscript, AgentError> {
        let mut conversation = Conversation::seeded(user_text);
        let mut segments = Vec::new();
        let mut tool_rounds = 0;
        let tools = self.catalog.export_for_completion_service();

        loop {
            let response = self
                .completion
                .complete(conversation.messages(), &tools)
                .await?;

            let wants_tools = response.has_invocations();
            let stop = wants_tools && tool_rounds >= self.config.max_tool_rounds;
            if wants_tools && !stop {
                tool_rounds += 1;
            }

            for segment in response.segments {
                match segment {
                    ResponseSegment::Text(text) => {
                        conversation.add_assistant_message(&text);
                        segments.push(text);
                    }
                    ResponseSegment::Invocation(_) if stop => {}
                    ResponseSegment::Invocation(invocation) => {
                        self.dispatch(&mut conversation, &mut segments, invocation)
                            .await;
                    }
                }
            }

            if stop {
                tracing::warn!(
                    rounds = tool_rounds,
                    "tool round limit reached, stopping"
                );
                segments.push(format!("[Stopped after {tool_rounds} tool rounds]"));
                break;
            }
            if !wants_tools {
                break;
            }
        }

        tracing::info!(
            rounds = tool_rounds,
            messages = conversation.len(),
            "query complete"
        );
        Ok(QueryTranscript {
            segments,
            conversation,
            tool_rounds,
        })
    }

    // ─── Dispatch ───────────────────────────────────────────────────────

    /// Execute one invocation and append the request/result pair to history.
    async fn dispatch(
        &self,
        conversation: &mut Conversation,
        segments: &mut Vec<String>,
        invocation: Invocation,
    ) {
        conversation.add_invocation_message(&invocation);

        let (content, is_error) = match self.execute(&invocation, segments).await {
            Ok(result) => (
                truncate_tool_result(&result.render_text(), &invocation.qualified_name),
                result.is_error,
            ),
            Err(e) => {
                tracing::warn!(
                    tool = %invocation.qualified_name,
                    request_id = %invocation.request_id,
                    error = %e,
                    "tool call failed"
                );
                segments.push(format!("[Error: {e}]"));
                (format!("Error: {e}"), true)
            }
        };

        conversation.add_tool_result_message(&invocation.request_id, content, is_error);
    }

    async fn execute(
        &self,
        invocation: &Invocation,
        segments: &mut Vec<String>,
    ) -> Result<InvocationResult, ToolCallError> {
        let tool = self
            .catalog
            .resolve(&invocation.qualified_name)
            .ok_or_else(|| ToolCallError::Unresolved {
                name: invocation.qualified_name.clone(),
            })?;

        let arguments = match &invocation.arguments {
            ToolArguments::Parsed(value) => value,
            ToolArguments::Unparsed(raw) => {
                return Err(InvocationError::InvalidArguments {
                    tool: invocation.qualified_name.clone(),
                    reason: format!("arguments are not valid JSON: {raw}"),
                }
                .into())
            }
        };
        ToolCatalog::validate_arguments(tool, arguments)?;

        let connection =
            self.pool
                .get(&tool.owner_provider)
                .ok_or_else(|| ToolCallError::ProviderUnavailable {
                    provider: tool.owner_provider.clone(),
                })?;

        segments.push(format!(
            "[Calling tool {} with args {}]",
            invocation.qualified_name, invocation.arguments
        ));
        tracing::info!(
            tool = %invocation.qualified_name,
            provider = %tool.owner_provider,
            request_id = %invocation.request_id,
            "dispatching tool call"
        );

        let result = connection
            .invoke(&tool.raw_name, arguments.clone(), &invocation.request_id)
            .await?;
        Ok(result)
    }
}

/// Truncate a tool result that would flood the model's context.
fn truncate_tool_result(result: &str, tool_name: &str) -> String {
    if result.len() <= MAX_TOOL_RESULT_CHARS {
        return result.to_string();
    }

    let mut cut = MAX_TOOL_RESULT_CHARS;
    while !result.is_char_boundary(cut) {
        cut -= 1;
    }
    tracing::warn!(
        tool = %tool_name,
        original_len = result.len(),
        truncated_to = cut,
        "tool result truncated"
    );
    format!(
        "{}\n\n[... truncated: showing first {cut} of {} chars]",
        &result[..cut],
        result.len()
    )
}

// ─── Tests ──────────────────────────────────────────────────────────────────
