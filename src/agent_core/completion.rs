//! Completion service boundary.
//!
//! The engine talks to the language model only through `CompletionService`.
//! A response is an ordered list of segments, each either text or a request
//! to invoke a tool.

use std::fmt;

use async_trait::async_trait;

use crate::inference::errors::InferenceError;
use crate::inference::types::ToolDefinition;

use super::conversation::ConversationMessage;

/// Tool-call arguments as the model produced them.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolArguments {
    /// Decoded JSON, of any shape.
    Parsed(serde_json::Value),
    /// Text that did not decode as JSON, kept verbatim.
    Unparsed(String),
}

impl ToolArguments {
    /// The encoded form, as sent back to the completion service.
    pub fn to_wire(&self) -> String {
        match self {
            Self::Parsed(value) => value.to_string(),
            Self::Unparsed(raw) => raw.clone(),
        }
    }
}

impl From<serde_json::Value> for ToolArguments {
    fn from(value: serde_json::Value) -> Self {
        Self::Parsed(value)
    }
}

impl fmt::Display for ToolArguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

/// A request from the model to invoke one tool.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// The name as exported by the tool catalog.
    pub qualified_name: String,
    pub arguments: ToolArguments,
    pub request_id: String,
}

/// One piece of a completion response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseSegment {
    Text(String),
    Invocation(Invocation),
}

/// Everything the model produced for one call, in emission order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionResponse {
    pub segments: Vec<ResponseSegment>,
}

impl CompletionResponse {
    /// A response with a single text segment.
    pub fn text(text: &str) -> Self {
        Self {
            segments: vec![ResponseSegment::Text(text.to_string())],
        }
    }

    /// Append a text segment.
    pub fn with_text(mut self, text: &str) -> Self {
        self.segments.push(ResponseSegment::Text(text.to_string()));
        self
    }

    /// Append an invocation segment.
    pub fn with_invocation(
        mut self,
        qualified_name: &str,
        arguments: impl Into<ToolArguments>,
        request_id: &str,
    ) -> Self {
        self.segments.push(ResponseSegment::Invocation(Invocation {
            qualified_name: qualified_name.to_string(),
            arguments: arguments.into(),
            request_id: request_id.to_string(),
        }));
        self
    }

    /// Whether the model asked for at least one tool.
    pub fn has_invocations(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, ResponseSegment::Invocation(_)))
    }
}

/// The language-model backend.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Produce the next response for `history`, offering `tools`.
    async fn complete(
        &self,
        history: &[ConversationMessage],
        tools: &[ToolDefinition],
    ) -> Result<CompletionResponse, InferenceError>;
}
