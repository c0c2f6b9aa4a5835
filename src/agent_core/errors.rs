//! Agent Core error types.

use thiserror::Error;

use crate::inference::errors::InferenceError;
use crate::provider::errors::InvocationError;

/// Errors that abort a whole `process_query` call.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The completion service call itself failed.
    #[error("completion service failed: {0}")]
    CompletionService(#[from] InferenceError),
}

/// A single tool call could not be completed.
///
/// Never aborts the query: the message is appended to history as a tool
/// result so the model can recover.
#[derive(Debug, Error)]
pub enum ToolCallError {
    /// The name does not map to any connected provider's tool.
    #[error("unknown tool '{name}'")]
    Unresolved { name: String },

    /// The owning provider is no longer connected.
    #[error("provider '{provider}' is not connected")]
    ProviderUnavailable { provider: String },

    /// The provider could not execute the call.
    #[error(transparent)]
    Invocation(#[from] InvocationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_call_error_messages() {
        let err = ToolCallError::Unresolved {
            name: "flaky.fetch".into(),
        };
        assert_eq!(err.to_string(), "unknown tool 'flaky.fetch'");

        let err: ToolCallError = InvocationError::Timeout {
            tool: "add".into(),
            timeout_ms: 500,
        }
        .into();
        assert_eq!(err.to_string(), "tool call 'add' timed out after 500ms");
    }

    #[test]
    fn test_completion_error_wraps_inference_error() {
        let err: AgentError = InferenceError::HttpError {
            status: 503,
            body: "overloaded".into(),
        }
        .into();
        assert_eq!(err.to_string(), "completion service failed: HTTP 503: overloaded");
    }
}
