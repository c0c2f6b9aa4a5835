//! Agent Core — the conversation side of the relay.
//!
//! Submodules:
//! - `completion`: The completion service seam and its response segments
//! - `conversation`: Append-only conversation history
//! - `engine`: The tool-calling loop behind each query
//! - `context`: Owns pool, catalog and engine for the process lifetime
//! - `errors`: Agent-level error types

pub mod completion;
pub mod context;
pub mod conversation;
pub mod engine;
pub mod errors;

// Re-exports for convenience
pub use completion::{
    CompletionResponse, CompletionService, Invocation, ResponseSegment, ToolArguments,
};
pub use context::OrchestrationContext;
pub use conversation::{Conversation, ConversationMessage};
pub use engine::{ConversationEngine, EngineConfig, QueryTranscript};
pub use errors::{AgentError, ToolCallError};
