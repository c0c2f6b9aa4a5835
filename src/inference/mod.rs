//! Inference Client — OpenAI-compatible chat completions.
//!
//! This module is the production `CompletionService`:
//! - Mapping conversation history to chat messages
//! - Non-streaming chat completions with function calling
//! - Parsing text and tool calls into response segments
//!
//! Any endpoint that speaks the OpenAI Chat Completions API works, making
//! the model interchangeable via config.

pub mod client;
pub mod config;
pub mod errors;
pub mod types;

// Re-exports for convenience
pub use client::InferenceClient;
pub use config::CompletionConfig;
pub use errors::InferenceError;
pub use types::{ChatMessage, Role, ToolDefinition};
