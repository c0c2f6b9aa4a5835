//! Provider error types.
//!
//! Launch failures are scoped to one provider and never abort the pool.
//! Invocation failures are scoped to one tool call and are fed back to the
//! model as conversational content.

use thiserror::Error;

/// A provider process failed to start or to complete its handshake.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The child process could not be spawned (missing binary, bad cwd).
    #[error("failed to spawn provider '{provider}': {reason}")]
    SpawnFailed { provider: String, reason: String },

    /// The process started but the capability-listing handshake failed.
    #[error("provider '{provider}' handshake failed: {reason}")]
    HandshakeFailed { provider: String, reason: String },

    /// The handshake did not complete in time.
    #[error("provider '{provider}' handshake timed out after {timeout_ms}ms")]
    HandshakeTimeout { provider: String, timeout_ms: u64 },

    /// The launch task itself panicked or was cancelled.
    #[error("provider '{provider}' launch task aborted: {reason}")]
    Aborted { provider: String, reason: String },
}

impl LaunchError {
    /// Name of the provider this error belongs to.
    pub fn provider(&self) -> &str {
        match self {
            Self::SpawnFailed { provider, .. }
            | Self::HandshakeFailed { provider, .. }
            | Self::HandshakeTimeout { provider, .. }
            | Self::Aborted { provider, .. } => provider,
        }
    }
}

/// A single tool call failed.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// The connection is not in `Ready` state (never started, or closed).
    #[error("provider '{provider}' is not ready")]
    NotReady { provider: String },

    /// JSON-RPC communication error (I/O failure, stream closed, bad JSON).
    #[error("transport error for provider '{provider}': {reason}")]
    Transport { provider: String, reason: String },

    /// The provider answered with a JSON-RPC error object.
    #[error("provider error [{code}]: {message}")]
    Server {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The call did not complete in time; the connection has been closed.
    #[error("tool call '{tool}' timed out after {timeout_ms}ms")]
    Timeout { tool: String, timeout_ms: u64 },

    /// Arguments do not satisfy the tool's declared input schema.
    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// The provider's result could not be interpreted.
    #[error("malformed result from '{tool}': {reason}")]
    MalformedResult { tool: String, reason: String },
}

/// Provider configuration could not be read or is invalid.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("invalid provider name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("unsupported provider script '{path}': expected a .py or .js file")]
    UnsupportedScript { path: String },
}
