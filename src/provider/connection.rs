//! A live session with one provider process.
//!
//! State machine: `Disconnected → Connecting → Ready → Closed`. A connection
//! that reaches `Closed` (explicit close, failed start, transport failure or
//! call timeout) stays closed for the rest of the session.

use std::sync::Mutex;
use std::time::Duration;

use tokio::process::Child;

use super::errors::{InvocationError, LaunchError};
use super::launcher::{Launcher, StderrTail};
use super::transport::{extract_result, StdioTransport};
use super::types::{
    CallToolResult, InitializeResult, InvocationResult, ProviderConfig, RawTool, ToolsListResult,
    PROTOCOL_VERSION,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default timeout for the initialize + tools/list handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for a single tool call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// How long `close()` waits for the process to exit before killing it.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on `tools/list` pages, in case a provider keeps returning cursors.
const MAX_LIST_PAGES: usize = 100;

// ─── Types ───────────────────────────────────────────────────────────────────

/// Lifecycle state of a provider connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    Closed,
}

/// Timeouts applied by a connection.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub handshake: Duration,
    pub call: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            handshake: DEFAULT_HANDSHAKE_TIMEOUT,
            call: DEFAULT_CALL_TIMEOUT,
        }
    }
}

// ─── ProviderConnection ──────────────────────────────────────────────────────

/// One session with one provider.
pub struct ProviderConnection {
    config: ProviderConfig,
    timeouts: Timeouts,
    state: Mutex<ConnectionState>,
    transport: Option<StdioTransport>,
    process: tokio::sync::Mutex<Option<Child>>,
    capabilities: Vec<RawTool>,
    stderr: StderrTail,
}

impl ProviderConnection {
    /// A connection in `Disconnected` state.
    pub fn new(config: ProviderConfig, timeouts: Timeouts) -> Self {
        Self {
            config,
            timeouts,
            state: Mutex::new(ConnectionState::Disconnected),
            transport: None,
            process: tokio::sync::Mutex::new(None),
            capabilities: Vec::new(),
            stderr: StderrTail::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: ConnectionState) -> ConnectionState {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *state, next)
    }

    // ─── Start ───────────────────────────────────────────────────────────

    /// Launch the provider and perform the capability-listing handshake.
    ///
    /// Any failure leaves the connection `Closed` with its process killed.
    /// There is no internal retry.
    pub async fn start(&mut self, launcher: &dyn Launcher) -> Result<(), LaunchError> {
        let name = self.config.name.clone();
        let previous = self.set_state(ConnectionState::Connecting);
        if previous != ConnectionState::Disconnected {
            self.set_state(previous);
            return Err(LaunchError::HandshakeFailed {
                provider: name,
                reason: format!("connection is {previous:?}, expected Disconnected"),
            });
        }

        let launched = match launcher.launch(&self.config).await {
            Ok(launched) => launched,
            Err(e) => {
                self.set_state(ConnectionState::Closed);
                return Err(e);
            }
        };

        *self.process.get_mut() = launched.process;
        self.stderr = launched.stderr;
        let transport = self.transport.insert(launched.transport);

        let pending = tokio::time::timeout(self.timeouts.handshake, handshake(transport, &name));
        let outcome = match pending.await {
            Ok(Ok(tools)) => Ok(tools),
            Ok(Err(e)) => Err(LaunchError::HandshakeFailed {
                provider: name.clone(),
                reason: format!("{e}{}", self.stderr.error_suffix()),
            }),
            Err(_) => Err(LaunchError::HandshakeTimeout {
                provider: name.clone(),
                timeout_ms: self.timeouts.handshake.as_millis() as u64,
            }),
        };

        match outcome {
            Ok(tools) => {
                tracing::info!(
                    provider = %name,
                    tool_count = tools.len(),
                    tools = ?tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
                    "provider ready"
                );
                self.capabilities = tools;
                self.set_state(ConnectionState::Ready);
                Ok(())
            }
            Err(e) => {
                let stderr = self.stderr.snapshot();
                if !stderr.is_empty() {
                    tracing::warn!(provider = %name, stderr = %stderr, "provider stderr captured on failure");
                }
                self.force_close().await;
                Err(e)
            }
        }
    }

    // ─── Capabilities ────────────────────────────────────────────────────

    /// Tools listed during the handshake. Never re-queries the provider.
    pub fn list_capabilities(&self) -> Result<&[RawTool], InvocationError> {
        self.ensure_ready()?;
        Ok(&self.capabilities)
    }

    fn ensure_ready(&self) -> Result<&StdioTransport, InvocationError> {
        match (&self.transport, self.state()) {
            (Some(transport), ConnectionState::Ready) => Ok(transport),
            _ => Err(InvocationError::NotReady {
                provider: self.config.name.clone(),
            }),
        }
    }

    // ─── Invocation ──────────────────────────────────────────────────────

    /// Call `raw_name` on this provider and wait for its result.
    ///
    /// Calls on one connection are serialized by the transport. A timeout or
    /// transport failure closes the connection.
    pub async fn invoke(
        &self,
        raw_name: &str,
        arguments: serde_json::Value,
        request_id: &str,
    ) -> Result<InvocationResult, InvocationError> {
        let transport = self.ensure_ready()?;

        let params = serde_json::json!({
            "name": raw_name,
            "arguments": arguments,
        });

        let response = match tokio::time::timeout(
            self.timeouts.call,
            transport.request("tools/call", Some(params)),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                if matches!(e, InvocationError::Transport { .. }) {
                    tracing::warn!(provider = %self.config.name, error = %e, "transport failed, closing connection");
                    self.force_close().await;
                }
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(
                    provider = %self.config.name,
                    tool = %raw_name,
                    timeout_ms = self.timeouts.call.as_millis() as u64,
                    "tool call timed out, closing connection"
                );
                self.force_close().await;
                return Err(InvocationError::Timeout {
                    tool: raw_name.to_string(),
                    timeout_ms: self.timeouts.call.as_millis() as u64,
                });
            }
        };

        let raw = extract_result(response)?;
        let parsed: CallToolResult =
            serde_json::from_value(raw.clone()).map_err(|e| InvocationError::MalformedResult {
                tool: raw_name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(InvocationResult {
            request_id: request_id.to_string(),
            content: parsed.content.unwrap_or(raw),
            is_error: parsed.is_error,
        })
    }

    // ─── Shutdown ────────────────────────────────────────────────────────

    /// Close the channel and terminate the process. Idempotent, never fails.
    pub async fn close(&self) {
        if self.set_state(ConnectionState::Closed) == ConnectionState::Closed {
            return;
        }

        if let Some(transport) = &self.transport {
            transport.shutdown().await;
        }

        let Some(mut child) = self.process.lock().await.take() else {
            return;
        };
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(provider = %self.config.name, %status, "provider exited");
            }
            _ => {
                tracing::warn!(provider = %self.config.name, "provider did not exit, killing");
                let _ = child.kill().await;
            }
        }
    }

    /// Kill the process first, then release the channel.
    ///
    /// Used for hard aborts: a half-read response must never be reused, and
    /// killing the peer unblocks any caller still waiting on the channel.
    async fn force_close(&self) {
        self.set_state(ConnectionState::Closed);
        if let Some(mut child) = self.process.lock().await.take() {
            let _ = child.kill().await;
        }
        if let Some(transport) = &self.transport {
            transport.shutdown().await;
        }
    }
}

// ─── Handshake ───────────────────────────────────────────────────────────────

/// `initialize`, `notifications/initialized`, then paginated `tools/list`.
async fn handshake(
    transport: &StdioTransport,
    provider: &str,
) -> Result<Vec<RawTool>, InvocationError> {
    let params = serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": "toolrelay",
            "version": env!("CARGO_PKG_VERSION"),
        },
    });
    let init = extract_result(transport.request("initialize", Some(params)).await?)?;
    let init: InitializeResult =
        serde_json::from_value(init).map_err(|e| InvocationError::MalformedResult {
            tool: "initialize".into(),
            reason: e.to_string(),
        })?;

    if let Some(info) = &init.server_info {
        tracing::debug!(
            provider,
            server_name = info.name.as_deref().unwrap_or("?"),
            server_version = info.version.as_deref().unwrap_or("?"),
            protocol = init.protocol_version.as_deref().unwrap_or("?"),
            "provider initialized"
        );
    }

    transport.notify("notifications/initialized", None).await?;

    let mut tools = Vec::new();
    let mut cursor: Option<String> = None;
    for _ in 0..MAX_LIST_PAGES {
        let params = cursor.take().map(|c| serde_json::json!({ "cursor": c }));
        let page = extract_result(transport.request("tools/list", params).await?)?;
        let page: ToolsListResult =
            serde_json::from_value(page).map_err(|e| InvocationError::MalformedResult {
                tool: "tools/list".into(),
                reason: e.to_string(),
            })?;
        tools.extend(page.tools);

        match page.next_cursor {
            Some(next) if !next.is_empty() => cursor = Some(next),
            _ => return Ok(tools),
        }
    }

    tracing::warn!(provider, pages = MAX_LIST_PAGES, "tools/list pagination did not terminate");
    Ok(tools)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
