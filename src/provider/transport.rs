//! Line-delimited JSON-RPC transport.
//!
//! Handles low-level communication with one provider:
//! - Writing JSON-RPC requests and notifications, one JSON object per line
//! - Reading lines until the response with the matching id arrives
//! - Serializing requests so only one is in flight per channel

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use super::errors::InvocationError;
use super::types::{error_codes, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

// ─── Request ID Generator ────────────────────────────────────────────────────

/// Global monotonic request ID counter.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique request ID.
pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Transport ───────────────────────────────────────────────────────────────

/// Write half of a provider channel (the child's stdin).
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Read half of a provider channel (the child's stdout).
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

struct Channel {
    writer: BoxedWriter,
    reader: BufReader<BoxedReader>,
}

/// Bi-directional JSON-RPC transport over a byte stream pair.
///
/// The whole write-then-read exchange holds one lock, so concurrent callers
/// on the same transport are served strictly one after another.
pub struct StdioTransport {
    provider: String,
    channel: Mutex<Option<Channel>>,
}

impl StdioTransport {
    /// Create a new transport from a writer (peer stdin) and reader (peer stdout).
    pub fn new(provider: &str, writer: BoxedWriter, reader: BoxedReader) -> Self {
        Self {
            provider: provider.to_string(),
            channel: Mutex::new(Some(Channel {
                writer,
                reader: BufReader::new(reader),
            })),
        }
    }

    fn transport_error(&self, reason: String) -> InvocationError {
        InvocationError::Transport {
            provider: self.provider.clone(),
            reason,
        }
    }

    /// Send a JSON-RPC request and wait for the matching response.
    ///
    /// Lines that are not a response carrying our id are skipped; providers
    /// are allowed to print log output or send their own notifications. An
    /// error with a null id is taken as the answer: only one request is in
    /// flight, and that is how peers reject a request they could not parse.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, InvocationError> {
        let id = next_request_id();
        let req = JsonRpcRequest::new(id, method, params);

        let mut json = serde_json::to_string(&req)
            .map_err(|e| self.transport_error(format!("failed to serialize request: {e}")))?;
        json.push('\n');

        let mut guard = self.channel.lock().await;
        let channel = guard
            .as_mut()
            .ok_or_else(|| self.transport_error("channel closed".into()))?;

        write_line(&mut channel.writer, &json)
            .await
            .map_err(|e| self.transport_error(format!("failed to write request: {e}")))?;

        let mut line_buf = String::new();
        loop {
            line_buf.clear();
            let bytes_read = channel
                .reader
                .read_line(&mut line_buf)
                .await
                .map_err(|e| self.transport_error(format!("failed to read response: {e}")))?;

            if bytes_read == 0 {
                return Err(self.transport_error(
                    "provider stdout closed (process may have exited)".into(),
                ));
            }

            let trimmed = line_buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(resp) if answers(&resp, id) => return Ok(resp),
                Ok(_) => continue,
                Err(_) => {
                    tracing::debug!(
                        provider = %self.provider,
                        line = %trimmed,
                        "skipping non-response line"
                    );
                    continue;
                }
            }
        }
    }

    /// Send a JSON-RPC notification (no response expected).
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), InvocationError> {
        let notification = JsonRpcNotification::new(method, params);
        let mut json = serde_json::to_string(&notification).map_err(|e| {
            self.transport_error(format!("failed to serialize notification: {e}"))
        })?;
        json.push('\n');

        let mut guard = self.channel.lock().await;
        let channel = guard
            .as_mut()
            .ok_or_else(|| self.transport_error("channel closed".into()))?;

        write_line(&mut channel.writer, &json)
            .await
            .map_err(|e| self.transport_error(format!("failed to write notification: {e}")))
    }

    /// Drop both halves of the channel. The peer sees EOF on its stdin.
    ///
    /// Waits for any in-flight request to release the channel first.
    pub async fn shutdown(&self) {
        let mut guard = self.channel.lock().await;
        if let Some(mut channel) = guard.take() {
            let _ = channel.writer.shutdown().await;
        }
    }
}

fn answers(resp: &JsonRpcResponse, id: u64) -> bool {
    if resp.method.is_some() {
        return false;
    }
    resp.id.as_u64() == Some(id) || (resp.id.is_null() && resp.error.is_some())
}

async fn write_line(writer: &mut BoxedWriter, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting errors to `InvocationError`.
pub fn extract_result(response: JsonRpcResponse) -> Result<serde_json::Value, InvocationError> {
    if let Some(err) = response.error {
        return Err(InvocationError::Server {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    response.result.ok_or(InvocationError::Server {
        code: error_codes::INTERNAL_ERROR,
        message: "response missing both result and error".into(),
        data: None,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
