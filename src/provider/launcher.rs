//! Provider process launching.
//!
//! A `Launcher` turns a `ProviderConfig` into a live byte channel. The
//! production launcher spawns the configured command with piped stdio; tests
//! substitute in-process providers.

use std::process::Stdio;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};

use super::errors::LaunchError;
use super::transport::StdioTransport;
use super::types::ProviderConfig;

/// Maximum characters of provider stderr kept for error messages.
const STDERR_TAIL_CHARS: usize = 2000;

/// A freshly launched provider, before the handshake.
pub struct LaunchedProvider {
    pub transport: StdioTransport,
    /// The child process, when the provider runs out of process.
    pub process: Option<Child>,
    pub stderr: StderrTail,
}

/// Starts provider channels.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, config: &ProviderConfig) -> Result<LaunchedProvider, LaunchError>;
}

// ─── Process Launcher ────────────────────────────────────────────────────────

/// Spawns each provider as a child process speaking JSON-RPC on stdio.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self, config: &ProviderConfig) -> Result<LaunchedProvider, LaunchError> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args);
        cmd.envs(&config.env);

        if let Some(dir) = &config.cwd {
            cmd.current_dir(dir);
        }

        // Windows: prevent console window from appearing for child processes
        #[cfg(target_os = "windows")]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| LaunchError::SpawnFailed {
            provider: config.name.clone(),
            reason: format!("{}: {e}", config.command),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| LaunchError::SpawnFailed {
            provider: config.name.clone(),
            reason: "failed to capture stdin".into(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| LaunchError::SpawnFailed {
            provider: config.name.clone(),
            reason: "failed to capture stdout".into(),
        })?;

        let stderr = StderrTail::default();
        if let Some(handle) = child.stderr.take() {
            stderr.drain(&config.name, handle);
        }

        tracing::debug!(
            provider = %config.name,
            command = %config.command,
            pid = child.id(),
            "spawned provider process"
        );

        Ok(LaunchedProvider {
            transport: StdioTransport::new(&config.name, Box::new(stdin), Box::new(stdout)),
            process: Some(child),
            stderr,
        })
    }
}

// ─── Stderr Capture ──────────────────────────────────────────────────────────

/// The most recent stderr output of a provider, for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct StderrTail {
    buf: Arc<Mutex<String>>,
}

impl StderrTail {
    /// Forward every stderr line to the log and keep a bounded tail.
    fn drain(&self, provider: &str, stderr: ChildStderr) {
        let buf = Arc::clone(&self.buf);
        let provider = provider.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(provider = %provider, "stderr: {line}");
                if let Ok(mut tail) = buf.lock() {
                    tail.push_str(&line);
                    tail.push('\n');
                    if tail.len() > STDERR_TAIL_CHARS {
                        let mut cut = tail.len() - STDERR_TAIL_CHARS;
                        while !tail.is_char_boundary(cut) {
                            cut += 1;
                        }
                        tail.drain(..cut);
                    }
                }
            }
        });
    }

    /// Current captured tail (may be empty).
    pub fn snapshot(&self) -> String {
        self.buf.lock().map(|s| s.trim().to_string()).unwrap_or_default()
    }

    /// `" | stderr: ..."` suffix for error messages, or an empty string.
    pub fn error_suffix(&self) -> String {
        let tail = self.snapshot();
        if tail.is_empty() {
            String::new()
        } else {
            format!(" | stderr: {tail}")
        }
    }
}
