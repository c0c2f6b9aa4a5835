//! ToolRelay — multi-provider MCP tool orchestration for chat models.
//!
//! Modules:
//! - `provider`: MCP provider connections, the pool and the tool catalog
//! - `inference`: OpenAI-compatible completion client
//! - `agent_core`: Conversation history and the tool-calling engine
//! - `server`: HTTP presentation layer
//! - `settings`: YAML settings with env-var interpolation

pub mod agent_core;
pub mod inference;
pub mod provider;
pub mod server;
pub mod settings;

#[cfg(test)]
pub(crate) mod testing;

use std::path::{Path, PathBuf};

/// Return the platform-standard data directory for ToolRelay.
///
/// Falls back to `~/.toolrelay/` when the platform has no data directory.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("toolrelay");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".toolrelay")
}

/// Initialize the tracing subscriber.
///
/// Logs go to stderr (JSON lines when `json` is set) and to
/// `<data_dir>/logs/toolrelay.log`. On each startup existing logs are
/// rotated (toolrelay.log → .1 → .2 → .3, keeps last 3). Returns the log
/// file path when the file could be opened.
pub fn init_tracing(json: bool) -> Option<PathBuf> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, Layer, Registry};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("toolrelay=info,warn"));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    layers.push(if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).boxed()
    });

    let log_path = data_dir().join("logs").join("toolrelay.log");
    let log_file = open_log_file(&log_path);
    if let Some(file) = log_file.as_ref().ok().cloned() {
        layers.push(
            fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(true)
                .boxed(),
        );
    }

    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init();

    match log_file {
        Ok(_) => {
            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                log_file = %log_path.display(),
                pid = std::process::id(),
                "=== ToolRelay starting ==="
            );
            Some(log_path)
        }
        Err(e) => {
            tracing::warn!(
                log_file = %log_path.display(),
                error = %e,
                "file logging disabled"
            );
            None
        }
    }
}

fn open_log_file(path: &Path) -> std::io::Result<FlushingWriter> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    rotate_log_file(path, 3);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    Ok(FlushingWriter::new(file))
}

/// Rotate log files: `toolrelay.log` → `toolrelay.log.1` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    // Shift: .{n-1} → .{n}
    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A writer over `std::fs::File` that flushes after every write, so log
/// lines survive a crash.
#[derive(Clone)]
struct FlushingWriter {
    file: std::sync::Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: std::sync::Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_rotate_keeps_last_three() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("toolrelay.log");

        for generation in 0..5 {
            rotate_log_file(&base, 3);
            std::fs::write(&base, format!("gen {generation}")).unwrap();
        }

        assert_eq!(std::fs::read_to_string(&base).unwrap(), "gen 4");
        let read = |suffix: u32| {
            std::fs::read_to_string(format!("{}.{suffix}", base.display())).unwrap()
        };
        assert_eq!(read(1), "gen 3");
        assert_eq!(read(2), "gen 2");
        assert_eq!(read(3), "gen 1");
        assert!(!Path::new(&format!("{}.4", base.display())).exists());
    }

    #[test]
    fn test_flushing_writer_writes_through() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("logs").join("toolrelay.log");
        let mut writer = open_log_file(&path).unwrap();
        writer.write_all(b"line one\n").unwrap();

        // No explicit flush: the content must already be on disk.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "line one\n");
    }
}
