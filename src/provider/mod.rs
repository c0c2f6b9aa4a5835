//! Provider layer — MCP tool servers running as child processes.
//!
//! This module handles:
//! - Spawning providers and speaking line-delimited JSON-RPC on their stdio
//! - The per-provider connection lifecycle and handshake
//! - Concurrent startup and teardown of the whole provider set
//! - Aggregating every provider's tools into one catalog
//!
//! Providers are configured in a JSON file or as script paths on the
//! command line.

pub mod catalog;
pub mod config;
pub mod connection;
pub mod errors;
pub mod launcher;
pub mod pool;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use catalog::{NamespacedTool, ToolCatalog};
pub use connection::{ConnectionState, ProviderConnection, Timeouts};
pub use errors::{ConfigError, InvocationError, LaunchError};
pub use launcher::{Launcher, ProcessLauncher};
pub use pool::{ConnectionPool, PoolStartReport};
pub use types::{InvocationResult, ProviderConfig, RawTool};
