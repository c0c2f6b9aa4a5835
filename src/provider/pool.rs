//! ConnectionPool — the set of live provider connections.
//!
//! Startup and teardown fan out over every provider concurrently and fan in
//! regardless of individual outcomes. A provider that fails to start is
//! reported and discarded; the rest keep serving.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};

use futures::future::join_all;

use super::connection::{ProviderConnection, Timeouts};
use super::errors::LaunchError;
use super::launcher::{Launcher, ProcessLauncher};
use super::types::ProviderConfig;

// ─── PoolStartReport ─────────────────────────────────────────────────────────

/// Outcome of `start_all`, partitioned by provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStartReport {
    /// Provider name → number of tools it listed.
    pub succeeded: BTreeMap<String, usize>,
    /// Provider name → launch failure cause.
    pub failed: BTreeMap<String, String>,
}

impl PoolStartReport {
    /// Total tools across every provider that came up.
    pub fn total_tools(&self) -> usize {
        self.succeeded.values().sum()
    }
}

// ─── ConnectionPool ──────────────────────────────────────────────────────────

/// Owns every `Ready` provider connection, in start order.
pub struct ConnectionPool {
    launcher: Arc<dyn Launcher>,
    timeouts: Timeouts,
    connections: RwLock<Vec<Arc<ProviderConnection>>>,
}

impl ConnectionPool {
    /// A pool that launches providers as child processes.
    pub fn new(timeouts: Timeouts) -> Self {
        Self::with_launcher(Arc::new(ProcessLauncher), timeouts)
    }

    /// A pool that launches providers through `launcher`.
    pub fn with_launcher(launcher: Arc<dyn Launcher>, timeouts: Timeouts) -> Self {
        Self {
            launcher,
            timeouts,
            connections: RwLock::new(Vec::new()),
        }
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Start every provider concurrently.
    ///
    /// One provider's failure never affects the others. Only providers that
    /// reach `Ready` are retained.
    pub async fn start_all(&self, configs: &[ProviderConfig]) -> PoolStartReport {
        let mut report = PoolStartReport::default();
        let mut seen: HashSet<String> = self.provider_names().into_iter().collect();
        let mut handles = Vec::new();

        for config in configs {
            if !seen.insert(config.name.clone()) {
                tracing::warn!(provider = %config.name, "duplicate provider name, skipping");
                report
                    .failed
                    .insert(config.name.clone(), "duplicate provider name".into());
                continue;
            }

            let launcher = Arc::clone(&self.launcher);
            let mut conn = ProviderConnection::new(config.clone(), self.timeouts);
            let name = config.name.clone();
            handles.push((
                name,
                tokio::spawn(async move {
                    conn.start(launcher.as_ref()).await.map(|()| conn)
                }),
            ));
        }

        let names: Vec<String> = handles.iter().map(|(name, _)| name.clone()).collect();
        let outcomes = join_all(handles.into_iter().map(|(_, handle)| handle)).await;

        let mut started = Vec::new();
        for (name, outcome) in names.into_iter().zip(outcomes) {
            let outcome = outcome.unwrap_or_else(|e| {
                Err(LaunchError::Aborted {
                    provider: name.clone(),
                    reason: format!("join error: {e}"),
                })
            });

            match outcome {
                Ok(conn) => {
                    let tool_count = conn.list_capabilities().map(|t| t.len()).unwrap_or(0);
                    report.succeeded.insert(name, tool_count);
                    started.push(Arc::new(conn));
                }
                Err(e) => {
                    tracing::warn!(provider = %name, error = %e, "provider failed to start");
                    report.failed.insert(name, e.to_string());
                }
            }
        }

        self.write().extend(started);

        tracing::info!(
            started = report.succeeded.len(),
            failed = report.failed.len(),
            tools = report.total_tools(),
            "provider pool started"
        );
        report
    }

    /// Close every connection concurrently and empty the pool.
    ///
    /// Never fails; per-connection problems are logged and returned as
    /// `(provider, reason)` pairs.
    pub async fn close_all(&self) -> Vec<(String, String)> {
        let connections = std::mem::take(&mut *self.write());

        let handles: Vec<_> = connections
            .into_iter()
            .map(|conn| {
                let name = conn.name().to_string();
                (name, tokio::spawn(async move { conn.close().await }))
            })
            .collect();

        let names: Vec<String> = handles.iter().map(|(name, _)| name.clone()).collect();
        let outcomes = join_all(handles.into_iter().map(|(_, handle)| handle)).await;

        let mut failures = Vec::new();
        for (name, outcome) in names.into_iter().zip(outcomes) {
            if let Err(e) = outcome {
                tracing::warn!(provider = %name, error = %e, "provider close failed");
                failures.push((name, e.to_string()));
            }
        }

        tracing::info!(failures = failures.len(), "provider pool closed");
        failures
    }

    // ─── Lookup ──────────────────────────────────────────────────────────

    /// A `Ready` connection by provider name.
    pub fn get(&self, name: &str) -> Option<Arc<ProviderConnection>> {
        self.read()
            .iter()
            .find(|c| c.name() == name && c.list_capabilities().is_ok())
            .cloned()
    }

    /// Every `Ready` connection, in start order.
    pub fn ready_connections(&self) -> Vec<Arc<ProviderConnection>> {
        self.read()
            .iter()
            .filter(|c| c.list_capabilities().is_ok())
            .cloned()
            .collect()
    }

    /// Names of every retained provider, in start order.
    pub fn provider_names(&self) -> Vec<String> {
        self.read().iter().map(|c| c.name().to_string()).collect()
    }

    /// Number of retained connections.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<ProviderConnection>>> {
        self.connections.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Arc<ProviderConnection>>> {
        self.connections.write().unwrap_or_else(|e| e.into_inner())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
