//! OrchestrationContext — everything a running relay owns.
//!
//! Built once at startup: the pool is started, the catalog is built from
//! whatever came up, and the engine is wired to both. Shared by reference
//! with the presentation layer and torn down exactly once at exit.

use std::sync::Arc;

use crate::provider::catalog::ToolCatalog;
use crate::provider::pool::{ConnectionPool, PoolStartReport};
use crate::provider::types::ProviderConfig;

use super::completion::CompletionService;
use super::engine::{ConversationEngine, EngineConfig};
use super::errors::AgentError;

/// Owns the provider pool, the tool catalog and the conversation engine.
pub struct OrchestrationContext {
    pool: Arc<ConnectionPool>,
    catalog: Arc<ToolCatalog>,
    engine: ConversationEngine,
    report: PoolStartReport,
}

impl OrchestrationContext {
    /// Start every provider and build the catalog.
    ///
    /// Never fails on provider problems: failed providers are listed in the
    /// start report and the context serves whatever came up.
    pub async fn start(
        pool: ConnectionPool,
        providers: &[ProviderConfig],
        completion: Arc<dyn CompletionService>,
        config: EngineConfig,
    ) -> Self {
        let report = pool.start_all(providers).await;
        for (provider, cause) in &report.failed {
            tracing::error!(provider = %provider, cause = %cause, "provider unavailable");
        }

        let pool = Arc::new(pool);
        let catalog = Arc::new(ToolCatalog::build(&pool));
        let engine =
            ConversationEngine::new(Arc::clone(&pool), Arc::clone(&catalog), completion, config);

        Self {
            pool,
            catalog,
            engine,
            report,
        }
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn engine(&self) -> &ConversationEngine {
        &self.engine
    }

    /// Startup outcome per provider.
    pub fn start_report(&self) -> &PoolStartReport {
        &self.report
    }

    /// Qualified names of every tool, in catalog order.
    pub fn tool_names(&self) -> Vec<String> {
        self.catalog
            .tool_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub async fn process_query(&self, user_text: &str) -> Result<String, AgentError> {
        self.engine.process_query(user_text).await
    }

    /// Close every provider. Problems are logged, never raised.
    pub async fn shutdown(&self) {
        let failures = self.pool.close_all().await;
        if failures.is_empty() {
            tracing::info!("all providers closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_core::completion::CompletionResponse;
    use crate::provider::connection::Timeouts;
    use crate::testing::{FakeLauncher, FakeProvider, ScriptedCompletion};

    #[tokio::test]
    async fn test_start_serves_and_shuts_down() {
        let launcher = FakeLauncher::new()
            .serve("calc", FakeProvider::calculator())
            .fail("flaky");
        let pool = ConnectionPool::with_launcher(Arc::new(launcher), Timeouts::default());
        let completion = Arc::new(ScriptedCompletion::new(vec![CompletionResponse::text(
            "hello",
        )]));

        let ctx = OrchestrationContext::start(
            pool,
            &[
                ProviderConfig::new("calc", "fake", &[]),
                ProviderConfig::new("flaky", "fake", &[]),
            ],
            completion,
            EngineConfig::default(),
        )
        .await;

        assert_eq!(ctx.start_report().succeeded["calc"], 2);
        assert!(ctx.start_report().failed.contains_key("flaky"));
        // Only one provider came up, so names stay unqualified.
        assert_eq!(ctx.tool_names(), vec!["add", "lookup"]);
        assert_eq!(ctx.process_query("hi").await.unwrap(), "hello");

        ctx.shutdown().await;
        assert!(ctx.pool().is_empty());
        ctx.shutdown().await;
    }
}
