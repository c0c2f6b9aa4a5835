//! HTTP presentation layer.
//!
//! Serves the relay over axum until a termination signal arrives, then
//! drains in-flight requests. Provider teardown is the caller's job and
//! happens after `serve` returns, so it never races a running query.

pub mod routes;

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;

use crate::agent_core::context::OrchestrationContext;
use crate::settings::HttpSettings;

pub use routes::make_app;

/// The HTTP server could not run.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("HTTP server error: {0}")]
    Serve(String),
}

/// Serve `ctx` on `settings.host:port` until `shutdown` resolves.
pub async fn serve(
    ctx: Arc<OrchestrationContext>,
    settings: &HttpSettings,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ServerError::Bind {
            addr: addr.clone(),
            reason: e.to_string(),
        })?;

    tracing::info!(
        addr = %addr,
        tools = ctx.catalog().len(),
        "HTTP server listening"
    );

    axum::serve(listener, make_app(ctx))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Serve(e.to_string()))?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl-C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
