//! ToolRelay server.
//!
//! Starts every configured MCP provider, then serves the chat endpoint
//! until SIGTERM or Ctrl-C.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use toolrelay::agent_core::OrchestrationContext;
use toolrelay::inference::InferenceClient;
use toolrelay::provider::config::{load_providers_file, provider_from_script};
use toolrelay::provider::{ConnectionPool, ProviderConfig};
use toolrelay::settings::{load_settings, Settings};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "toolrelay")]
#[command(about = "Serve a chat model over tools from several MCP providers", long_about = None)]
struct Args {
    /// Settings YAML file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Providers JSON file (`{"servers": {name: {command, args, env, cwd}}}`)
    #[arg(short, long)]
    providers: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Provider scripts (.py or .js) to launch in addition to the providers file
    scripts: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    toolrelay::init_tracing(args.log_json);

    let settings = load_settings(args.config.as_deref()).context("failed to load settings")?;
    let providers = collect_providers(&args, &settings)?;
    if providers.is_empty() {
        bail!("no providers configured: pass --providers <file.json> or provider scripts");
    }

    let client = InferenceClient::from_config(settings.completion.clone())
        .context("failed to configure completion client")?;
    tracing::info!(
        model = %client.model(),
        providers = providers.len(),
        "starting relay"
    );

    let pool = ConnectionPool::new(settings.engine.timeouts());
    let ctx = Arc::new(
        OrchestrationContext::start(
            pool,
            &providers,
            Arc::new(client),
            settings.engine.engine_config(),
        )
        .await,
    );

    let served = toolrelay::server::serve(
        Arc::clone(&ctx),
        &settings.http,
        toolrelay::server::shutdown_signal(),
    )
    .await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, ctx.shutdown())
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "provider shutdown timed out"
        );
    }

    served.context("HTTP server failed")?;
    Ok(())
}

/// Providers from `--providers` (or `providers_file` in settings), then
/// provider scripts from the command line.
fn collect_providers(args: &Args, settings: &Settings) -> Result<Vec<ProviderConfig>> {
    let file = args.providers.clone().or_else(|| {
        settings
            .providers_file
            .as_deref()
            .map(|file| relative_to_config(file, args.config.as_deref()))
    });

    let mut providers = match file {
        Some(path) => load_providers_file(&path)
            .with_context(|| format!("failed to load providers from {}", path.display()))?,
        None => Vec::new(),
    };

    for script in &args.scripts {
        providers.push(provider_from_script(script)?);
    }
    Ok(providers)
}

/// Resolve a settings-relative path against the settings file's directory.
fn relative_to_config(file: &str, config: Option<&Path>) -> PathBuf {
    let path = PathBuf::from(file);
    if path.is_absolute() {
        return path;
    }
    match config.and_then(Path::parent) {
        Some(dir) => dir.join(path),
        None => path,
    }
}
