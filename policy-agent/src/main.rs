use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use policy_agent::api::{ApiServer, AppState};
use policy_agent::backend::BackendRegistry;
use policy_agent::cli::Args;
use policy_agent::config::{AgentConfig, load_agent_config};
use policy_agent::ingest::HttpIngestClientFactory;
use policy_agent::logging::init_logging;
use policy_agent::policy::{PolicyManager, RunnerContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before clap reads its env fallbacks
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let _log_guard = init_logging(
        args.log_level.as_deref(),
        args.log_format,
        args.log_dir.as_deref(),
    )
    .context("Failed to initialize logging")?;

    let file = match &args.config {
        Some(path) => load_agent_config(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => AgentConfig::default(),
    };
    let sink = args.sink_config(file.sink.clone())?;
    info!(sink = %sink.target, prefix = ?sink.prefix, "ingestion sink configured");

    let backends = Arc::new(BackendRegistry::with_builtins());
    let clients = Arc::new(HttpIngestClientFactory::new()?);
    let manager = Arc::new(PolicyManager::new(RunnerContext::new(sink, backends, clients)));
    info!(backends = ?manager.capabilities(), "backends loaded");

    if !file.policies.is_empty() {
        let started = manager
            .start_policies(file.policy_request())
            .context("Failed to start policies from config file")?;
        info!(policies = ?started, "startup policies started");
    }

    let server = ApiServer::new(args.server_config(), AppState::new(manager.clone()));
    let cancel = server.cancel_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
        }
        cancel.cancel();
    });

    let result = server.run().await;
    manager.stop();
    info!("policy-agent stopped");

    result.context("API server failed")
}
