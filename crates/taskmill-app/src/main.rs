//! Taskmill application binary - composition root.
//!
//! Wires the engine together: configuration, the persisted parameter
//! store, the process-wide context, and the manifest-backed task catalog.
//! In headless mode it runs the requested task batch and exits with 0/1;
//! otherwise it keeps the catalog live-reloading until interrupted.

mod batch;
mod cli;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use taskmill_core::MillConfig;
use taskmill_engine::{JsonFileStore, MillContext};

use crate::batch::run_batch;
use crate::cli::{parse_invocations, CliArgs};

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.resolve_log_level()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = MillConfig::load_or_default(&args.resolve_config_path());
    let manifest_path = args
        .manifest
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.engine.manifest_path));
    let poll = Duration::from_secs(config.engine.manifest_poll_secs.max(1));
    let store = Arc::new(JsonFileStore::open(&config.store.path));

    let ctx = MillContext::new(config, store);
    ctx.registry.set_manifest_path(&manifest_path);
    ctx.init().await;

    if let Err(e) = ctx.registry.reload_manifest().await {
        warn!(path = %manifest_path.display(), "Initial manifest load failed: {}", e);
    }
    info!(tasks = ctx.registry.len(), "Task catalog ready");

    if args.headless {
        let invocations = match parse_invocations(&args.invocations) {
            Ok(invocations) => invocations,
            Err(e) => {
                error!("Invalid task invocation: {}", e);
                return ExitCode::from(1);
            }
        };

        let code = match run_batch(&ctx, invocations, args.results.as_deref()).await {
            Ok(summary) => summary.exit_code(),
            Err(e) => {
                error!("Batch aborted: {}", e);
                1
            }
        };
        ctx.shutdown().await;
        return ExitCode::from(code);
    }

    // Interactive host: keep the manifest live until interrupted. The
    // visual task panel is an external collaborator driving Execute.
    let watcher_ctx = Arc::clone(&ctx);
    let watcher = tokio::spawn(async move {
        watcher_ctx.registry.watch_manifest(poll).await;
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }

    ctx.shutdown().await;
    let _ = watcher.await;
    ExitCode::SUCCESS
}
