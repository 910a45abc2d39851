// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use anyhow::{Context, Result};
use c64b_backend::PlatformHandle;
use c64b_scheduler::Scheduler;
use c64b_server::{build_registry, rpc, select};
use c64b_tools::ToolContext;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "c64bridge", version, about = "Tool-dispatch server for a C64 Ultimate device")]
struct Args {
    /// Device base URL; forces the device backend.
    #[arg(long)]
    base_url: Option<String>,

    /// Enable request/dispatch debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("c64b=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("c64b=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // A config file that exists but cannot be read or parsed is fatal.
    let loaded = c64b_config::load().context("load configuration")?;
    if let Some(loaded) = &loaded {
        info!(path = %loaded.path.display(), "loaded configuration");
    }
    let config = loaded.map(|l| l.config);

    let selection = select::select_backend(args.base_url.as_deref(), config.as_ref())
        .await
        .context("select backend")?;
    let platform = PlatformHandle::new(selection.status.clone());

    let scheduler = Scheduler::from_env();
    info!(home = %scheduler.paths().home.display(), "task state home");

    let registry = Arc::new(build_registry(scheduler.clone()).context("compose tool registry")?);
    info!(tools = registry.len(), platform = %selection.status.id, "c64bridge ready");

    let ctx = ToolContext::new(selection.backend, platform);
    let served = rpc::serve(registry, ctx).await;

    match scheduler.stop_all() {
        Ok(stopped) if stopped > 0 => info!(stopped, "stopped background tasks on shutdown"),
        Ok(_) => {}
        Err(err) => warn!(error = %err, "failed to stop background tasks on shutdown"),
    }

    served
}
