use std::path::PathBuf;
use std::sync::Arc;

use aeronav_core::Fetcher;
use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

mod adds;
mod app;
mod subscribers;

use app::AppContext;

/// Aviation publication freshness service.
#[derive(Debug, Parser)]
#[command(name = "aeronav-gateway", version, about)]
struct Cli {
    /// Config file (default: AERONAV_CONFIG, then ~/.aeronav/aeronav.toml).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every background loop until Ctrl-C (default).
    Run,
    /// Download missing chart supplement editions once.
    RefreshDcs,
    /// Resolve the currently valid DTPP metadata version.
    ResolveDtpp,
    /// Delete cached DTPP metadata that is not currently valid.
    CleanDtpp,
    /// Write an airport's chart supplement pages as a zip.
    Extract {
        icao: String,
        #[arg(long, short)]
        out: PathBuf,
    },
    /// Print a remote directory listing as JSON.
    Listing { url: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "aeronav_gateway=info,aeronav_scheduler=info,aeronav_dcs=info,aeronav_dtpp=info"
                    .into()
            }),
        )
        .init();

    let cli = Cli::parse();
    let config = aeronav_core::AeronavConfig::load(cli.config.as_deref())
        .context("failed to load configuration")?;
    let ctx = AppContext::new(config)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(ctx).await,
        Command::RefreshDcs => {
            let report = ctx.dcs.refresh().await?;
            println!(
                "downloaded: {:?}, retired: {:?}",
                report.downloaded, report.retired
            );
            Ok(())
        }
        Command::ResolveDtpp => {
            let resolved = ctx.dtpp_resolver().seek_valid_version().await?;
            println!("{}", serde_json::to_string_pretty(&resolved)?);
            Ok(())
        }
        Command::CleanDtpp => {
            let removed = ctx.dtpp_resolver().clean_cache()?;
            println!("removed {removed} cached metadata file(s)");
            Ok(())
        }
        Command::Extract { icao, out } => {
            let zip = ctx.dcs.get_as_zip(&icao)?;
            std::fs::write(&out, &zip)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("wrote {} bytes to {}", zip.len(), out.display());
            Ok(())
        }
        Command::Listing { url } => {
            let body = ctx.fetcher.get(&url).await?;
            let entries = aeronav_scheduler::parse_listing(&String::from_utf8_lossy(&body))?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
            Ok(())
        }
    }
}

/// Start the ADDS poller, the DCS refresh loop and the DTPP watcher, then
/// wait for Ctrl-C and stop them in turn.
async fn run(ctx: AppContext) -> anyhow::Result<()> {
    let poller = ctx.adds_poller().start();
    info!(files = ctx.config.adds.files.len(), "ADDS poller started");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let dcs_task = tokio::spawn(
        Arc::clone(&ctx.dcs).run_refresh_loop(ctx.dcs_refresh_interval(), shutdown_rx),
    );

    let watcher = ctx.dtpp_watcher();
    watcher.start();

    info!(cache = %ctx.config.cache.root.display(), "aeronav gateway running");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutdown requested");

    watcher.shutdown().await;
    poller.shutdown().await;
    let _ = shutdown_tx.send(true);
    if let Err(e) = dcs_task.await {
        warn!("chart supplement refresh task ended abnormally: {e}");
    }
    info!("aeronav gateway stopped");
    Ok(())
}
