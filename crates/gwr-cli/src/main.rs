use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gwr_core::Gameweek;
use gwr_sync::{report_runs_markdown, SyncConfig, SyncPipeline, SyncRunSummary};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "gwr-cli")]
#[command(about = "Gameweek stats reconciler: join fantasy points and expected-goals feeds per player")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch both feeds and run one full reconcile.
    Sync,
    /// Run the weekly scheduler until interrupted.
    Schedule,
    /// Reconcile previously saved feed payloads.
    Reconcile {
        #[arg(long)]
        fantasy: PathBuf,
        #[arg(long)]
        analytics: PathBuf,
        /// e.g. `5`, `GW5` or `Gameweek 5`; defaults to the fantasy feed's current gameweek.
        #[arg(long)]
        gameweek: Option<Gameweek>,
        #[arg(long)]
        season: Option<String>,
    },
    /// Summarize the most recent runs.
    Report {
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },
}

fn print_summary(summary: &SyncRunSummary) {
    println!(
        "reconcile complete: run_id={} season={} gameweek={} unified={} unresolved={} skipped={} csv={} reports={}",
        summary.run_id,
        summary.season,
        summary.gameweek,
        summary.unified_records,
        summary.unresolved,
        summary.skipped_records,
        summary.csv_path,
        summary.reports_dir
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let summary = gwr_sync::run_sync_once_from_env().await?;
            print_summary(&summary);
        }
        Commands::Schedule => {
            let mut config = SyncConfig::from_env();
            config.scheduler_enabled = true;
            let cron = config.sync_cron.clone();
            let pipeline = Arc::new(SyncPipeline::new(config)?);
            let Some(mut sched) = pipeline.maybe_build_scheduler().await? else {
                return Ok(());
            };
            sched.start().await.context("starting scheduler")?;
            info!(%cron, "scheduler running; ctrl-c to stop");
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            sched.shutdown().await.context("stopping scheduler")?;
        }
        Commands::Reconcile {
            fantasy,
            analytics,
            gameweek,
            season,
        } => {
            let mut config = SyncConfig::from_env();
            if let Some(season) = season {
                config.season = season;
            }
            let pipeline = SyncPipeline::new(config)?;
            let summary = pipeline.reconcile_files(&fantasy, &analytics, gameweek).await?;
            print_summary(&summary);
        }
        Commands::Report { runs } => {
            let root = SyncConfig::from_env().workspace_root;
            println!("{}", report_runs_markdown(runs, Some(root))?);
        }
    }

    Ok(())
}
