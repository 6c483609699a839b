use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use omet_poller::BatchSummary;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "omet-cli")]
#[command(about = "Orchestrator metrics collector")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run both batches on their configured intervals until interrupted.
    Run,
    /// Run the timeseries batch once and exit.
    Timeseries,
    /// Run the realtime batch once and exit.
    Realtime,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let poller = Arc::new(omet_poller::connect_from_env().await?);
            let mut sched = omet_poller::build_scheduler(poller).await?;
            sched.start().await?;
            info!("poller running; ctrl-c to stop");
            tokio::signal::ctrl_c().await?;
            sched.shutdown().await?;
        }
        Commands::Timeseries => {
            let poller = omet_poller::connect_from_env().await?;
            print_summary(&poller.run_timeseries().await);
        }
        Commands::Realtime => {
            let poller = omet_poller::connect_from_env().await?;
            print_summary(&poller.run_realtime().await);
        }
    }

    Ok(())
}

fn print_summary(summary: &BatchSummary) {
    println!(
        "{} batch complete: run_id={} completed={} failed={}",
        summary.batch,
        summary.run_id,
        summary.completed.len(),
        summary.failed.len()
    );
    for failure in &summary.failed {
        println!(
            "  {} failed ({}): {}",
            failure.operation, failure.kind, failure.message
        );
    }
}
