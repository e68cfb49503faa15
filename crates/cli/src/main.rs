//! Command Line Interface for the CLMM keeper.
mod logging;
mod output;
mod paper;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use clmm_keeper_domain::prelude::*;
use clmm_keeper_execution::prelude::*;
use clmm_keeper_protocols::prelude::*;
use dotenv::dotenv;
use output::{OutputFormat, print_report};
use paper::PaperSettings;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "clmm-keeper")]
#[command(about = "Automated range rebalancing and fee harvesting for CLMM positions", long_about = None)]
struct Cli {
    /// Default log filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a configuration file without starting the loop
    Validate {
        /// Path to the TOML configuration
        #[arg(short, long, env = "CLMM_KEEPER_CONFIG")]
        config: PathBuf,
    },
    /// Run the keeper against the paper-trading market
    Run {
        /// Path to the TOML configuration
        #[arg(short, long, env = "CLMM_KEEPER_CONFIG")]
        config: PathBuf,

        /// Run a single tick and exit
        #[arg(long)]
        once: bool,

        /// Print reports as JSON lines
        #[arg(long)]
        json: bool,

        /// Override the configured dry-run flag
        #[arg(long)]
        dry_run: bool,
    },
    /// Re-issue the deposit of an interrupted rebalance on one pool
    Resume {
        /// Path to the TOML configuration
        #[arg(short, long, env = "CLMM_KEEPER_CONFIG")]
        config: PathBuf,

        /// Pool whose pending deposit should be retried
        #[arg(short, long)]
        pool: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    logging::setup_logging(&cli.log_level);

    match cli.command {
        Commands::Validate { config } => validate(&config),
        Commands::Run {
            config,
            once,
            json,
            dry_run,
        } => {
            let format = if json {
                OutputFormat::Json
            } else {
                OutputFormat::Table
            };
            run(&config, once, format, dry_run).await
        }
        Commands::Resume { config, pool } => resume(&config, &pool).await,
    }
}

fn load_config(path: &Path) -> Result<(KeeperConfig, PaperSettings)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config = KeeperConfig::from_toml_str(&content)?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    let paper = PaperSettings::from_toml_str(&content)?;
    Ok((config, paper))
}

fn validate(path: &Path) -> Result<()> {
    let (config, _) = load_config(path)?;
    let allocated: rust_decimal::Decimal =
        config.pools.iter().map(|p| p.target_allocation_pct).sum();
    println!(
        "{} is valid: {} pools, {}% allocated, tick every {}s, harvest every {}s",
        path.display(),
        config.pools.len(),
        allocated,
        config.keeper.interval_secs,
        config.keeper.harvest_interval_secs
    );
    Ok(())
}

/// Builds the paper market and a keeper over it, with stored positions restored into both.
async fn start_keeper(
    config: &KeeperConfig,
    paper: &PaperSettings,
) -> Result<(ControlLoop, Arc<SimulatedPoolClient>)> {
    let sim = paper.build_client(&config.pools);
    let client = config.keeper.wrap_client(sim.clone());
    let control = ControlLoop::from_config(config, client, Arc::new(SystemClock))?;
    let restored = control.restore().await.context("Failed to restore positions")?;
    if restored > 0 {
        for position in control.positions().await {
            sim.restore_position(&position);
        }
        info!(restored, "Resuming managed positions");
    }
    Ok((control, sim))
}

async fn resume(path: &Path, pool: &str) -> Result<()> {
    let (config, paper) = load_config(path)?;
    let (control, _) = start_keeper(&config, &paper).await?;

    let Some(outcome) = control.resume_pool(&PoolId::new(pool)).await else {
        bail!("pool {pool} is not configured");
    };
    println!("{pool}: {outcome}");
    if !outcome.is_success() {
        bail!("deposit for {pool} did not land");
    }
    Ok(())
}

async fn run(path: &Path, once: bool, format: OutputFormat, dry_run: bool) -> Result<()> {
    let (mut config, paper) = load_config(path)?;
    if dry_run {
        config.keeper.dry_run = true;
    }

    let (control, sim) = start_keeper(&config, &paper).await?;

    if once {
        let report = control.run_once().await;
        print_report(&report, format)?;
        if report.failed_pools() > 0 {
            bail!("{} pool(s) failed", report.failed_pools());
        }
        return Ok(());
    }

    let stop = StopHandle::new();
    let market = paper.spawn_market(sim, stop.clone());

    let (tx, mut rx) = mpsc::channel(16);
    let control = Arc::new(control.with_report_sink(tx));
    let keeper = {
        let control = control.clone();
        let stop = stop.clone();
        tokio::spawn(async move { control.run(stop).await })
    };

    let printer = tokio::spawn(async move {
        while let Some(report) = rx.recv().await {
            if let Err(e) = print_report(&report, format) {
                warn!(error = %e, "Failed to print report");
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Stop requested, finishing current tick");
    stop.stop();

    keeper.await.context("Keeper task failed")?;
    market.await.context("Market task failed")?;

    let stats = control.lifecycle().get_aggregate_stats().await;
    // Dropping the loop closes the report channel and ends the printer.
    drop(control);
    printer.await.context("Printer task failed")?;

    info!(
        positions = stats.total_positions,
        rebalances = stats.total_rebalances,
        interrupted = stats.total_interrupted,
        fees = %stats.total_fees,
        rewards = %stats.total_rewards,
        "Keeper stopped"
    );
    Ok(())
}
