//! Rebalancer CLI
//!
//! Discovers a factory's pairs, estimates rebalances against them, or watches
//! the ledger and keeps the pool cache current until interrupted.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rebalancer_config::RebalancerConfig;
use rebalancer_types::Address;
use tracing::{info, warn};

use rebalance_strategy::{init_tracing, log_metrics, log_success, RebalanceService};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "rebalancer")]
#[command(about = "Pool discovery, rebalance estimation and ledger watching")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/rebalancer.toml")]
    config: PathBuf,

    /// Environment overlay (development, staging, production)
    #[arg(short, long)]
    environment: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enumerate a factory's pairs and print them
    Discover {
        #[arg(long)]
        factory: Option<Address>,
    },
    /// Estimate a rebalance of one pool
    Estimate {
        #[arg(long)]
        pool: Address,
        #[arg(long)]
        target: f64,
        /// Slippage tolerance in percent
        #[arg(long, default_value_t = 0.5)]
        slippage: f64,
        /// Discover this factory first so the pool is tracked
        #[arg(long)]
        factory: Option<Address>,
    },
    /// Discover, then follow factory and rebalancer logs until Ctrl-C
    Watch {
        #[arg(long)]
        factory: Option<Address>,
        /// Seconds between dashboard summaries
        #[arg(long, default_value_t = 30)]
        stats_interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = RebalancerConfig::load(Some(&cli.config), cli.environment.as_deref())
        .with_context(|| format!("Failed to load {:?}", cli.config))?;

    if cli.print_config {
        println!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let Some(command) = cli.command else {
        bail!("no command given, see --help");
    };

    let default_factory = config.service.factory;
    let service = RebalanceService::from_config(config).context("Failed to build ledger client")?;
    service
        .verify_chain()
        .await
        .context("Ledger endpoints failed the chain id check")?;

    match command {
        Command::Discover { factory } => {
            let factory = factory
                .or(default_factory)
                .context("--factory or service.factory is required")?;
            let report = service.discover_pairs(factory).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Estimate {
            pool,
            target,
            slippage,
            factory,
        } => {
            if let Some(factory) = factory.or(default_factory) {
                service.discover_pairs(factory).await?;
            }
            let estimate = service.estimate_rebalance(pool, target, slippage).await?;
            println!("{}", serde_json::to_string_pretty(&estimate)?);
        }
        Command::Watch {
            factory,
            stats_interval,
        } => {
            let factory = factory
                .or(default_factory)
                .context("--factory or service.factory is required")?;
            watch(&service, factory, Duration::from_secs(stats_interval.max(1))).await?;
        }
    }

    Ok(())
}

async fn watch(service: &RebalanceService, factory: Address, stats_interval: Duration) -> Result<()> {
    let report = service.discover_pairs(factory).await?;
    log_success!(
        "Tracking {} pools from {:#x} ({} skipped)",
        report.pools.len(),
        factory,
        report.failures.len()
    );

    let (tx, funnel) = service.spawn_update_funnel();
    let poller = if service.config().events.enabled {
        Some(service.spawn_log_poller(factory, tx.clone()))
    } else {
        warn!("Event polling disabled, pool cache will only change on rebalances");
        None
    };
    drop(tx);

    let mut ticker = tokio::time::interval(stats_interval);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received");
                break;
            }
            _ = ticker.tick() => {
                let stats = service.dashboard_stats();
                log_metrics!(
                    "{} pools, {} active, {} imbalanced, TVL {}, {} monitors in flight",
                    stats.total_pools,
                    stats.active_pools,
                    stats.imbalanced_pools,
                    stats.total_tvl,
                    service.monitors_in_flight()
                );
            }
        }
    }

    if let Some(poller) = poller {
        poller.abort();
    }
    funnel.abort();
    service.shutdown().await;
    Ok(())
}
