//! Chainboard collector CLI.
//!
//! Fetches block data from every configured chain, normalizes it and
//! persists it with resumable checkpoints, then refreshes each chain's
//! rolling 24h statistics.
//!
//! # Usage
//!
//! ```bash
//! # One catch-up round over all configured chains, then exit
//! chainboard-collector collect --config chainboard.toml --exit
//!
//! # Run forever, sleeping 5 minutes between rounds
//! chainboard-collector collect --config chainboard.toml
//!
//! # Re-verify a range without touching checkpoints
//! chainboard-collector collect --chain ethereum --from-block 20324800 --force --exit
//!
//! # Show the configured chains
//! chainboard-collector list --config chainboard.toml
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chainboard_collector::adapter::{ChainAdapter, FamilyAdapter};
use chainboard_collector::aggregator;
use chainboard_collector::collector::{self, CollectOptions};
use chainboard_collector::config::Config;
use chainboard_collector::store::SqliteStore;
use clap::{Parser, Subcommand};

/// Multi-chain block data collector.
#[derive(Debug, Parser)]
#[command(name = "chainboard-collector", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Collect block data and refresh chain statistics.
    Collect {
        /// Configuration file path.
        #[arg(long, default_value = "chainboard.toml")]
        config: PathBuf,

        /// Collect only these chains (comma-separated names).
        /// If omitted, every configured chain is collected.
        #[arg(long)]
        chain: Option<String>,

        /// Collect from this block instead of the stored checkpoint.
        #[arg(long)]
        from_block: Option<u64>,

        /// Re-fetch and overwrite blocks without touching checkpoints.
        #[arg(long)]
        force: bool,

        /// Run a single round and exit instead of looping.
        #[arg(long)]
        exit: bool,

        /// Seconds to sleep between rounds.
        #[arg(long, default_value_t = 300)]
        sleep: u64,
    },

    /// List the configured chains.
    List {
        /// Configuration file path.
        #[arg(long, default_value = "chainboard.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Collect {
            config,
            chain,
            from_block,
            force,
            exit,
            sleep,
        } => cmd_collect(&config, chain.as_deref(), from_block, force, exit, sleep).await,
        Command::List { config } => {
            cmd_list(&Config::load(&config)?);
            Ok(())
        }
    }
}

/// Execute the `collect` subcommand.
async fn cmd_collect(
    config_path: &Path,
    chain_filter: Option<&str>,
    from_block: Option<u64>,
    force: bool,
    exit: bool,
    sleep: u64,
) -> Result<()> {
    let config = Config::load(config_path)?;
    let store = SqliteStore::open(&config.storage.path)
        .with_context(|| format!("opening storage at {}", config.storage.path.display()))?;

    let names: Vec<String> = match chain_filter {
        Some(csv) => csv
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .collect(),
        None => config.chain_names().iter().map(|name| (*name).to_owned()).collect(),
    };
    if names.is_empty() {
        bail!("no chains selected");
    }

    // Fail on unknown chain names before any collection starts.
    let mut adapters = Vec::with_capacity(names.len());
    for name in &names {
        let chain = config
            .chain(name)
            .with_context(|| format!("chain {name} is not configured"))?;
        adapters.push(
            FamilyAdapter::for_chain(chain.clone())
                .with_context(|| format!("building the http client for {name}"))?,
        );
    }

    let options = CollectOptions { from_block, force };

    tracing::info!(chains = adapters.len(), "starting collection");

    loop {
        let mut success = 0_u32;
        let mut failed = 0_u32;

        for adapter in &adapters {
            let chain = adapter.chain().name.clone();
            match collector::collect_chain(adapter, &store, &options).await {
                Ok(summary) => {
                    match aggregator::aggregate_chain(&store, adapter.chain(), unix_now()).await {
                        Ok(_) => {
                            success += 1;
                            tracing::info!(chain = %chain, collected = summary.collected, "sync complete");
                        }
                        Err(error) => {
                            failed += 1;
                            tracing::error!(chain = %chain, error = %error, "aggregation failed");
                        }
                    }
                }
                Err(error) => {
                    failed += 1;
                    tracing::error!(chain = %chain, error = %error, "sync failed");
                }
            }
        }

        tracing::info!(success, failed, "round finished");

        if failed > 0 {
            bail!("{failed} chain(s) failed to sync");
        }
        if exit {
            break;
        }
        tokio::time::sleep(Duration::from_secs(sleep)).await;
    }

    Ok(())
}

fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}

/// Execute the `list` subcommand.
#[allow(clippy::print_stdout, reason = "list output is the command's purpose")]
fn cmd_list(config: &Config) {
    println!(
        "{:<16} {:<8} {:<14} {:<6} RPCs",
        "Chain", "Family", "Start Block", "Coin"
    );
    println!("{}", "-".repeat(70));

    for name in config.chain_names() {
        if let Some(chain) = config.chain(name) {
            println!(
                "{:<16} {:<8} {:<14} {:<6} {}",
                chain.name,
                chain.family,
                chain.start_block,
                chain.coin,
                chain.node_rpcs.len(),
            );
        }
    }
}
