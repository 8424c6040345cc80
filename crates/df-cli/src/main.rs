//! Data Farming CLI
//!
//! `dftool` runs a weekly reward round: fetch inputs into a CSV directory,
//! calculate rewards from them, then dispense.

mod commands;
mod config;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use commands::{Substream, Window};
use config::DfConfig;
use df_bridge::{
    BlockRange, DryRunContract, Dispenser, HttpTransport, JsonRpcClient, JsonRpcContract,
    RateSource, SubgraphClient,
};
use df_core::{csvs, ChainId, Symbol};
use df_economics::calendar::{df_week_of_date, parse_date, parse_week_start, week_start_date};
use df_economics::from_wei;

#[derive(Parser)]
#[command(name = "dftool")]
#[command(version)]
#[command(about = "Data Farming weekly reward rounds", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON log lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "DFTOOL_CONFIG", default_value = "~/.dftool/dftool.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the DF week of a date
    Dfweek {
        /// Date, YYYY-MM-DD (default: today)
        date: Option<String>,
    },

    /// Show the reward budget of a round
    Budget {
        /// Round start, a Thursday (default: from config)
        #[arg(long)]
        start_date: Option<String>,

        /// Override the total OCEAN for the round
        #[arg(long, env = "TOT_OCEAN")]
        tot_ocean: Option<f64>,
    },

    /// Fetch average USD rates of tokens
    Getrate {
        /// Comma-separated symbols, e.g. OCEAN,H2O,ROSE
        #[arg(num_args = 1, value_delimiter = ',')]
        symbols: Vec<String>,
        st: String,
        fin: String,
        csv_dir: PathBuf,
    },

    /// Fetch nft and swap volumes, owners and basetoken symbols of a chain
    Volsym {
        st: String,
        fin: String,
        chain_id: ChainId,
        csv_dir: PathBuf,
    },

    /// Fetch veOCEAN balances averaged over sampled blocks
    Vebals {
        st: String,
        fin: String,
        chain_id: ChainId,
        csv_dir: PathBuf,

        /// Blocks to sample (default: from config)
        #[arg(long)]
        n_samples: Option<usize>,
    },

    /// Fetch veOCEAN allocations averaged over sampled blocks
    Allocations {
        st: String,
        fin: String,
        chain_id: ChainId,
        csv_dir: PathBuf,

        /// Blocks to sample (default: from config)
        #[arg(long)]
        n_samples: Option<usize>,
    },

    /// Fetch predictoor summaries and feed contracts
    PredoorData {
        st: String,
        fin: String,
        chain_id: ChainId,
        csv_dir: PathBuf,
    },

    /// Calculate rewards from the CSVs in a directory
    Calc {
        /// volume, predictoor or challenge (default: from config)
        #[arg(value_enum)]
        substream: Option<Substream>,

        csv_dir: PathBuf,

        /// Round start, a Thursday (default: from config)
        #[arg(long)]
        start_date: Option<String>,

        /// Override the total OCEAN for the round
        #[arg(long, env = "TOT_OCEAN")]
        tot_ocean: Option<f64>,
    },

    /// Send rewards on chain
    Dispense {
        #[arg(value_enum)]
        substream: Substream,

        csv_dir: PathBuf,

        /// Chain to dispense on
        #[arg(long)]
        chain_id: ChainId,

        /// Record the calls instead of sending them
        #[arg(long)]
        dry_run: bool,
    },
}

fn init_logging(verbose: bool, json: bool) {
    let env_filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn expand_path(path: &Path) -> PathBuf {
    if let Some(rest) = path.to_str().and_then(|s| s.strip_prefix("~/")) {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

fn csv_dir(path: &Path) -> anyhow::Result<PathBuf> {
    let dir = expand_path(path);
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    Ok(dir)
}

fn window(st: &str, fin: &str) -> anyhow::Result<Window> {
    Window::new(parse_date(st)?, parse_date(fin)?)
}

/// Round start from the flag, else the config
fn start_date(flag: Option<&str>, config: &DfConfig) -> anyhow::Result<NaiveDate> {
    let raw = flag
        .or(config.rewards.start_date.as_deref())
        .context("no start date: pass --start-date or set rewards.start_date")?;
    Ok(parse_week_start(raw)?)
}

fn subgraph_client(config: &DfConfig, chain_id: ChainId) -> anyhow::Result<SubgraphClient<HttpTransport>> {
    let endpoint = config.network.chain(chain_id)?;
    let transport = HttpTransport::new(config.network.timeout())?;
    Ok(SubgraphClient::new(transport, chain_id, endpoint.subgraph_url.clone())
        .with_retry(config.network.retry_policy()))
}

fn rpc_client(config: &DfConfig, chain_id: ChainId) -> anyhow::Result<JsonRpcClient> {
    Ok(JsonRpcClient::new(
        config.network.rpc_url(chain_id)?,
        config.network.timeout(),
    )?)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let config = DfConfig::load(Some(&expand_path(&cli.config)))?;

    match cli.command {
        Commands::Dfweek { date } => {
            let date = match date {
                Some(d) => parse_date(&d)?,
                None => Utc::now().date_naive(),
            };
            let week = df_week_of_date(date);
            println!("DF week: {week}");
            match week_start_date(week) {
                Some(start) => println!("Week start: {start}"),
                None => println!("Before DF week 5"),
            }
        }

        Commands::Budget { start_date: flag, tot_ocean } => {
            let start = start_date(flag.as_deref(), &config)?;
            let budgets = commands::budgets(start, tot_ocean.or(config.rewards.tot_ocean));
            println!("DF week: {}", budgets.week);
            println!("Total OCEAN: {}", from_wei(budgets.total));
            println!("  Volume: {}", budgets.volume_ocean());
            println!("  Predictoor: {}", budgets.predictoor_ocean());
        }

        Commands::Getrate { symbols, st, fin, csv_dir: dir } => {
            let dir = csv_dir(&dir)?;
            let source = RateSource::http(
                &config.rates.binance_url,
                &config.rates.coingecko_url,
                config.network.timeout(),
            )?;
            let symbols: Vec<Symbol> = symbols.iter().map(|s| Symbol::new(s)).collect();
            let rates = commands::get_rates(&source, &symbols, window(&st, &fin)?, &dir).await?;
            for (symbol, rate) in rates {
                println!("{symbol}: {rate}");
            }
        }

        Commands::Volsym { st, fin, chain_id, csv_dir: dir } => {
            let dir = csv_dir(&dir)?;
            let client = subgraph_client(&config, chain_id)?;
            let clock = rpc_client(&config, chain_id)?;
            commands::fetch_volsym(&client, &clock, window(&st, &fin)?)
                .await?
                .save(&dir, chain_id)?;
        }

        Commands::Vebals { st, fin, chain_id, csv_dir: dir, n_samples } => {
            let dir = csv_dir(&dir)?;
            let client = subgraph_client(&config, chain_id)?;
            let clock = rpc_client(&config, chain_id)?;
            let w = window(&st, &fin)?;
            let range = BlockRange::from_timestamps(
                &clock,
                w.st_ts(),
                w.fin_ts(),
                n_samples.unwrap_or(config.network.n_samples),
            )
            .await?;
            let rows = commands::fetch_vebals(&client, &clock, &range).await?;
            csvs::save_vebals(&dir, &rows)?;
        }

        Commands::Allocations { st, fin, chain_id, csv_dir: dir, n_samples } => {
            let dir = csv_dir(&dir)?;
            let client = subgraph_client(&config, chain_id)?;
            let clock = rpc_client(&config, chain_id)?;
            let w = window(&st, &fin)?;
            let range = BlockRange::from_timestamps(
                &clock,
                w.st_ts(),
                w.fin_ts(),
                n_samples.unwrap_or(config.network.n_samples),
            )
            .await?;
            let allocations = commands::fetch_allocations(&client, &range).await?;
            csvs::save_allocations(&dir, &allocations)?;
        }

        Commands::PredoorData { st, fin, chain_id, csv_dir: dir } => {
            let dir = csv_dir(&dir)?;
            let client = subgraph_client(&config, chain_id)?;
            let (summaries, contracts) =
                commands::fetch_predoor_data(&client, window(&st, &fin)?).await?;
            csvs::save_predictoor_data(&dir, &summaries)?;
            csvs::save_predictoor_feeds(&dir, chain_id, &contracts)?;
        }

        Commands::Calc { substream, csv_dir: dir, start_date: flag, tot_ocean } => {
            let dir = expand_path(&dir);
            let substream = match substream {
                Some(s) => s,
                None => config.rewards.substream.parse()?,
            };
            let start = start_date(flag.as_deref(), &config)?;
            let tot_ocean = tot_ocean.or(config.rewards.tot_ocean);

            match substream {
                Substream::Volume => {
                    let rewards =
                        commands::calc_volume(&dir, start, tot_ocean, config.rewards.params())?;
                    println!("Volume rewards: {} OCEAN", rewards.total());
                }
                Substream::Predictoor => {
                    let rewards = commands::calc_predictoor(&dir, start, tot_ocean)?;
                    let total: f64 = rewards.values().flat_map(|m| m.values()).sum();
                    println!("Predictoor rewards: {total} OCEAN");
                }
                Substream::Challenge => {
                    let rewards = commands::calc_challenge(&dir, start)?;
                    print_json(&rewards)?;
                }
            }
        }

        Commands::Dispense { substream, csv_dir: dir, chain_id, dry_run } => {
            let dir = expand_path(&dir);
            let token = config.dispense.token()?;
            let dfrewards = config.dispense.dfrewards()?;

            let receipt = if dry_run {
                let dispenser = Dispenser::new(DryRunContract::new(dfrewards))
                    .with_batch_size(config.dispense.batch_size)
                    .with_retry(config.dispense.retry_policy());
                commands::dispense(&dispenser, &dir, substream, chain_id, &token).await?
            } else {
                let rpc = Arc::new(rpc_client(&config, chain_id)?);
                let contract = JsonRpcContract::new(rpc, config.dispense.from()?, dfrewards);
                let dispenser = Dispenser::new(contract)
                    .with_batch_size(config.dispense.batch_size)
                    .with_retry(config.dispense.retry_policy());
                commands::dispense(&dispenser, &dir, substream, chain_id, &token).await?
            };
            print_json(&receipt)?;
            if !receipt.is_complete() {
                anyhow::bail!("{} batch(es) failed", receipt.failed_batches().count());
            }
        }
    }

    Ok(())
}
