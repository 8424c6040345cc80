//! Work behind each dftool subcommand
//!
//! Fetch steps talk to subgraphs, nodes and rate APIs and leave CSVs in a
//! directory; calc steps read those CSVs and write reward CSVs next to them.

use anyhow::{bail, Context};
use chrono::{Days, NaiveDate};
use futures::future::try_join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{info, warn};

use df_bridge::sampling::{average_allocations, average_balances, block_at_timestamp};
use df_bridge::{
    BlockRange, ChainClock, DispenseReceipt, Dispenser, RateSource, RewardsContract,
    SubgraphClient, SubgraphTransport,
};
use df_core::csvs::{self, VeBalanceRow};
use df_core::normalize::{filter_by_swap_volumes, prune_zeros, with_native_symbols};
use df_core::{
    Address, Allocations, ChainId, ChallengeReward, NftVols, Owners, PredictoorContracts,
    PredictoorRewards, PredictoorSummaries, Rates, Symbol, Symbols,
};
use df_economics::calendar::{date_start_ts, df_week_of_date};
use df_economics::challenge::winners_from_entries;
use df_economics::predictoor::{contracts_in, rewards_per_predictoor, summarize_predictions};
use df_economics::{
    calc_challenge_rewards, calc_predictoor_rewards, derive_locked_amounts, derive_stakes,
    to_wei, RewardCalculator, RewardInputs, RewardParams, StreamBudgets, VestingSchedule,
    VolumeRewards, MIN_PREDICTIONS,
};

/// Which reward stream a calc or dispense runs for
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Substream {
    Volume,
    Predictoor,
    Challenge,
}

impl std::str::FromStr for Substream {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "volume" => Ok(Self::Volume),
            "predictoor" => Ok(Self::Predictoor),
            "challenge" => Ok(Self::Challenge),
            other => bail!("unknown substream {other:?}"),
        }
    }
}

/// Date range of a fetch, `[st, fin)`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub st: NaiveDate,
    pub fin: NaiveDate,
}

impl Window {
    pub fn new(st: NaiveDate, fin: NaiveDate) -> anyhow::Result<Self> {
        if st >= fin {
            bail!("start {st} must be before end {fin}");
        }
        Ok(Self { st, fin })
    }

    /// The seven days from `st`
    pub fn week_from(st: NaiveDate) -> anyhow::Result<Self> {
        let fin = st
            .checked_add_days(Days::new(7))
            .with_context(|| format!("date overflow after {st}"))?;
        Self::new(st, fin)
    }

    pub fn st_ts(&self) -> i64 {
        date_start_ts(self.st)
    }

    pub fn fin_ts(&self) -> i64 {
        date_start_ts(self.fin)
    }
}

// ============================================================================
// Budgets
// ============================================================================

/// Stream budgets of the round starting on `start`
pub fn budgets(start: NaiveDate, tot_ocean: Option<f64>) -> StreamBudgets {
    VestingSchedule::default().stream_budgets(date_start_ts(start), tot_ocean)
}

// ============================================================================
// Fetch steps
// ============================================================================

/// Average rates over the window, each cached as `rate-<symbol>.csv`
///
/// Rates that were found are saved even when others are missing.
pub async fn get_rates(
    source: &RateSource,
    symbols: &[Symbol],
    window: Window,
    csv_dir: &Path,
) -> anyhow::Result<Rates> {
    let mut rates = Rates::new();
    let mut missing = Vec::new();
    for (symbol, rate) in source.get_rates(symbols, window.st, window.fin).await {
        match rate {
            Some(rate) => {
                csvs::save_rate(csv_dir, &symbol, rate)?;
                rates.insert(symbol, rate);
            }
            None => missing.push(symbol.to_string()),
        }
    }
    if !missing.is_empty() {
        bail!("no provider returned a rate for {}", missing.join(", "));
    }
    Ok(rates)
}

/// What `volsym` fetches for one chain
#[derive(Clone, Debug, Default)]
pub struct VolSym {
    pub nftvols: NftVols,
    pub swapvols: NftVols,
    pub owners: Owners,
    pub symbols: Symbols,
}

impl VolSym {
    pub fn save(&self, csv_dir: &Path, chain_id: ChainId) -> anyhow::Result<()> {
        csvs::save_nftvols(csv_dir, chain_id, &self.nftvols)?;
        csvs::save_swapvols(csv_dir, chain_id, &self.swapvols)?;
        csvs::save_owners(csv_dir, chain_id, &self.owners)?;
        csvs::save_symbols(csv_dir, chain_id, &self.symbols)?;
        Ok(())
    }
}

/// Order and swap volumes, owners and symbols for one chain
pub async fn fetch_volsym<T, C>(
    client: &SubgraphClient<T>,
    clock: &C,
    window: Window,
) -> anyhow::Result<VolSym>
where
    T: SubgraphTransport,
    C: ChainClock + ?Sized,
{
    let chain_id = client.chain_id();
    let st_block = block_at_timestamp(clock, window.st_ts()).await?;
    let fin_block = block_at_timestamp(clock, window.fin_ts()).await?;

    let vols = client.fetch_nftvols(st_block, fin_block).await?;
    let swaps = client.fetch_swapvols(st_block, fin_block).await?;
    let nfts: Vec<Address> = vols
        .values()
        .flat_map(|by_nft| by_nft.keys())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let basetokens: Vec<Address> = vols.keys().cloned().collect();

    let owners = client.fetch_owners(&nfts).await?;
    let symbols = client.fetch_symbols(&basetokens).await?;

    let nftvols = NftVols::from([(chain_id, vols)]);
    let symbols = with_native_symbols(&Symbols::from([(chain_id, symbols)]), &nftvols);
    info!(chain = chain_id, n_nfts = nfts.len(), "Fetched volumes and symbols");
    Ok(VolSym {
        nftvols,
        swapvols: NftVols::from([(chain_id, swaps)]),
        owners: Owners::from([(chain_id, owners)]),
        symbols,
    })
}

/// veOCEAN balances averaged over the sampled blocks
pub async fn fetch_vebals<T, C>(
    client: &SubgraphClient<T>,
    clock: &C,
    range: &BlockRange,
) -> anyhow::Result<Vec<VeBalanceRow>>
where
    T: SubgraphTransport,
    C: ChainClock + ?Sized,
{
    let samples = try_join_all(range.sample_blocks().into_iter().map(|block| async move {
        let ts = clock.block_timestamp(block).await?;
        client.fetch_vebals(block, ts).await
    }))
    .await?;

    let mut unlock_times = BTreeMap::new();
    let mut balances: Vec<BTreeMap<Address, f64>> = Vec::with_capacity(samples.len());
    let mut locked: Vec<BTreeMap<Address, f64>> = Vec::with_capacity(samples.len());
    for sample in &samples {
        balances.push(sample.iter().map(|(lp, v)| (lp.clone(), v.balance)).collect());
        locked.push(sample.iter().map(|(lp, v)| (lp.clone(), v.locked)).collect());
        for (lp, v) in sample {
            unlock_times.insert(lp.clone(), v.unlock_time);
        }
    }
    let balances = average_balances(&balances);
    let locked = average_balances(&locked);

    Ok(balances
        .into_iter()
        .map(|(lp, balance)| VeBalanceRow {
            locked_amt: locked.get(&lp).copied().unwrap_or_default(),
            unlock_time: unlock_times.get(&lp).copied().unwrap_or_default(),
            lp_addr: lp,
            balance,
        })
        .collect())
}

/// Allocations averaged over the sampled blocks
pub async fn fetch_allocations<T: SubgraphTransport>(
    client: &SubgraphClient<T>,
    range: &BlockRange,
) -> anyhow::Result<Allocations> {
    let samples = try_join_all(
        range
            .sample_blocks()
            .into_iter()
            .map(|block| client.fetch_allocations(block)),
    )
    .await?;
    Ok(average_allocations(&samples))
}

/// Prediction summaries and every predictoor contract on the chain
pub async fn fetch_predoor_data<T: SubgraphTransport>(
    client: &SubgraphClient<T>,
    window: Window,
) -> anyhow::Result<(PredictoorSummaries, PredictoorContracts)> {
    let contracts = client.fetch_predictoor_contracts().await?;
    let predictions = client.fetch_predictions(window.st_ts(), window.fin_ts()).await?;

    let known: Vec<_> = predictions
        .iter()
        .filter(|p| contracts.contains_key(&p.contract))
        .collect();
    if known.len() < predictions.len() {
        warn!(
            dropped = predictions.len() - known.len(),
            "Predictions on unknown contracts"
        );
    }

    let summaries = summarize_predictions(known);
    Ok((summaries, PredictoorContracts::from([(client.chain_id(), contracts)])))
}

// ============================================================================
// Calc steps
// ============================================================================

/// Volume rewards from the CSVs in `csv_dir`
pub fn calc_volume(
    csv_dir: &Path,
    start: NaiveDate,
    tot_ocean: Option<f64>,
    params: RewardParams,
) -> anyhow::Result<VolumeRewards> {
    let mut nftvols = prune_zeros(&csvs::load_nftvols(csv_dir)?);
    if let Some(swapvols) = csvs::load_swapvols(csv_dir)? {
        info!("Filtering volumes by swap volumes");
        nftvols = filter_by_swap_volumes(&nftvols, &swapvols);
    }
    let owners = csvs::load_owners(csv_dir)?;
    let symbols = csvs::load_symbols(csv_dir)?;
    let rates = csvs::load_rates(csv_dir)?;
    let feeds = csvs::load_predictoor_feeds(csv_dir)?;
    let (balances, locked_balances, _) = csvs::load_vebals(csv_dir)?;
    let allocations = prune_zeros(&csvs::load_allocations(csv_dir)?);

    let stakes = derive_stakes(&allocations, &balances)?;
    let locked = derive_locked_amounts(&allocations, &locked_balances)?;

    let budget = budgets(start, tot_ocean);
    let inputs = RewardInputs {
        stakes: &stakes,
        locked: &locked,
        nftvols: &nftvols,
        owners: &owners,
        symbols: &symbols,
        rates: &rates,
        predictoor_feeds: &feeds,
        week: df_week_of_date(start),
        ocean_avail: budget.volume_ocean(),
    };
    let rewards = RewardCalculator::new(params).calculate(&inputs)?;

    csvs::save_volume_rewards(csv_dir, &rewards.rewards)?;
    csvs::save_volume_rewards_info(csv_dir, &rewards.rewards_info)?;
    info!(total = rewards.total(), budget = budget.volume_ocean(), "Volume rewards");
    Ok(rewards)
}

/// Predictoor rewards from `predictoor_data.csv`
///
/// The budget is split across every contract in the `predictoor_feeds-*`
/// files, including contracts nobody predicted on.
pub fn calc_predictoor(
    csv_dir: &Path,
    start: NaiveDate,
    tot_ocean: Option<f64>,
) -> anyhow::Result<PredictoorRewards> {
    let summaries = csvs::load_predictoor_data(csv_dir)?;
    let mut contracts: BTreeSet<Address> = csvs::load_predictoor_contracts(csv_dir)?
        .into_values()
        .flat_map(BTreeMap::into_keys)
        .collect();
    if contracts.is_empty() && !summaries.is_empty() {
        bail!(
            "no predictoor contracts in {}; run predoor-data first",
            csv_dir.display()
        );
    }
    let unlisted: Vec<Address> = contracts_in(&summaries)
        .into_iter()
        .filter(|c| !contracts.contains(c))
        .collect();
    if !unlisted.is_empty() {
        warn!(n = unlisted.len(), "Predictions on contracts missing from the feeds files");
        contracts.extend(unlisted);
    }
    let budget = budgets(start, tot_ocean);

    let rewards = calc_predictoor_rewards(
        &summaries,
        &contracts,
        budget.predictoor_ocean(),
        MIN_PREDICTIONS,
    )?;
    csvs::save_predictoor_rewards(csv_dir, &rewards)?;
    info!(
        n_contracts = contracts.len(),
        budget = budget.predictoor_ocean(),
        "Predictoor rewards"
    );
    Ok(rewards)
}

/// Challenge rewards from `challenge.csv`, paid at the cached OCEAN rate
pub fn calc_challenge(csv_dir: &Path, start: NaiveDate) -> anyhow::Result<Vec<ChallengeReward>> {
    let entries = csvs::load_challenge_data(csv_dir)?;
    let winners = winners_from_entries(&entries);
    let ocean_rate = csvs::load_rates(csv_dir)?
        .get(&Symbol::ocean())
        .copied()
        .unwrap_or_default();

    let rewards = calc_challenge_rewards(&winners, start, ocean_rate)?;
    csvs::save_challenge_rewards(csv_dir, &rewards)?;
    Ok(rewards)
}

// ============================================================================
// Dispense
// ============================================================================

/// Per-recipient wei for a substream, from its reward CSV
pub fn dispense_amounts(
    csv_dir: &Path,
    substream: Substream,
    chain_id: ChainId,
) -> anyhow::Result<BTreeMap<Address, u128>> {
    let ocean: BTreeMap<Address, f64> = match substream {
        Substream::Volume => {
            let rewards = csvs::load_volume_rewards_checked(csv_dir)?;
            let elsewhere: usize = rewards
                .iter()
                .filter(|(chain, _)| **chain != chain_id)
                .map(|(_, by_lp)| by_lp.len())
                .sum();
            let on_chain = rewards.get(&chain_id).cloned().unwrap_or_default();
            if elsewhere > 0 {
                warn!(chain = chain_id, skipped = elsewhere, "Rewards on other chains not dispensed here");
            }
            on_chain
        }
        Substream::Predictoor => rewards_per_predictoor(&csvs::load_predictoor_rewards(csv_dir)?),
        Substream::Challenge => {
            let mut by_winner = BTreeMap::new();
            for reward in csvs::load_challenge_rewards(csv_dir)? {
                *by_winner.entry(reward.winner_addr).or_default() += reward.ocean_amt;
            }
            by_winner
        }
    };

    Ok(ocean
        .into_iter()
        .map(|(addr, amount)| (addr, to_wei(amount)))
        .filter(|(_, wei)| *wei > 0)
        .collect())
}

pub async fn dispense<C: RewardsContract>(
    dispenser: &Dispenser<C>,
    csv_dir: &Path,
    substream: Substream,
    chain_id: ChainId,
    token: &Address,
) -> anyhow::Result<DispenseReceipt> {
    let amounts = dispense_amounts(csv_dir, substream, chain_id)?;
    let receipt = dispenser.dispense(&amounts, token).await?;
    if !receipt.is_complete() {
        warn!(
            failed = receipt.failed_batches().count(),
            "Some batches were not dispensed"
        );
    }
    Ok(receipt)
}
