//! CSV formats for per-run intermediates and reward outputs
//!
//! | File | Columns |
//! |------|---------|
//! | `volume_rewards.csv` | chainID, LP_addr, OCEAN_amt |
//! | `volume_rewardsinfo.csv` | chainID, nft_addr, LP_addr, OCEAN_amt |
//! | `predictoor_rewards.csv` | predictoor_addr, contract_addr, OCEAN_amt |
//! | `predictoor_data.csv` | predictoor_addr, contract_addr, n_pred, n_correct, accuracy |
//! | `challenge.csv` | from_addr, nft_addr, nmse |
//! | `challenge_rewards.csv` | winner_addr, OCEAN_amt |
//! | `nftvols-<chain>.csv`, `swapvols-<chain>.csv` | chainID, basetoken_addr, nft_addr, vol_amt |
//! | `owners-<chain>.csv` | chainID, nft_addr, owner_addr |
//! | `symbols-<chain>.csv` | chainID, token_addr, token_symbol |
//! | `predictoor_feeds-<chain>.csv` | chainID, contract_addr, nft_addr |
//! | `rate-<symbol>.csv` | token_symbol, rate |
//! | `vebals.csv` | LP_addr, balance, locked_amt, unlock_time |
//! | `allocations.csv` | chainID, nft_addr, LP_addr, percent |
//!
//! Addresses are re-canonicalized on read, so hand-edited files with mixed
//! case load cleanly.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{DfError, Result};
use crate::types::*;

pub const VOLUME_REWARDS_CSV: &str = "volume_rewards.csv";
pub const VOLUME_REWARDSINFO_CSV: &str = "volume_rewardsinfo.csv";
pub const PREDICTOOR_REWARDS_CSV: &str = "predictoor_rewards.csv";
pub const PREDICTOOR_DATA_CSV: &str = "predictoor_data.csv";
pub const CHALLENGE_CSV: &str = "challenge.csv";
pub const CHALLENGE_REWARDS_CSV: &str = "challenge_rewards.csv";
pub const VEBALS_CSV: &str = "vebals.csv";
pub const ALLOCATIONS_CSV: &str = "allocations.csv";

/// Relative slack when matching reward totals across files
const REWARD_TOLERANCE: f64 = 1e-9;

pub fn nftvols_csv(dir: &Path, chain_id: ChainId) -> PathBuf {
    dir.join(format!("nftvols-{chain_id}.csv"))
}

pub fn swapvols_csv(dir: &Path, chain_id: ChainId) -> PathBuf {
    dir.join(format!("swapvols-{chain_id}.csv"))
}

pub fn owners_csv(dir: &Path, chain_id: ChainId) -> PathBuf {
    dir.join(format!("owners-{chain_id}.csv"))
}

pub fn symbols_csv(dir: &Path, chain_id: ChainId) -> PathBuf {
    dir.join(format!("symbols-{chain_id}.csv"))
}

pub fn predictoor_feeds_csv(dir: &Path, chain_id: ChainId) -> PathBuf {
    dir.join(format!("predictoor_feeds-{chain_id}.csv"))
}

pub fn rate_csv(dir: &Path, symbol: &Symbol) -> PathBuf {
    dir.join(format!("rate-{}.csv", symbol.as_str()))
}

// ============================================================================
// Row types
// ============================================================================

#[derive(Serialize, Deserialize)]
struct VolumeRewardRow {
    #[serde(rename = "chainID")]
    chain_id: ChainId,
    #[serde(rename = "LP_addr")]
    lp_addr: Address,
    #[serde(rename = "OCEAN_amt")]
    ocean_amt: f64,
}

#[derive(Serialize, Deserialize)]
struct VolumeRewardInfoRow {
    #[serde(rename = "chainID")]
    chain_id: ChainId,
    nft_addr: Address,
    #[serde(rename = "LP_addr")]
    lp_addr: Address,
    #[serde(rename = "OCEAN_amt")]
    ocean_amt: f64,
}

#[derive(Serialize, Deserialize)]
struct PredictoorRewardRow {
    predictoor_addr: Address,
    contract_addr: Address,
    #[serde(rename = "OCEAN_amt")]
    ocean_amt: f64,
}

#[derive(Serialize, Deserialize)]
struct PredictoorDataRow {
    predictoor_addr: Address,
    contract_addr: Address,
    n_pred: u64,
    n_correct: u64,
    accuracy: f64,
}

#[derive(Serialize, Deserialize)]
struct NftVolRow {
    #[serde(rename = "chainID")]
    chain_id: ChainId,
    basetoken_addr: Address,
    nft_addr: Address,
    vol_amt: f64,
}

#[derive(Serialize, Deserialize)]
struct OwnerRow {
    #[serde(rename = "chainID")]
    chain_id: ChainId,
    nft_addr: Address,
    owner_addr: Address,
}

#[derive(Serialize, Deserialize)]
struct SymbolRow {
    #[serde(rename = "chainID")]
    chain_id: ChainId,
    token_addr: Address,
    token_symbol: Symbol,
}

#[derive(Serialize, Deserialize)]
struct FeedRow {
    #[serde(rename = "chainID")]
    chain_id: ChainId,
    contract_addr: Address,
    nft_addr: Address,
}

#[derive(Serialize, Deserialize)]
struct RateRow {
    token_symbol: Symbol,
    rate: f64,
}

/// One row of `vebals.csv`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VeBalanceRow {
    #[serde(rename = "LP_addr")]
    pub lp_addr: Address,
    /// Time-averaged veOCEAN balance
    pub balance: f64,
    /// OCEAN locked to back the balance
    pub locked_amt: f64,
    /// Unix time the lock expires
    pub unlock_time: i64,
}

#[derive(Serialize, Deserialize)]
struct AllocationRow {
    #[serde(rename = "chainID")]
    chain_id: ChainId,
    nft_addr: Address,
    #[serde(rename = "LP_addr")]
    lp_addr: Address,
    percent: f64,
}

// ============================================================================
// Generic helpers
// ============================================================================

fn write_rows<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    let mut count = 0usize;
    for row in rows {
        writer.serialize(row)?;
        count += 1;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = count, "wrote csv");
    Ok(())
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// Chain ids of every `<prefix>-<chainid>.csv` in `dir`, sorted
pub fn chain_ids_in_dir(dir: &Path, prefix: &str) -> Result<Vec<ChainId>> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(rest) = name.strip_prefix(prefix).and_then(|r| r.strip_prefix('-')) else {
            continue;
        };
        if let Some(id) = rest.strip_suffix(".csv").and_then(|s| s.parse().ok()) {
            ids.push(id);
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

fn insert_nested(map: &mut ChainNftLp<f64>, chain_id: ChainId, a: Address, b: Address, v: f64) {
    *map.entry(chain_id).or_default().entry(a).or_default().entry(b).or_default() += v;
}

// ============================================================================
// Reward outputs
// ============================================================================

pub fn save_volume_rewards(dir: &Path, rewards: &RewardMap) -> Result<()> {
    let rows = rewards.iter().flat_map(|(chain_id, by_lp)| {
        by_lp.iter().map(move |(lp, amt)| VolumeRewardRow {
            chain_id: *chain_id,
            lp_addr: lp.clone(),
            ocean_amt: *amt,
        })
    });
    write_rows(&dir.join(VOLUME_REWARDS_CSV), rows)
}

pub fn load_volume_rewards(dir: &Path) -> Result<RewardMap> {
    let mut map = RewardMap::new();
    for row in read_rows::<VolumeRewardRow>(&dir.join(VOLUME_REWARDS_CSV))? {
        *map.entry(row.chain_id).or_default().entry(row.lp_addr).or_default() += row.ocean_amt;
    }
    Ok(map)
}

pub fn save_volume_rewards_info(dir: &Path, info: &RewardInfo) -> Result<()> {
    let rows = info.iter().flat_map(|(chain_id, by_nft)| {
        by_nft.iter().flat_map(move |(nft, by_lp)| {
            by_lp.iter().map(move |(lp, amt)| VolumeRewardInfoRow {
                chain_id: *chain_id,
                nft_addr: nft.clone(),
                lp_addr: lp.clone(),
                ocean_amt: *amt,
            })
        })
    });
    write_rows(&dir.join(VOLUME_REWARDSINFO_CSV), rows)
}

pub fn load_volume_rewards_info(dir: &Path) -> Result<RewardInfo> {
    let mut info = RewardInfo::new();
    for row in read_rows::<VolumeRewardInfoRow>(&dir.join(VOLUME_REWARDSINFO_CSV))? {
        insert_nested(&mut info, row.chain_id, row.nft_addr, row.lp_addr, row.ocean_amt);
    }
    Ok(info)
}

/// Load `volume_rewards.csv`, checked against `volume_rewardsinfo.csv`
///
/// Each LP's total on a chain must equal the sum of its per-nft rows.
pub fn load_volume_rewards_checked(dir: &Path) -> Result<RewardMap> {
    let rewards = load_volume_rewards(dir)?;
    let from_info = aggregate_reward_info(&load_volume_rewards_info(dir)?);

    let keys: BTreeSet<(ChainId, &Address)> = rewards
        .iter()
        .chain(from_info.iter())
        .flat_map(|(chain_id, by_lp)| by_lp.keys().map(move |lp| (*chain_id, lp)))
        .collect();
    for (chain_id, lp) in keys {
        let lookup = |map: &RewardMap| {
            map.get(&chain_id)
                .and_then(|by_lp| by_lp.get(lp))
                .copied()
                .unwrap_or(0.0)
        };
        let (total, summed) = (lookup(&rewards), lookup(&from_info));
        if (total - summed).abs() > REWARD_TOLERANCE * total.abs().max(1.0) {
            return Err(DfError::InvalidInput(format!(
                "{VOLUME_REWARDS_CSV} has {total} for {lp} on chain {chain_id}, \
                 {VOLUME_REWARDSINFO_CSV} sums to {summed}"
            )));
        }
    }
    Ok(rewards)
}

pub fn save_predictoor_rewards(dir: &Path, rewards: &PredictoorRewards) -> Result<()> {
    let rows = rewards.iter().flat_map(|(contract, by_predictoor)| {
        by_predictoor.iter().map(move |(predictoor, amt)| PredictoorRewardRow {
            predictoor_addr: predictoor.clone(),
            contract_addr: contract.clone(),
            ocean_amt: *amt,
        })
    });
    write_rows(&dir.join(PREDICTOOR_REWARDS_CSV), rows)
}

pub fn load_predictoor_rewards(dir: &Path) -> Result<PredictoorRewards> {
    let mut map = PredictoorRewards::new();
    for row in read_rows::<PredictoorRewardRow>(&dir.join(PREDICTOOR_REWARDS_CSV))? {
        *map.entry(row.contract_addr)
            .or_default()
            .entry(row.predictoor_addr)
            .or_default() += row.ocean_amt;
    }
    Ok(map)
}

pub fn save_predictoor_data(dir: &Path, summaries: &PredictoorSummaries) -> Result<()> {
    let rows = summaries.iter().flat_map(|(predictoor, by_contract)| {
        by_contract.iter().map(move |(contract, s)| PredictoorDataRow {
            predictoor_addr: predictoor.clone(),
            contract_addr: contract.clone(),
            n_pred: s.n_pred,
            n_correct: s.n_correct,
            accuracy: s.accuracy(),
        })
    });
    write_rows(&dir.join(PREDICTOOR_DATA_CSV), rows)
}

pub fn load_predictoor_data(dir: &Path) -> Result<PredictoorSummaries> {
    let mut map = PredictoorSummaries::new();
    for row in read_rows::<PredictoorDataRow>(&dir.join(PREDICTOOR_DATA_CSV))? {
        map.entry(row.predictoor_addr)
            .or_default()
            .insert(row.contract_addr, PredictionSummary::new(row.n_pred, row.n_correct));
    }
    Ok(map)
}

/// Writes entries sorted by ascending NMSE
pub fn save_challenge_data(dir: &Path, entries: &[ChallengeEntry]) -> Result<()> {
    let mut sorted = entries.to_vec();
    sorted.sort_by(|a, b| a.nmse.total_cmp(&b.nmse));
    write_rows(&dir.join(CHALLENGE_CSV), sorted)
}

/// Loads entries sorted by ascending NMSE
pub fn load_challenge_data(dir: &Path) -> Result<Vec<ChallengeEntry>> {
    let mut entries: Vec<ChallengeEntry> = read_rows(&dir.join(CHALLENGE_CSV))?;
    for entry in &entries {
        if entry.nmse.is_nan() {
            return Err(DfError::InvalidInput(format!(
                "NaN nmse for {}",
                entry.from_addr
            )));
        }
    }
    entries.sort_by(|a, b| a.nmse.total_cmp(&b.nmse));
    Ok(entries)
}

pub fn save_challenge_rewards(dir: &Path, rewards: &[ChallengeReward]) -> Result<()> {
    write_rows(&dir.join(CHALLENGE_REWARDS_CSV), rewards.iter().cloned())
}

pub fn load_challenge_rewards(dir: &Path) -> Result<Vec<ChallengeReward>> {
    read_rows(&dir.join(CHALLENGE_REWARDS_CSV))
}

// ============================================================================
// Per-run intermediates
// ============================================================================

fn save_vols(path: &Path, chain_id: ChainId, vols: &NftVols) -> Result<()> {
    let rows = vols.get(&chain_id).into_iter().flat_map(|by_base| {
        by_base.iter().flat_map(move |(base, by_nft)| {
            by_nft.iter().map(move |(nft, vol)| NftVolRow {
                chain_id,
                basetoken_addr: base.clone(),
                nft_addr: nft.clone(),
                vol_amt: *vol,
            })
        })
    });
    write_rows(path, rows)
}

fn load_vols(path: &Path, into: &mut NftVols) -> Result<()> {
    for row in read_rows::<NftVolRow>(path)? {
        insert_nested(into, row.chain_id, row.basetoken_addr, row.nft_addr, row.vol_amt);
    }
    Ok(())
}

pub fn save_nftvols(dir: &Path, chain_id: ChainId, nftvols: &NftVols) -> Result<()> {
    save_vols(&nftvols_csv(dir, chain_id), chain_id, nftvols)
}

/// Load every `nftvols-<chain>.csv` in `dir`
pub fn load_nftvols(dir: &Path) -> Result<NftVols> {
    let mut map = NftVols::new();
    for chain_id in chain_ids_in_dir(dir, "nftvols")? {
        load_vols(&nftvols_csv(dir, chain_id), &mut map)?;
    }
    Ok(map)
}

pub fn save_swapvols(dir: &Path, chain_id: ChainId, swapvols: &NftVols) -> Result<()> {
    save_vols(&swapvols_csv(dir, chain_id), chain_id, swapvols)
}

/// Load every `swapvols-<chain>.csv` in `dir`; `None` when there are none
pub fn load_swapvols(dir: &Path) -> Result<Option<NftVols>> {
    let chain_ids = chain_ids_in_dir(dir, "swapvols")?;
    if chain_ids.is_empty() {
        return Ok(None);
    }
    let mut map = NftVols::new();
    for chain_id in chain_ids {
        load_vols(&swapvols_csv(dir, chain_id), &mut map)?;
    }
    Ok(Some(map))
}

pub fn save_owners(dir: &Path, chain_id: ChainId, owners: &Owners) -> Result<()> {
    let rows = owners.get(&chain_id).into_iter().flat_map(|by_nft| {
        by_nft.iter().map(move |(nft, owner)| OwnerRow {
            chain_id,
            nft_addr: nft.clone(),
            owner_addr: owner.clone(),
        })
    });
    write_rows(&owners_csv(dir, chain_id), rows)
}

pub fn load_owners(dir: &Path) -> Result<Owners> {
    let mut map = Owners::new();
    for chain_id in chain_ids_in_dir(dir, "owners")? {
        for row in read_rows::<OwnerRow>(&owners_csv(dir, chain_id))? {
            map.entry(row.chain_id).or_default().insert(row.nft_addr, row.owner_addr);
        }
    }
    Ok(map)
}

pub fn save_symbols(dir: &Path, chain_id: ChainId, symbols: &Symbols) -> Result<()> {
    let rows = symbols.get(&chain_id).into_iter().flat_map(|by_addr| {
        by_addr.iter().map(move |(addr, symbol)| SymbolRow {
            chain_id,
            token_addr: addr.clone(),
            token_symbol: symbol.clone(),
        })
    });
    write_rows(&symbols_csv(dir, chain_id), rows)
}

pub fn load_symbols(dir: &Path) -> Result<Symbols> {
    let mut map = Symbols::new();
    for chain_id in chain_ids_in_dir(dir, "symbols")? {
        for row in read_rows::<SymbolRow>(&symbols_csv(dir, chain_id))? {
            map.entry(row.chain_id).or_default().insert(row.token_addr, row.token_symbol);
        }
    }
    Ok(map)
}

/// One row per predictoor contract, including contracts nobody predicted on
pub fn save_predictoor_feeds(
    dir: &Path,
    chain_id: ChainId,
    contracts: &PredictoorContracts,
) -> Result<()> {
    let rows = contracts.get(&chain_id).into_iter().flat_map(|by_contract| {
        by_contract.iter().map(move |(contract, nft)| FeedRow {
            chain_id,
            contract_addr: contract.clone(),
            nft_addr: nft.clone(),
        })
    });
    write_rows(&predictoor_feeds_csv(dir, chain_id), rows)
}

/// Every predictoor contract listed in `predictoor_feeds-<chain>.csv` files
pub fn load_predictoor_contracts(dir: &Path) -> Result<PredictoorContracts> {
    let mut map = PredictoorContracts::new();
    for chain_id in chain_ids_in_dir(dir, "predictoor_feeds")? {
        for row in read_rows::<FeedRow>(&predictoor_feeds_csv(dir, chain_id))? {
            map.entry(row.chain_id).or_default().insert(row.contract_addr, row.nft_addr);
        }
    }
    Ok(map)
}

pub fn load_predictoor_feeds(dir: &Path) -> Result<PredictoorFeeds> {
    Ok(feed_nfts(&load_predictoor_contracts(dir)?))
}

pub fn save_rate(dir: &Path, symbol: &Symbol, rate: f64) -> Result<()> {
    let row = RateRow {
        token_symbol: symbol.clone(),
        rate,
    };
    write_rows(&rate_csv(dir, symbol), [row])
}

/// Load every `rate-<symbol>.csv` in `dir`
pub fn load_rates(dir: &Path) -> Result<Rates> {
    let mut rates = Rates::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_rate_file = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("rate-") && n.ends_with(".csv"))
            .unwrap_or(false);
        if !is_rate_file {
            continue;
        }
        for row in read_rows::<RateRow>(&path)? {
            rates.insert(row.token_symbol, row.rate);
        }
    }
    Ok(rates)
}

pub fn save_vebals(dir: &Path, rows: &[VeBalanceRow]) -> Result<()> {
    write_rows(&dir.join(VEBALS_CSV), rows.iter().cloned())
}

/// Load `vebals.csv` as `(balances, locked amounts, unlock times)`
pub fn load_vebals(
    dir: &Path,
) -> Result<(VeBalances, LockedBalances, BTreeMap<Address, i64>)> {
    let mut balances = VeBalances::new();
    let mut locked = LockedBalances::new();
    let mut unlock = BTreeMap::new();
    for row in read_rows::<VeBalanceRow>(&dir.join(VEBALS_CSV))? {
        balances.insert(row.lp_addr.clone(), row.balance);
        locked.insert(row.lp_addr.clone(), row.locked_amt);
        unlock.insert(row.lp_addr, row.unlock_time);
    }
    Ok((balances, locked, unlock))
}

pub fn save_allocations(dir: &Path, allocations: &Allocations) -> Result<()> {
    let rows = allocations.iter().flat_map(|(chain_id, by_nft)| {
        by_nft.iter().flat_map(move |(nft, by_lp)| {
            by_lp.iter().map(move |(lp, percent)| AllocationRow {
                chain_id: *chain_id,
                nft_addr: nft.clone(),
                lp_addr: lp.clone(),
                percent: *percent,
            })
        })
    });
    write_rows(&dir.join(ALLOCATIONS_CSV), rows)
}

pub fn load_allocations(dir: &Path) -> Result<Allocations> {
    let mut map = Allocations::new();
    for row in read_rows::<AllocationRow>(&dir.join(ALLOCATIONS_CSV))? {
        insert_nested(&mut map, row.chain_id, row.nft_addr, row.lp_addr, row.percent);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn addr(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    #[test]
    fn test_volume_rewards_files() {
        let dir = tempdir().unwrap();
        let mut info = RewardInfo::new();
        info.entry(1).or_default().entry(addr(1)).or_default().insert(addr(7), 2.5);
        info.entry(1).or_default().entry(addr(2)).or_default().insert(addr(7), 1.5);
        info.entry(137).or_default().entry(addr(3)).or_default().insert(addr(8), 4.0);

        let rewards = aggregate_reward_info(&info);
        save_volume_rewards(dir.path(), &rewards).unwrap();
        save_volume_rewards_info(dir.path(), &info).unwrap();

        let loaded = load_volume_rewards(dir.path()).unwrap();
        assert_eq!(loaded[&1][&addr(7)], 4.0);
        assert_eq!(loaded[&137][&addr(8)], 4.0);

        let loaded_info = load_volume_rewards_info(dir.path()).unwrap();
        assert_eq!(aggregate_reward_info(&loaded_info), loaded);

        let header = fs::read_to_string(dir.path().join(VOLUME_REWARDS_CSV)).unwrap();
        assert!(header.starts_with("chainID,LP_addr,OCEAN_amt"));
    }

    #[test]
    fn test_volume_rewards_must_match_info() {
        let dir = tempdir().unwrap();
        let mut info = RewardInfo::new();
        info.entry(1).or_default().entry(addr(1)).or_default().insert(addr(7), 2.5);
        info.entry(1).or_default().entry(addr(2)).or_default().insert(addr(7), 1.5);
        save_volume_rewards_info(dir.path(), &info).unwrap();

        save_volume_rewards(dir.path(), &aggregate_reward_info(&info)).unwrap();
        assert_eq!(load_volume_rewards_checked(dir.path()).unwrap()[&1][&addr(7)], 4.0);

        let mut edited = aggregate_reward_info(&info);
        edited.entry(1).or_default().insert(addr(7), 5.0);
        save_volume_rewards(dir.path(), &edited).unwrap();
        assert!(matches!(
            load_volume_rewards_checked(dir.path()),
            Err(DfError::InvalidInput(_))
        ));

        // An LP only in the totals file is a mismatch too
        let mut extra = aggregate_reward_info(&info);
        extra.entry(1).or_default().insert(addr(8), 1.0);
        save_volume_rewards(dir.path(), &extra).unwrap();
        assert!(load_volume_rewards_checked(dir.path()).is_err());
    }

    #[test]
    fn test_predictoor_feeds_keep_every_contract() {
        let dir = tempdir().unwrap();
        let contracts = PredictoorContracts::from([(
            23294,
            BTreeMap::from([(addr(0xa1), addr(0xb1)), (addr(0xa2), addr(0xb2))]),
        )]);
        save_predictoor_feeds(dir.path(), 23294, &contracts).unwrap();

        assert_eq!(load_predictoor_contracts(dir.path()).unwrap(), contracts);
        let feeds = load_predictoor_feeds(dir.path()).unwrap();
        assert_eq!(feeds[&23294].len(), 2);
        assert!(feeds[&23294].contains(&addr(0xb2)));
    }

    #[test]
    fn test_per_chain_files_discovered() {
        let dir = tempdir().unwrap();
        let mut vols = NftVols::new();
        vols.entry(1).or_default().entry(addr(0xaa)).or_default().insert(addr(1), 3.0);
        vols.entry(56).or_default().entry(addr(0xaa)).or_default().insert(addr(2), 5.0);

        save_nftvols(dir.path(), 1, &vols).unwrap();
        save_nftvols(dir.path(), 56, &vols).unwrap();
        fs::write(dir.path().join("nftvols-notachain.csv"), "junk").unwrap();

        assert_eq!(chain_ids_in_dir(dir.path(), "nftvols").unwrap(), vec![1, 56]);
        assert_eq!(load_nftvols(dir.path()).unwrap(), vols);
        assert!(load_swapvols(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_mixed_case_addresses_canonicalized_on_read() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("owners-1.csv"),
            "chainID,nft_addr,owner_addr\n1,0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA,0xBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB\n",
        )
        .unwrap();

        let owners = load_owners(dir.path()).unwrap();
        assert_eq!(owners[&1][&addr(0xaa)], addr(0xbb));
    }

    #[test]
    fn test_malformed_address_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(ALLOCATIONS_CSV),
            "chainID,nft_addr,LP_addr,percent\n1,0x12,0xBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB,0.5\n",
        )
        .unwrap();
        assert!(load_allocations(dir.path()).is_err());
    }

    #[test]
    fn test_challenge_data_sorted_by_nmse() {
        let dir = tempdir().unwrap();
        let entries = vec![
            ChallengeEntry { from_addr: addr(1), nft_addr: addr(11), nmse: 0.3 },
            ChallengeEntry { from_addr: addr(2), nft_addr: addr(12), nmse: 0.1 },
            ChallengeEntry { from_addr: addr(3), nft_addr: addr(13), nmse: 0.2 },
        ];
        save_challenge_data(dir.path(), &entries).unwrap();

        let loaded = load_challenge_data(dir.path()).unwrap();
        let order: Vec<_> = loaded.iter().map(|e| e.from_addr.clone()).collect();
        assert_eq!(order, vec![addr(2), addr(3), addr(1)]);
    }

    #[test]
    fn test_rates_and_vebals() {
        let dir = tempdir().unwrap();
        save_rate(dir.path(), &Symbol::ocean(), 0.42).unwrap();
        save_rate(dir.path(), &Symbol::h2o(), H2O_RATE).unwrap();

        let rates = load_rates(dir.path()).unwrap();
        assert_eq!(rates[&Symbol::ocean()], 0.42);
        assert_eq!(rates[&Symbol::h2o()], H2O_RATE);

        let rows = vec![VeBalanceRow {
            lp_addr: addr(5),
            balance: 10.0,
            locked_amt: 40.0,
            unlock_time: 1_700_000_000,
        }];
        save_vebals(dir.path(), &rows).unwrap();
        let (bals, locked, unlock) = load_vebals(dir.path()).unwrap();
        assert_eq!(bals[&addr(5)], 10.0);
        assert_eq!(locked[&addr(5)], 40.0);
        assert_eq!(unlock[&addr(5)], 1_700_000_000);
    }

    #[test]
    fn test_predictoor_data_keeps_accuracy_column() {
        let dir = tempdir().unwrap();
        let mut data = PredictoorSummaries::new();
        data.entry(addr(1)).or_default().insert(addr(2), PredictionSummary::new(4, 3));
        save_predictoor_data(dir.path(), &data).unwrap();

        let text = fs::read_to_string(dir.path().join(PREDICTOOR_DATA_CSV)).unwrap();
        assert!(text.contains("0.75"));
        assert_eq!(load_predictoor_data(dir.path()).unwrap(), data);
    }
}
