//! # Volume Reward Calculation
//!
//! Distributes the weekly volume budget across `(chain, nft, lp)` positions.
//!
//! ## Steps
//!
//! 1. **USD volumes**: every nft's volume priced via its basetoken symbol
//! 2. **Index**: sorted LPs (`i`) × sorted `(chain, nft)` positions (`j`)
//! 3. **Publisher boost**: an owner staking on its own nft counts double
//! 4. **Asset share**: rank-based or pro-rata on USD volume
//! 5. **Bound**: `min(budget share, APY cap, DCV cap)` per entry
//! 6. **Cleanup**: dust removal, NaN check, budget postcondition
//!
//! Every stage works on dense matrices; nested maps only appear again in the
//! final reshape.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use df_core::normalize::{check_non_negative, nftvols_to_usd, validate_nested, validate_rates};
use df_core::{
    Address, ChainId, DfError, LockedAmounts, NftVols, Owners, PredictoorFeeds, Rates, Result,
    RewardInfo, RewardMap, Stakes, Symbol, Symbols, UsdVols,
};

use crate::constants::*;
use crate::multiplier::calc_dcv_multiplier;
use crate::rank::{rank_based_allocate, RankScaleOp};

/// Calculator switches
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RewardParams {
    /// Double the stake of an LP that owns the nft
    pub do_pubrewards: bool,

    /// Share the budget by volume rank instead of pro-rata
    pub do_rank: bool,

    /// Scale applied to ranks
    pub rank_scale_op: RankScaleOp,

    /// Assets eligible under rank allocation
    pub max_n_rank_assets: usize,
}

impl Default for RewardParams {
    fn default() -> Self {
        Self {
            do_pubrewards: true,
            do_rank: true,
            rank_scale_op: RankScaleOp::default(),
            max_n_rank_assets: MAX_N_RANK_ASSETS,
        }
    }
}

/// Normalized inputs of one round, borrowed for the duration of a calculation
#[derive(Clone, Copy, Debug)]
pub struct RewardInputs<'a> {
    pub stakes: &'a Stakes,
    pub locked: &'a LockedAmounts,
    pub nftvols: &'a NftVols,
    pub owners: &'a Owners,
    pub symbols: &'a Symbols,
    pub rates: &'a Rates,
    pub predictoor_feeds: &'a PredictoorFeeds,
    /// DF week of the round
    pub week: i64,
    /// Volume budget in OCEAN
    pub ocean_avail: f64,
}

/// Result of a volume reward calculation
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeRewards {
    /// `chain → lp → OCEAN`
    pub rewards: RewardMap,
    /// `chain → nft → lp → OCEAN`
    pub rewards_info: RewardInfo,
}

impl VolumeRewards {
    /// Total OCEAN paid
    pub fn total(&self) -> f64 {
        df_core::sum_rewards(&self.rewards)
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }
}

/// Row-major dense matrix over `(lp, position)`
#[derive(Clone, Debug)]
struct Matrix {
    n_cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    fn zeros(n_rows: usize, n_cols: usize) -> Self {
        Self {
            n_cols,
            data: vec![0.0; n_rows * n_cols],
        }
    }

    fn n_rows(&self) -> usize {
        if self.n_cols == 0 {
            0
        } else {
            self.data.len() / self.n_cols
        }
    }

    fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n_cols + j]
    }

    fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.n_cols + j] = value;
    }

    fn col_sum(&self, j: usize) -> f64 {
        (0..self.n_rows()).map(|i| self.get(i, j)).sum()
    }

    fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    fn map_in_place(&mut self, f: impl Fn(f64) -> f64) {
        for value in &mut self.data {
            *value = f(*value);
        }
    }
}

/// Sorted LP and position enumerations
#[derive(Debug)]
struct PositionIndex {
    lps: Vec<Address>,
    lp_index: BTreeMap<Address, usize>,
    positions: Vec<(ChainId, Address)>,
}

impl PositionIndex {
    /// LPs are everyone with a stake; positions are nfts that have both
    /// volume and stake on the same chain
    fn build(stakes: &Stakes, usd_vols: &UsdVols) -> Self {
        let lps: Vec<Address> = stakes
            .values()
            .flat_map(|by_nft| by_nft.values())
            .flat_map(|by_lp| by_lp.keys())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let lp_index = lps
            .iter()
            .enumerate()
            .map(|(i, lp)| (lp.clone(), i))
            .collect();

        let mut positions = Vec::new();
        for (chain_id, by_nft) in usd_vols {
            let Some(staked) = stakes.get(chain_id) else {
                continue;
            };
            for nft in by_nft.keys() {
                if staked.contains_key(nft) {
                    positions.push((*chain_id, nft.clone()));
                }
            }
        }

        Self {
            lps,
            lp_index,
            positions,
        }
    }

    fn n_lps(&self) -> usize {
        self.lps.len()
    }

    fn n_positions(&self) -> usize {
        self.positions.len()
    }
}

/// Volume reward calculator
pub struct RewardCalculator {
    params: RewardParams,
}

impl RewardCalculator {
    /// Create a new calculator
    pub fn new(params: RewardParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RewardParams {
        &self.params
    }

    /// Compute the rewards of one round
    pub fn calculate(&self, inputs: &RewardInputs<'_>) -> Result<VolumeRewards> {
        check_non_negative("OCEAN_avail", inputs.ocean_avail)?;
        validate_nested("stake", inputs.stakes)?;
        validate_nested("locked amount", inputs.locked)?;
        validate_nested("volume", inputs.nftvols)?;
        validate_rates(inputs.rates)?;

        let usd_vols = nftvols_to_usd(inputs.nftvols, inputs.symbols, inputs.rates);
        let index = PositionIndex::build(inputs.stakes, &usd_vols);

        if index.n_lps() == 0 || index.n_positions() == 0 {
            info!(
                n_lps = index.n_lps(),
                n_positions = index.n_positions(),
                "No staked volume this round"
            );
            return Ok(VolumeRewards::default());
        }

        // Index construction
        let (n_i, n_j) = (index.n_lps(), index.n_positions());
        let mut stake = Matrix::zeros(n_i, n_j);
        let mut locked = Matrix::zeros(n_i, n_j);
        let mut v_usd = vec![0.0; n_j];
        let mut multiplier = vec![0.0; n_j];
        let mut owner_idx: Vec<Option<usize>> = vec![None; n_j];

        for (j, (chain_id, nft)) in index.positions.iter().enumerate() {
            if let Some(by_lp) = inputs.stakes.get(chain_id).and_then(|m| m.get(nft)) {
                for (lp, amount) in by_lp {
                    stake.set(index.lp_index[lp], j, *amount);
                }
            }
            if let Some(by_lp) = inputs.locked.get(chain_id).and_then(|m| m.get(nft)) {
                for (lp, amount) in by_lp {
                    // Locked OCEAN without a matching stake earns nothing
                    if let Some(i) = index.lp_index.get(lp) {
                        locked.set(*i, j, *amount);
                    }
                }
            }

            v_usd[j] = usd_vols[chain_id][nft];

            let is_predictoor = inputs
                .predictoor_feeds
                .get(chain_id)
                .is_some_and(|feeds| feeds.contains(nft));
            multiplier[j] = calc_dcv_multiplier(inputs.week, is_predictoor);

            owner_idx[j] = inputs
                .owners
                .get(chain_id)
                .and_then(|m| m.get(nft))
                .and_then(|owner| index.lp_index.get(owner).copied());
        }

        let total_vol: f64 = v_usd.iter().sum();
        if total_vol <= 0.0 {
            info!("Total USD volume is zero, no rewards");
            return Ok(VolumeRewards::default());
        }

        let rate_ocean = inputs
            .rates
            .get(&Symbol::ocean())
            .copied()
            .ok_or_else(|| DfError::MissingRate(Symbol::ocean().to_string()))?;
        if rate_ocean <= 0.0 {
            return Err(DfError::InvalidInput(format!(
                "OCEAN rate must be positive, got {rate_ocean}"
            )));
        }

        info!(
            week = inputs.week,
            n_lps = n_i,
            n_positions = n_j,
            total_vol_usd = total_vol,
            ocean_avail = inputs.ocean_avail,
            "Calculating volume rewards"
        );

        // Publisher boost
        if self.params.do_pubrewards {
            for (j, owner) in owner_idx.iter().enumerate() {
                if let Some(i) = owner {
                    stake.set(*i, j, stake.get(*i, j) * PUBLISHER_BOOST);
                }
            }
        }

        let perc_per_j = self.asset_shares(&v_usd, total_vol)?;

        // Bounded rewards
        let mut rewards = Matrix::zeros(n_i, n_j);
        for j in 0..n_j {
            let stake_j = stake.col_sum(j);
            let dcv_ocean_j = v_usd[j] / rate_ocean;
            if stake_j == 0.0 || dcv_ocean_j == 0.0 {
                continue;
            }

            for i in 0..n_i {
                let s_ij = stake.get(i, j);
                if s_ij == 0.0 {
                    continue;
                }
                let perc_at_ij = s_ij / stake_j;

                let reward_candidate = perc_per_j[j] * perc_at_ij * inputs.ocean_avail;
                let apy_bound = locked.get(i, j) * TARGET_WPY;
                let dcv_bound = dcv_ocean_j * perc_at_ij * multiplier[j];

                rewards.set(i, j, reward_candidate.min(apy_bound).min(dcv_bound));
            }
        }

        // Cleanup
        rewards.map_in_place(|r| if r < DUST_THRESHOLD { 0.0 } else { r });

        if rewards.data.iter().any(|r| r.is_nan()) {
            return Err(DfError::NanReward);
        }

        let total = rewards.sum();
        if total == 0.0 {
            info!("All rewards bounded to zero");
            return Ok(VolumeRewards::default());
        }

        let ceiling = inputs.ocean_avail * (1.0 + BUDGET_TOLERANCE);
        if total > ceiling {
            return Err(DfError::BudgetExceeded {
                total,
                budget: inputs.ocean_avail,
            });
        }
        if total > inputs.ocean_avail {
            warn!(total, budget = inputs.ocean_avail, "Scaling down float drift");
            rewards.map_in_place(|r| r / (1.0 + BUDGET_TOLERANCE));
        }

        let result = Self::reshape(&index, &rewards);
        info!(
            total_rewards = result.total(),
            n_rewarded = result.rewards.values().map(|m| m.len()).sum::<usize>(),
            "Volume rewards calculated"
        );
        Ok(result)
    }

    /// Fraction of the budget per position
    fn asset_shares(&self, v_usd: &[f64], total_vol: f64) -> Result<Vec<f64>> {
        if !self.params.do_rank {
            return Ok(v_usd.iter().map(|v| v / total_vol).collect());
        }

        // Zero-volume positions are outside the ranking
        let ranked: Vec<usize> = (0..v_usd.len()).filter(|j| v_usd[*j] > 0.0).collect();
        let vols: Vec<f64> = ranked.iter().map(|j| v_usd[*j]).collect();
        let perc = rank_based_allocate(
            &vols,
            self.params.max_n_rank_assets,
            self.params.rank_scale_op,
        )?;

        let mut perc_per_j = vec![0.0; v_usd.len()];
        for (k, j) in ranked.iter().enumerate() {
            perc_per_j[*j] = perc[k];
        }
        debug!(n_ranked = ranked.len(), op = %self.params.rank_scale_op, "Rank shares");
        Ok(perc_per_j)
    }

    /// Back to nested maps, omitting zeros
    fn reshape(index: &PositionIndex, rewards: &Matrix) -> VolumeRewards {
        let mut out = VolumeRewards::default();

        for (j, (chain_id, nft)) in index.positions.iter().enumerate() {
            for (i, lp) in index.lps.iter().enumerate() {
                let amount = rewards.get(i, j);
                if amount == 0.0 {
                    continue;
                }
                *out.rewards
                    .entry(*chain_id)
                    .or_default()
                    .entry(lp.clone())
                    .or_default() += amount;
                out.rewards_info
                    .entry(*chain_id)
                    .or_default()
                    .entry(nft.clone())
                    .or_default()
                    .insert(lp.clone(), amount);
            }
        }
        out
    }
}

impl Default for RewardCalculator {
    fn default() -> Self {
        Self::new(RewardParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    /// Owned inputs for a single-chain round priced in OCEAN
    #[derive(Default)]
    struct Round {
        stakes: Stakes,
        locked: LockedAmounts,
        nftvols: NftVols,
        owners: Owners,
        symbols: Symbols,
        rates: Rates,
        feeds: PredictoorFeeds,
    }

    impl Round {
        fn new() -> Self {
            let mut round = Self::default();
            round
                .symbols
                .entry(1)
                .or_default()
                .insert(addr(0xcc), Symbol::ocean());
            round.rates.insert(Symbol::ocean(), 1.0);
            round
        }

        fn stake(mut self, nft: u8, lp: u8, amount: f64) -> Self {
            self.stakes.entry(1).or_default().entry(addr(nft)).or_default().insert(addr(lp), amount);
            self.locked.entry(1).or_default().entry(addr(nft)).or_default().insert(addr(lp), amount);
            self
        }

        fn volume(mut self, nft: u8, vol: f64) -> Self {
            self.nftvols.entry(1).or_default().entry(addr(0xcc)).or_default().insert(addr(nft), vol);
            self
        }

        fn inputs(&self, week: i64, ocean_avail: f64) -> RewardInputs<'_> {
            RewardInputs {
                stakes: &self.stakes,
                locked: &self.locked,
                nftvols: &self.nftvols,
                owners: &self.owners,
                symbols: &self.symbols,
                rates: &self.rates,
                predictoor_feeds: &self.feeds,
                week,
                ocean_avail,
            }
        }
    }

    fn pro_rata() -> RewardCalculator {
        RewardCalculator::new(RewardParams {
            do_rank: false,
            ..Default::default()
        })
    }

    #[test]
    fn test_matrix_sums() {
        let mut m = Matrix::zeros(2, 3);
        m.set(0, 1, 2.0);
        m.set(1, 1, 3.0);
        m.set(1, 2, 1.0);
        assert_eq!(m.n_rows(), 2);
        assert_eq!(m.col_sum(1), 5.0);
        assert_eq!(m.sum(), 6.0);
    }

    #[test]
    fn test_positions_need_stake_and_volume() {
        let round = Round::new()
            .stake(1, 10, 100.0)
            .stake(2, 11, 100.0)
            .volume(1, 5.0)
            .volume(3, 5.0);
        let usd = nftvols_to_usd(&round.nftvols, &round.symbols, &round.rates);
        let index = PositionIndex::build(&round.stakes, &usd);

        assert_eq!(index.lps, vec![addr(10), addr(11)]);
        assert_eq!(index.positions, vec![(1, addr(1))]);
    }

    #[test]
    fn test_pro_rata_split() {
        let round = Round::new()
            .stake(1, 10, 1e6)
            .stake(2, 11, 1e6)
            .volume(1, 300.0)
            .volume(2, 100.0);
        let result = pro_rata().calculate(&round.inputs(7, 100.0)).unwrap();

        assert!((result.rewards[&1][&addr(10)] - 75.0).abs() < 1e-9);
        assert!((result.rewards[&1][&addr(11)] - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_volume_no_rewards() {
        let round = Round::new().stake(1, 10, 100.0);
        let result = RewardCalculator::default().calculate(&round.inputs(7, 100.0)).unwrap();
        assert!(result.is_empty());

        let zero_vol = Round::new().stake(1, 10, 100.0).volume(1, 0.0);
        let result = RewardCalculator::default().calculate(&zero_vol.inputs(7, 100.0)).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_dust_is_dropped() {
        // APY cap of 1e-5 locked OCEAN is below the dust threshold
        let round = Round::new().stake(1, 10, 1e-5).volume(1, 10.0);
        let result = RewardCalculator::default().calculate(&round.inputs(7, 100.0)).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_predictoor_feed_multiplier() {
        let mut round = Round::new().stake(1, 10, 1e9).volume(1, 1_000.0);
        round.feeds.entry(1).or_default().insert(addr(1));

        let result = RewardCalculator::default().calculate(&round.inputs(60, 10_000.0)).unwrap();
        let expected = 1_000.0 * PREDICTOOR_MULTIPLIER;
        assert!((result.total() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_missing_ocean_rate_fails() {
        let mut round = Round::new().stake(1, 10, 100.0).volume(1, 10.0);
        round.rates.insert(Symbol::new("USDC"), 1.0);
        round
            .symbols
            .entry(1)
            .or_default()
            .insert(addr(0xcc), Symbol::new("USDC"));
        round.rates.remove(&Symbol::ocean());

        let err = RewardCalculator::default().calculate(&round.inputs(7, 10.0)).unwrap_err();
        assert_eq!(err, DfError::MissingRate("OCEAN".into()));
    }

    #[test]
    fn test_negative_budget_rejected() {
        let round = Round::new().stake(1, 10, 100.0).volume(1, 10.0);
        assert!(RewardCalculator::default().calculate(&round.inputs(7, -1.0)).is_err());
    }

    #[test]
    fn test_rewards_info_aggregates() {
        let round = Round::new()
            .stake(1, 10, 1e6)
            .stake(1, 11, 2e6)
            .stake(2, 10, 1e6)
            .volume(1, 40.0)
            .volume(2, 20.0);
        let result = RewardCalculator::default().calculate(&round.inputs(7, 50.0)).unwrap();

        assert_eq!(df_core::aggregate_reward_info(&result.rewards_info), result.rewards);
        assert!(result.total() <= 50.0 * (1.0 + BUDGET_TOLERANCE));
    }
}
