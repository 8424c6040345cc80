//! # Data Farming Economics - Weekly Reward Rounds
//!
//! Budgeting and allocation for the three reward streams of a Data Farming
//! round.
//!
//! ## Key Features
//!
//! - **Vesting schedule**: piecewise-constant weekly budget, then a 4-year half-life
//! - **Bounded volume rewards**: min of budget share, APY cap and DCV cap
//! - **Rank allocation**: top-N assets weighted by volume rank
//! - **Publisher boost**: owners staking on their own asset count double
//! - **Predictoor & challenge streams**: accuracy-weighted and fixed top-3 payouts
//!
//! ## Weekly Budget
//!
//! | DF Week | Weekly OCEAN |
//! |---------|--------------|
//! | ≤ 28 | 0 |
//! | 29 - 80 | 150,000 |
//! | 81 - 106 | 300,000 |
//! | 107 - 132 | 600,000 |
//! | ≥ 133 | half-life emission over 503.37M OCEAN |
//!
//! ## Reward Bound
//!
//! ```text
//! R[i,j] = min( perc_j · perc_ij · OCEAN_avail,     budget share
//!               L[i,j] · TARGET_WPY,                APY cap
//!               DCV_j / rate_OCEAN · perc_ij · M_j ) DCV cap
//! ```

pub mod calendar;
pub mod challenge;
pub mod multiplier;
pub mod predictoor;
pub mod rank;
pub mod rewards;
pub mod staking;
pub mod vesting;

// Re-exports
pub use calendar::{df_week, df_week_of_date, week_start_date};
pub use challenge::calc_challenge_rewards;
pub use multiplier::calc_dcv_multiplier;
pub use predictoor::calc_predictoor_rewards;
pub use rank::{rank_based_allocate, RankScaleOp};
pub use rewards::{RewardCalculator, RewardInputs, RewardParams, VolumeRewards};
pub use staking::{derive_locked_amounts, derive_stakes};
pub use vesting::{StreamBudgets, VestingSchedule};

/// Data Farming constants
pub mod constants {
    /// One OCEAN in wei
    pub const ONE_OCEAN: u128 = 1_000_000_000_000_000_000; // 10^18

    /// Seconds per DF week
    pub const WEEK_SECS: i64 = 7 * 24 * 3600;

    /// Unix time of Thursday 2022-09-29 00:00 UTC, the start of DF week 5
    pub const WEEK5_START_TS: i64 = 1_664_409_600;

    /// First numbered DF week
    pub const FIRST_DF_WEEK: i64 = 5;

    /// Target weekly yield on locked OCEAN (APY cap)
    pub const TARGET_WPY: f64 = 0.015717;

    /// DCV multiplier for predictoor feeds
    pub const PREDICTOOR_MULTIPLIER: f64 = 0.201;

    /// DCV multiplier floor
    pub const MIN_DCV_MULTIPLIER: f64 = 0.001;

    /// Weekly decay of the DCV multiplier
    pub const DCV_DECAY_PER_WEEK: f64 = 0.0485;

    /// First week the DCV multiplier is bounded
    pub const DCV_DECAY_START_WEEK: i64 = 9;

    /// Last week of the linear DCV decay
    pub const DCV_DECAY_END_WEEK: i64 = 28;

    /// Share of the weekly budget paid as active rewards (0.5)
    pub const ACTIVE_REWARDS_PERCENT: u128 = 50;

    /// First DF week with a predictoor stream
    pub const PREDICTOOR_RELEASE_WEEK: i64 = 62;

    /// Predictoor share of active rewards
    pub const PREDICTOOR_BUDGET_PERCENT: u128 = 1;

    /// Stake multiplier for an LP that owns the asset
    pub const PUBLISHER_BOOST: f64 = 2.0;

    /// Rewards below this are dropped
    pub const DUST_THRESHOLD: f64 = 1e-6;

    /// Relative float tolerance on the budget postcondition
    pub const BUDGET_TOLERANCE: f64 = 1e-13;

    /// Assets eligible under rank allocation
    pub const MAX_N_RANK_ASSETS: usize = 100;

    /// Predictoors below this many predictions get nothing
    pub const MIN_PREDICTIONS: u64 = 2;

    /// Emission half-life: 4 years in seconds
    pub const HALF_LIFE_SECS: u64 = 4 * 365 * 24 * 3600; // ~126,144,000 seconds

    /// OCEAN reserved for half-life emission
    pub const DF_TOTAL_SUPPLY: u128 = 503_370_000 * ONE_OCEAN;

    /// Unix time of Thursday 2025-03-13 00:00 UTC, start of DF week 133
    pub const VESTING_START_TS: i64 = 1_741_824_000;
}

pub use constants::*;

/// Convert a wei amount to OCEAN
pub fn from_wei(wei: u128) -> f64 {
    wei as f64 / ONE_OCEAN as f64
}

/// Convert an OCEAN amount to wei (negative and NaN amounts become 0)
pub fn to_wei(amount: f64) -> u128 {
    if amount.is_nan() || amount <= 0.0 {
        return 0;
    }
    (amount * ONE_OCEAN as f64) as u128
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_week5_start_is_thursday() {
        let start = chrono::DateTime::from_timestamp(WEEK5_START_TS, 0).unwrap();
        assert_eq!(start.date_naive().to_string(), "2022-09-29");
        assert_eq!(
            chrono::Datelike::weekday(&start.date_naive()),
            chrono::Weekday::Thu
        );
    }

    #[test]
    fn test_vesting_start_is_week_133() {
        assert_eq!(
            VESTING_START_TS,
            WEEK5_START_TS + (133 - FIRST_DF_WEEK) * WEEK_SECS
        );
    }

    #[test]
    fn test_wei_conversion() {
        assert_eq!(to_wei(1.5), 1_500_000_000_000_000_000);
        assert_eq!(to_wei(-3.0), 0);
        assert_eq!(to_wei(f64::NAN), 0);
        assert_eq!(from_wei(150_000 * ONE_OCEAN), 150_000.0);
    }
}
