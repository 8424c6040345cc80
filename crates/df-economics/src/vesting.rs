//! # Vesting Schedule
//!
//! Weekly OCEAN budget for Data Farming.
//!
//! ## Schedule
//!
//! ```text
//! Week   1-28:        0 OCEAN/week
//! Week  29-80:  150,000 OCEAN/week
//! Week  81-106: 300,000 OCEAN/week
//! Week 107-132: 600,000 OCEAN/week
//! Week 133+:    half-life emission, half-life 4 years
//! ```
//!
//! The half-life curve follows the on-chain vesting wallet: within each
//! half-life period the vested amount grows linearly, and each period
//! releases half of what the previous one did.
//!
//! ```text
//! vested(V, t, h) = V - p + (p · (t mod h)) / (2h)      p = V >> (t / h)
//! ```

use serde::{Deserialize, Serialize};

use crate::calendar::df_week;
use crate::constants::*;
use crate::{from_wei, to_wei};

/// Piecewise-constant budget: `(last week of the step, OCEAN per week)`
const STEP_SCHEDULE: [(i64, u128); 4] = [
    (28, 0),
    (80, 150_000),
    (106, 300_000),
    (132, 600_000),
];

/// Amount vested by time `t` out of `value` with half-life `h`
///
/// Integer arithmetic, matching the vesting wallet to the wei.
pub fn halflife(value: u128, t: u64, h: u64) -> u128 {
    let periods = t / h;
    if periods >= 128 {
        return value;
    }
    let p = value >> periods;
    let t_in_period = (t % h) as u128;
    value - p + (p * t_in_period) / (2 * h as u128)
}

/// Per-stream split of one week's active rewards
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamBudgets {
    /// DF week
    pub week: i64,
    /// Total active rewards (wei)
    pub total: u128,
    /// Volume stream (wei)
    pub volume: u128,
    /// Predictoor stream (wei)
    pub predictoor: u128,
}

impl StreamBudgets {
    /// Split a total: 1% to predictoors once they are live, the rest to volume
    pub fn from_total(total: u128, week: i64) -> Self {
        let predictoor = if week >= PREDICTOOR_RELEASE_WEEK {
            total * PREDICTOOR_BUDGET_PERCENT / 100
        } else {
            0
        };
        Self {
            week,
            total,
            volume: total - predictoor,
            predictoor,
        }
    }

    /// Streams sum to the total
    pub fn verify(&self) -> bool {
        self.volume + self.predictoor == self.total
    }

    pub fn volume_ocean(&self) -> f64 {
        from_wei(self.volume)
    }

    pub fn predictoor_ocean(&self) -> f64 {
        from_wei(self.predictoor)
    }

    pub fn total_ocean(&self) -> f64 {
        from_wei(self.total)
    }
}

/// Vesting schedule manager
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VestingSchedule {
    /// OCEAN released by the half-life curve (wei)
    pub total_supply: u128,
    /// Half-life in seconds: 4 years
    pub half_life: u64,
    /// Unix time the half-life curve starts
    pub vesting_start: i64,
}

impl Default for VestingSchedule {
    fn default() -> Self {
        Self {
            total_supply: DF_TOTAL_SUPPLY,
            half_life: HALF_LIFE_SECS,
            vesting_start: VESTING_START_TS,
        }
    }
}

impl VestingSchedule {
    /// Amount vested by the half-life curve at a timestamp
    pub fn vested_at(&self, timestamp: i64) -> u128 {
        let t = timestamp.saturating_sub(self.vesting_start).max(0) as u64;
        halflife(self.total_supply, t, self.half_life)
    }

    /// Weekly budget in wei for the week starting at `week_start`
    pub fn weekly_budget_wei(&self, week_start: i64) -> u128 {
        let week = df_week(week_start);

        for (last_week, ocean) in STEP_SCHEDULE {
            if week <= last_week {
                return ocean * ONE_OCEAN;
            }
        }

        self.vested_at(week_start + WEEK_SECS) - self.vested_at(week_start)
    }

    /// Active rewards for the week: [`ACTIVE_REWARDS_PERCENT`] of the
    /// weekly budget
    pub fn active_reward_week_wei(&self, week_start: i64) -> u128 {
        self.weekly_budget_wei(week_start) * ACTIVE_REWARDS_PERCENT / 100
    }

    /// Stream budgets for a week; a positive `tot_ocean` overrides the schedule
    pub fn stream_budgets(&self, week_start: i64, tot_ocean: Option<f64>) -> StreamBudgets {
        let week = df_week(week_start);
        let total = match tot_ocean {
            Some(amount) if amount > 0.0 => to_wei(amount),
            _ => self.active_reward_week_wei(week_start),
        };
        StreamBudgets::from_total(total, week)
    }
}
