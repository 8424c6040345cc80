//! # Challenge Rewards
//!
//! Fixed top-3 payouts for the weekly prediction challenge, quoted in USDT
//! and paid in OCEAN.
//!
//! | Period | 1st | 2nd | 3rd |
//! |--------|-----|-----|-----|
//! | before 2023-05-11 | 0 | 0 | 0 |
//! | before predictoor release | 625 | 375 | 250 |
//! | after predictoor release | 500 | 300 | 200 |

use chrono::NaiveDate;
use tracing::info;

use df_core::{Address, ChallengeEntry, ChallengeReward, DfError, Result};

use crate::calendar::{date_start_ts, df_week_of_date};
use crate::constants::PREDICTOOR_RELEASE_WEEK;

/// Unix time of 2023-05-11 00:00 UTC, the first day challenge winners are paid
pub const CHALLENGE_FIRST_TS: i64 = 1_683_763_200;

/// Number of paid places
pub const N_WINNERS: usize = 3;

/// USDT payouts before the predictoor stream launched
pub const USDT_AMOUNTS_PRE_PREDICTOOR: [f64; N_WINNERS] = [625.0, 375.0, 250.0];

/// USDT payouts once the predictoor stream is live
pub const USDT_AMOUNTS: [f64; N_WINNERS] = [500.0, 300.0, 200.0];

/// USDT payout schedule in force on `date`
pub fn usdt_amounts(date: NaiveDate) -> [f64; N_WINNERS] {
    if date_start_ts(date) < CHALLENGE_FIRST_TS {
        [0.0; N_WINNERS]
    } else if df_week_of_date(date) < PREDICTOOR_RELEASE_WEEK {
        USDT_AMOUNTS_PRE_PREDICTOOR
    } else {
        USDT_AMOUNTS
    }
}

/// Submitters ordered best first (ascending NMSE)
pub fn winners_from_entries(entries: &[ChallengeEntry]) -> Vec<Address> {
    let mut sorted: Vec<&ChallengeEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.nmse.total_cmp(&b.nmse));
    sorted.into_iter().map(|e| e.from_addr.clone()).collect()
}

/// Payouts for the top three `winners` on `date`
///
/// `ocean_usdt_rate` is the OCEAN price in USDT; it only matters once the
/// challenge pays out.
pub fn calc_challenge_rewards(
    winners: &[Address],
    date: NaiveDate,
    ocean_usdt_rate: f64,
) -> Result<Vec<ChallengeReward>> {
    if winners.len() < N_WINNERS {
        return Err(DfError::InvalidInput(format!(
            "need at least {N_WINNERS} challenge winners, got {}",
            winners.len()
        )));
    }

    let amounts = usdt_amounts(date);
    let paying = amounts.iter().any(|a| *a > 0.0);
    if paying && (ocean_usdt_rate.is_nan() || ocean_usdt_rate <= 0.0) {
        return Err(DfError::InvalidInput(format!(
            "OCEAN/USDT rate must be positive, got {ocean_usdt_rate}"
        )));
    }

    let rewards: Vec<ChallengeReward> = winners
        .iter()
        .zip(amounts)
        .map(|(winner, usdt)| ChallengeReward {
            winner_addr: winner.clone(),
            ocean_amt: if paying { usdt / ocean_usdt_rate } else { 0.0 },
        })
        .collect();

    info!(%date, paying, "Challenge rewards calculated");
    Ok(rewards)
}
