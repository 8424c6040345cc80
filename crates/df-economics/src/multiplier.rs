//! # DCV Multiplier
//!
//! Caps an asset's rewards at a multiple of its data consumption value.
//!
//! | DF Week | Multiplier |
//! |---------|------------|
//! | < 9 | unbounded |
//! | 9 - 28 | 1.0 decaying by 0.0485 per week |
//! | > 28 | 0.001 |
//! | predictoor feed | 0.201 |

use crate::constants::*;

/// DCV multiplier for an asset in a DF week
pub fn calc_dcv_multiplier(week: i64, is_predictoor: bool) -> f64 {
    if is_predictoor {
        return PREDICTOOR_MULTIPLIER;
    }

    if week < DCV_DECAY_START_WEEK {
        return f64::INFINITY;
    }

    if week <= DCV_DECAY_END_WEEK {
        let decayed = -DCV_DECAY_PER_WEEK * (week - DCV_DECAY_START_WEEK) as f64 + 1.0;
        return decayed.max(MIN_DCV_MULTIPLIER);
    }

    MIN_DCV_MULTIPLIER
}
