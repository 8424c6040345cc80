//! # Rank Allocation
//!
//! Splits the volume budget across assets by volume rank instead of
//! pro-rata volume. Only the top `max_n_rank_assets` ranks get a share.
//!
//! | Scale | Raw allocation for rank r |
//! |-------|---------------------------|
//! | LIN | max(r) - r + 1 |
//! | SQRT | max(√r) - √r + 1 |
//! | POW2 | (max(r) - r + 1)² |
//! | POW4 | (max(r) - r + 1)⁴ |
//! | LOG | max(log₁₀ r) - log₁₀ r + log₁₀ 1.5 |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use df_core::{DfError, Result};

/// Tolerance on the allocation summing to 1
pub const RANK_SUM_TOLERANCE: f64 = 1e-8;

/// Rank scaling operation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RankScaleOp {
    Lin,
    Sqrt,
    Pow2,
    Pow4,
    #[default]
    Log,
}

impl RankScaleOp {
    /// Raw (unnormalized) allocations for the kept ranks
    fn raw_allocations(&self, ranks: &[f64]) -> Vec<f64> {
        let max_of = |f: fn(f64) -> f64| ranks.iter().map(|r| f(*r)).fold(f64::MIN, f64::max);

        match self {
            Self::Lin => {
                let max_r = max_of(|r| r);
                ranks.iter().map(|r| max_r - r + 1.0).collect()
            }
            Self::Sqrt => {
                let max_sqrt = max_of(f64::sqrt);
                ranks.iter().map(|r| max_sqrt - r.sqrt() + 1.0).collect()
            }
            Self::Pow2 => {
                let max_r = max_of(|r| r);
                ranks.iter().map(|r| (max_r - r + 1.0).powi(2)).collect()
            }
            Self::Pow4 => {
                let max_r = max_of(|r| r);
                ranks.iter().map(|r| (max_r - r + 1.0).powi(4)).collect()
            }
            Self::Log => {
                let max_log = max_of(f64::log10);
                ranks
                    .iter()
                    .map(|r| max_log - r.log10() + 1.5f64.log10())
                    .collect()
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Lin => "LIN",
            Self::Sqrt => "SQRT",
            Self::Pow2 => "POW2",
            Self::Pow4 => "POW4",
            Self::Log => "LOG",
        }
    }
}

impl fmt::Display for RankScaleOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RankScaleOp {
    type Err = DfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LIN" => Ok(Self::Lin),
            "SQRT" => Ok(Self::Sqrt),
            "POW2" => Ok(Self::Pow2),
            "POW4" => Ok(Self::Pow4),
            "LOG" => Ok(Self::Log),
            other => Err(DfError::InvalidInput(format!("unknown rank scale op {other:?}"))),
        }
    }
}

/// Rank values so the largest gets rank 1; ties share the lowest rank ("min")
pub fn rank_descending(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|a, b| values[*b].total_cmp(&values[*a]));

    let mut ranks = vec![0usize; values.len()];
    for (pos, idx) in order.iter().enumerate() {
        ranks[*idx] = if pos > 0 && values[order[pos - 1]] == values[*idx] {
            ranks[order[pos - 1]]
        } else {
            pos + 1
        };
    }
    ranks
}

/// Fraction of the budget per asset, from USD volumes
///
/// Every volume must be strictly positive. The result sums to 1 within
/// [`RANK_SUM_TOLERANCE`]; assets ranked below `max_n_rank_assets` get 0.
pub fn rank_based_allocate(
    v_usd: &[f64],
    max_n_rank_assets: usize,
    op: RankScaleOp,
) -> Result<Vec<f64>> {
    if v_usd.is_empty() {
        return Ok(Vec::new());
    }
    if let Some(bad) = v_usd.iter().find(|v| v.is_nan() || **v <= 0.0) {
        return Err(DfError::NonPositiveVolume(*bad));
    }

    let ranks = rank_descending(v_usd);
    let max_n = v_usd.len().min(max_n_rank_assets.max(1));

    let kept: Vec<usize> = (0..v_usd.len()).filter(|i| ranks[*i] <= max_n).collect();
    let kept_ranks: Vec<f64> = kept.iter().map(|i| ranks[*i] as f64).collect();
    let raw = op.raw_allocations(&kept_ranks);
    let total: f64 = raw.iter().sum();

    let mut perc = vec![0.0; v_usd.len()];
    for (k, idx) in kept.iter().enumerate() {
        perc[*idx] = raw[k] / total;
    }

    let sum: f64 = perc.iter().sum();
    if (sum - 1.0).abs() > RANK_SUM_TOLERANCE {
        return Err(DfError::InvalidInput(format!(
            "rank allocation sums to {sum}"
        )));
    }
    Ok(perc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranks_with_min_ties() {
        assert_eq!(rank_descending(&[10.0, 99.0, 3.0]), vec![2, 1, 3]);
        assert_eq!(rank_descending(&[5.0, 7.0, 5.0, 1.0]), vec![2, 1, 2, 4]);
    }

    #[test]
    fn test_log_allocation() {
        let perc = rank_based_allocate(&[10.0, 99.0, 3.0], 100, RankScaleOp::Log).unwrap();
        assert!((perc[0] - 0.298).abs() < 1e-3);
        assert!((perc[1] - 0.553).abs() < 1e-3);
        assert!((perc[2] - 0.149).abs() < 1e-3);
        assert!((perc.iter().sum::<f64>() - 1.0).abs() < RANK_SUM_TOLERANCE);
    }

    #[test]
    fn test_lin_allocation() {
        // ranks [2, 1, 3] → raw [2, 3, 1] / 6
        let perc = rank_based_allocate(&[10.0, 99.0, 3.0], 100, RankScaleOp::Lin).unwrap();
        assert!((perc[0] - 2.0 / 6.0).abs() < 1e-12);
        assert!((perc[1] - 3.0 / 6.0).abs() < 1e-12);
        assert!((perc[2] - 1.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_pow_allocations_favor_top() {
        let v = [10.0, 99.0, 3.0];
        let lin = rank_based_allocate(&v, 100, RankScaleOp::Lin).unwrap();
        let pow2 = rank_based_allocate(&v, 100, RankScaleOp::Pow2).unwrap();
        let pow4 = rank_based_allocate(&v, 100, RankScaleOp::Pow4).unwrap();
        assert!(pow2[1] > lin[1]);
        assert!(pow4[1] > pow2[1]);

        let sqrt = rank_based_allocate(&v, 100, RankScaleOp::Sqrt).unwrap();
        assert!((sqrt.iter().sum::<f64>() - 1.0).abs() < RANK_SUM_TOLERANCE);
    }

    #[test]
    fn test_only_top_n_rewarded() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        let perc = rank_based_allocate(&v, 2, RankScaleOp::Lin).unwrap();
        assert_eq!(perc[0], 0.0);
        assert_eq!(perc[1], 0.0);
        assert_eq!(perc[2], 0.0);
        assert!(perc[3] > 0.0 && perc[4] > perc[3]);
        assert!((perc.iter().sum::<f64>() - 1.0).abs() < RANK_SUM_TOLERANCE);
    }

    #[test]
    fn test_single_asset_gets_everything() {
        for op in [RankScaleOp::Lin, RankScaleOp::Sqrt, RankScaleOp::Pow2, RankScaleOp::Pow4, RankScaleOp::Log] {
            assert_eq!(rank_based_allocate(&[42.0], 100, op).unwrap(), vec![1.0]);
        }
    }

    #[test]
    fn test_non_positive_volume_fails() {
        assert!(rank_based_allocate(&[1.0, 0.0], 100, RankScaleOp::Log).is_err());
        assert!(rank_based_allocate(&[1.0, -2.0], 100, RankScaleOp::Log).is_err());
        assert!(rank_based_allocate(&[], 100, RankScaleOp::Log).unwrap().is_empty());
    }

    #[test]
    fn test_parse_scale_op() {
        assert_eq!("log".parse::<RankScaleOp>().unwrap(), RankScaleOp::Log);
        assert_eq!("POW4".parse::<RankScaleOp>().unwrap(), RankScaleOp::Pow4);
        assert!("cubic".parse::<RankScaleOp>().is_err());
        assert_eq!(RankScaleOp::default().to_string(), "LOG");
    }
}
