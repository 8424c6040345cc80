//! # Block-Range Sampling
//!
//! veOCEAN balances and allocations are read at evenly spaced blocks over
//! the round and averaged, so last-minute locks earn only for the time they
//! were actually held.

use std::collections::BTreeMap;
use tracing::debug;

use df_core::{Address, Allocations};

use crate::rpc::ChainClock;
use crate::{BridgeError, Result};

/// Last block whose timestamp is at or before `ts`
pub async fn block_at_timestamp<C: ChainClock + ?Sized>(clock: &C, ts: i64) -> Result<u64> {
    let latest = clock.latest_block().await?;
    if clock.block_timestamp(latest).await? <= ts {
        return Ok(latest);
    }
    if clock.block_timestamp(0).await? > ts {
        return Err(BridgeError::InvalidInput(format!(
            "timestamp {ts} is before the first block"
        )));
    }

    // Invariant: ts(lo) <= ts < ts(hi)
    let (mut lo, mut hi) = (0u64, latest);
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if clock.block_timestamp(mid).await? <= ts {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    debug!(ts, block = lo, "Resolved block");
    Ok(lo)
}

/// Inclusive block range with a sample count
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockRange {
    pub st: u64,
    pub fin: u64,
    pub n_samples: usize,
}

impl BlockRange {
    pub fn new(st: u64, fin: u64, n_samples: usize) -> Result<Self> {
        if st > fin {
            return Err(BridgeError::InvalidInput(format!(
                "block range start {st} after end {fin}"
            )));
        }
        if n_samples == 0 {
            return Err(BridgeError::InvalidInput("need at least one sample".into()));
        }
        Ok(Self { st, fin, n_samples })
    }

    /// Range covering `[st_ts, fin_ts]`
    pub async fn from_timestamps<C: ChainClock + ?Sized>(
        clock: &C,
        st_ts: i64,
        fin_ts: i64,
        n_samples: usize,
    ) -> Result<Self> {
        let st = block_at_timestamp(clock, st_ts).await?;
        let fin = block_at_timestamp(clock, fin_ts).await?;
        Self::new(st, fin, n_samples)
    }

    pub fn num_blocks(&self) -> u64 {
        self.fin - self.st + 1
    }

    /// Evenly spaced blocks from `st` to `fin`, both ends included
    pub fn sample_blocks(&self) -> Vec<u64> {
        let n = (self.n_samples as u64).min(self.num_blocks());
        if n <= 1 {
            return vec![self.st];
        }
        let span = self.fin - self.st;
        (0..n).map(|k| self.st + span * k / (n - 1)).collect()
    }
}

/// Per-LP mean across samples; an LP missing from a sample counts as 0 there
pub fn average_balances(samples: &[BTreeMap<Address, f64>]) -> BTreeMap<Address, f64> {
    let mut totals: BTreeMap<Address, f64> = BTreeMap::new();
    for sample in samples {
        for (lp, value) in sample {
            *totals.entry(lp.clone()).or_default() += value;
        }
    }
    let n = samples.len().max(1) as f64;
    totals.values_mut().for_each(|v| *v /= n);
    totals
}

/// Per-position mean of allocations across samples
pub fn average_allocations(samples: &[Allocations]) -> Allocations {
    let mut totals = Allocations::new();
    for sample in samples {
        for (chain_id, by_nft) in sample {
            for (nft, by_lp) in by_nft {
                for (lp, fraction) in by_lp {
                    *totals
                        .entry(*chain_id)
                        .or_default()
                        .entry(nft.clone())
                        .or_default()
                        .entry(lp.clone())
                        .or_default() += fraction;
                }
            }
        }
    }
    let n = samples.len().max(1) as f64;
    for by_nft in totals.values_mut() {
        for by_lp in by_nft.values_mut() {
            by_lp.values_mut().for_each(|v| *v /= n);
        }
    }
    totals
}
