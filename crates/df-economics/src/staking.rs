//! # Stake Derivation
//!
//! Turns fractional allocations into absolute positions.
//!
//! ```text
//! stake[c][n][lp]  = allocation[c][n][lp] × veBalance[lp]
//! locked[c][n][lp] = allocation[c][n][lp] × lockedOcean[lp]
//! ```
//!
//! An LP with no balance contributes nothing; that is not an error.

use std::collections::BTreeMap;

use df_core::normalize::{validate_allocations, validate_balances};
use df_core::{Address, Allocations, ChainNftLp, LockedAmounts, LockedBalances, Result, Stakes, VeBalances};

fn scale_allocations(
    allocations: &Allocations,
    per_lp: &BTreeMap<Address, f64>,
) -> ChainNftLp<f64> {
    let mut out = ChainNftLp::new();
    for (chain_id, by_nft) in allocations {
        for (nft, by_lp) in by_nft {
            for (lp, fraction) in by_lp {
                let amount = fraction * per_lp.get(lp).copied().unwrap_or(0.0);
                if amount <= 0.0 {
                    continue;
                }
                out.entry(*chain_id)
                    .or_default()
                    .entry(nft.clone())
                    .or_default()
                    .insert(lp.clone(), amount);
            }
        }
    }
    out
}

/// Absolute veToken stakes
pub fn derive_stakes(allocations: &Allocations, balances: &VeBalances) -> Result<Stakes> {
    validate_allocations(allocations)?;
    validate_balances("veBalance", balances)?;
    Ok(scale_allocations(allocations, balances))
}

/// Absolute locked-OCEAN amounts, same shape as the stakes
pub fn derive_locked_amounts(
    allocations: &Allocations,
    locked: &LockedBalances,
) -> Result<LockedAmounts> {
    validate_allocations(allocations)?;
    validate_balances("locked amount", locked)?;
    Ok(scale_allocations(allocations, locked))
}

#[cfg(test)]
mod tests {
    use super::*;
    use df_core::DfError;

    fn addr(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    #[test]
    fn test_stakes_scale_balance() {
        let mut allocs = Allocations::new();
        allocs.entry(1).or_default().entry(addr(1)).or_default().insert(addr(9), 0.25);
        allocs.entry(137).or_default().entry(addr(2)).or_default().insert(addr(9), 0.75);

        let mut bals = VeBalances::new();
        bals.insert(addr(9), 400.0);

        let stakes = derive_stakes(&allocs, &bals).unwrap();
        assert_eq!(stakes[&1][&addr(1)][&addr(9)], 100.0);
        assert_eq!(stakes[&137][&addr(2)][&addr(9)], 300.0);
    }

    #[test]
    fn test_missing_balance_is_ineffective() {
        let mut allocs = Allocations::new();
        allocs.entry(1).or_default().entry(addr(1)).or_default().insert(addr(9), 1.0);

        let stakes = derive_stakes(&allocs, &VeBalances::new()).unwrap();
        assert!(stakes.is_empty());
    }

    #[test]
    fn test_locked_amounts_same_shape() {
        let mut allocs = Allocations::new();
        allocs.entry(1).or_default().entry(addr(1)).or_default().insert(addr(9), 0.5);

        let mut locked = LockedBalances::new();
        locked.insert(addr(9), 1_000.0);

        let amounts = derive_locked_amounts(&allocs, &locked).unwrap();
        assert_eq!(amounts[&1][&addr(1)][&addr(9)], 500.0);
    }

    #[test]
    fn test_overallocation_rejected() {
        let mut allocs = Allocations::new();
        allocs.entry(1).or_default().entry(addr(1)).or_default().insert(addr(9), 0.9);
        allocs.entry(1).or_default().entry(addr(2)).or_default().insert(addr(9), 0.2);

        let err = derive_stakes(&allocs, &VeBalances::new()).unwrap_err();
        assert!(matches!(err, DfError::AllocationOverflow { .. }));
    }

    #[test]
    fn test_negative_balance_rejected() {
        let allocs = Allocations::new();
        let mut bals = VeBalances::new();
        bals.insert(addr(9), -5.0);
        assert!(derive_stakes(&allocs, &bals).is_err());
    }
}
