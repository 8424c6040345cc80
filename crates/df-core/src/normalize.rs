//! Input normalization
//!
//! Canonicalizes and validates everything that flows into the reward
//! calculator. Structural violations (bad allocation sums, negative amounts)
//! are errors; missing symbols or rates only drop the affected volume entry.

use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{DfError, Result};
use crate::types::*;

/// Per-LP allocation sums may exceed 1.0 by at most this much
pub const ALLOCATION_TOLERANCE: f64 = 1e-5;

/// Native gas token for a chain: `(pseudo-address, symbol)`
///
/// Gas spent on consume transactions is recorded as volume under the
/// zero address, so it needs its own symbol to be priced.
pub fn native_token(chain_id: ChainId) -> Option<(Address, Symbol)> {
    let symbol = match chain_id {
        1 | 5 | 10 | 11155111 | 8996 => "ETH",
        56 => "BNB",
        137 | 80001 => "MATIC",
        246 => "EWT",
        1285 => "MOVR",
        23294 | 23295 => "ROSE",
        _ => return None,
    };
    Some((Address::zero(), Symbol::new(symbol)))
}

/// Fail on a negative or NaN amount
pub fn check_non_negative(what: &'static str, value: f64) -> Result<()> {
    if value.is_nan() || value < 0.0 {
        return Err(DfError::NegativeValue { what, value });
    }
    Ok(())
}

/// Validate every leaf of a `chain → a → b → value` map
pub fn validate_nested(what: &'static str, map: &ChainNftLp<f64>) -> Result<()> {
    for by_a in map.values() {
        for by_b in by_a.values() {
            for value in by_b.values() {
                check_non_negative(what, *value)?;
            }
        }
    }
    Ok(())
}

/// Validate a rate table
pub fn validate_rates(rates: &Rates) -> Result<()> {
    for rate in rates.values() {
        check_non_negative("rate", *rate)?;
    }
    Ok(())
}

/// Validate per-LP balances
pub fn validate_balances(what: &'static str, balances: &BTreeMap<Address, f64>) -> Result<()> {
    for value in balances.values() {
        check_non_negative(what, *value)?;
    }
    Ok(())
}

/// Validate allocations: each fraction in [0, 1] and each LP's total across
/// every (chain, nft) at most `1 + ALLOCATION_TOLERANCE`
pub fn validate_allocations(allocations: &Allocations) -> Result<()> {
    let mut per_lp: BTreeMap<&Address, f64> = BTreeMap::new();

    for by_nft in allocations.values() {
        for by_lp in by_nft.values() {
            for (lp, fraction) in by_lp {
                check_non_negative("allocation", *fraction)?;
                *per_lp.entry(lp).or_default() += fraction;
            }
        }
    }

    for (lp, total) in per_lp {
        if total > 1.0 + ALLOCATION_TOLERANCE {
            return Err(DfError::AllocationOverflow {
                lp: lp.clone(),
                total,
            });
        }
    }
    Ok(())
}

/// Add the native token symbol of every chain in `nftvols` to `symbols`
pub fn with_native_symbols(symbols: &Symbols, nftvols: &NftVols) -> Symbols {
    let mut out = symbols.clone();
    for chain_id in nftvols.keys() {
        if let Some((addr, symbol)) = native_token(*chain_id) {
            out.entry(*chain_id).or_default().entry(addr).or_insert(symbol);
        }
    }
    out
}

/// USD rate of a basetoken on a chain, if both symbol and rate are known
pub fn basetoken_rate(
    chain_id: ChainId,
    basetoken: &Address,
    symbols: &Symbols,
    rates: &Rates,
) -> Option<f64> {
    let symbol = symbols
        .get(&chain_id)
        .and_then(|by_addr| by_addr.get(basetoken))
        .cloned()
        .or_else(|| {
            native_token(chain_id)
                .filter(|(addr, _)| addr == basetoken)
                .map(|(_, sym)| sym)
        })?;
    rates.get(&symbol).copied()
}

/// Convert `chain → basetoken → nft → vol` into `chain → nft → USD vol`,
/// summing across basetokens. Entries with an unknown symbol or rate are
/// dropped.
pub fn nftvols_to_usd(nftvols: &NftVols, symbols: &Symbols, rates: &Rates) -> UsdVols {
    let mut usd = UsdVols::new();

    for (chain_id, by_base) in nftvols {
        for (basetoken, by_nft) in by_base {
            let Some(rate) = basetoken_rate(*chain_id, basetoken, symbols, rates) else {
                debug!(
                    chain = chain_id,
                    basetoken = %basetoken,
                    "dropping volume: no symbol or rate for basetoken"
                );
                continue;
            };

            for (nft, vol) in by_nft {
                *usd.entry(*chain_id).or_default().entry(nft.clone()).or_default() += vol * rate;
            }
        }
    }
    usd
}

/// Clamp order volumes by exchange swap volumes
///
/// Each `(chain, basetoken, nft)` keeps `min(order_vol, swap_vol)`; the
/// entry is dropped when either side is zero or the swap volume is missing.
/// Gas, keyed under the zero address, is never swapped and passes through.
pub fn filter_by_swap_volumes(nftvols: &NftVols, swapvols: &NftVols) -> NftVols {
    let mut out = NftVols::new();

    for (chain_id, by_base) in nftvols {
        for (basetoken, by_nft) in by_base {
            if basetoken.is_zero() {
                out.entry(*chain_id)
                    .or_default()
                    .insert(basetoken.clone(), by_nft.clone());
                continue;
            }
            for (nft, order_vol) in by_nft {
                let swap_vol = swapvols
                    .get(chain_id)
                    .and_then(|b| b.get(basetoken))
                    .and_then(|n| n.get(nft))
                    .copied()
                    .unwrap_or(0.0);

                if *order_vol <= 0.0 || swap_vol <= 0.0 {
                    debug!(chain = chain_id, nft = %nft, "dropping volume: no swap volume");
                    continue;
                }

                out.entry(*chain_id)
                    .or_default()
                    .entry(basetoken.clone())
                    .or_default()
                    .insert(nft.clone(), order_vol.min(swap_vol));
            }
        }
    }
    out
}

/// Drop zero-valued leaves and empty branches
pub fn prune_zeros(map: &ChainNftLp<f64>) -> ChainNftLp<f64> {
    let mut out = ChainNftLp::new();
    for (chain_id, by_a) in map {
        for (a, by_b) in by_a {
            for (b, value) in by_b {
                if *value > 0.0 {
                    out.entry(*chain_id)
                        .or_default()
                        .entry(a.clone())
                        .or_default()
                        .insert(b.clone(), *value);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    #[test]
    fn test_allocation_sum_within_tolerance() {
        let mut allocs = Allocations::new();
        allocs.entry(1).or_default().entry(addr(1)).or_default().insert(addr(9), 0.6);
        allocs.entry(137).or_default().entry(addr(2)).or_default().insert(addr(9), 0.400001);
        assert!(validate_allocations(&allocs).is_ok());
    }

    #[test]
    fn test_allocation_sum_overflow() {
        let mut allocs = Allocations::new();
        allocs.entry(1).or_default().entry(addr(1)).or_default().insert(addr(9), 0.7);
        allocs.entry(1).or_default().entry(addr(2)).or_default().insert(addr(9), 0.4);

        let err = validate_allocations(&allocs).unwrap_err();
        assert!(matches!(err, DfError::AllocationOverflow { .. }));
        assert!(err.is_structural());
    }

    #[test]
    fn test_negative_rate_rejected() {
        let mut rates = Rates::new();
        rates.insert(Symbol::ocean(), -0.1);
        assert!(validate_rates(&rates).is_err());

        rates.insert(Symbol::ocean(), f64::NAN);
        assert!(validate_rates(&rates).is_err());
    }

    #[test]
    fn test_nftvols_to_usd_drops_unknown() {
        let ocean = addr(0xaa);
        let unknown = addr(0xbb);
        let nft = addr(1);

        let mut nftvols = NftVols::new();
        nftvols.entry(1).or_default().entry(ocean.clone()).or_default().insert(nft.clone(), 4.0);
        nftvols.entry(1).or_default().entry(unknown).or_default().insert(nft.clone(), 100.0);

        let mut symbols = Symbols::new();
        symbols.entry(1).or_default().insert(ocean, Symbol::ocean());

        let mut rates = Rates::new();
        rates.insert(Symbol::ocean(), 0.5);

        let usd = nftvols_to_usd(&nftvols, &symbols, &rates);
        assert_eq!(usd[&1][&nft], 2.0);
    }

    #[test]
    fn test_native_volume_priced_by_chain_symbol() {
        let nft = addr(1);
        let mut nftvols = NftVols::new();
        nftvols.entry(137).or_default().entry(Address::zero()).or_default().insert(nft.clone(), 10.0);

        let mut rates = Rates::new();
        rates.insert(Symbol::new("matic"), 0.8);

        let usd = nftvols_to_usd(&nftvols, &Symbols::new(), &rates);
        assert!((usd[&137][&nft] - 8.0).abs() < 1e-12);

        // chain without a native token entry drops the volume
        let mut nftvols = NftVols::new();
        nftvols.entry(424242).or_default().entry(Address::zero()).or_default().insert(nft, 10.0);
        assert!(nftvols_to_usd(&nftvols, &Symbols::new(), &rates).is_empty());
    }

    #[test]
    fn test_swap_volume_filter() {
        let base = addr(0xaa);
        let (n1, n2, n3) = (addr(1), addr(2), addr(3));

        let mut orders = NftVols::new();
        let by_nft = orders.entry(1).or_default().entry(base.clone()).or_default();
        by_nft.insert(n1.clone(), 10.0);
        by_nft.insert(n2.clone(), 5.0);
        by_nft.insert(n3.clone(), 7.0);

        let mut swaps = NftVols::new();
        let by_nft = swaps.entry(1).or_default().entry(base.clone()).or_default();
        by_nft.insert(n1.clone(), 4.0);
        by_nft.insert(n2.clone(), 0.0);

        let filtered = filter_by_swap_volumes(&orders, &swaps);
        let by_nft = &filtered[&1][&base];
        assert_eq!(by_nft[&n1], 4.0);
        assert!(!by_nft.contains_key(&n2));
        assert!(!by_nft.contains_key(&n3));
    }

    #[test]
    fn test_swap_volume_filter_keeps_gas() {
        let mut orders = NftVols::new();
        orders.entry(1).or_default().entry(Address::zero()).or_default().insert(addr(1), 0.2);

        let filtered = filter_by_swap_volumes(&orders, &NftVols::new());
        assert_eq!(filtered[&1][&Address::zero()][&addr(1)], 0.2);
    }

    #[test]
    fn test_prune_zeros() {
        let mut map = Stakes::new();
        map.entry(1).or_default().entry(addr(1)).or_default().insert(addr(2), 0.0);
        assert!(prune_zeros(&map).is_empty());
    }
}
