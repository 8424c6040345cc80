//! # Predictoor Rewards
//!
//! The predictoor budget is split evenly across feed contracts; within a
//! contract each predictoor earns in proportion to its accuracy there.
//!
//! ```text
//! per_contract   = tokens_avail / |contracts|
//! reward[k][p]   = accuracy_p[k] / Σ_q accuracy_q[k] · per_contract
//! ```
//!
//! Predictoors with fewer than `min_predictions` predictions overall are
//! left out before anything is summed.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use df_core::normalize::check_non_negative;
use df_core::{Address, Prediction, PredictoorRewards, PredictoorSummaries, Result};

/// Tally settled predictions per (predictoor, contract)
pub fn summarize_predictions<'a>(
    predictions: impl IntoIterator<Item = &'a Prediction>,
) -> PredictoorSummaries {
    let mut summaries = PredictoorSummaries::new();
    for prediction in predictions {
        summaries
            .entry(prediction.predictoor.clone())
            .or_default()
            .entry(prediction.contract.clone())
            .or_default()
            .record(prediction.correct);
    }
    summaries
}

/// Every contract that appears in any summary
pub fn contracts_in(summaries: &PredictoorSummaries) -> BTreeSet<Address> {
    summaries
        .values()
        .flat_map(|by_contract| by_contract.keys())
        .cloned()
        .collect()
}

/// Split `tokens_avail` across `contracts` and their predictoors
pub fn calc_predictoor_rewards(
    summaries: &PredictoorSummaries,
    contracts: &BTreeSet<Address>,
    tokens_avail: f64,
    min_predictions: u64,
) -> Result<PredictoorRewards> {
    check_non_negative("predictoor budget", tokens_avail)?;

    let mut rewards = PredictoorRewards::new();
    if contracts.is_empty() || tokens_avail == 0.0 {
        return Ok(rewards);
    }

    let eligible: BTreeMap<&Address, _> = summaries
        .iter()
        .filter(|(predictoor, by_contract)| {
            let n_pred: u64 = by_contract.values().map(|s| s.n_pred).sum();
            if n_pred < min_predictions {
                debug!(predictoor = %predictoor, n_pred, "Below minimum predictions");
                return false;
            }
            true
        })
        .collect();

    let per_contract = tokens_avail / contracts.len() as f64;

    for contract in contracts {
        let accuracies: Vec<(&Address, f64)> = eligible
            .iter()
            .filter_map(|(predictoor, by_contract)| {
                by_contract
                    .get(contract)
                    .map(|summary| (*predictoor, summary.accuracy()))
            })
            .filter(|(_, accuracy)| *accuracy > 0.0)
            .collect();

        let total_accuracy: f64 = accuracies.iter().map(|(_, a)| a).sum();
        if total_accuracy == 0.0 {
            debug!(contract = %contract, "No accurate predictoors");
            continue;
        }

        let by_predictoor = rewards.entry(contract.clone()).or_default();
        for (predictoor, accuracy) in accuracies {
            by_predictoor.insert(predictoor.clone(), accuracy / total_accuracy * per_contract);
        }
    }

    info!(
        n_contracts = contracts.len(),
        n_eligible = eligible.len(),
        tokens_avail,
        "Predictoor rewards calculated"
    );
    Ok(rewards)
}

/// Per-predictoor totals across contracts
pub fn rewards_per_predictoor(rewards: &PredictoorRewards) -> BTreeMap<Address, f64> {
    let mut totals = BTreeMap::new();
    for by_predictoor in rewards.values() {
        for (predictoor, amount) in by_predictoor {
            *totals.entry(predictoor.clone()).or_insert(0.0) += amount;
        }
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use df_core::PredictionSummary;

    fn addr(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    fn summaries(entries: &[(u8, u8, u64, u64)]) -> PredictoorSummaries {
        let mut out = PredictoorSummaries::new();
        for (predictoor, contract, n_pred, n_correct) in entries {
            out.entry(addr(*predictoor))
                .or_default()
                .insert(addr(*contract), PredictionSummary::new(*n_pred, *n_correct));
        }
        out
    }

    #[test]
    fn test_accuracy_weighted_split() {
        // contract 1: accuracies 0.75 and 0.25 → 75/25 of half the budget
        let s = summaries(&[(10, 1, 4, 3), (11, 1, 4, 1), (11, 2, 2, 2)]);
        let contracts = contracts_in(&s);
        let rewards = calc_predictoor_rewards(&s, &contracts, 100.0, 2).unwrap();

        assert!((rewards[&addr(1)][&addr(10)] - 37.5).abs() < 1e-9);
        assert!((rewards[&addr(1)][&addr(11)] - 12.5).abs() < 1e-9);
        assert!((rewards[&addr(2)][&addr(11)] - 50.0).abs() < 1e-9);

        let totals = rewards_per_predictoor(&rewards);
        assert!((totals[&addr(11)] - 62.5).abs() < 1e-9);
    }

    #[test]
    fn test_min_predictions_filter() {
        let s = summaries(&[(10, 1, 1, 1), (11, 1, 5, 1)]);
        let contracts = contracts_in(&s);
        let rewards = calc_predictoor_rewards(&s, &contracts, 10.0, 2).unwrap();

        assert!(!rewards[&addr(1)].contains_key(&addr(10)));
        assert!((rewards[&addr(1)][&addr(11)] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_contract_without_accuracy_keeps_its_share() {
        // contract 2 is counted in the split even though nobody was right
        let s = summaries(&[(10, 1, 2, 2), (10, 2, 2, 0)]);
        let contracts = contracts_in(&s);
        let rewards = calc_predictoor_rewards(&s, &contracts, 10.0, 2).unwrap();

        assert_eq!(rewards.len(), 1);
        assert!((rewards[&addr(1)][&addr(10)] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_inputs() {
        let s = summaries(&[(10, 1, 2, 2)]);
        assert!(calc_predictoor_rewards(&s, &BTreeSet::new(), 10.0, 2).unwrap().is_empty());
        assert!(calc_predictoor_rewards(&s, &contracts_in(&s), 0.0, 2).unwrap().is_empty());
        assert!(calc_predictoor_rewards(&s, &contracts_in(&s), -1.0, 2).is_err());
    }

    #[test]
    fn test_summarize_predictions() {
        let predictions = vec![
            Prediction { predictoor: addr(10), contract: addr(1), slot: 300, correct: true },
            Prediction { predictoor: addr(10), contract: addr(1), slot: 600, correct: false },
            Prediction { predictoor: addr(11), contract: addr(1), slot: 300, correct: true },
        ];
        let s = summarize_predictions(&predictions);
        assert_eq!(s[&addr(10)][&addr(1)], PredictionSummary::new(2, 1));
        assert_eq!(s[&addr(11)][&addr(1)].accuracy(), 1.0);
    }
}
