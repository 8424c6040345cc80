//! Core type definitions for Data Farming reward rounds
//!
//! Every nested mapping is a `BTreeMap` so that iteration order is sorted and
//! total. Reward computation never depends on the insertion order of its inputs.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::DfError;

/// Chain identifier (EIP-155)
pub type ChainId = u64;

/// Address - 20-byte account or contract address
///
/// Always stored as `0x` followed by 40 lowercase hex characters.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(String);

impl Address {
    /// The zero address (`0x000…000`)
    pub fn zero() -> Self {
        Self(format!("0x{}", "0".repeat(40)))
    }

    /// Parse and canonicalize an address string
    pub fn parse(s: &str) -> Result<Self, DfError> {
        let trimmed = s.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| DfError::InvalidAddress(s.to_string()))?;

        if body.len() != 40 || hex::decode(body).is_err() {
            return Err(DfError::InvalidAddress(s.to_string()));
        }

        Ok(Self(format!("0x{}", body.to_ascii_lowercase())))
    }

    /// Build from raw bytes
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(format!("0x{}", hex::encode(bytes)))
    }

    /// Raw 20 bytes (used for ABI encoding)
    pub fn to_bytes(&self) -> [u8; 20] {
        let mut out = [0u8; 20];
        // The constructor guarantees 40 valid hex chars after the prefix.
        if let Ok(decoded) = hex::decode(&self.0[2..]) {
            out.copy_from_slice(&decoded);
        }
        out
    }

    /// Canonical string form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Is this the zero address
    pub fn is_zero(&self) -> bool {
        self.0[2..].bytes().all(|b| b == b'0')
    }
}

impl FromStr for Address {
    type Err = DfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", &self.0[..10])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Address::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Token symbol, always upper-case
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(s: &str) -> Self {
        Self(s.trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn ocean() -> Self {
        Self::new(OCEAN)
    }

    pub fn h2o() -> Self {
        Self::new(H2O)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Symbol::new(&raw))
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::new(s)
    }
}

/// Reward token symbol
pub const OCEAN: &str = "OCEAN";

/// Stablecoin priced at a fixed rate
pub const H2O: &str = "H2O";

/// Fixed USD price of H2O
pub const H2O_RATE: f64 = 1.618;

/// `chain → nft → lp → value`
pub type ChainNftLp<T> = BTreeMap<ChainId, BTreeMap<Address, BTreeMap<Address, T>>>;

/// Symbol → USD per token
pub type Rates = BTreeMap<Symbol, f64>;

/// LP → veToken balance
pub type VeBalances = BTreeMap<Address, f64>;

/// LP → locked OCEAN
pub type LockedBalances = BTreeMap<Address, f64>;

/// `chain → nft → lp → fraction of the LP's balance`
pub type Allocations = ChainNftLp<f64>;

/// `chain → nft → lp → absolute veToken stake`
pub type Stakes = ChainNftLp<f64>;

/// `chain → nft → lp → absolute locked OCEAN`
pub type LockedAmounts = ChainNftLp<f64>;

/// `chain → basetoken → nft → volume in basetoken units`
pub type NftVols = ChainNftLp<f64>;

/// `chain → nft → USD volume`
pub type UsdVols = BTreeMap<ChainId, BTreeMap<Address, f64>>;

/// `chain → nft → owner`
pub type Owners = BTreeMap<ChainId, BTreeMap<Address, Address>>;

/// `chain → basetoken address → symbol`
pub type Symbols = BTreeMap<ChainId, BTreeMap<Address, Symbol>>;

/// `chain → set of predictoor feed nfts`
pub type PredictoorFeeds = BTreeMap<ChainId, BTreeSet<Address>>;

/// `chain → predictoor contract → feed nft`
pub type PredictoorContracts = BTreeMap<ChainId, BTreeMap<Address, Address>>;

/// `chain → lp → OCEAN`
pub type RewardMap = BTreeMap<ChainId, BTreeMap<Address, f64>>;

/// `chain → nft → lp → OCEAN`
pub type RewardInfo = ChainNftLp<f64>;

/// Prediction tally of one predictoor on one feed contract
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionSummary {
    /// Predictions submitted
    pub n_pred: u64,
    /// Predictions matching the true value
    pub n_correct: u64,
}

impl PredictionSummary {
    pub fn new(n_pred: u64, n_correct: u64) -> Self {
        Self { n_pred, n_correct }
    }

    /// Fraction of correct predictions (0 when nothing was predicted)
    pub fn accuracy(&self) -> f64 {
        if self.n_pred == 0 {
            return 0.0;
        }
        self.n_correct as f64 / self.n_pred as f64
    }

    /// Record one more prediction
    pub fn record(&mut self, correct: bool) {
        self.n_pred += 1;
        if correct {
            self.n_correct += 1;
        }
    }
}

/// One settled prediction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub predictoor: Address,
    /// Feed contract the prediction was submitted to
    pub contract: Address,
    /// Epoch start (unix seconds) the prediction is for
    pub slot: u64,
    /// Did the predicted direction match the truth
    pub correct: bool,
}

/// `predictoor → contract → summary`
pub type PredictoorSummaries = BTreeMap<Address, BTreeMap<Address, PredictionSummary>>;

/// `contract → predictoor → OCEAN`
pub type PredictoorRewards = BTreeMap<Address, BTreeMap<Address, f64>>;

/// One challenge submission, ranked by ascending NMSE
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChallengeEntry {
    pub from_addr: Address,
    pub nft_addr: Address,
    pub nmse: f64,
}

/// Challenge payout for one winner
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChallengeReward {
    pub winner_addr: Address,
    #[serde(rename = "OCEAN_amt")]
    pub ocean_amt: f64,
}

/// Sum of every leaf in a three-level map
pub fn sum_leaves(map: &ChainNftLp<f64>) -> f64 {
    map.values()
        .flat_map(|by_nft| by_nft.values())
        .flat_map(|by_lp| by_lp.values())
        .sum()
}

/// Sum of every leaf in a two-level reward map
pub fn sum_rewards(map: &RewardMap) -> f64 {
    map.values().flat_map(|by_lp| by_lp.values()).sum()
}

/// Per-LP totals across chains
pub fn flatten_rewards(map: &RewardMap) -> BTreeMap<Address, f64> {
    let mut flat: BTreeMap<Address, f64> = BTreeMap::new();
    for by_lp in map.values() {
        for (lp, amount) in by_lp {
            *flat.entry(lp.clone()).or_default() += amount;
        }
    }
    flat
}

/// Feed nfts behind every listed predictoor contract
pub fn feed_nfts(contracts: &PredictoorContracts) -> PredictoorFeeds {
    contracts
        .iter()
        .map(|(chain_id, by_contract)| (*chain_id, by_contract.values().cloned().collect()))
        .collect()
}

/// Aggregate `chain → nft → lp` rewards down to `chain → lp`
pub fn aggregate_reward_info(info: &RewardInfo) -> RewardMap {
    let mut map = RewardMap::new();
    for (chain, by_nft) in info {
        for by_lp in by_nft.values() {
            for (lp, amount) in by_lp {
                *map.entry(*chain).or_default().entry(lp.clone()).or_default() += amount;
            }
        }
    }
    map
}
