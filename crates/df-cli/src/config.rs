//! dftool configuration
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! file (or none at all) is a valid config. CLI flags override on top.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use df_bridge::{rates, RetryPolicy};
use df_core::{Address, ChainId};
use df_economics::{RankScaleOp, RewardParams, MAX_N_RANK_ASSETS};

/// Complete dftool configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DfConfig {
    /// Round envelope
    #[serde(default)]
    pub rewards: RewardsConfig,

    /// Subgraph and RPC endpoints
    #[serde(default)]
    pub network: NetworkConfig,

    /// Exchange-rate APIs
    #[serde(default)]
    pub rates: RatesConfig,

    /// On-chain dispense
    #[serde(default)]
    pub dispense: DispenseConfig,
}

impl DfConfig {
    /// Read `path` if given and present, else defaults
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            tracing::info!(path = %path.display(), "Config not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if let Some(tot) = self.rewards.tot_ocean {
            if tot.is_nan() || tot < 0.0 {
                bail!("rewards.tot_ocean must be non-negative, got {tot}");
            }
        }
        if self.rewards.max_n_rank_assets == 0 {
            bail!("rewards.max_n_rank_assets must be at least 1");
        }
        if !(1..=df_bridge::dispense::MAX_BATCH_SIZE).contains(&self.dispense.batch_size) {
            bail!(
                "dispense.batch_size must be in 1..={}",
                df_bridge::dispense::MAX_BATCH_SIZE
            );
        }
        Ok(())
    }
}

/// Round envelope
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RewardsConfig {
    /// Overrides the vesting schedule when set and positive
    #[serde(default)]
    pub tot_ocean: Option<f64>,

    /// Round start, `YYYY-MM-DD`, a Thursday
    #[serde(default)]
    pub start_date: Option<String>,

    /// `volume`, `predictoor` or `challenge`
    #[serde(default = "default_substream")]
    pub substream: String,

    #[serde(default = "default_true")]
    pub do_pubrewards: bool,

    #[serde(default = "default_true")]
    pub do_rank: bool,

    #[serde(default)]
    pub rank_scale_op: RankScaleOp,

    #[serde(default = "default_max_n_rank_assets")]
    pub max_n_rank_assets: usize,
}

fn default_substream() -> String {
    "volume".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_n_rank_assets() -> usize {
    MAX_N_RANK_ASSETS
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            tot_ocean: None,
            start_date: None,
            substream: default_substream(),
            do_pubrewards: true,
            do_rank: true,
            rank_scale_op: RankScaleOp::default(),
            max_n_rank_assets: default_max_n_rank_assets(),
        }
    }
}

impl RewardsConfig {
    pub fn params(&self) -> RewardParams {
        RewardParams {
            do_pubrewards: self.do_pubrewards,
            do_rank: self.do_rank,
            rank_scale_op: self.rank_scale_op,
            max_n_rank_assets: self.max_n_rank_assets,
        }
    }
}

/// Endpoints for one chain
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEndpoint {
    pub chain_id: ChainId,
    pub subgraph_url: String,
    #[serde(default)]
    pub rpc_url: Option<String>,
}

/// Network configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// One `[[network.chains]]` table per chain
    #[serde(default)]
    pub chains: Vec<ChainEndpoint>,

    /// HTTP timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Attempts per query, including the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First retry delay in milliseconds; doubles after each failure
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    /// Blocks sampled per round for veOCEAN and allocations
    #[serde(default = "default_n_samples")]
    pub n_samples: usize,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_base_delay() -> u64 {
    1000
}

fn default_n_samples() -> usize {
    50
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            chains: Vec::new(),
            request_timeout: default_request_timeout(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay(),
            n_samples: default_n_samples(),
        }
    }
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_base_delay_ms))
    }

    pub fn chain(&self, chain_id: ChainId) -> anyhow::Result<&ChainEndpoint> {
        self.chains
            .iter()
            .find(|c| c.chain_id == chain_id)
            .with_context(|| format!("no [[network.chains]] entry for chain {chain_id}"))
    }

    pub fn rpc_url(&self, chain_id: ChainId) -> anyhow::Result<&str> {
        self.chain(chain_id)?
            .rpc_url
            .as_deref()
            .with_context(|| format!("no rpc_url configured for chain {chain_id}"))
    }
}

/// Exchange-rate configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RatesConfig {
    #[serde(default = "default_binance_url")]
    pub binance_url: String,

    #[serde(default = "default_coingecko_url")]
    pub coingecko_url: String,
}

fn default_binance_url() -> String {
    rates::BINANCE_API.to_string()
}

fn default_coingecko_url() -> String {
    rates::COINGECKO_API.to_string()
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            binance_url: default_binance_url(),
            coingecko_url: default_coingecko_url(),
        }
    }
}

/// Dispense configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DispenseConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Seconds before the first retry of a batch
    #[serde(default = "default_dispense_retry_delay")]
    pub retry_delay: u64,

    /// Reward token (OCEAN) on the dispense chain
    #[serde(default)]
    pub token_address: Option<String>,

    /// DFRewards contract
    #[serde(default)]
    pub dfrewards_address: Option<String>,

    /// Account the node signs with
    #[serde(default)]
    pub from_address: Option<String>,
}

fn default_batch_size() -> usize {
    df_bridge::dispense::MAX_BATCH_SIZE
}

fn default_max_attempts() -> u32 {
    df_bridge::dispense::BATCH_ATTEMPTS
}

fn default_dispense_retry_delay() -> u64 {
    5
}

impl Default for DispenseConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            retry_delay: default_dispense_retry_delay(),
            token_address: None,
            dfrewards_address: None,
            from_address: None,
        }
    }
}

impl DispenseConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.retry_delay))
    }

    pub fn token(&self) -> anyhow::Result<Address> {
        required_address("dispense.token_address", self.token_address.as_deref())
    }

    pub fn dfrewards(&self) -> anyhow::Result<Address> {
        required_address("dispense.dfrewards_address", self.dfrewards_address.as_deref())
    }

    pub fn from(&self) -> anyhow::Result<Address> {
        required_address("dispense.from_address", self.from_address.as_deref())
    }
}

fn required_address(key: &str, value: Option<&str>) -> anyhow::Result<Address> {
    let raw = value.with_context(|| format!("{key} is not set"))?;
    Address::parse(raw).with_context(|| format!("{key} is not a valid address"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_defaults() {
        let config = DfConfig::parse("").unwrap();
        assert_eq!(config.rewards.substream, "volume");
        assert!(config.rewards.do_pubrewards);
        assert!(config.rewards.do_rank);
        assert_eq!(config.rewards.rank_scale_op, RankScaleOp::Log);
        assert_eq!(config.rewards.max_n_rank_assets, 100);
        assert_eq!(config.network.request_timeout, 30);
        assert_eq!(config.dispense.batch_size, 500);
        assert_eq!(config.dispense.max_attempts, 3);
    }

    #[test]
    fn test_full_config() {
        let config = DfConfig::parse(
            r#"
            [rewards]
            tot_ocean = 10000.0
            start_date = "2024-01-04"
            rank_scale_op = "SQRT"
            do_pubrewards = false

            [network]
            max_retries = 2

            [[network.chains]]
            chain_id = 1
            subgraph_url = "https://v4.subgraph.mainnet.oceanprotocol.com"
            rpc_url = "http://localhost:8545"

            [[network.chains]]
            chain_id = 23294
            subgraph_url = "https://v4.subgraph.sapphire-mainnet.oceanprotocol.com"

            [dispense]
            batch_size = 200
            token_address = "0x967DA4048cD07aB37855c090aAF366e4ce1b9F48"
            "#,
        )
        .unwrap();

        assert_eq!(config.rewards.tot_ocean, Some(10_000.0));
        let params = config.rewards.params();
        assert_eq!(params.rank_scale_op, RankScaleOp::Sqrt);
        assert!(!params.do_pubrewards);
        assert!(params.do_rank);

        assert_eq!(config.network.retry_policy().max_attempts, 2);
        assert_eq!(config.network.rpc_url(1).unwrap(), "http://localhost:8545");
        assert!(config.network.rpc_url(23294).is_err());
        assert!(config.network.chain(137).is_err());

        assert_eq!(
            config.dispense.token().unwrap().as_str(),
            "0x967da4048cd07ab37855c090aaf366e4ce1b9f48"
        );
        assert!(config.dispense.dfrewards().is_err());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(DfConfig::parse("[rewards]\ntot_ocean = -1.0").is_err());
        assert!(DfConfig::parse("[rewards]\nmax_n_rank_assets = 0").is_err());
        assert!(DfConfig::parse("[dispense]\nbatch_size = 501").is_err());
        assert!(DfConfig::parse("[rewards]\nrank_scale_op = \"CUBE\"").is_err());
    }

    #[test]
    fn test_missing_file_is_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DfConfig::load(Some(&dir.path().join("dftool.toml"))).unwrap();
        assert_eq!(config.network.n_samples, 50);
    }
}
