//! # Data Farming Bridges
//!
//! Connects a reward round to the systems around it:
//! - Per-chain subgraphs (volumes, owners, symbols, veOCEAN, allocations, predictions)
//! - Exchange-rate APIs (Binance primary, CoinGecko secondary)
//! - EVM JSON-RPC nodes (block sampling, reward dispense)
//!
//! ## Seams
//!
//! Every external system sits behind an `async_trait` so a round can be
//! replayed against in-memory fakes:
//!
//! | Trait | Production impl | Used for |
//! |-------|-----------------|----------|
//! | [`subgraph::SubgraphTransport`] | [`subgraph::HttpTransport`] | GraphQL queries |
//! | [`rates::RateProvider`] | [`rates::BinanceProvider`], [`rates::CoinGeckoProvider`] | USD rates |
//! | [`rpc::ChainClock`] | [`rpc::JsonRpcClient`] | timestamp → block |
//! | [`dispense::RewardsContract`] | [`dispense::JsonRpcContract`] | approve / allocate |

use thiserror::Error;

pub mod dispense;
pub mod rates;
pub mod retry;
pub mod rpc;
pub mod sampling;
pub mod subgraph;

pub use dispense::{DispenseReceipt, Dispenser, DryRunContract, JsonRpcContract, RewardsContract};
pub use rates::{BinanceProvider, CoinGeckoProvider, RateProvider, RateSource};
pub use rpc::{ChainClock, JsonRpcClient};
pub use sampling::BlockRange;
pub use retry::{with_retry, RetryPolicy};
pub use subgraph::{HttpTransport, SubgraphClient, SubgraphTransport, VeLock};

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Bridge error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Transport-level failure (connect, timeout, TLS)
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Non-success HTTP status
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// GraphQL response without a `data` object
    #[error("Missing data in response: {0}")]
    MissingData(String),

    /// Response body could not be decoded
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// JSON-RPC error object
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Transaction rejected or reverted
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Gave up after retrying
    #[error("{what} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        what: String,
        attempts: u32,
        last: String,
    },

    /// No provider returned a rate
    #[error("No rate for {0}")]
    RateUnavailable(String),

    /// Bad input to a bridge call
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl BridgeError {
    /// Numeric code for reports and exit status
    pub fn code(&self) -> u32 {
        match self {
            Self::ConnectionFailed(_) => 4001,
            Self::Http { .. } => 4002,
            Self::MissingData(_) => 4003,
            Self::Malformed(_) => 4004,
            Self::Rpc { .. } => 5001,
            Self::TransactionFailed(_) => 5002,
            Self::RetriesExhausted { .. } => 6001,
            Self::RateUnavailable(_) => 6002,
            Self::InvalidInput(_) => 9999,
        }
    }

    /// Worth another attempt
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_)
                | Self::Http { .. }
                | Self::MissingData(_)
                | Self::Rpc { .. }
                | Self::TransactionFailed(_)
        )
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::ConnectionFailed(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

impl From<df_core::DfError> for BridgeError {
    fn from(err: df_core::DfError) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Parse a decimal that subgraphs may send as a string or a number
pub(crate) fn parse_decimal(value: &serde_json::Value) -> Result<f64> {
    value
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| value.as_f64())
        .ok_or_else(|| BridgeError::Malformed(format!("expected a number, got {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recoverable_classification() {
        assert!(BridgeError::Http { status: 502, url: "x".into() }.is_recoverable());
        assert!(BridgeError::MissingData("orders".into()).is_recoverable());
        assert!(!BridgeError::Malformed("bad".into()).is_recoverable());
        assert!(!BridgeError::RateUnavailable("OCEAN".into()).is_recoverable());
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal(&json!("1.25")).unwrap(), 1.25);
        assert_eq!(parse_decimal(&json!(3)).unwrap(), 3.0);
        assert!(parse_decimal(&json!(null)).is_err());
        assert!(parse_decimal(&json!("abc")).is_err());
    }
}
