//! EVM JSON-RPC client
//!
//! Only the handful of calls a reward round needs: block numbers and
//! timestamps for sampling, and node-signed transactions for dispense.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use df_core::Address;

use crate::{BridgeError, Result};

/// Block height and time
#[async_trait]
pub trait ChainClock: Send + Sync {
    /// Latest block number
    async fn latest_block(&self) -> Result<u64>;

    /// Unix timestamp of a block
    async fn block_timestamp(&self, block: u64) -> Result<i64>;
}

#[derive(Deserialize)]
struct RpcReply {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Parse a hex quantity such as `"0x1b4"`
pub fn parse_quantity(value: &Value) -> Result<u64> {
    let s = value
        .as_str()
        .ok_or_else(|| BridgeError::Malformed(format!("expected hex quantity, got {value}")))?;
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16)
        .map_err(|e| BridgeError::Malformed(format!("bad quantity {s:?}: {e}")))
}

/// JSON-RPC 2.0 over HTTP
pub struct JsonRpcClient {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call `method` and return its `result`
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        debug!(method, id, "JSON-RPC call");

        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Http {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let reply: RpcReply = response.json().await?;
        if let Some(err) = reply.error {
            return Err(BridgeError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        reply
            .result
            .ok_or_else(|| BridgeError::MissingData(format!("{method} returned no result")))
    }

    /// Submit a transaction signed by the node's unlocked `from` account
    pub async fn send_transaction(&self, from: &Address, to: &Address, data: &[u8]) -> Result<String> {
        let tx = json!({
            "from": from,
            "to": to,
            "data": format!("0x{}", hex::encode(data)),
        });
        let hash = self.call("eth_sendTransaction", json!([tx])).await?;
        hash.as_str()
            .map(str::to_string)
            .ok_or_else(|| BridgeError::Malformed(format!("bad tx hash {hash}")))
    }

    /// `Some(true)` once mined successfully, `Some(false)` if reverted, `None` while pending
    pub async fn transaction_status(&self, hash: &str) -> Result<Option<bool>> {
        let receipt = self.call("eth_getTransactionReceipt", json!([hash])).await?;
        if receipt.is_null() {
            return Ok(None);
        }
        let status = receipt
            .get("status")
            .ok_or_else(|| BridgeError::Malformed("receipt without status".into()))?;
        Ok(Some(parse_quantity(status)? == 1))
    }
}

#[async_trait]
impl ChainClock for JsonRpcClient {
    async fn latest_block(&self) -> Result<u64> {
        parse_quantity(&self.call("eth_blockNumber", json!([])).await?)
    }

    async fn block_timestamp(&self, block: u64) -> Result<i64> {
        let result = self
            .call("eth_getBlockByNumber", json!([format!("0x{block:x}"), false]))
            .await?;
        let ts = result
            .get("timestamp")
            .ok_or_else(|| BridgeError::MissingData(format!("block {block}")))?;
        Ok(parse_quantity(ts)? as i64)
    }
}
