//! # Reward Dispense
//!
//! Pays a flattened reward map through the DFRewards contract:
//!
//! ```text
//! token.approve(dfrewards, Σ amounts)
//! dfrewards.allocate(addrs[0..500],   amounts[0..500],   token)
//! dfrewards.allocate(addrs[500..1000], amounts[500..1000], token)
//! ...
//! ```
//!
//! A batch that still fails after its retries is logged and skipped, so one
//! bad batch never blocks the others. The receipt lists what went through.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use sha3::{Digest, Keccak256};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use df_core::Address;

use crate::retry::{with_retry, RetryPolicy};
use crate::rpc::JsonRpcClient;
use crate::{BridgeError, Result};

/// Most recipients per `allocate` call
pub const MAX_BATCH_SIZE: usize = 500;

/// Attempts per batch before giving up on it
pub const BATCH_ATTEMPTS: u32 = 3;

const APPROVE_SIG: &str = "approve(address,uint256)";
const ALLOCATE_SIG: &str = "allocate(address[],uint256[],address)";

/// First four bytes of `keccak256(signature)`
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn word_address(addr: &Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&addr.to_bytes());
    word
}

fn word_uint(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Calldata for `approve(spender, amount)`
pub fn encode_approve(spender: &Address, amount: u128) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 64);
    data.extend_from_slice(&selector(APPROVE_SIG));
    data.extend_from_slice(&word_address(spender));
    data.extend_from_slice(&word_uint(amount));
    data
}

/// Calldata for `allocate(address[] tos, uint256[] values, address token)`
pub fn encode_allocate(addrs: &[Address], amounts: &[u128], token: &Address) -> Result<Vec<u8>> {
    if addrs.len() != amounts.len() {
        return Err(BridgeError::InvalidInput(format!(
            "{} addresses but {} amounts",
            addrs.len(),
            amounts.len()
        )));
    }
    let n = addrs.len();

    // Head: two array offsets and the token, then each array as length + items
    let tos_offset = 3 * 32;
    let values_offset = tos_offset + 32 * (n + 1);

    let mut data = Vec::with_capacity(4 + 32 * (3 + 2 * (n + 1)));
    data.extend_from_slice(&selector(ALLOCATE_SIG));
    data.extend_from_slice(&word_uint(tos_offset as u128));
    data.extend_from_slice(&word_uint(values_offset as u128));
    data.extend_from_slice(&word_address(token));

    data.extend_from_slice(&word_uint(n as u128));
    for addr in addrs {
        data.extend_from_slice(&word_address(addr));
    }
    data.extend_from_slice(&word_uint(n as u128));
    for amount in amounts {
        data.extend_from_slice(&word_uint(*amount));
    }
    Ok(data)
}

/// The two contract calls a dispense needs
#[async_trait]
pub trait RewardsContract: Send + Sync {
    /// Address of the DFRewards contract (the `approve` spender)
    fn rewards_address(&self) -> &Address;

    /// `token.approve(rewards_address, amount)`; returns the tx hash
    async fn approve(&self, token: &Address, amount: u128) -> Result<String>;

    /// `dfrewards.allocate(addrs, amounts, token)`; returns the tx hash
    async fn allocate(&self, addrs: &[Address], amounts: &[u128], token: &Address) -> Result<String>;
}

/// Sends calls through a node holding the `from` key
pub struct JsonRpcContract {
    rpc: Arc<JsonRpcClient>,
    from: Address,
    dfrewards: Address,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl JsonRpcContract {
    pub fn new(rpc: Arc<JsonRpcClient>, from: Address, dfrewards: Address) -> Self {
        Self {
            rpc,
            from,
            dfrewards,
            poll_interval: Duration::from_secs(2),
            poll_attempts: 60,
        }
    }

    /// Submit and wait for the receipt; a revert is a `TransactionFailed`
    async fn transact(&self, to: &Address, data: Vec<u8>) -> Result<String> {
        let hash = self.rpc.send_transaction(&self.from, to, &data).await?;
        for _ in 0..self.poll_attempts {
            match self.rpc.transaction_status(&hash).await? {
                Some(true) => return Ok(hash),
                Some(false) => return Err(BridgeError::TransactionFailed(format!("{hash} reverted"))),
                None => tokio::time::sleep(self.poll_interval).await,
            }
        }
        warn!(%hash, "Transaction still pending, not waiting further");
        Ok(hash)
    }
}

#[async_trait]
impl RewardsContract for JsonRpcContract {
    fn rewards_address(&self) -> &Address {
        &self.dfrewards
    }

    async fn approve(&self, token: &Address, amount: u128) -> Result<String> {
        self.transact(token, encode_approve(&self.dfrewards, amount)).await
    }

    async fn allocate(&self, addrs: &[Address], amounts: &[u128], token: &Address) -> Result<String> {
        let data = encode_allocate(addrs, amounts, token)?;
        self.transact(&self.dfrewards, data).await
    }
}

/// A call recorded by [`DryRunContract`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum ContractCall {
    Approve { token: Address, amount: u128 },
    Allocate { addrs: Vec<Address>, amounts: Vec<u128>, token: Address },
}

/// Records calls instead of sending them
pub struct DryRunContract {
    dfrewards: Address,
    calls: Mutex<Vec<ContractCall>>,
}

impl DryRunContract {
    pub fn new(dfrewards: Address) -> Self {
        Self {
            dfrewards,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ContractCall> {
        self.calls.lock().clone()
    }

    fn record(&self, call: ContractCall) -> String {
        let mut calls = self.calls.lock();
        calls.push(call);
        format!("dry-run-{}", calls.len())
    }
}

#[async_trait]
impl RewardsContract for DryRunContract {
    fn rewards_address(&self) -> &Address {
        &self.dfrewards
    }

    async fn approve(&self, token: &Address, amount: u128) -> Result<String> {
        Ok(self.record(ContractCall::Approve {
            token: token.clone(),
            amount,
        }))
    }

    async fn allocate(&self, addrs: &[Address], amounts: &[u128], token: &Address) -> Result<String> {
        Ok(self.record(ContractCall::Allocate {
            addrs: addrs.to_vec(),
            amounts: amounts.to_vec(),
            token: token.clone(),
        }))
    }
}

/// Outcome of one `allocate` batch
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub index: usize,
    pub recipients: usize,
    pub amount: u128,
    pub tx: Option<String>,
    pub error: Option<String>,
}

/// Summary of a dispense run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DispenseReceipt {
    pub token: Option<Address>,
    pub total: u128,
    pub recipients: usize,
    pub approve_tx: Option<String>,
    pub batches: Vec<BatchOutcome>,
}

impl DispenseReceipt {
    /// Amount actually allocated
    pub fn dispensed(&self) -> u128 {
        self.batches
            .iter()
            .filter(|b| b.tx.is_some())
            .map(|b| b.amount)
            .sum()
    }

    pub fn failed_batches(&self) -> impl Iterator<Item = &BatchOutcome> {
        self.batches.iter().filter(|b| b.error.is_some())
    }

    pub fn is_complete(&self) -> bool {
        self.failed_batches().next().is_none()
    }
}

/// Batches a reward map into contract calls
pub struct Dispenser<C: RewardsContract> {
    contract: C,
    batch_size: usize,
    retry: RetryPolicy,
}

impl<C: RewardsContract> Dispenser<C> {
    pub fn new(contract: C) -> Self {
        Self {
            contract,
            batch_size: MAX_BATCH_SIZE,
            retry: RetryPolicy::new(BATCH_ATTEMPTS, Duration::from_secs(5)),
        }
    }

    /// Batch size, clamped to `1..=500`
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn contract(&self) -> &C {
        &self.contract
    }

    /// Approve the total then allocate batch by batch; zero amounts are skipped
    pub async fn dispense(&self, rewards: &BTreeMap<Address, u128>, token: &Address) -> Result<DispenseReceipt> {
        let entries: Vec<(&Address, u128)> = rewards
            .iter()
            .filter(|(_, amount)| **amount > 0)
            .map(|(addr, amount)| (addr, *amount))
            .collect();

        let total = entries
            .iter()
            .try_fold(0u128, |acc, (_, amount)| acc.checked_add(*amount))
            .ok_or_else(|| BridgeError::InvalidInput("reward total overflows u128".into()))?;

        let mut receipt = DispenseReceipt {
            token: Some(token.clone()),
            total,
            recipients: entries.len(),
            ..Default::default()
        };
        if entries.is_empty() {
            info!(%token, "Nothing to dispense");
            return Ok(receipt);
        }

        let approve_tx = with_retry(&self.retry, "approve", || self.contract.approve(token, total)).await?;
        info!(%token, total, tx = %approve_tx, "Approved");
        receipt.approve_tx = Some(approve_tx);

        for (index, batch) in entries.chunks(self.batch_size).enumerate() {
            let addrs: Vec<Address> = batch.iter().map(|(a, _)| (*a).clone()).collect();
            let amounts: Vec<u128> = batch.iter().map(|(_, v)| *v).collect();
            let amount: u128 = amounts.iter().sum();
            let what = format!("allocate batch {index}");

            let outcome = match with_retry(&self.retry, &what, || {
                self.contract.allocate(&addrs, &amounts, token)
            })
            .await
            {
                Ok(tx) => {
                    info!(batch = index, recipients = addrs.len(), amount, %tx, "Allocated");
                    BatchOutcome {
                        index,
                        recipients: addrs.len(),
                        amount,
                        tx: Some(tx),
                        error: None,
                    }
                }
                Err(err) => {
                    error!(batch = index, recipients = addrs.len(), amount, error = %err, "CRITICAL: batch not dispensed");
                    BatchOutcome {
                        index,
                        recipients: addrs.len(),
                        amount,
                        tx: None,
                        error: Some(err.to_string()),
                    }
                }
            };
            receipt.batches.push(outcome);
        }

        Ok(receipt)
    }
}
