//! # Subgraph Client
//!
//! GraphQL queries against one chain's subgraph. Every collection query is
//! paged with `first`/`skip` until an empty page comes back; each page is
//! retried with exponential spacing.
//!
//! ## Queries
//!
//! | Query | Entity | Result |
//! |-------|--------|--------|
//! | [`SubgraphClient::fetch_nftvols`] | `orders` | basetoken → nft → volume (+ gas) |
//! | [`SubgraphClient::fetch_swapvols`] | `fixedRateExchangeSwaps` | basetoken → nft → swap volume |
//! | [`SubgraphClient::fetch_owners`] | `nfts` | nft → owner |
//! | [`SubgraphClient::fetch_symbols`] | `tokens` | basetoken → symbol |
//! | [`SubgraphClient::fetch_vebals`] | `veOCEANs` | lp → (veOCEAN, locked OCEAN) |
//! | [`SubgraphClient::fetch_allocations`] | `veAllocations` | chain → nft → lp → fraction |
//! | [`SubgraphClient::fetch_predictoor_contracts`] | `predictContracts` | contract → feed nft |
//! | [`SubgraphClient::fetch_predictions`] | `predictPredictions` | settled predictions |

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use df_core::{Address, Allocations, ChainId, Prediction, Symbol};

use crate::retry::{with_retry, RetryPolicy};
use crate::{parse_decimal, BridgeError, Result};

/// Rows per page
pub const PAGE_SIZE: usize = 1000;

/// Ids per `id_in` filter
const ID_CHUNK: usize = 1000;

/// Longest veOCEAN lock: 4 years
pub const MAX_LOCK_SECS: f64 = 4.0 * 365.0 * 24.0 * 3600.0;

/// Allocations are recorded in basis points of the LP's balance
const ALLOCATION_DENOMINATOR: f64 = 10_000.0;

/// One GraphQL round trip
#[async_trait]
pub trait SubgraphTransport: Send + Sync {
    /// POST `query` to `url` and return the response's `data` object
    async fn query(&self, url: &str, query: &str) -> Result<Value>;
}

/// `reqwest` transport
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SubgraphTransport for HttpTransport {
    async fn query(&self, url: &str, query: &str) -> Result<Value> {
        let response = self
            .client
            .post(url)
            .json(&json!({ "query": query }))
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(BridgeError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let mut body: Value = response.json().await?;
        let data = body.get_mut("data").map(Value::take);
        match data {
            Some(data) if !data.is_null() => Ok(data),
            _ => Err(BridgeError::MissingData(
                body.get("errors")
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no data key".to_string()),
            )),
        }
    }
}

/// One LP's veOCEAN position at a block
#[derive(Clone, Debug, PartialEq)]
pub struct VeLock {
    pub balance: f64,
    pub locked: f64,
    pub unlock_time: i64,
}

#[derive(Deserialize)]
struct IdRef {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderRow {
    last_price_token: Option<IdRef>,
    #[serde(default)]
    last_price_value: Option<Value>,
    gas_used: Option<Value>,
    gas_price: Option<Value>,
    datatoken: DatatokenRef,
}

#[derive(Deserialize)]
struct DatatokenRef {
    nft: IdRef,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapRow {
    base_token_amount: Value,
    exchange_id: ExchangeRef,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeRef {
    base_token: IdRef,
    datatoken: DatatokenRef,
}

#[derive(Deserialize)]
struct NftRow {
    id: String,
    owner: IdRef,
}

#[derive(Deserialize)]
struct TokenRow {
    id: String,
    symbol: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VeOceanRow {
    id: String,
    locked_amount: Value,
    unlock_time: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VeAllocationRow {
    allocation_user: IdRef,
    chain_id: Value,
    nft_address: String,
    allocated: Value,
}

#[derive(Deserialize)]
struct PredictContractRow {
    id: String,
    token: PredictTokenRef,
}

#[derive(Deserialize)]
struct PredictTokenRef {
    nft: IdRef,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PredictionRow {
    user: IdRef,
    slot: PredictSlotRef,
    payout: Option<PayoutRef>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PredictSlotRef {
    slot: Value,
    predict_contract: IdRef,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayoutRef {
    predicted_value: bool,
    true_value: bool,
}

fn parse_rows<T: for<'de> Deserialize<'de>>(rows: Vec<Value>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(BridgeError::from))
        .collect()
}

fn id_list(ids: &[Address]) -> String {
    let quoted: Vec<String> = ids.iter().map(|a| format!("\"{a}\"")).collect();
    format!("[{}]", quoted.join(","))
}

/// Subgraph client for one chain
pub struct SubgraphClient<T> {
    transport: T,
    chain_id: ChainId,
    url: String,
    retry: RetryPolicy,
    page_size: usize,
}

impl<T: SubgraphTransport> SubgraphClient<T> {
    pub fn new(transport: T, chain_id: ChainId, url: impl Into<String>) -> Self {
        Self {
            transport,
            chain_id,
            url: url.into(),
            retry: RetryPolicy::default(),
            page_size: PAGE_SIZE,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// One query, retried
    pub async fn query(&self, query: &str) -> Result<Value> {
        with_retry(&self.retry, "subgraph query", || {
            self.transport.query(&self.url, query)
        })
        .await
    }

    /// Every row of `entity`, paging until an empty page
    ///
    /// `build(first, skip)` renders the query for one page.
    pub async fn query_all(
        &self,
        entity: &str,
        build: impl Fn(usize, usize) -> String,
    ) -> Result<Vec<Value>> {
        let mut rows = Vec::new();
        loop {
            let data = self.query(&build(self.page_size, rows.len())).await?;
            let page = data
                .get(entity)
                .and_then(Value::as_array)
                .ok_or_else(|| BridgeError::MissingData(entity.to_string()))?;

            if page.is_empty() {
                break;
            }
            rows.extend(page.iter().cloned());
            debug!(chain = self.chain_id, entity, n_rows = rows.len(), "Fetched page");
        }
        Ok(rows)
    }

    /// Consume volume per basetoken and nft, plus gas in the native token
    /// under the zero address
    pub async fn fetch_nftvols(
        &self,
        st_block: u64,
        fin_block: u64,
    ) -> Result<BTreeMap<Address, BTreeMap<Address, f64>>> {
        let rows = self
            .query_all("orders", |first, skip| {
                format!(
                    "{{ orders(where: {{block_gte: {st_block}, block_lte: {fin_block}}}, \
                     first: {first}, skip: {skip}, orderBy: id) {{ \
                     lastPriceToken {{ id }} lastPriceValue gasUsed gasPrice \
                     datatoken {{ nft {{ id }} }} }} }}"
                )
            })
            .await?;

        let mut vols: BTreeMap<Address, BTreeMap<Address, f64>> = BTreeMap::new();
        for order in parse_rows::<OrderRow>(rows)? {
            let nft = Address::parse(&order.datatoken.nft.id)?;

            if let (Some(token), Some(value)) = (order.last_price_token, order.last_price_value) {
                let value = parse_decimal(&value)?;
                if value > 0.0 {
                    *vols
                        .entry(Address::parse(&token.id)?)
                        .or_default()
                        .entry(nft.clone())
                        .or_default() += value;
                }
            }

            if let (Some(used), Some(price)) = (order.gas_used, order.gas_price) {
                let gas = parse_decimal(&used)? * parse_decimal(&price)? / 1e18;
                if gas > 0.0 {
                    *vols
                        .entry(Address::zero())
                        .or_default()
                        .entry(nft)
                        .or_default() += gas;
                }
            }
        }

        info!(
            chain = self.chain_id,
            st_block,
            fin_block,
            n_basetokens = vols.len(),
            "Fetched nft volumes"
        );
        Ok(vols)
    }

    /// Basetoken paid into fixed-rate exchanges per basetoken and nft
    pub async fn fetch_swapvols(
        &self,
        st_block: u64,
        fin_block: u64,
    ) -> Result<BTreeMap<Address, BTreeMap<Address, f64>>> {
        let rows = self
            .query_all("fixedRateExchangeSwaps", |first, skip| {
                format!(
                    "{{ fixedRateExchangeSwaps(where: {{block_gte: {st_block}, block_lte: {fin_block}}}, \
                     first: {first}, skip: {skip}, orderBy: id) {{ \
                     baseTokenAmount exchangeId {{ baseToken {{ id }} \
                     datatoken {{ nft {{ id }} }} }} }} }}"
                )
            })
            .await?;

        let mut vols: BTreeMap<Address, BTreeMap<Address, f64>> = BTreeMap::new();
        for swap in parse_rows::<SwapRow>(rows)? {
            let amount = parse_decimal(&swap.base_token_amount)?;
            if amount <= 0.0 {
                continue;
            }
            *vols
                .entry(Address::parse(&swap.exchange_id.base_token.id)?)
                .or_default()
                .entry(Address::parse(&swap.exchange_id.datatoken.nft.id)?)
                .or_default() += amount;
        }

        info!(
            chain = self.chain_id,
            st_block,
            fin_block,
            n_basetokens = vols.len(),
            "Fetched swap volumes"
        );
        Ok(vols)
    }

    /// Owner of each nft
    pub async fn fetch_owners(&self, nfts: &[Address]) -> Result<BTreeMap<Address, Address>> {
        let mut owners = BTreeMap::new();
        for chunk in nfts.chunks(ID_CHUNK) {
            let ids = id_list(chunk);
            let rows = self
                .query_all("nfts", |first, skip| {
                    format!(
                        "{{ nfts(where: {{id_in: {ids}}}, first: {first}, skip: {skip}) \
                         {{ id owner {{ id }} }} }}"
                    )
                })
                .await?;
            for row in parse_rows::<NftRow>(rows)? {
                owners.insert(Address::parse(&row.id)?, Address::parse(&row.owner.id)?);
            }
        }
        Ok(owners)
    }

    /// Symbol of each basetoken
    pub async fn fetch_symbols(&self, tokens: &[Address]) -> Result<BTreeMap<Address, Symbol>> {
        let mut symbols = BTreeMap::new();
        let queried: Vec<Address> = tokens.iter().filter(|t| !t.is_zero()).cloned().collect();

        for chunk in queried.chunks(ID_CHUNK) {
            let ids = id_list(chunk);
            let rows = self
                .query_all("tokens", |first, skip| {
                    format!(
                        "{{ tokens(where: {{id_in: {ids}}}, first: {first}, skip: {skip}) \
                         {{ id symbol }} }}"
                    )
                })
                .await?;
            for row in parse_rows::<TokenRow>(rows)? {
                if let Some(symbol) = row.symbol {
                    symbols.insert(Address::parse(&row.id)?, Symbol::new(&symbol));
                }
            }
        }
        Ok(symbols)
    }

    /// veOCEAN balance and locked OCEAN per LP at a block
    ///
    /// The balance decays linearly to zero at unlock: `locked · remaining / MAX_LOCK_SECS`.
    pub async fn fetch_vebals(
        &self,
        block: u64,
        block_ts: i64,
    ) -> Result<BTreeMap<Address, VeLock>> {
        let rows = self
            .query_all("veOCEANs", |first, skip| {
                format!(
                    "{{ veOCEANs(first: {first}, skip: {skip}, block: {{number: {block}}}) \
                     {{ id lockedAmount unlockTime }} }}"
                )
            })
            .await?;

        let mut balances = BTreeMap::new();
        for row in parse_rows::<VeOceanRow>(rows)? {
            let locked = parse_decimal(&row.locked_amount)?;
            let unlock = parse_decimal(&row.unlock_time)?;
            let remaining = (unlock - block_ts as f64).max(0.0);
            let balance = locked * remaining.min(MAX_LOCK_SECS) / MAX_LOCK_SECS;
            balances.insert(
                Address::parse(&row.id)?,
                VeLock {
                    balance,
                    locked,
                    unlock_time: unlock as i64,
                },
            );
        }
        Ok(balances)
    }

    /// veOCEAN allocations at a block, as fractions of each LP's balance
    pub async fn fetch_allocations(&self, block: u64) -> Result<Allocations> {
        let rows = self
            .query_all("veAllocations", |first, skip| {
                format!(
                    "{{ veAllocations(where: {{allocated_gt: 0}}, first: {first}, skip: {skip}, \
                     block: {{number: {block}}}) \
                     {{ allocationUser {{ id }} chainId nftAddress allocated }} }}"
                )
            })
            .await?;

        let mut allocations = Allocations::new();
        for row in parse_rows::<VeAllocationRow>(rows)? {
            let chain_id = parse_decimal(&row.chain_id)? as ChainId;
            let fraction = parse_decimal(&row.allocated)? / ALLOCATION_DENOMINATOR;
            *allocations
                .entry(chain_id)
                .or_default()
                .entry(Address::parse(&row.nft_address)?)
                .or_default()
                .entry(Address::parse(&row.allocation_user.id)?)
                .or_default() += fraction;
        }
        Ok(allocations)
    }

    /// Predictoor feed contracts and the nft behind each
    pub async fn fetch_predictoor_contracts(&self) -> Result<BTreeMap<Address, Address>> {
        let rows = self
            .query_all("predictContracts", |first, skip| {
                format!(
                    "{{ predictContracts(first: {first}, skip: {skip}) \
                     {{ id token {{ nft {{ id }} }} }} }}"
                )
            })
            .await?;

        let mut contracts = BTreeMap::new();
        for row in parse_rows::<PredictContractRow>(rows)? {
            contracts.insert(Address::parse(&row.id)?, Address::parse(&row.token.nft.id)?);
        }
        Ok(contracts)
    }

    /// Settled predictions for slots in `(st_ts, fin_ts]`
    pub async fn fetch_predictions(&self, st_ts: i64, fin_ts: i64) -> Result<Vec<Prediction>> {
        let rows = self
            .query_all("predictPredictions", |first, skip| {
                format!(
                    "{{ predictPredictions(where: {{slot_: {{slot_gt: {st_ts}, slot_lte: {fin_ts}, \
                     status: \"Paying\"}}}}, first: {first}, skip: {skip}) \
                     {{ user {{ id }} slot {{ slot predictContract {{ id }} }} \
                     payout {{ predictedValue trueValue }} }} }}"
                )
            })
            .await?;

        let mut predictions = Vec::new();
        for row in parse_rows::<PredictionRow>(rows)? {
            // Unsettled predictions have no payout yet
            let Some(payout) = row.payout else {
                continue;
            };
            predictions.push(Prediction {
                predictoor: Address::parse(&row.user.id)?,
                contract: Address::parse(&row.slot.predict_contract.id)?,
                slot: parse_decimal(&row.slot.slot)? as u64,
                correct: payout.predicted_value == payout.true_value,
            });
        }

        info!(chain = self.chain_id, n_predictions = predictions.len(), "Fetched predictions");
        Ok(predictions)
    }
}
