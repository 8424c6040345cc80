//! # Exchange Rates
//!
//! Average USD price of a token over a date range.
//!
//! ```text
//! H2O      → 1.618, always
//! primary  → Binance daily klines, mean close of <SYMBOL>USDT
//! fallback → CoinGecko market_chart/range, mean price in USD
//! ```
//!
//! A token no provider can price has no rate; the caller decides whether
//! that is fatal (it is for OCEAN).

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::join_all;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

use df_core::{Symbol, H2O_RATE};

use crate::{parse_decimal, BridgeError, Result};

/// Default Binance API root
pub const BINANCE_API: &str = "https://api.binance.com";

/// Default CoinGecko API root
pub const COINGECKO_API: &str = "https://api.coingecko.com";

/// Source of average USD rates
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Mean USD price of `symbol` from `st` to `fin`, both days included
    async fn rate(&self, symbol: &Symbol, st: NaiveDate, fin: NaiveDate) -> Result<f64>;
}

fn start_of_day_secs(date: NaiveDate) -> i64 {
    date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp()
}

fn mean(values: &[f64], what: &str) -> Result<f64> {
    if values.is_empty() {
        return Err(BridgeError::RateUnavailable(what.to_string()));
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

async fn get_json(client: &reqwest::Client, url: &str) -> Result<Value> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(BridgeError::Http {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(response.json().await?)
}

/// Mean close price from a Binance klines response
///
/// Each kline is `[open_time, open, high, low, close, ...]` with prices as strings.
pub fn parse_binance_klines(body: &Value) -> Result<f64> {
    let klines = body
        .as_array()
        .ok_or_else(|| BridgeError::Malformed(format!("klines not an array: {body}")))?;
    let closes = klines
        .iter()
        .map(|k| {
            k.get(4)
                .ok_or_else(|| BridgeError::Malformed("kline without close".into()))
                .and_then(parse_decimal)
        })
        .collect::<Result<Vec<f64>>>()?;
    mean(&closes, "binance klines")
}

/// Mean price from a CoinGecko `market_chart/range` response
pub fn parse_coingecko_prices(body: &Value) -> Result<f64> {
    let prices = body
        .get("prices")
        .and_then(Value::as_array)
        .ok_or_else(|| BridgeError::Malformed("response without prices".into()))?;
    let values = prices
        .iter()
        .map(|p| {
            p.get(1)
                .ok_or_else(|| BridgeError::Malformed("price point without value".into()))
                .and_then(parse_decimal)
        })
        .collect::<Result<Vec<f64>>>()?;
    mean(&values, "coingecko prices")
}

/// CoinGecko coin id for a symbol
pub fn coingecko_id(symbol: &Symbol) -> Option<&'static str> {
    Some(match symbol.as_str() {
        "OCEAN" => "ocean-protocol",
        "ETH" | "WETH" => "ethereum",
        "MATIC" => "matic-network",
        "BNB" => "binancecoin",
        "EWT" => "energy-web-token",
        "MOVR" => "moonriver",
        "ROSE" => "oasis-network",
        "USDT" => "tether",
        "USDC" => "usd-coin",
        "DAI" => "dai",
        "FET" => "fetch-ai",
        _ => return None,
    })
}

/// Binance daily klines against USDT
pub struct BinanceProvider {
    client: reqwest::Client,
    base_url: String,
}

impl BinanceProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl RateProvider for BinanceProvider {
    fn name(&self) -> &str {
        "binance"
    }

    async fn rate(&self, symbol: &Symbol, st: NaiveDate, fin: NaiveDate) -> Result<f64> {
        let url = format!(
            "{}/api/v3/klines?symbol={}USDT&interval=1d&startTime={}&endTime={}",
            self.base_url.trim_end_matches('/'),
            symbol,
            start_of_day_secs(st) * 1000,
            start_of_day_secs(fin) * 1000,
        );
        parse_binance_klines(&get_json(&self.client, &url).await?)
    }
}

/// CoinGecko range prices in USD
pub struct CoinGeckoProvider {
    client: reqwest::Client,
    base_url: String,
}

impl CoinGeckoProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl RateProvider for CoinGeckoProvider {
    fn name(&self) -> &str {
        "coingecko"
    }

    async fn rate(&self, symbol: &Symbol, st: NaiveDate, fin: NaiveDate) -> Result<f64> {
        let id = coingecko_id(symbol)
            .ok_or_else(|| BridgeError::RateUnavailable(format!("no coingecko id for {symbol}")))?;
        let url = format!(
            "{}/api/v3/coins/{}/market_chart/range?vs_currency=usd&from={}&to={}",
            self.base_url.trim_end_matches('/'),
            id,
            start_of_day_secs(st),
            start_of_day_secs(fin) + 24 * 3600,
        );
        parse_coingecko_prices(&get_json(&self.client, &url).await?)
    }
}

/// Ordered providers, first success wins
pub struct RateSource {
    providers: Vec<Box<dyn RateProvider>>,
}

impl RateSource {
    pub fn new(providers: Vec<Box<dyn RateProvider>>) -> Self {
        Self { providers }
    }

    /// Binance then CoinGecko
    pub fn http(binance_url: &str, coingecko_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self::new(vec![
            Box::new(BinanceProvider::new(binance_url, timeout)?),
            Box::new(CoinGeckoProvider::new(coingecko_url, timeout)?),
        ]))
    }

    /// Rate of `symbol`, or `None` when every provider fails
    pub async fn get_rate(&self, symbol: &Symbol, st: NaiveDate, fin: NaiveDate) -> Option<f64> {
        if *symbol == Symbol::h2o() {
            return Some(H2O_RATE);
        }

        for provider in &self.providers {
            match provider.rate(symbol, st, fin).await {
                Ok(rate) if rate > 0.0 => {
                    info!(%symbol, provider = provider.name(), rate, "Got rate");
                    return Some(rate);
                }
                Ok(rate) => {
                    warn!(%symbol, provider = provider.name(), rate, "Ignoring non-positive rate");
                }
                Err(err) => {
                    warn!(%symbol, provider = provider.name(), error = %err, "Rate lookup failed");
                }
            }
        }
        None
    }

    /// Rates of several symbols, looked up concurrently
    pub async fn get_rates(
        &self,
        symbols: &[Symbol],
        st: NaiveDate,
        fin: NaiveDate,
    ) -> BTreeMap<Symbol, Option<f64>> {
        let lookups = symbols.iter().map(|s| self.get_rate(s, st, fin));
        symbols.iter().cloned().zip(join_all(lookups).await).collect()
    }
}
