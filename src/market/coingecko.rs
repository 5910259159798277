//! CoinGecko price client.
//!
//! API docs: https://docs.coingecko.com/reference/introduction
//! Endpoints used:
//!   `/simple/price?ids=..&vs_currencies=usd` for spot prices
//!   `/coins/{id}/market_chart?vs_currency=usd&days=N` for history
//! Auth: none on the public tier. Rate limit: ~30 req/min, not handled here.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::{zero_prices, PriceOracle};
use crate::types::{HistoricalSeries, PriceMap, UsdQuote};

/// `simple/price` body: `{ "bitcoin": { "usd": 50000.0 } }`.
type SimplePriceResponse = HashMap<String, HashMap<String, f64>>;

/// `market_chart` body. Each point is `[timestamp_ms, price]`.
#[derive(Debug, Deserialize)]
struct MarketChartResponse {
    prices: Vec<(f64, f64)>,
}

pub struct CoinGeckoClient {
    http: Client,
    base_url: String,
    vs_currency: String,
}

impl CoinGeckoClient {
    pub fn new(base_url: &str, vs_currency: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("paper-exchange/0.1.0")
            .build()
            .context("Failed to build HTTP client for CoinGecko")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            vs_currency: vs_currency.to_lowercase(),
        })
    }

    async fn fetch_simple_prices(&self, ids: &[String]) -> Result<SimplePriceResponse> {
        let ids = ids.iter().map(|id| urlencoding::encode(id)).collect::<Vec<_>>().join(",");
        let url = format!(
            "{}/simple/price?ids={ids}&vs_currencies={}",
            self.base_url, self.vs_currency
        );
        debug!(url = %url, "Fetching spot prices");

        let resp = self.http.get(&url).send().await.context("CoinGecko request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("CoinGecko API error {status}");
        }

        resp.json().await.context("Failed to parse CoinGecko simple/price response")
    }

    async fn fetch_market_chart(&self, asset: &str, days: u32) -> Result<MarketChartResponse> {
        let url = format!(
            "{}/coins/{}/market_chart?vs_currency={}&days={days}",
            self.base_url,
            urlencoding::encode(asset),
            self.vs_currency
        );
        debug!(url = %url, "Fetching price history");

        let resp = self.http.get(&url).send().await.context("CoinGecko request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("CoinGecko API error {status}");
        }

        resp.json().await.context("Failed to parse CoinGecko market_chart response")
    }

    /// Pick the configured currency out of a `simple/price` body.
    fn quote_for(&self, body: &SimplePriceResponse, asset: &str) -> Option<Decimal> {
        body.get(asset)
            .and_then(|quotes| quotes.get(&self.vs_currency))
            .and_then(|price| Decimal::from_f64(*price))
    }
}

/// Turn chart points into index-labelled series.
fn series_from_chart(chart: MarketChartResponse) -> HistoricalSeries {
    let values: Vec<f64> = chart.prices.into_iter().map(|(_, price)| price).collect();
    let labels = (0..values.len()).map(|i| i.to_string()).collect();
    HistoricalSeries { labels, values }
}

#[async_trait]
impl PriceOracle for CoinGeckoClient {
    async fn current_prices(&self, assets: &[String]) -> PriceMap {
        match self.fetch_simple_prices(assets).await {
            Ok(body) => assets
                .iter()
                .map(|asset| {
                    let usd = self.quote_for(&body, asset).unwrap_or(Decimal::ZERO);
                    (asset.clone(), UsdQuote { usd })
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "Price oracle unavailable, serving zero prices");
                zero_prices(assets)
            }
        }
    }

    async fn spot_price(&self, asset: &str) -> Result<Decimal> {
        let body = self.fetch_simple_prices(&[asset.to_string()]).await?;
        let price = self
            .quote_for(&body, asset)
            .ok_or_else(|| anyhow!("no {} price for {asset}", self.vs_currency))?;
        if price <= Decimal::ZERO {
            anyhow::bail!("non-positive price {price} for {asset}");
        }
        Ok(price)
    }

    async fn historical_series(&self, asset: &str, days: u32) -> HistoricalSeries {
        match self.fetch_market_chart(asset, days).await {
            Ok(chart) => series_from_chart(chart),
            Err(e) => {
                warn!(error = %e, asset, days, "Price history unavailable");
                HistoricalSeries::default()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
