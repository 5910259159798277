//! Market data.
//!
//! Defines the `PriceOracle` trait and the CoinGecko implementation used in
//! production. The read-only endpoints degrade to zero/empty data; the
//! trade path needs a real price and gets a `Result`.

pub mod coingecko;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::{HistoricalSeries, PriceMap, UsdQuote};

/// Abstraction over external price providers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Current USD price for every asset in `assets`.
    ///
    /// Never fails: when the provider is unreachable or returns garbage,
    /// every asset maps to a zero quote.
    async fn current_prices(&self, assets: &[String]) -> PriceMap;

    /// Current USD price of a single asset, for trade execution.
    async fn spot_price(&self, asset: &str) -> Result<Decimal>;

    /// Price history over the last `days` days. Empty on failure.
    async fn historical_series(&self, asset: &str, days: u32) -> HistoricalSeries;
}

/// The degraded answer of [`PriceOracle::current_prices`].
pub fn zero_prices(assets: &[String]) -> PriceMap {
    assets
        .iter()
        .map(|a| (a.clone(), UsdQuote { usd: Decimal::ZERO }))
        .collect()
}
