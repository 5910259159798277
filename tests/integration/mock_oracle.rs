//! Mock price oracle for integration testing.
//!
//! Deterministic `PriceOracle` with in-memory prices that test code can
//! change or knock out at any time.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use paper_exchange::market::{zero_prices, PriceOracle};
use paper_exchange::types::{HistoricalSeries, PriceMap, UsdQuote};

pub struct MockOracle {
    prices: Mutex<HashMap<String, Decimal>>,
    history: Vec<f64>,
    offline: AtomicBool,
    spot_calls: AtomicUsize,
}

impl MockOracle {
    /// Fixed prices for the five default assets.
    pub fn new() -> Self {
        let prices = [
            ("bitcoin", dec!(50000)),
            ("ethereum", dec!(3000)),
            ("tether", dec!(1)),
            ("binancecoin", dec!(600)),
            ("solana", dec!(150)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            prices: Mutex::new(prices),
            history: vec![48000.0, 49000.0, 50500.0, 50000.0],
            offline: AtomicBool::new(false),
            spot_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_price(&self, asset: &str, price: Decimal) {
        self.prices.lock().unwrap().insert(asset.to_string(), price);
    }

    /// Make every call behave like an unreachable upstream.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn spot_calls(&self) -> usize {
        self.spot_calls.load(Ordering::SeqCst)
    }

    fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceOracle for MockOracle {
    async fn current_prices(&self, assets: &[String]) -> PriceMap {
        if self.is_offline() {
            return zero_prices(assets);
        }
        let prices = self.prices.lock().unwrap();
        assets
            .iter()
            .map(|a| {
                let usd = prices.get(a).copied().unwrap_or(Decimal::ZERO);
                (a.clone(), UsdQuote { usd })
            })
            .collect()
    }

    async fn spot_price(&self, asset: &str) -> Result<Decimal> {
        self.spot_calls.fetch_add(1, Ordering::SeqCst);
        if self.is_offline() {
            return Err(anyhow!("mock oracle offline"));
        }
        self.prices
            .lock()
            .unwrap()
            .get(asset)
            .copied()
            .ok_or_else(|| anyhow!("no price for {asset}"))
    }

    async fn historical_series(&self, _asset: &str, _days: u32) -> HistoricalSeries {
        if self.is_offline() {
            return HistoricalSeries::default();
        }
        HistoricalSeries {
            labels: (0..self.history.len()).map(|i| i.to_string()).collect(),
            values: self.history.clone(),
        }
    }
}
