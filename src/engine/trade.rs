//! Trade engine.
//!
//! Buys and sells at the oracle's spot price against the simulated USD
//! balance. A trade touches exactly two rows (the user's balance and one
//! portfolio position) or none.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use super::with_fresh_snapshot;
use crate::market::PriceOracle;
use crate::storage::{AccountChange, Store};
use crate::types::{
    AccountSnapshot, ExchangeError, TradeReceipt, TradeRequest, TradeSide, UserId,
};

pub struct TradeEngine {
    store: Store,
    oracle: Arc<dyn PriceOracle>,
    assets: Vec<String>,
    max_retries: u32,
}

impl TradeEngine {
    pub fn new(
        store: Store,
        oracle: Arc<dyn PriceOracle>,
        assets: Vec<String>,
        max_retries: u32,
    ) -> Self {
        Self { store, oracle, assets, max_retries }
    }

    pub fn supports(&self, asset: &str) -> bool {
        self.assets.iter().any(|a| a == asset)
    }

    /// Execute a market order for `user_id`.
    ///
    /// The price is fetched once; balance and holdings checks are re-run
    /// against a fresh snapshot if another request wrote to the account
    /// in between.
    pub async fn execute(
        &self,
        user_id: UserId,
        request: &TradeRequest,
    ) -> Result<TradeReceipt, ExchangeError> {
        if !self.supports(&request.asset) {
            return Err(ExchangeError::UnknownAsset(request.asset.clone()));
        }
        if request.amount <= Decimal::ZERO {
            return Err(ExchangeError::InvalidAmount("must be greater than zero".into()));
        }

        let price = self.oracle.spot_price(&request.asset).await.map_err(|e| {
            warn!(user_id, asset = %request.asset, error = %e, "Spot price unavailable");
            ExchangeError::PriceOracleUnavailable(e.to_string())
        })?;

        let store = &self.store;
        let receipt = with_fresh_snapshot(store, user_id, self.max_retries, |snapshot| async move {
            let (change, receipt) = plan_trade(&snapshot, request, price)?;
            let committed = store.apply_change(&snapshot, &change).await?;
            Ok::<_, ExchangeError>(committed.then_some(receipt))
        })
        .await?;

        info!(
            user_id,
            asset = %receipt.asset,
            side = %receipt.side,
            amount = %receipt.amount,
            price = %receipt.price,
            cost = format!("${:.2}", receipt.cost),
            balance = format!("${:.2}", receipt.balance_after),
            "Trade filled"
        );
        Ok(receipt)
    }
}

/// Validate a trade against a snapshot and compute the resulting rows.
pub fn plan_trade<'a>(
    snapshot: &AccountSnapshot,
    request: &'a TradeRequest,
    price: Decimal,
) -> Result<(AccountChange<'a>, TradeReceipt), ExchangeError> {
    let cost = request
        .amount
        .checked_mul(price)
        .ok_or_else(|| ExchangeError::InvalidAmount("trade value out of range".into()))?;
    let held = snapshot.holding(&request.asset);

    let (new_balance, new_holding) = match request.side {
        TradeSide::Buy => {
            if cost > snapshot.balance_usd {
                return Err(ExchangeError::InsufficientFunds {
                    needed: cost,
                    available: snapshot.balance_usd,
                });
            }
            (snapshot.balance_usd - cost, held + request.amount)
        }
        TradeSide::Sell => {
            if request.amount > held {
                return Err(ExchangeError::InsufficientHoldings {
                    asset: request.asset.clone(),
                    needed: request.amount,
                    available: held,
                });
            }
            (snapshot.balance_usd + cost, held - request.amount)
        }
    };

    let change = AccountChange {
        new_balance,
        holding: Some((request.asset.as_str(), new_holding)),
    };
    let receipt = TradeReceipt {
        user_id: snapshot.user_id,
        asset: request.asset.clone(),
        side: request.side,
        amount: request.amount,
        price,
        cost,
        balance_after: new_balance,
    };
    Ok((change, receipt))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
