//! Simulated deposits and withdrawals.
//!
//! Neither side talks to a payment provider. A deposit is a free fixed
//! credit; a withdrawal only debits the balance and keeps no ledger of
//! pending payouts.

use rust_decimal::Decimal;
use tracing::info;

use super::with_fresh_snapshot;
use crate::storage::{AccountChange, Store};
use crate::types::{ExchangeError, UserId, WithdrawalReceipt};

pub struct Cashier {
    store: Store,
    deposit_amount: Decimal,
    max_retries: u32,
}

impl Cashier {
    pub fn new(store: Store, deposit_amount: Decimal, max_retries: u32) -> Self {
        Self { store, deposit_amount, max_retries }
    }

    pub fn deposit_amount(&self) -> Decimal {
        self.deposit_amount
    }

    /// Credit the fixed deposit amount. Returns the new balance.
    pub async fn deposit(&self, user_id: UserId) -> Result<Decimal, ExchangeError> {
        let store = &self.store;
        let amount = self.deposit_amount;
        let balance = with_fresh_snapshot(store, user_id, self.max_retries, |snapshot| async move {
            let change = AccountChange { new_balance: snapshot.balance_usd + amount, holding: None };
            let committed = store.apply_change(&snapshot, &change).await?;
            Ok::<_, ExchangeError>(committed.then_some(change.new_balance))
        })
        .await?;
        info!(
            user_id,
            amount = %self.deposit_amount,
            balance = format!("${balance:.2}"),
            "Simulated deposit"
        );
        Ok(balance)
    }

    /// Debit `amount` if the balance covers it.
    pub async fn withdraw(
        &self,
        user_id: UserId,
        amount: Decimal,
        method: &str,
    ) -> Result<WithdrawalReceipt, ExchangeError> {
        if amount <= Decimal::ZERO {
            return Err(ExchangeError::InvalidAmount("must be greater than zero".into()));
        }
        let method = method.trim();
        if method.is_empty() {
            return Err(ExchangeError::InvalidInput("withdrawal method is required".into()));
        }

        let store = &self.store;
        let receipt = with_fresh_snapshot(store, user_id, self.max_retries, |snapshot| async move {
            if amount > snapshot.balance_usd {
                return Err(ExchangeError::InsufficientFunds {
                    needed: amount,
                    available: snapshot.balance_usd,
                });
            }
            let change = AccountChange { new_balance: snapshot.balance_usd - amount, holding: None };
            let committed = store.apply_change(&snapshot, &change).await?;
            Ok::<_, ExchangeError>(committed.then(|| WithdrawalReceipt {
                user_id,
                amount,
                method: method.to_string(),
                balance_after: change.new_balance,
            }))
        })
        .await?;

        info!(
            user_id,
            amount = %receipt.amount,
            method = %receipt.method,
            balance = format!("${:.2}", receipt.balance_after),
            "Simulated withdrawal accepted"
        );
        Ok(receipt)
    }
}
