//! Core engine: trade execution and wallet movements.
//!
//! Both follow the same shape: read a snapshot, validate against it,
//! write conditionally on the snapshot's version, and re-read on conflict.

pub mod cashier;
pub mod trade;

use std::future::Future;
use tracing::warn;

use crate::storage::Store;
use crate::types::{AccountSnapshot, ExchangeError, UserId};

/// Run `attempt` against fresh snapshots until it commits.
///
/// `attempt` returns `Ok(Some(_))` once its write landed, `Ok(None)` when
/// the snapshot was stale. Validation errors end the loop immediately.
pub(crate) async fn with_fresh_snapshot<T, F, Fut>(
    store: &Store,
    user_id: UserId,
    max_retries: u32,
    mut attempt: F,
) -> Result<T, ExchangeError>
where
    F: FnMut(AccountSnapshot) -> Fut,
    Fut: Future<Output = Result<Option<T>, ExchangeError>>,
{
    for round in 0..=max_retries {
        let snapshot = store.load_account(user_id).await?;
        if let Some(done) = attempt(snapshot).await? {
            return Ok(done);
        }
        warn!(user_id, round, "Concurrent account update, retrying");
    }
    Err(ExchangeError::Conflict)
}
