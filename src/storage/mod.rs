//! Persistence layer.
//!
//! Two SQLite tables: `users` and `portfolio`. Amounts are stored as
//! canonical `Decimal` strings so a position reads back exactly as written.
//!
//! Every balance write goes through [`Store::apply_change`], which compares
//! the `version` column of the user row against the snapshot the change
//! was computed from. A stale snapshot writes nothing and the caller
//! re-reads and re-validates.

use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

use crate::types::{AccountSnapshot, ExchangeError, PortfolioEntry, UserId, UserRecord};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT UNIQUE NOT NULL,
        password TEXT NOT NULL,
        balance_usd TEXT NOT NULL DEFAULT '0',
        version INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS portfolio (
        user_id INTEGER NOT NULL REFERENCES users(id),
        crypto_id TEXT NOT NULL,
        amount TEXT NOT NULL DEFAULT '0',
        PRIMARY KEY (user_id, crypto_id)
    )",
];

/// A balance write computed from an [`AccountSnapshot`].
#[derive(Debug, Clone)]
pub struct AccountChange<'a> {
    pub new_balance: Decimal,
    /// `(asset, new amount)` when a portfolio row changes too.
    pub holding: Option<(&'a str, Decimal)>,
}

/// Handle to the exchange database. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database at `url` and ensure the schema.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, ExchangeError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        info!(url, "Database ready");
        Ok(store)
    }

    /// Private in-memory database. A single connection, since every
    /// `:memory:` connection would otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self, ExchangeError> {
        Self::connect("sqlite::memory:", 1).await
    }

    async fn init_schema(&self) -> Result<(), ExchangeError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    // -- Users -----------------------------------------------------------

    /// Insert a user with a zero position for every asset, atomically.
    ///
    /// Fails with [`ExchangeError::DuplicateUsername`] when the name is
    /// taken; nothing is written in that case.
    pub async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        assets: &[String],
    ) -> Result<UserId, ExchangeError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query("INSERT INTO users (username, password) VALUES (?, ?)")
            .bind(username)
            .bind(password_hash)
            .execute(&mut *tx)
            .await;

        let user_id = match inserted {
            Ok(res) => res.last_insert_rowid(),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(ExchangeError::DuplicateUsername);
            }
            Err(e) => return Err(e.into()),
        };

        for asset in assets {
            sqlx::query("INSERT INTO portfolio (user_id, crypto_id, amount) VALUES (?, ?, '0')")
                .bind(user_id)
                .bind(asset)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(user_id, username, positions = assets.len(), "User created");
        Ok(user_id)
    }

    pub async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, ExchangeError> {
        let row: Option<(i64, String, String)> =
            sqlx::query_as("SELECT id, username, password FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id, username, password_hash)| UserRecord { id, username, password_hash }))
    }

    pub async fn count_users_named(&self, username: &str) -> Result<i64, ExchangeError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // -- Accounts --------------------------------------------------------

    /// Read balance, version and all positions of a user.
    pub async fn load_account(&self, user_id: UserId) -> Result<AccountSnapshot, ExchangeError> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT balance_usd, version FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some((balance, version)) = row else {
            return Err(ExchangeError::NotAuthenticated);
        };

        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT crypto_id, amount FROM portfolio WHERE user_id = ? ORDER BY rowid",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let holdings = rows
            .into_iter()
            .map(|(crypto_id, amount)| {
                let amount = to_decimal(&amount)?;
                Ok(PortfolioEntry { crypto_id, amount })
            })
            .collect::<Result<Vec<_>, ExchangeError>>()?;

        Ok(AccountSnapshot { user_id, balance_usd: to_decimal(&balance)?, holdings, version })
    }

    /// Write a change computed from `snapshot`.
    ///
    /// Returns `Ok(false)` without writing anything if the user row has
    /// moved past `snapshot.version`.
    pub async fn apply_change(
        &self,
        snapshot: &AccountSnapshot,
        change: &AccountChange<'_>,
    ) -> Result<bool, ExchangeError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE users SET balance_usd = ?, version = version + 1 WHERE id = ? AND version = ?",
        )
        .bind(to_text(change.new_balance))
        .bind(snapshot.user_id)
        .bind(snapshot.version)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            debug!(user_id = snapshot.user_id, version = snapshot.version, "Stale account snapshot");
            return Ok(false);
        }

        if let Some((asset, amount)) = change.holding {
            let updated = sqlx::query(
                "UPDATE portfolio SET amount = ? WHERE user_id = ? AND crypto_id = ?",
            )
            .bind(to_text(amount))
            .bind(snapshot.user_id)
            .bind(asset)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(ExchangeError::Internal(format!(
                    "no portfolio row for user {} asset {asset}",
                    snapshot.user_id
                )));
            }
        }

        tx.commit().await?;
        Ok(true)
    }
}

fn to_decimal(stored: &str) -> Result<Decimal, ExchangeError> {
    Decimal::from_str(stored)
        .map_err(|e| ExchangeError::Internal(format!("corrupt stored amount '{stored}': {e}")))
}

fn to_text(value: Decimal) -> String {
    value.normalize().to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
