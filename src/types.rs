//! Shared types for the paper exchange.
//!
//! These types form the data model used across the storage, market,
//! engine and web modules, so that none of them depends on another
//! for its vocabulary.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Primary key of a user row.
pub type UserId = i64;

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// A user row as needed for authentication.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    /// PHC-format salted hash. Never compared as a string.
    pub password_hash: String,
}

/// One asset position of a user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioEntry {
    pub crypto_id: String,
    pub amount: Decimal,
}

/// Point-in-time view of a user's wallet.
///
/// `version` is bumped by every balance write and is what the store
/// compares against when applying a change computed from this snapshot.
#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    pub user_id: UserId,
    pub balance_usd: Decimal,
    pub holdings: Vec<PortfolioEntry>,
    pub version: i64,
}

impl AccountSnapshot {
    /// Amount held of `asset`; zero when there is no row for it.
    pub fn holding(&self, asset: &str) -> Decimal {
        self.holdings
            .iter()
            .find(|h| h.crypto_id == asset)
            .map(|h| h.amount)
            .unwrap_or(Decimal::ZERO)
    }
}

// ---------------------------------------------------------------------------
// Trading
// ---------------------------------------------------------------------------

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "buy"),
            TradeSide::Sell => write!(f, "sell"),
        }
    }
}

impl FromStr for TradeSide {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" => Ok(TradeSide::Buy),
            "sell" => Ok(TradeSide::Sell),
            other => Err(ExchangeError::InvalidInput(format!("unknown action '{other}'"))),
        }
    }
}

/// A validated trade order.
#[derive(Debug, Clone)]
pub struct TradeRequest {
    pub asset: String,
    pub amount: Decimal,
    pub side: TradeSide,
}

/// Outcome of a filled trade.
#[derive(Debug, Clone, Serialize)]
pub struct TradeReceipt {
    pub user_id: UserId,
    pub asset: String,
    pub side: TradeSide,
    pub amount: Decimal,
    pub price: Decimal,
    pub cost: Decimal,
    pub balance_after: Decimal,
}

impl fmt::Display for TradeReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Success: {} {} {} for ${:.2}",
            self.side,
            self.amount.normalize(),
            self.asset.to_uppercase(),
            self.cost,
        )
    }
}

/// Outcome of an accepted (simulated) withdrawal.
#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalReceipt {
    pub user_id: UserId,
    pub amount: Decimal,
    pub method: String,
    pub balance_after: Decimal,
}

impl fmt::Display for WithdrawalReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Withdrawal request of ${} to {} accepted (simulated)",
            self.amount.normalize(),
            self.method,
        )
    }
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// Price of one asset in USD, shaped like the upstream `simple/price` entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsdQuote {
    pub usd: Decimal,
}

/// Asset id → quote. A zero quote means the oracle was unavailable.
pub type PriceMap = BTreeMap<String, UsdQuote>;

/// Chart-ready price history. Labels are sequential indices, not dates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSeries {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

impl HistoricalSeries {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain errors surfaced to the page layer.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("Invalid captcha!")]
    CaptchaMismatch,

    #[error("User already exists!")]
    DuplicateUsername,

    #[error("Invalid username or password!")]
    InvalidCredentials,

    #[error("Insufficient USD: need ${needed:.2}, have ${available:.2}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    #[error("Insufficient {asset}: need {needed}, have {available}")]
    InsufficientHoldings {
        asset: String,
        needed: Decimal,
        available: Decimal,
    },

    #[error("Price API error: {0}")]
    PriceOracleUnavailable(String),

    #[error("Login required")]
    NotAuthenticated,

    #[error("Unsupported asset: {0}")]
    UnknownAsset(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Account was modified concurrently, please retry")]
    Conflict,

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExchangeError {
    /// Whether the error is the user's to fix (rendered on the form) rather
    /// than a server fault.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, ExchangeError::Storage(_) | ExchangeError::Internal(_))
    }
}

/// Parse a form amount: finite and strictly positive.
pub fn parse_amount(raw: &str) -> Result<Decimal, ExchangeError> {
    let amount = Decimal::from_str(raw.trim())
        .or_else(|_| Decimal::from_scientific(raw.trim()))
        .map_err(|_| ExchangeError::InvalidAmount(format!("'{}' is not a number", raw.trim())))?;
    if amount <= Decimal::ZERO {
        return Err(ExchangeError::InvalidAmount("must be greater than zero".into()));
    }
    Ok(amount)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
