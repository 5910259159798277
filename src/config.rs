//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! The session signing key is referenced by env-var name in the config
//! and resolved at startup, never stored in the file itself.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::time::Duration;

use crate::auth::session::MAX_TTL_SECS;

/// Top-level application configuration.
///
/// Built once at startup and shared read-only by every component.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_addr: "0.0.0.0".into(), port: 8080 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://exchange.db".into(), max_connections: 5 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MarketConfig {
    /// CoinGecko v3 API root, without trailing slash.
    pub base_url: String,
    pub vs_currency: String,
    pub timeout_secs: u64,
    pub default_history_days: u32,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.coingecko.com/api/v3".into(),
            vs_currency: "usd".into(),
            timeout_secs: 10,
            default_history_days: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub secret_key_env: String,
    pub cookie_name: String,
    pub ttl_secs: u64,
    pub captcha_ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret_key_env: "EXCHANGE_SECRET_KEY".into(),
            cookie_name: "exchange_session".into(),
            ttl_secs: 86_400,
            captcha_ttl_secs: 600,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    /// CoinGecko coin ids. Every new account gets one zero position per id.
    pub assets: Vec<String>,
    pub deposit_amount: Decimal,
    pub max_conflict_retries: u32,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            assets: ["bitcoin", "ethereum", "tether", "binancecoin", "solana"]
                .into_iter()
                .map(String::from)
                .collect(),
            deposit_amount: dec!(100),
            max_conflict_retries: 3,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.exchange.assets.is_empty() {
            bail!("exchange.assets must list at least one asset");
        }
        let mut seen = HashSet::new();
        for asset in &self.exchange.assets {
            if asset.trim().is_empty() {
                bail!("exchange.assets contains an empty id");
            }
            if !seen.insert(asset.as_str()) {
                bail!("exchange.assets lists '{asset}' twice");
            }
        }
        if self.exchange.deposit_amount <= Decimal::ZERO {
            bail!("exchange.deposit_amount must be positive");
        }
        if self.market.timeout_secs == 0 {
            bail!("market.timeout_secs must be positive");
        }
        for (key, secs) in [
            ("session.ttl_secs", self.session.ttl_secs),
            ("session.captcha_ttl_secs", self.session.captcha_ttl_secs),
        ] {
            if secs == 0 || secs > MAX_TTL_SECS {
                bail!("{key} must be between 1 and {MAX_TTL_SECS}");
            }
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.bind_addr, self.server.port)
            .parse()
            .with_context(|| {
                format!("Invalid listen address {}:{}", self.server.bind_addr, self.server.port)
            })
    }

    pub fn market_timeout(&self) -> Duration {
        Duration::from_secs(self.market.timeout_secs)
    }

    /// Resolve the session signing key from the environment.
    pub fn session_secret(&self) -> Result<SecretString> {
        Self::resolve_env(&self.session.secret_key_env).map(SecretString::new)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
