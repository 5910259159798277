//! Paper Exchange: simulated crypto trading over live market prices.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the database and serves the web front-end until Ctrl+C.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use paper_exchange::config::AppConfig;
use paper_exchange::market::coingecko::CoinGeckoClient;
use paper_exchange::storage::Store;
use paper_exchange::web::{self, ExchangeState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var("EXCHANGE_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    info!(
        config = %config_path,
        assets = ?cfg.exchange.assets,
        deposit_amount = %cfg.exchange.deposit_amount,
        oracle = %cfg.market.base_url,
        "Paper Exchange starting up"
    );

    let secret = cfg.session_secret()?;
    let addr = cfg.listen_addr()?;

    let store = Store::connect(&cfg.database.url, cfg.database.max_connections)
        .await
        .with_context(|| format!("Failed to open database {}", cfg.database.url))?;

    let oracle = CoinGeckoClient::new(
        &cfg.market.base_url,
        &cfg.market.vs_currency,
        cfg.market_timeout(),
    )?;

    let state = Arc::new(ExchangeState::new(cfg, store, Arc::new(oracle), secret));
    web::serve(state, addr).await?;

    info!("Paper Exchange shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("paper_exchange=info"));

    let json_logging = std::env::var("EXCHANGE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
