//! Web front-end: Axum server for the exchange pages and price API.
//!
//! HTML pages are rendered server-side; `/api/*` returns JSON and is the
//! only part with CORS enabled.

pub mod pages;
pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use secrecy::SecretString;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::auth::session::SessionStore;
use crate::config::AppConfig;
use crate::engine::cashier::Cashier;
use crate::engine::trade::TradeEngine;
use crate::market::PriceOracle;
use crate::storage::Store;

/// Shared state accessible by all route handlers.
pub struct ExchangeState {
    pub config: AppConfig,
    pub store: Store,
    pub oracle: Arc<dyn PriceOracle>,
    pub sessions: SessionStore,
    pub trades: TradeEngine,
    pub cashier: Cashier,
}

impl ExchangeState {
    pub fn new(
        config: AppConfig,
        store: Store,
        oracle: Arc<dyn PriceOracle>,
        secret: SecretString,
    ) -> Self {
        let sessions = SessionStore::new(
            secret,
            config.session.ttl_secs,
            config.session.captcha_ttl_secs,
        );
        let trades = TradeEngine::new(
            store.clone(),
            oracle.clone(),
            config.exchange.assets.clone(),
            config.exchange.max_conflict_retries,
        );
        let cashier = Cashier::new(
            store.clone(),
            config.exchange.deposit_amount,
            config.exchange.max_conflict_retries,
        );
        Self { config, store, oracle, sessions, trades, cashier }
    }

    pub fn assets(&self) -> &[String] {
        &self.config.exchange.assets
    }
}

pub type AppState = Arc<ExchangeState>;

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    let api = Router::new()
        .route("/api/prices", get(routes::api_prices))
        .route("/api/historical", get(routes::api_historical))
        .layer(cors);

    Router::new()
        .route("/", get(routes::index))
        .route("/register", get(routes::register_form).post(routes::register_submit))
        .route("/login", get(routes::login_form).post(routes::login_submit))
        .route("/logout", get(routes::logout))
        .route("/dashboard", get(routes::dashboard))
        .route("/exchange", get(routes::exchange_page).post(routes::exchange_select))
        .route("/store", get(routes::store_page).post(routes::store_submit))
        .route("/deposit", get(routes::deposit_page).post(routes::deposit_submit))
        .route("/withdraw", get(routes::withdraw_page).post(routes::withdraw_submit))
        .route("/health", get(routes::health))
        .merge(api)
        .with_state(state)
}

/// Serve until Ctrl+C.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(%addr, "Exchange listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received.");
        })
        .await
        .context("HTTP server error")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
