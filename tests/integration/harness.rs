//! Browser-like test client.
//!
//! Drives the real router with `oneshot`, carrying the session cookie
//! between requests the way a browser would.

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use rust_decimal::Decimal;
use secrecy::SecretString;
use std::sync::Arc;
use tower::ServiceExt;

use paper_exchange::auth::session::SessionId;
use paper_exchange::config::AppConfig;
use paper_exchange::storage::{AccountChange, Store};
use paper_exchange::types::{AccountSnapshot, UserId};
use paper_exchange::web::{build_router, AppState, ExchangeState};

use super::mock_oracle::MockOracle;

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl Response {
    pub fn location(&self) -> Option<&str> {
        self.headers.get(header::LOCATION).and_then(|v| v.to_str().ok())
    }
}

pub struct TestClient {
    pub state: AppState,
    pub oracle: Arc<MockOracle>,
    router: Router,
    cookie: Option<String>,
}

impl TestClient {
    pub async fn new() -> Self {
        let store = Store::in_memory().await.unwrap();
        let oracle = Arc::new(MockOracle::new());
        let state = Arc::new(ExchangeState::new(
            AppConfig::default(),
            store,
            oracle.clone(),
            SecretString::new("integration-secret".into()),
        ));
        let router = build_router(state.clone());
        Self { state, oracle, router, cookie: None }
    }

    /// A second browser against the same server.
    pub fn fork(&self) -> Self {
        Self {
            state: self.state.clone(),
            oracle: self.oracle.clone(),
            router: self.router.clone(),
            cookie: None,
        }
    }

    fn cookie_name(&self) -> &str {
        &self.state.config.session.cookie_name
    }

    async fn send(&mut self, request: Request<Body>) -> Response {
        let resp = self.router.clone().oneshot(request).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();

        for set_cookie in headers.get_all(header::SET_COOKIE) {
            let raw = set_cookie.to_str().unwrap();
            let pair = raw.split(';').next().unwrap();
            if let Some((name, value)) = pair.split_once('=') {
                if name == self.cookie_name() {
                    self.cookie = (!value.is_empty()).then(|| value.to_string());
                }
            }
        }

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        Response { status, headers, body: String::from_utf8(bytes.to_vec()).unwrap() }
    }

    fn with_cookie(&self, builder: axum::http::request::Builder) -> axum::http::request::Builder {
        match &self.cookie {
            Some(value) => builder.header(header::COOKIE, format!("{}={value}", self.cookie_name())),
            None => builder,
        }
    }

    pub async fn get(&mut self, uri: &str) -> Response {
        let request = self
            .with_cookie(Request::builder().method("GET").uri(uri))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn post(&mut self, uri: &str, form: &[(&str, &str)]) -> Response {
        let body = form
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let request = self
            .with_cookie(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded"),
            )
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    pub fn session_id(&self) -> SessionId {
        let token = self.cookie.as_deref().expect("no session cookie yet");
        self.state.sessions.verify_token(token).expect("session cookie signature")
    }

    /// Pin the pending captcha to a known answer (the rendered image is
    /// not machine-readable).
    pub async fn pin_captcha(&self, text: &str) {
        self.state.sessions.set_captcha(self.session_id(), text).await;
    }

    /// Open the form at `uri` and submit it with a correct captcha.
    pub async fn submit_captcha_form(&mut self, uri: &str, username: &str, password: &str) -> Response {
        let page = self.get(uri).await;
        assert_eq!(page.status, StatusCode::OK);
        self.pin_captcha("Q7W8E9").await;
        self.post(
            uri,
            &[("username", username), ("password", password), ("captcha_text", "q7w8e9")],
        )
        .await
    }

    pub async fn register(&mut self, username: &str, password: &str) -> Response {
        self.submit_captcha_form("/register", username, password).await
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Response {
        self.submit_captcha_form("/login", username, password).await
    }

    /// Register, log in and return the new user's id.
    pub async fn signed_in(&mut self, username: &str) -> UserId {
        let resp = self.register(username, "correct horse").await;
        assert_eq!(resp.location(), Some("/login"), "{}", resp.body);
        let resp = self.login(username, "correct horse").await;
        assert_eq!(resp.location(), Some("/dashboard"), "{}", resp.body);
        self.state.sessions.user_id(self.session_id()).await.unwrap()
    }

    pub async fn account(&self, user_id: UserId) -> AccountSnapshot {
        self.state.store.load_account(user_id).await.unwrap()
    }

    pub async fn fund(&self, user_id: UserId, amount: Decimal) {
        let store = &self.state.store;
        let snapshot = store.load_account(user_id).await.unwrap();
        let change = AccountChange { new_balance: snapshot.balance_usd + amount, holding: None };
        assert!(store.apply_change(&snapshot, &change).await.unwrap());
    }
}
