//! Route handlers.
//!
//! Pages take form posts and answer with HTML or a 303 redirect. Domain
//! errors are rendered on the form they came from; only storage/internal
//! faults become a 500.

use axum::{
    async_trait,
    extract::{FromRequestParts, Query, State},
    http::{request::Parts, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use tracing::{error, info, warn};

use super::pages::{self, AuthForm, Notice};
use super::AppState;
use crate::auth::{self, session::SessionId};
use crate::types::{
    parse_amount, ExchangeError, HistoricalSeries, PriceMap, TradeReceipt, TradeRequest, TradeSide,
    UserId,
};

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

fn session_cookie(state: &AppState, id: SessionId) -> Cookie<'static> {
    Cookie::build((state.config.session.cookie_name.clone(), state.sessions.sign(id)))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

async fn current_session(state: &AppState, jar: &CookieJar) -> Option<SessionId> {
    let token = jar.get(&state.config.session.cookie_name).map(|c| c.value().to_owned());
    state.sessions.resolve(token.as_deref()).await
}

/// The caller's live session, starting a new one (and setting its cookie)
/// if there is none.
async fn ensure_session(state: &AppState, jar: CookieJar) -> (CookieJar, SessionId) {
    if let Some(id) = current_session(state, &jar).await {
        return (jar, id);
    }
    let id = state.sessions.create().await;
    (jar.add(session_cookie(state, id)), id)
}

/// An authenticated caller. Rejects with a redirect to `/login`.
pub struct CurrentUser {
    pub user_id: UserId,
    pub session: SessionId,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Redirect;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let session = current_session(state, &jar)
            .await
            .ok_or_else(|| Redirect::to("/login"))?;
        let user_id = state
            .sessions
            .user_id(session)
            .await
            .ok_or_else(|| Redirect::to("/login"))?;
        Ok(Self { user_id, session })
    }
}

/// Map a non-form error to a response.
fn fail(err: ExchangeError) -> Response {
    match err {
        ExchangeError::NotAuthenticated => Redirect::to("/login").into_response(),
        other => {
            error!(error = %other, "Request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Html(pages::server_error())).into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Public pages
// ---------------------------------------------------------------------------

/// GET /
pub async fn index(State(state): State<AppState>, jar: CookieJar) -> Html<String> {
    let logged_in = match current_session(&state, &jar).await {
        Some(id) => state.sessions.user_id(id).await.is_some(),
        None => false,
    };
    Html(pages::landing(logged_in))
}

/// POST body of `/register` and `/login`.
#[derive(Debug, Deserialize)]
pub struct CredentialsForm {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub captcha_text: String,
}

/// Render a captcha form with a fresh challenge bound to the session.
async fn render_auth_form(
    state: &AppState,
    jar: CookieJar,
    kind: AuthForm,
    notice: Option<Notice>,
) -> Response {
    let (jar, session) = ensure_session(state, jar).await;
    let challenge = state.sessions.issue_captcha(session).await;
    (jar, Html(pages::auth_form(kind, &challenge, notice.as_ref()))).into_response()
}

/// GET /register
pub async fn register_form(State(state): State<AppState>, jar: CookieJar) -> Response {
    render_auth_form(&state, jar, AuthForm::Register, None).await
}

/// POST /register
pub async fn register_submit(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<CredentialsForm>,
) -> Response {
    let (jar, session) = ensure_session(&state, jar).await;

    match register(&state, session, &form).await {
        Ok(user_id) => {
            info!(user_id, username = %form.username.trim(), "Account registered");
            (jar, Redirect::to("/login")).into_response()
        }
        Err(e) if e.is_user_facing() => {
            render_auth_form(&state, jar, AuthForm::Register, Some(Notice::Error(e.to_string()))).await
        }
        Err(e) => fail(e),
    }
}

async fn register(
    state: &AppState,
    session: SessionId,
    form: &CredentialsForm,
) -> Result<UserId, ExchangeError> {
    if !state.sessions.check_captcha(session, &form.captcha_text).await {
        return Err(ExchangeError::CaptchaMismatch);
    }
    let username = form.username.trim();
    if username.is_empty() {
        return Err(ExchangeError::InvalidInput("username must not be empty".into()));
    }
    let hash = auth::hash_password(&form.password)?;
    state.store.create_user(username, &hash, state.assets()).await
}

/// GET /login
pub async fn login_form(State(state): State<AppState>, jar: CookieJar) -> Response {
    render_auth_form(&state, jar, AuthForm::Login, None).await
}

/// POST /login
pub async fn login_submit(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<CredentialsForm>,
) -> Response {
    let (jar, session) = ensure_session(&state, jar).await;

    match authenticate(&state, session, &form).await {
        Ok(user_id) => {
            let session = state.sessions.login(session, user_id).await;
            info!(user_id, "Logged in");
            (jar.add(session_cookie(&state, session)), Redirect::to("/dashboard")).into_response()
        }
        Err(e) if e.is_user_facing() => {
            warn!(username = %form.username.trim(), reason = %e, "Login rejected");
            // Same message whichever check failed.
            let notice = Notice::Error(ExchangeError::InvalidCredentials.to_string());
            render_auth_form(&state, jar, AuthForm::Login, Some(notice)).await
        }
        Err(e) => fail(e),
    }
}

async fn authenticate(
    state: &AppState,
    session: SessionId,
    form: &CredentialsForm,
) -> Result<UserId, ExchangeError> {
    if !state.sessions.check_captcha(session, &form.captcha_text).await {
        return Err(ExchangeError::CaptchaMismatch);
    }
    let user = state
        .store
        .find_user_by_username(form.username.trim())
        .await?
        .ok_or(ExchangeError::InvalidCredentials)?;
    if !auth::verify_password(&user.password_hash, &form.password) {
        return Err(ExchangeError::InvalidCredentials);
    }
    Ok(user.id)
}

/// GET /logout
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Some(id) = current_session(&state, &jar).await {
        state.sessions.destroy(id).await;
    }
    let removal = Cookie::build((state.config.session.cookie_name.clone(), "")).path("/");
    (jar.remove(removal), Redirect::to("/")).into_response()
}

// ---------------------------------------------------------------------------
// Account pages
// ---------------------------------------------------------------------------

/// GET /dashboard
pub async fn dashboard(State(state): State<AppState>, user: CurrentUser) -> Response {
    match state.store.load_account(user.user_id).await {
        Ok(account) => Html(pages::dashboard(&account, state.assets())).into_response(),
        Err(e) => fail(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ExchangeForm {
    #[serde(default)]
    pub crypto: String,
}

fn exchange_response(state: &AppState, requested: Option<&str>) -> Html<String> {
    let assets = state.assets();
    let selected = requested
        .filter(|r| assets.iter().any(|a| a == *r))
        .or_else(|| assets.first().map(String::as_str))
        .unwrap_or_default();
    Html(pages::exchange(assets, selected, state.config.market.default_history_days))
}

/// GET /exchange
pub async fn exchange_page(State(state): State<AppState>, _user: CurrentUser) -> Html<String> {
    exchange_response(&state, None)
}

/// POST /exchange
pub async fn exchange_select(
    State(state): State<AppState>,
    _user: CurrentUser,
    Form(form): Form<ExchangeForm>,
) -> Html<String> {
    exchange_response(&state, Some(form.crypto.trim()))
}

#[derive(Debug, Deserialize)]
pub struct TradeForm {
    pub crypto: String,
    pub amount: String,
    pub action: String,
}

/// GET /store
pub async fn store_page(State(state): State<AppState>, user: CurrentUser) -> Response {
    match state.store.load_account(user.user_id).await {
        Ok(account) => Html(pages::store(&account, state.assets(), None)).into_response(),
        Err(e) => fail(e),
    }
}

/// POST /store
pub async fn store_submit(
    State(state): State<AppState>,
    user: CurrentUser,
    Form(form): Form<TradeForm>,
) -> Response {
    let notice = match trade(&state, user.user_id, &form).await {
        Ok(receipt) => Notice::Success(receipt.to_string()),
        Err(e) if e.is_user_facing() => Notice::Error(e.to_string()),
        Err(e) => return fail(e),
    };

    match state.store.load_account(user.user_id).await {
        Ok(account) => Html(pages::store(&account, state.assets(), Some(&notice))).into_response(),
        Err(e) => fail(e),
    }
}

async fn trade(
    state: &AppState,
    user_id: UserId,
    form: &TradeForm,
) -> Result<TradeReceipt, ExchangeError> {
    let request = TradeRequest {
        asset: form.crypto.trim().to_string(),
        amount: parse_amount(&form.amount)?,
        side: form.action.parse::<TradeSide>()?,
    };
    state.trades.execute(user_id, &request).await
}

/// GET /deposit
pub async fn deposit_page(State(state): State<AppState>, _user: CurrentUser) -> Html<String> {
    Html(pages::deposit(state.cashier.deposit_amount()))
}

/// POST /deposit
pub async fn deposit_submit(State(state): State<AppState>, user: CurrentUser) -> Response {
    match state.cashier.deposit(user.user_id).await {
        Ok(_) => Redirect::to("/dashboard").into_response(),
        Err(e) => fail(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct WithdrawForm {
    pub amount: String,
    #[serde(default)]
    pub method: String,
}

/// GET /withdraw
pub async fn withdraw_page(State(state): State<AppState>, user: CurrentUser) -> Response {
    match state.store.load_account(user.user_id).await {
        Ok(account) => Html(pages::withdraw(account.balance_usd, None)).into_response(),
        Err(e) => fail(e),
    }
}

/// POST /withdraw
pub async fn withdraw_submit(
    State(state): State<AppState>,
    user: CurrentUser,
    Form(form): Form<WithdrawForm>,
) -> Response {
    let outcome = match parse_amount(&form.amount) {
        Ok(amount) => state.cashier.withdraw(user.user_id, amount, &form.method).await,
        Err(e) => Err(e),
    };

    let notice = match outcome {
        Ok(receipt) => Notice::Success(receipt.to_string()),
        Err(e) if e.is_user_facing() => Notice::Error(e.to_string()),
        Err(e) => return fail(e),
    };

    match state.store.load_account(user.user_id).await {
        Ok(account) => Html(pages::withdraw(account.balance_usd, Some(&notice))).into_response(),
        Err(e) => fail(e),
    }
}

// ---------------------------------------------------------------------------
// JSON API
// ---------------------------------------------------------------------------

/// GET /api/prices
pub async fn api_prices(State(state): State<AppState>) -> Json<PriceMap> {
    Json(state.oracle.current_prices(state.assets()).await)
}

#[derive(Debug, Deserialize)]
pub struct HistoricalQuery {
    pub crypto: Option<String>,
    pub days: Option<String>,
}

/// GET /api/historical
pub async fn api_historical(
    State(state): State<AppState>,
    Query(query): Query<HistoricalQuery>,
) -> Json<HistoricalSeries> {
    let assets = state.assets();
    let asset = match query.crypto.as_deref().map(str::trim) {
        Some(requested) => requested.to_string(),
        None => assets.first().cloned().unwrap_or_default(),
    };
    if !assets.contains(&asset) {
        return Json(HistoricalSeries::default());
    }

    let days = query
        .days
        .as_deref()
        .and_then(|d| d.trim().parse::<u32>().ok())
        .filter(|d| *d > 0)
        .unwrap_or(state.config.market.default_history_days);

    Json(state.oracle.historical_series(&asset, days).await)
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}
