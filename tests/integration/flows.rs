//! End-to-end browser flows against the full router.

use axum::http::StatusCode;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;

use super::harness::TestClient;

#[tokio::test]
async fn registration_creates_zeroed_portfolio() {
    let mut browser = TestClient::new().await;

    let resp = browser.register("alice", "hunter2").await;
    assert_eq!(resp.status, StatusCode::SEE_OTHER);
    assert_eq!(resp.location(), Some("/login"));

    let store = &browser.state.store;
    assert_eq!(store.count_users_named("alice").await.unwrap(), 1);

    let user = store.find_user_by_username("alice").await.unwrap().unwrap();
    assert_ne!(user.password_hash, "hunter2");

    let account = browser.account(user.id).await;
    assert_eq!(account.balance_usd, Decimal::ZERO);
    assert_eq!(account.holdings.len(), 5);
    assert!(account.holdings.iter().all(|h| h.amount.is_zero()));
}

#[tokio::test]
async fn duplicate_username_is_rejected() {
    let mut browser = TestClient::new().await;
    browser.register("alice", "first").await;

    let resp = browser.register("alice", "second").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.body.contains("User already exists!"));
    assert_eq!(browser.state.store.count_users_named("alice").await.unwrap(), 1);
}

#[tokio::test]
async fn wrong_captcha_blocks_registration() {
    let mut browser = TestClient::new().await;
    browser.get("/register").await;
    browser.pin_captcha("ABC123").await;

    let resp = browser
        .post("/register", &[("username", "bob"), ("password", "pw"), ("captcha_text", "ZZZ999")])
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.body.contains("Invalid captcha!"));
    assert_eq!(browser.state.store.count_users_named("bob").await.unwrap(), 0);

    // The rejected challenge was replaced; its old answer no longer works.
    let resp = browser
        .post("/register", &[("username", "bob"), ("password", "pw"), ("captcha_text", "ABC123")])
        .await;
    assert!(resp.body.contains("Invalid captcha!"));
    assert_eq!(browser.state.store.count_users_named("bob").await.unwrap(), 0);
}

#[tokio::test]
async fn login_failures_share_one_message() {
    let mut browser = TestClient::new().await;
    browser.register("carol", "right").await;

    let wrong_password = browser.login("carol", "wrong").await;
    let unknown_user = browser.login("mallory", "right").await;

    browser.get("/login").await;
    browser.pin_captcha("AAAAAA").await;
    let bad_captcha = browser
        .post("/login", &[("username", "carol"), ("password", "right"), ("captcha_text", "BBBBBB")])
        .await;

    for resp in [wrong_password, unknown_user, bad_captcha] {
        assert_eq!(resp.status, StatusCode::OK);
        assert!(resp.body.contains("Invalid username or password!"));
        assert!(!resp.body.contains("Invalid captcha!"));
    }

    let resp = browser.get("/dashboard").await;
    assert_eq!(resp.location(), Some("/login"));
}

#[tokio::test]
async fn login_rotates_session_and_logout_ends_it() {
    let mut browser = TestClient::new().await;
    browser.register("dave", "pw").await;
    let anonymous = browser.session_id();

    let resp = browser.login("dave", "pw").await;
    assert_eq!(resp.location(), Some("/dashboard"));
    let authenticated = browser.session_id();
    assert_ne!(anonymous, authenticated);
    assert!(!browser.state.sessions.is_active(anonymous).await);

    let resp = browser.get("/dashboard").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.body.contains("$0.00"));

    let resp = browser.get("/logout").await;
    assert_eq!(resp.location(), Some("/"));
    assert!(!browser.state.sessions.is_active(authenticated).await);

    let resp = browser.get("/store").await;
    assert_eq!(resp.location(), Some("/login"));
}

#[tokio::test]
async fn deposit_credits_fixed_amount() {
    let mut browser = TestClient::new().await;
    let user_id = browser.signed_in("erin").await;

    let page = browser.get("/deposit").await;
    assert!(page.body.contains("$100.00"));

    for _ in 0..2 {
        let resp = browser.post("/deposit", &[]).await;
        assert_eq!(resp.location(), Some("/dashboard"));
    }
    assert_eq!(browser.account(user_id).await.balance_usd, dec!(200));
}

#[tokio::test]
async fn buy_then_sell_through_store() {
    let mut browser = TestClient::new().await;
    let user_id = browser.signed_in("frank").await;
    browser.fund(user_id, dec!(1000)).await;

    let resp = browser
        .post("/store", &[("crypto", "bitcoin"), ("amount", "0.01"), ("action", "buy")])
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.body.contains("Success: buy 0.01 BITCOIN for $500.00"), "{}", resp.body);

    let account = browser.account(user_id).await;
    assert_eq!(account.balance_usd, dec!(500));
    assert_eq!(account.holding("bitcoin"), dec!(0.01));

    browser.oracle.set_price("bitcoin", dec!(60000));
    let resp = browser
        .post("/store", &[("crypto", "bitcoin"), ("amount", "0.005"), ("action", "sell")])
        .await;
    assert!(resp.body.contains("Success: sell 0.005 BITCOIN for $300.00"), "{}", resp.body);

    let account = browser.account(user_id).await;
    assert_eq!(account.balance_usd, dec!(800));
    assert_eq!(account.holding("bitcoin"), dec!(0.005));
}

#[tokio::test]
async fn rejected_trades_leave_account_untouched() {
    let mut browser = TestClient::new().await;
    let user_id = browser.signed_in("grace").await;
    browser.fund(user_id, dec!(100)).await;

    let resp = browser
        .post("/store", &[("crypto", "bitcoin"), ("amount", "1"), ("action", "buy")])
        .await;
    assert!(resp.body.contains("Insufficient USD: need $50000.00, have $100.00"), "{}", resp.body);

    let resp = browser
        .post("/store", &[("crypto", "solana"), ("amount", "2"), ("action", "sell")])
        .await;
    assert!(resp.body.contains("Insufficient solana"), "{}", resp.body);

    let resp = browser
        .post("/store", &[("crypto", "dogecoin"), ("amount", "1"), ("action", "buy")])
        .await;
    assert!(resp.body.contains("Unsupported asset"), "{}", resp.body);

    let resp = browser
        .post("/store", &[("crypto", "bitcoin"), ("amount", "-1"), ("action", "buy")])
        .await;
    assert!(resp.body.contains("Invalid amount"), "{}", resp.body);

    // Only the two well-formed orders asked for a price.
    assert_eq!(browser.oracle.spot_calls(), 2);

    let account = browser.account(user_id).await;
    assert_eq!(account.balance_usd, dec!(100));
    assert!(account.holdings.iter().all(|h| h.amount.is_zero()));
}

#[tokio::test]
async fn oracle_outage_blocks_trading() {
    let mut browser = TestClient::new().await;
    let user_id = browser.signed_in("heidi").await;
    browser.fund(user_id, dec!(1000)).await;
    browser.oracle.set_offline(true);

    let resp = browser
        .post("/store", &[("crypto", "ethereum"), ("amount", "0.1"), ("action", "buy")])
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.body.contains("Price API error"), "{}", resp.body);
    assert_eq!(browser.account(user_id).await.balance_usd, dec!(1000));

    let prices: Value = serde_json::from_str(&browser.get("/api/prices").await.body).unwrap();
    assert_eq!(prices["ethereum"]["usd"].as_f64(), Some(0.0));
}

#[tokio::test]
async fn withdrawal_debits_balance() {
    let mut browser = TestClient::new().await;
    let user_id = browser.signed_in("ivan").await;
    browser.fund(user_id, dec!(100)).await;

    let resp = browser.post("/withdraw", &[("amount", "40"), ("method", "card")]).await;
    assert!(
        resp.body.contains("Withdrawal request of $40 to card accepted (simulated)"),
        "{}",
        resp.body
    );
    assert_eq!(browser.account(user_id).await.balance_usd, dec!(60));

    let resp = browser.post("/withdraw", &[("amount", "61"), ("method", "card")]).await;
    assert!(resp.body.contains("Insufficient USD"), "{}", resp.body);
    assert_eq!(browser.account(user_id).await.balance_usd, dec!(60));
}

#[tokio::test]
async fn sessions_are_isolated_between_browsers() {
    let mut alice = TestClient::new().await;
    let alice_id = alice.signed_in("alice").await;
    let mut bob = alice.fork();
    let bob_id = bob.signed_in("bob").await;
    assert_ne!(alice_id, bob_id);

    bob.post("/deposit", &[]).await;
    assert_eq!(alice.account(alice_id).await.balance_usd, Decimal::ZERO);
    assert_eq!(bob.account(bob_id).await.balance_usd, dec!(100));
}

#[tokio::test]
async fn price_api_serves_oracle_data() {
    let mut browser = TestClient::new().await;

    let resp = browser.get("/api/prices").await;
    assert_eq!(resp.status, StatusCode::OK);
    let prices: Value = serde_json::from_str(&resp.body).unwrap();
    assert_eq!(prices["bitcoin"]["usd"].as_f64(), Some(50000.0));
    assert_eq!(prices.as_object().unwrap().len(), 5);

    let resp = browser.get("/api/historical?crypto=bitcoin&days=7").await;
    let series: Value = serde_json::from_str(&resp.body).unwrap();
    assert_eq!(series["labels"].as_array().unwrap().len(), 4);
    assert_eq!(series["values"][2].as_f64(), Some(50500.0));

    let resp = browser.get("/api/historical?crypto=dogecoin").await;
    let series: Value = serde_json::from_str(&resp.body).unwrap();
    assert!(series["values"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn exchange_chart_falls_back_to_first_asset() {
    let mut browser = TestClient::new().await;
    browser.signed_in("judy").await;

    let resp = browser.get("/exchange").await;
    assert!(resp.body.contains(r#"data-selected="bitcoin""#), "{}", resp.body);

    let resp = browser.post("/exchange", &[("crypto", "solana")]).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.body.contains(r#"data-selected="solana""#), "{}", resp.body);

    let resp = browser.post("/exchange", &[("crypto", "dogecoin")]).await;
    assert!(resp.body.contains(r#"data-selected="bitcoin""#), "{}", resp.body);

    let resp = browser.post("/exchange", &[]).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.body.contains(r#"data-selected="bitcoin""#), "{}", resp.body);
}
