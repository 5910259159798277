//! Server-rendered HTML pages.
//!
//! Static assets (stylesheet, chart script) are compiled into the binary;
//! everything user-supplied goes through [`escape`].

use rust_decimal::Decimal;
use std::fmt::Write as _;

use crate::auth::captcha::CaptchaChallenge;
use crate::types::AccountSnapshot;

const STYLE_CSS: &str = include_str!("templates/style.css");
const EXCHANGE_JS: &str = include_str!("templates/exchange.js");

/// Message shown above a form.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Error(String),
    Success(String),
}

impl Notice {
    fn render(&self) -> String {
        match self {
            Notice::Error(msg) => format!(r#"<div class="notice error">{}</div>"#, escape(msg)),
            Notice::Success(msg) => format!(r#"<div class="notice success">{}</div>"#, escape(msg)),
        }
    }
}

fn render_notice(notice: Option<&Notice>) -> String {
    notice.map(Notice::render).unwrap_or_default()
}

/// Minimal HTML escaping for text and attribute values.
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn usd(amount: Decimal) -> String {
    format!("${:.2}", amount)
}

fn layout(title: &str, logged_in: bool, body: &str) -> String {
    let nav = if logged_in {
        r#"<a href="/dashboard">Dashboard</a><a href="/exchange">Exchange</a><a href="/store">Trade</a><a href="/deposit">Deposit</a><a href="/withdraw">Withdraw</a><a href="/logout">Log out</a>"#
    } else {
        r#"<a href="/login">Log in</a><a href="/register">Register</a>"#
    };
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} · Paper Exchange</title>
<style>{STYLE_CSS}</style>
</head>
<body>
<nav><a class="brand" href="/">Paper Exchange</a>{nav}</nav>
<main>
{body}
</main>
</body>
</html>"#,
        title = escape(title),
    )
}

pub fn landing(logged_in: bool) -> String {
    let call_to_action = if logged_in {
        r#"<p><a href="/dashboard">Go to your dashboard →</a></p>"#
    } else {
        r#"<p><a href="/register">Create an account</a> or <a href="/login">log in</a> to start trading.</p>"#
    };
    let body = format!(
        r#"<section class="panel">
<h1>Trade crypto without the risk</h1>
<p class="muted">Paper Exchange gives you a simulated USD wallet and live market prices for the top coins. Buy, sell and track your portfolio; no real money ever moves.</p>
{call_to_action}
</section>"#
    );
    layout("Home", logged_in, &body)
}

/// Which captcha-protected form to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthForm {
    Register,
    Login,
}

impl AuthForm {
    fn title(self) -> &'static str {
        match self {
            AuthForm::Register => "Register",
            AuthForm::Login => "Log in",
        }
    }

    fn action(self) -> &'static str {
        match self {
            AuthForm::Register => "/register",
            AuthForm::Login => "/login",
        }
    }
}

/// Registration or login form. Previously typed credentials are never
/// echoed back.
pub fn auth_form(kind: AuthForm, captcha: &CaptchaChallenge, notice: Option<&Notice>) -> String {
    let footer = match kind {
        AuthForm::Register => r#"<p class="muted">Already registered? <a href="/login">Log in</a></p>"#,
        AuthForm::Login => r#"<p class="muted">No account yet? <a href="/register">Register</a></p>"#,
    };
    let body = format!(
        r#"<section class="panel">
<h1>{title}</h1>
{notice}
<form method="post" action="{action}">
<input name="username" placeholder="Username" autocomplete="username" required>
<input name="password" type="password" placeholder="Password" required>
<img class="captcha" src="{image}" alt="captcha" width="280" height="100">
<input name="captcha_text" placeholder="Enter the characters above" autocomplete="off" required>
<button type="submit">{title}</button>
</form>
{footer}
</section>"#,
        title = kind.title(),
        notice = render_notice(notice),
        action = kind.action(),
        image = escape(&captcha.image),
    );
    layout(kind.title(), false, &body)
}

fn holdings_table(account: &AccountSnapshot, assets: &[String]) -> String {
    let mut rows = String::new();
    for asset in assets {
        let _ = write!(
            rows,
            r#"<tr><td>{}</td><td class="num">{}</td></tr>"#,
            escape(&asset.to_uppercase()),
            account.holding(asset).normalize(),
        );
    }
    format!(
        r#"<table><thead><tr><th>Asset</th><th class="num">Amount</th></tr></thead><tbody>{rows}</tbody></table>"#
    )
}

pub fn dashboard(account: &AccountSnapshot, assets: &[String]) -> String {
    let body = format!(
        r#"<section class="panel">
<h1>Dashboard</h1>
<p class="muted">USD balance</p>
<p class="balance">{balance}</p>
<p><a href="/deposit">Deposit</a> · <a href="/withdraw">Withdraw</a></p>
</section>
<section class="panel">
<h2>Portfolio</h2>
{table}
<p><a href="/store">Buy or sell →</a></p>
</section>"#,
        balance = usd(account.balance_usd),
        table = holdings_table(account, assets),
    );
    layout("Dashboard", true, &body)
}

fn asset_options(assets: &[String], selected: &str) -> String {
    let mut options = String::new();
    for asset in assets {
        let _ = write!(
            options,
            r#"<option value="{value}"{sel}>{label}</option>"#,
            value = escape(asset),
            sel = if asset == selected { " selected" } else { "" },
            label = escape(&asset.to_uppercase()),
        );
    }
    options
}

pub fn exchange(assets: &[String], selected: &str, history_days: u32) -> String {
    let body = format!(
        r#"<section class="panel" id="exchange" data-selected="{selected_attr}" data-days="{history_days}">
<h1>Exchange</h1>
<form method="post" action="/exchange">
<select name="crypto">{options}</select>
<button type="submit">Show chart</button>
</form>
<h2>{selected_label} · last {history_days} days</h2>
<canvas id="chart"></canvas>
<p id="chart-status" class="muted">Loading…</p>
</section>
<section class="panel">
<h2>Live prices</h2>
<table><thead><tr><th>Asset</th><th class="num">USD</th></tr></thead><tbody id="prices"></tbody></table>
</section>
<script>{EXCHANGE_JS}</script>"#,
        selected_attr = escape(selected),
        options = asset_options(assets, selected),
        selected_label = escape(&selected.to_uppercase()),
    );
    layout("Exchange", true, &body)
}

pub fn store(account: &AccountSnapshot, assets: &[String], notice: Option<&Notice>) -> String {
    let selected = assets.first().map(String::as_str).unwrap_or_default();
    let body = format!(
        r#"<section class="panel">
<h1>Trade</h1>
{notice}
<p class="muted">USD balance</p>
<p class="balance">{balance}</p>
<form method="post" action="/store">
<select name="crypto">{options}</select>
<input name="amount" inputmode="decimal" placeholder="Amount" required>
<select name="action"><option value="buy">Buy</option><option value="sell">Sell</option></select>
<button type="submit">Place order</button>
</form>
</section>
<section class="panel">
<h2>Portfolio</h2>
{table}
</section>"#,
        notice = render_notice(notice),
        balance = usd(account.balance_usd),
        options = asset_options(assets, selected),
        table = holdings_table(account, assets),
    );
    layout("Trade", true, &body)
}

pub fn deposit(amount: Decimal) -> String {
    let body = format!(
        r#"<section class="panel">
<h1>Deposit</h1>
<p class="muted">This is a simulation: every deposit credits {amount} to your balance. No payment is taken.</p>
<form method="post" action="/deposit">
<button type="submit">Deposit {amount}</button>
</form>
</section>"#,
        amount = usd(amount),
    );
    layout("Deposit", true, &body)
}

pub fn withdraw(balance: Decimal, notice: Option<&Notice>) -> String {
    let body = format!(
        r#"<section class="panel">
<h1>Withdraw</h1>
{notice}
<p class="muted">Available</p>
<p class="balance">{balance}</p>
<form method="post" action="/withdraw">
<input name="amount" inputmode="decimal" placeholder="Amount (USD)" required>
<select name="method"><option value="card">Bank card</option><option value="bank">Bank transfer</option><option value="crypto">Crypto wallet</option></select>
<button type="submit">Request withdrawal</button>
</form>
</section>"#,
        notice = render_notice(notice),
        balance = usd(balance),
    );
    layout("Withdraw", true, &body)
}

pub fn server_error() -> String {
    layout(
        "Error",
        false,
        r#"<section class="panel"><h1>Something went wrong</h1><p class="muted">Please try again in a moment.</p></section>"#,
    )
}
