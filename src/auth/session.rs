//! Server-side sessions.
//!
//! The browser only holds `"{uuid}.{signature}"`, where the signature is
//! HMAC-SHA256 of the uuid under the configured secret. Everything else
//! (logged-in user, pending captcha) lives in memory here, each with its
//! own expiry. Anonymous sessions only live as long as a captcha does;
//! logging in extends a session to the full TTL.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::auth::captcha;
use crate::types::UserId;

type HmacSha256 = Hmac<Sha256>;

/// Opaque session key.
pub type SessionId = Uuid;

/// Upper bound for any configured lifetime.
pub const MAX_TTL_SECS: u64 = 365 * 24 * 3600;

fn lifetime(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_TTL_SECS) as i64)
}

#[derive(Debug, Clone)]
struct PendingCaptcha {
    text: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct SessionData {
    user_id: Option<UserId>,
    captcha: Option<PendingCaptcha>,
    expires_at: DateTime<Utc>,
}

pub struct SessionStore {
    secret: SecretString,
    ttl: Duration,
    captcha_ttl: Duration,
    sessions: RwLock<HashMap<SessionId, SessionData>>,
}

impl SessionStore {
    pub fn new(secret: SecretString, ttl_secs: u64, captcha_ttl_secs: u64) -> Self {
        Self {
            secret,
            ttl: lifetime(ttl_secs),
            captcha_ttl: lifetime(captcha_ttl_secs),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    // -- Cookie token ----------------------------------------------------

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length.
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC key length is unrestricted"))
    }

    /// Cookie value for a session id.
    pub fn sign(&self, id: SessionId) -> String {
        let mut mac = self.mac();
        mac.update(id.as_bytes());
        let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{id}.{sig}")
    }

    /// Session id from a cookie value, if the signature checks out.
    pub fn verify_token(&self, token: &str) -> Option<SessionId> {
        let (id, sig) = token.split_once('.')?;
        let id = Uuid::parse_str(id).ok()?;
        let sig = URL_SAFE_NO_PAD.decode(sig).ok()?;
        let mut mac = self.mac();
        mac.update(id.as_bytes());
        mac.verify_slice(&sig).ok()?;
        Some(id)
    }

    // -- Lifecycle -------------------------------------------------------

    /// Start an anonymous session.
    pub async fn create(&self) -> SessionId {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(
            id,
            SessionData { user_id: None, captcha: None, expires_at: now + self.captcha_ttl },
        );
        id
    }

    /// Whether `id` names a live session.
    pub async fn is_active(&self, id: SessionId) -> bool {
        let now = Utc::now();
        self.sessions
            .read()
            .await
            .get(&id)
            .is_some_and(|s| s.expires_at > now)
    }

    /// The live session behind a cookie value, if any.
    pub async fn resolve(&self, token: Option<&str>) -> Option<SessionId> {
        let id = self.verify_token(token?)?;
        self.is_active(id).await.then_some(id)
    }

    /// Replace `old` with a fresh session bound to `user_id`.
    ///
    /// The id changes on login so a session id seen before authentication
    /// can never carry the authenticated identity.
    pub async fn login(&self, old: SessionId, user_id: UserId) -> SessionId {
        let id = Uuid::new_v4();
        let mut sessions = self.sessions.write().await;
        sessions.remove(&old);
        sessions.insert(
            id,
            SessionData { user_id: Some(user_id), captcha: None, expires_at: Utc::now() + self.ttl },
        );
        debug!(user_id, "Session authenticated");
        id
    }

    pub async fn destroy(&self, id: SessionId) {
        self.sessions.write().await.remove(&id);
    }

    pub async fn user_id(&self, id: SessionId) -> Option<UserId> {
        let now = Utc::now();
        self.sessions
            .read()
            .await
            .get(&id)
            .filter(|s| s.expires_at > now)
            .and_then(|s| s.user_id)
    }

    // -- Captcha ---------------------------------------------------------

    /// Generate a challenge and make it the only one valid for `id`.
    pub async fn issue_captcha(&self, id: SessionId) -> captcha::CaptchaChallenge {
        let challenge = captcha::generate_challenge();
        self.set_captcha(id, &challenge.text).await;
        challenge
    }

    /// Overwrite the pending captcha text of `id`.
    pub async fn set_captcha(&self, id: SessionId, text: &str) {
        let now = Utc::now();
        if let Some(session) = self.sessions.write().await.get_mut(&id) {
            let expires_at = now + self.captcha_ttl;
            if session.user_id.is_none() {
                session.expires_at = session.expires_at.max(expires_at);
            }
            session.captcha = Some(PendingCaptcha { text: text.to_uppercase(), expires_at });
        }
    }

    /// Check `input` against the pending captcha and consume it either way.
    pub async fn check_captcha(&self, id: SessionId, input: &str) -> bool {
        let now = Utc::now();
        let pending = self
            .sessions
            .write()
            .await
            .get_mut(&id)
            .and_then(|s| s.captcha.take());

        match pending {
            Some(p) if p.expires_at > now => captcha::verify(input, &p.text),
            _ => false,
        }
    }
}
