//! Session management for OAuth flows and authenticated requests
//!
//! Provides the opaque per-session token store, HMAC-signed session cookies and
//! the middleware that attaches a [`SessionHandle`] to every request.

use crate::constants::SESSION_COOKIE_NAME;
use crate::error::SessionError;
use crate::model::SessionData;
use crate::utils::generate_secure_token;
use crate::{EmailBillError, Result};
use async_trait::async_trait;
use axum::http::request::Parts;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::Response,
};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Persistence for session payloads
///
/// Implementations treat [`SessionData`] as opaque; each call is atomic per
/// session id and the last writer wins.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<SessionData>>;

    async fn save(&self, session_id: &str, data: &SessionData) -> Result<()>;

    async fn delete(&self, session_id: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
struct StoredSession {
    payload: String,
    expires_at: DateTime<Utc>,
}

type SessionMap = RwLock<HashMap<String, StoredSession>>;

/// In-process session store
///
/// A session expires `ttl` after its first save; later saves keep that
/// deadline so the store and the cookie's `Max-Age` agree.
#[derive(Clone)]
pub struct MemorySessionStore {
    sessions: Arc<SessionMap>,
    ttl: Duration,
}

impl MemorySessionStore {
    /// Create a new session store
    ///
    /// When called inside a Tokio runtime a background task sweeps expired
    /// sessions every few minutes; it stops once the store is dropped.
    pub fn new(ttl: Duration) -> Self {
        let store = Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        };

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let sessions = Arc::downgrade(&store.sessions);
            handle.spawn(cleanup_loop(sessions));
        }

        store
    }

    /// Number of live (not yet swept) sessions
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expiry of a stored session
    pub fn expires_at(&self, session_id: &str) -> Option<DateTime<Utc>> {
        self.sessions.read().get(session_id).map(|s| s.expires_at)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<SessionData>> {
        let stored = self.sessions.read().get(session_id).cloned();
        let Some(stored) = stored else {
            return Ok(None);
        };

        if Utc::now() > stored.expires_at {
            self.sessions.write().remove(session_id);
            return Ok(None);
        }

        Ok(Some(SessionData::decode(&stored.payload)?))
    }

    async fn save(&self, session_id: &str, data: &SessionData) -> Result<()> {
        let payload = data.encode()?;
        let now = Utc::now();

        let mut sessions = self.sessions.write();
        let expires_at = sessions
            .get(session_id)
            .map(|s| s.expires_at)
            .filter(|at| now <= *at)
            .unwrap_or(now + self.ttl);
        sessions.insert(session_id.to_string(), StoredSession { payload, expires_at });
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        self.sessions.write().remove(session_id);
        Ok(())
    }
}

async fn cleanup_loop(sessions: Weak<SessionMap>) {
    let interval = std::time::Duration::from_secs(crate::constants::SESSION_CLEANUP_INTERVAL_SECS);
    loop {
        tokio::time::sleep(interval).await;

        let Some(sessions) = sessions.upgrade() else {
            return;
        };
        let now = Utc::now();
        sessions.write().retain(|_, session| now < session.expires_at);
    }
}

/// Signs and verifies session ids carried in the cookie
#[derive(Clone)]
pub struct SessionSigner {
    mac: Hmac<Sha256>,
}

impl SessionSigner {
    pub fn new(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(EmailBillError::config("session secret must not be empty"));
        }
        let mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .map_err(|e| EmailBillError::config(format!("invalid session secret: {}", e)))?;
        Ok(Self { mac })
    }

    /// Cookie value for `session_id`: `<id>.<base64url(hmac)>`
    pub fn sign(&self, session_id: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(session_id.as_bytes());
        let signature =
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{}.{}", session_id, signature)
    }

    /// Session id from a cookie value, if the signature checks out
    pub fn verify(&self, cookie_value: &str) -> Option<String> {
        let (session_id, signature) = cookie_value.rsplit_once('.')?;
        let signature = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(signature)
            .ok()?;

        let mut mac = self.mac.clone();
        mac.update(session_id.as_bytes());
        mac.verify_slice(&signature).ok()?;

        Some(session_id.to_string())
    }
}

/// Session middleware configuration
#[derive(Clone)]
pub struct SessionLayer {
    pub store: Arc<dyn SessionStore>,
    pub signer: SessionSigner,
    pub ttl: Duration,
    pub secure: bool,
}

/// The session a request belongs to
///
/// `fresh` sessions were minted for this request because the client sent no
/// valid cookie; they only get a cookie if a handler persisted them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionHandle {
    pub id: String,
    pub fresh: bool,
}

/// Response extension moving the client onto a new session id
///
/// The session middleware answers it with a `Set-Cookie` for the new id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RotatedSession(pub String);

/// Persist `data` under a newly minted id and drop `old_id`
///
/// Used when a session gains privileges so a cookie issued before the
/// change no longer resolves to it.
pub async fn rotate_session(store: &dyn SessionStore, old_id: &str, data: &SessionData) -> Result<String> {
    let new_id = generate_secure_token();
    store.save(&new_id, data).await?;
    store.delete(old_id).await?;
    Ok(new_id)
}

/// Resolve the session cookie into a [`SessionHandle`] request extension
pub async fn session_middleware(
    State(layer): State<SessionLayer>,
    mut req: Request,
    next: Next,
) -> Response {
    let existing = session_cookie_value(req.headers()).and_then(|value| layer.signer.verify(&value));

    let handle = match existing {
        Some(id) => SessionHandle { id, fresh: false },
        None => SessionHandle {
            id: generate_secure_token(),
            fresh: true,
        },
    };
    req.extensions_mut().insert(handle.clone());

    let mut response = next.run(req).await;

    if let Some(RotatedSession(id)) = response.extensions_mut().remove::<RotatedSession>() {
        append_session_cookie(&layer, &mut response, &id);
    } else if handle.fresh {
        match layer.store.load(&handle.id).await {
            Ok(Some(_)) => append_session_cookie(&layer, &mut response, &handle.id),
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to check new session: {}", e),
        }
    }

    response
}

fn append_session_cookie(layer: &SessionLayer, response: &mut Response, session_id: &str) {
    let cookie = set_session_cookie(&layer.signer.sign(session_id), layer.ttl, layer.secure);
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::error!("Failed to build session cookie: {}", e),
    }
}

impl<S> FromRequestParts<S> for SessionHandle
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        parts.extensions.get::<SessionHandle>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "Session middleware not configured",
        ))
    }
}

/// Load a session, treating an undecodable payload as no session
///
/// The decode failure is logged and the broken payload deleted, so the client
/// starts over instead of being stuck with a session it can never use.
pub async fn load_or_reset(store: &dyn SessionStore, session_id: &str) -> Result<Option<SessionData>> {
    match store.load(session_id).await {
        Ok(data) => Ok(data),
        Err(EmailBillError::Session(e @ (SessionError::Corrupt(_) | SessionError::UnsupportedVersion(_)))) => {
            tracing::warn!("Discarding unreadable session: {}", e);
            store.delete(session_id).await?;
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Raw value of the session cookie, if present
pub fn session_cookie_value(headers: &HeaderMap) -> Option<String> {
    let prefix = format!("{}=", SESSION_COOKIE_NAME);
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .map(|c| c.trim())
        .find_map(|c| c.strip_prefix(prefix.as_str()))
        .filter(|value| !value.is_empty())
        .map(|s| s.to_string())
}

/// Set a session cookie with security flags
///
/// The `secure` parameter controls whether to set the Secure flag (requires HTTPS).
pub fn set_session_cookie(value: &str, ttl: Duration, secure: bool) -> String {
    let secure_flag = if secure { " Secure;" } else { "" };
    format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly;{} SameSite=Lax",
        SESSION_COOKIE_NAME,
        value,
        ttl.num_seconds(),
        secure_flag
    )
}

/// Clear the session cookie with security flags
///
/// The `secure` parameter should match what was used when setting the cookie.
pub fn clear_session_cookie(secure: bool) -> String {
    let secure_flag = if secure { " Secure;" } else { "" };
    format!(
        "{}=; Path=/; Max-Age=0; HttpOnly;{} SameSite=Lax",
        SESSION_COOKIE_NAME, secure_flag
    )
}
