//! Core data models for EmailBill
//!
//! Providers, credentials, the session identity that links them, and the
//! versioned session payload persisted by the session store.

use crate::error::SessionError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Current schema version of [`Identity`]
pub const IDENTITY_SCHEMA_VERSION: u32 = 1;

/// Current schema version of [`SessionData`]
pub const SESSION_SCHEMA_VERSION: u32 = 1;

/// External OAuth2 identity/data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Clio,
}

impl Provider {
    /// Every provider the application knows about
    pub const ALL: [Provider; 2] = [Provider::Google, Provider::Clio];

    /// Identifier used in paths, JSON keys and metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Clio => "clio",
        }
    }

    /// Human-readable name for user-facing messages
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Google => "Google",
            Provider::Clio => "Clio",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(Provider::Google),
            "clio" => Ok(Provider::Clio),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

/// Tokens and minimal profile obtained from one provider
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Provider profile, opaque to the linker
    #[serde(default)]
    pub profile: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Whether the access token expires within `margin` of `now`.
    /// Credentials without an expiry are never stale.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at
            .is_some_and(|expires_at| now + margin >= expires_at)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[redacted]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[redacted]"),
            )
            .field("profile", &self.profile)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Provider credentials linked to one browser session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub version: u32,

    #[serde(default)]
    pub providers: BTreeMap<Provider, Credential>,
}

impl Identity {
    /// Create an identity with no linked providers
    pub fn new() -> Self {
        Self {
            version: IDENTITY_SCHEMA_VERSION,
            providers: BTreeMap::new(),
        }
    }

    pub fn credential(&self, provider: Provider) -> Option<&Credential> {
        self.providers.get(&provider)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new()
    }
}

/// CSRF nonce for an in-flight OAuth handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuth {
    pub provider: Provider,
    pub nonce: String,
    pub created_at: DateTime<Utc>,
}

/// Everything persisted for one browser session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingAuth>,
}

impl SessionData {
    pub fn new() -> Self {
        Self {
            version: SESSION_SCHEMA_VERSION,
            identity: None,
            pending: None,
        }
    }

    /// Encode to the opaque payload handed to a session store
    pub fn encode(&self) -> Result<String, SessionError> {
        serde_json::to_string(self).map_err(|e| SessionError::Corrupt(e.to_string()))
    }

    /// Decode a payload produced by [`SessionData::encode`]
    ///
    /// The version of both the session and its identity is checked before the
    /// full shape is parsed, so a payload written by a future schema yields
    /// `UnsupportedVersion` rather than a confusing field error.
    pub fn decode(payload: &str) -> Result<Self, SessionError> {
        let raw: serde_json::Value =
            serde_json::from_str(payload).map_err(|e| SessionError::Corrupt(e.to_string()))?;

        let version = schema_version(&raw)?;
        if version != SESSION_SCHEMA_VERSION {
            return Err(SessionError::UnsupportedVersion(version));
        }
        if let Some(identity) = raw.get("identity").filter(|v| !v.is_null()) {
            let identity_version = schema_version(identity)?;
            if identity_version != IDENTITY_SCHEMA_VERSION {
                return Err(SessionError::UnsupportedVersion(identity_version));
            }
        }

        serde_json::from_value(raw).map_err(|e| SessionError::Corrupt(e.to_string()))
    }
}

impl Default for SessionData {
    fn default() -> Self {
        Self::new()
    }
}

fn schema_version(value: &serde_json::Value) -> Result<u32, SessionError> {
    value
        .get("version")
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| SessionError::Corrupt("missing schema version".to_string()))
}
