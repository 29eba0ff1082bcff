//! Configuration management for EmailBill
//!
//! Configuration comes from `emailbill.config.json` when that file exists
//! (string values may reference the environment as `$env:NAME`), otherwise
//! straight from environment variables. Every required value must be present
//! before the server starts.

use crate::constants;
use crate::{EmailBillError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::path::Path;

/// Complete EmailBill configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub http: HttpConfig,

    /// Session cookie and store configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Google OAuth client
    #[serde(default)]
    pub google: ProviderSettings,

    /// Clio OAuth client
    #[serde(default)]
    pub clio: ProviderSettings,

    /// Timeouts and refresh behaviour for provider calls
    #[serde(default)]
    pub oauth: OAuthTuning,

    /// Gmail / Clio / HuggingFace API endpoints
    #[serde(default)]
    pub downstream: DownstreamConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Enable secure cookies (requires HTTPS). Default: false for local development
    #[serde(default)]
    pub secure: bool,

    /// Dashboard origin; used for CORS and post-login redirects (required)
    #[serde(default)]
    pub frontend_url: String,
}

/// Session configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Key used to sign session cookies (required)
    #[serde(default)]
    pub secret: String,

    /// Session lifetime in hours
    #[serde(default = "default_session_ttl_hours")]
    pub ttl_hours: i64,
}

/// OAuth client registration for one provider
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    #[serde(default)]
    pub redirect_uri: String,

    /// Endpoint overrides, mostly for tests against a mock provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
}

/// Provider call tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthTuning {
    /// Timeout for token, profile and downstream calls
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Credentials expiring within this many seconds are refreshed first
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: i64,
}

/// Downstream collaborator endpoints
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownstreamConfig {
    #[serde(default = "default_gmail_api_base")]
    pub gmail_api_base: String,

    #[serde(default = "default_clio_api_base")]
    pub clio_api_base: String,

    #[serde(default = "default_huggingface_api_base")]
    pub huggingface_api_base: String,

    /// Summarization is unavailable without a key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub huggingface_api_key: Option<String>,
}

fn default_host() -> String {
    constants::DEFAULT_HTTP_HOST.to_string()
}

fn default_port() -> u16 {
    constants::DEFAULT_HTTP_PORT
}

fn default_session_ttl_hours() -> i64 {
    constants::DEFAULT_SESSION_TTL_HOURS
}

fn default_timeout_secs() -> u64 {
    constants::DEFAULT_PROVIDER_TIMEOUT_SECS
}

fn default_refresh_margin_secs() -> i64 {
    constants::DEFAULT_REFRESH_MARGIN_SECS
}

fn default_gmail_api_base() -> String {
    constants::GMAIL_API_BASE.to_string()
}

fn default_clio_api_base() -> String {
    constants::CLIO_API_BASE.to_string()
}

fn default_huggingface_api_base() -> String {
    constants::HUGGINGFACE_API_BASE.to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            secure: false,
            frontend_url: String::new(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            ttl_hours: default_session_ttl_hours(),
        }
    }
}

impl Default for OAuthTuning {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            refresh_margin_secs: default_refresh_margin_secs(),
        }
    }
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        Self {
            gmail_api_base: default_gmail_api_base(),
            clio_api_base: default_clio_api_base(),
            huggingface_api_base: default_huggingface_api_base(),
            huggingface_api_key: None,
        }
    }
}

// Secrets stay out of logs and panic messages.
impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &"[redacted]")
            .field("ttl_hours", &self.ttl_hours)
            .finish()
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("redirect_uri", &self.redirect_uri)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("profile_url", &self.profile_url)
            .finish()
    }
}

impl std::fmt::Debug for DownstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownstreamConfig")
            .field("gmail_api_base", &self.gmail_api_base)
            .field("clio_api_base", &self.clio_api_base)
            .field("huggingface_api_base", &self.huggingface_api_base)
            .field(
                "huggingface_api_key",
                &self.huggingface_api_key.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

impl Config {
    /// Load configuration from the config file if present, else from the environment
    pub fn load() -> Result<Self> {
        let path = Path::new(constants::CONFIG_FILE_NAME);
        if path.exists() {
            Self::load_from_path(path)
        } else {
            Self::from_env()
        }
    }

    /// Load configuration from a JSON file, expanding `$env:NAME` values
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut raw: Value = serde_json::from_str(&content).map_err(|e| {
            EmailBillError::config(format!("Failed to parse JSON config: {}", e))
        })?;

        expand_env_values(&mut raw);

        let config: Config = serde_json::from_value(raw).map_err(|e| {
            EmailBillError::config(format!("Invalid config structure: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Build configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let text = |key: &str| get(key).unwrap_or_default();

        let provider = |prefix: &str| ProviderSettings {
            client_id: text(&format!("{}_CLIENT_ID", prefix)),
            client_secret: text(&format!("{}_CLIENT_SECRET", prefix)),
            redirect_uri: text(&format!("{}_REDIRECT_URI", prefix)),
            auth_url: get(&format!("{}_AUTH_URL", prefix)),
            token_url: get(&format!("{}_TOKEN_URL", prefix)),
            profile_url: get(&format!("{}_PROFILE_URL", prefix)),
        };

        let defaults = DownstreamConfig::default();

        let config = Config {
            http: HttpConfig {
                host: get("HOST").unwrap_or_else(default_host),
                port: parse_or("PORT", get("PORT"), default_port())?,
                secure: parse_or("COOKIE_SECURE", get("COOKIE_SECURE"), false)?,
                frontend_url: text("FRONTEND_URL"),
            },
            session: SessionConfig {
                secret: text("SESSION_SECRET"),
                ttl_hours: parse_or(
                    "SESSION_TTL_HOURS",
                    get("SESSION_TTL_HOURS"),
                    default_session_ttl_hours(),
                )?,
            },
            google: provider("GOOGLE"),
            clio: provider("CLIO"),
            oauth: OAuthTuning {
                timeout_secs: parse_or(
                    "PROVIDER_TIMEOUT_SECS",
                    get("PROVIDER_TIMEOUT_SECS"),
                    default_timeout_secs(),
                )?,
                refresh_margin_secs: parse_or(
                    "REFRESH_MARGIN_SECS",
                    get("REFRESH_MARGIN_SECS"),
                    default_refresh_margin_secs(),
                )?,
            },
            downstream: DownstreamConfig {
                gmail_api_base: get("GMAIL_API_BASE").unwrap_or(defaults.gmail_api_base),
                clio_api_base: get("CLIO_API_BASE").unwrap_or(defaults.clio_api_base),
                huggingface_api_base: get("HUGGINGFACE_API_BASE")
                    .unwrap_or(defaults.huggingface_api_base),
                huggingface_api_key: get("HUGGINGFACE_API_KEY"),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// Reports every missing required value at once, named by its
    /// environment variable.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("GOOGLE_CLIENT_ID", &self.google.client_id),
            ("GOOGLE_CLIENT_SECRET", &self.google.client_secret),
            ("GOOGLE_REDIRECT_URI", &self.google.redirect_uri),
            ("CLIO_CLIENT_ID", &self.clio.client_id),
            ("CLIO_CLIENT_SECRET", &self.clio.client_secret),
            ("CLIO_REDIRECT_URI", &self.clio.redirect_uri),
            ("SESSION_SECRET", &self.session.secret),
            ("FRONTEND_URL", &self.http.frontend_url),
        ];

        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(EmailBillError::config(format!(
                "missing required configuration: {}",
                missing.join(", ")
            )));
        }

        url::Url::parse(&self.http.frontend_url).map_err(|e| {
            EmailBillError::config(format!("FRONTEND_URL is not a valid URL: {}", e))
        })?;

        if self.session.ttl_hours <= 0 || self.session.ttl_hours > constants::MAX_SESSION_TTL_HOURS {
            return Err(EmailBillError::config(format!(
                "SESSION_TTL_HOURS must be between 1 and {}",
                constants::MAX_SESSION_TTL_HOURS
            )));
        }

        if self.oauth.timeout_secs == 0 || self.oauth.timeout_secs > constants::MAX_PROVIDER_TIMEOUT_SECS {
            return Err(EmailBillError::config(format!(
                "PROVIDER_TIMEOUT_SECS must be between 1 and {}",
                constants::MAX_PROVIDER_TIMEOUT_SECS
            )));
        }

        if !(0..=constants::MAX_REFRESH_MARGIN_SECS).contains(&self.oauth.refresh_margin_secs) {
            return Err(EmailBillError::config(format!(
                "REFRESH_MARGIN_SECS must be between 0 and {}",
                constants::MAX_REFRESH_MARGIN_SECS
            )));
        }

        Ok(())
    }

    /// Frontend origin without a trailing slash
    pub fn frontend_base(&self) -> &str {
        self.http.frontend_url.trim_end_matches('/')
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, value: Option<String>, default: T) -> Result<T> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| EmailBillError::config(format!("{} has an invalid value", key))),
        None => Ok(default),
    }
}

/// Expand a `$env:NAME` reference; other values are returned unchanged
pub fn expand_env_value(value: &str) -> String {
    match value.strip_prefix(constants::ENV_VALUE_PREFIX) {
        Some(name) => env::var(name).unwrap_or_default(),
        None => value.to_string(),
    }
}

/// Recursively expand `$env:NAME` string values in a JSON tree
pub fn expand_env_values(value: &mut Value) {
    match value {
        Value::String(s) => {
            let expanded = expand_env_value(s);
            if expanded != *s {
                *s = expanded;
            }
        }
        Value::Array(items) => items.iter_mut().for_each(expand_env_values),
        Value::Object(map) => map.values_mut().for_each(expand_env_values),
        _ => {}
    }
}

#[cfg(test)]
mod config_test;
