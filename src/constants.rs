//! Constants used throughout EmailBill
//!
//! Provider endpoints, default scopes, session and HTTP defaults.

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Optional configuration file name (environment variables are used otherwise)
pub const CONFIG_FILE_NAME: &str = "emailbill.config.json";

/// Prefix marking a config value that should be read from the environment
pub const ENV_VALUE_PREFIX: &str = "$env:";

/// Default HTTP bind host
pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";

/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 3000;

/// Default session lifetime in hours
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

/// Longest accepted session lifetime (one year)
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;

/// Default timeout for outbound provider calls, in seconds
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 5;

/// Longest accepted provider timeout, in seconds
pub const MAX_PROVIDER_TIMEOUT_SECS: u64 = 300;

/// Default margin before `expires_at` at which a credential is refreshed
pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 60;

/// Longest accepted refresh margin (one day)
pub const MAX_REFRESH_MARGIN_SECS: i64 = 24 * 60 * 60;

// ============================================================================
// SESSION
// ============================================================================

/// Session cookie name
pub const SESSION_COOKIE_NAME: &str = "emailbill_session";

/// Interval between sweeps of expired sessions, in seconds
pub const SESSION_CLEANUP_INTERVAL_SECS: u64 = 300;

// ============================================================================
// GOOGLE
// ============================================================================

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_PROFILE_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// Scopes requested from Google when the caller asks for none
pub const GOOGLE_DEFAULT_SCOPES: &[&str] = &[
    "profile",
    "email",
    "https://www.googleapis.com/auth/gmail.readonly",
];

// ============================================================================
// CLIO
// ============================================================================

pub const CLIO_AUTH_URL: &str = "https://app.clio.com/oauth/authorize";
pub const CLIO_TOKEN_URL: &str = "https://app.clio.com/oauth/token";
pub const CLIO_PROFILE_URL: &str = "https://app.clio.com/api/v4/users/who_am_i";
pub const CLIO_API_BASE: &str = "https://app.clio.com/api/v4";

// ============================================================================
// SUMMARIZATION
// ============================================================================

pub const HUGGINGFACE_API_BASE: &str = "https://api-inference.huggingface.co";
pub const SUMMARIZATION_MODEL: &str = "facebook/bart-large-cnn";

/// Billable hours suggested for a summarized email
pub const DEFAULT_SUMMARY_DURATION_HOURS: f64 = 0.5;

/// Number of sent messages listed on the dashboard
pub const GMAIL_MAX_RESULTS: u32 = 10;

// ============================================================================
// HTTP
// ============================================================================

/// Query value appended to the dashboard redirect when a callback fails
pub const AUTH_FAILED_ERROR: &str = "auth_failed";

/// Maximum accepted JSON request body size
pub const MAX_BODY_BYTES: usize = 1024 * 1024;
