//! EmailBill - turn sent Gmail messages into billable Clio time entries
//!
//! The backend links two OAuth identities (Google and Clio) to one browser
//! session and exposes a small API the dashboard uses to read sent mail,
//! summarize it, and log time against Clio matters.
//!
//! # Architecture
//!
//! - [`auth::client`]: one [`auth::client::ProviderAdapter`] per provider
//!   (consent URL, code exchange, refresh)
//! - [`auth::linker`]: merges provider credentials into one [`model::Identity`]
//! - [`auth::middleware`]: per-route link gate with refresh-once semantics
//! - [`http::session`]: signed session cookie and the token store
//! - [`downstream`]: Gmail, Clio and summarization clients
//!
//! # Example
//!
//! ```rust,no_run
//! use emailbill::config::Config;
//! use emailbill::http::{AppState, build_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load()?;
//!     let router = build_router(AppState::from_config(config)?)?;
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

// Core modules
pub mod constants;
pub mod error;
pub mod model;

// Infrastructure
pub mod config;
pub mod telemetry;

// Interface layers
pub mod auth;
pub mod cli;
pub mod downstream;
pub mod http;

// Utilities
pub mod utils;

// Re-exports for convenience
pub use error::{EmailBillError, Result};
pub use model::{Credential, Identity, Provider, SessionData};


/// Initialize logging for the application
pub fn init_logging() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "emailbill=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
