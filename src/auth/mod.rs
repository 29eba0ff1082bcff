//! OAuth linking for Google and Clio
//!
//! - **Client**: per-provider consent, code exchange and refresh
//! - **Linker**: pure identity merge and link-state classification
//! - **Middleware**: link gate guarding the `/api` routes

pub mod client;
pub mod linker;
pub mod middleware;

pub use client::{OAuthProviderClient, ProviderAdapter, ProviderConfig, ProviderRegistry};
pub use linker::{LinkState, RequiredProviders, classify, is_fully_linked, merge};
pub use middleware::{GateRejection, LinkGate, Linked, require_linked};
