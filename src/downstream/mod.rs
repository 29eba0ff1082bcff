//! Clients for the services the API endpoints call on a user's behalf
//!
//! Each client takes the caller's access token per request and never touches
//! the session. Any non-2xx answer or unexpected payload becomes
//! [`EmailBillError::Downstream`] carrying the full response for the logs.

pub mod clio;
pub mod gmail;
pub mod summarizer;

pub use clio::{ClioClient, Matter, NewTimeEntry, TimeEntry};
pub use gmail::{Email, GmailClient};
pub use summarizer::{Summarizer, Summary};

use crate::{EmailBillError, Result};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Shared HTTP client for downstream calls
pub fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| EmailBillError::config(format!("failed to build HTTP client: {}", e)))
}

/// Send `request` and decode a 2xx JSON body as `T`
pub(crate) async fn send_json<T: DeserializeOwned>(service: &str, request: RequestBuilder) -> Result<T> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(EmailBillError::downstream(format!(
            "{} returned status {}: {}",
            service,
            status.as_u16(),
            body
        )));
    }

    serde_json::from_str(&body).map_err(|e| {
        EmailBillError::downstream(format!("{} returned an unexpected payload ({}): {}", service, e, body))
    })
}

/// Join `path` onto a configured base URL without doubling slashes
pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
