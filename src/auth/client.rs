//! OAuth 2.0 client for the linked providers
//!
//! Each provider sits behind [`ProviderAdapter`]: build the consent URL,
//! exchange the callback code, refresh an expiring credential. The concrete
//! [`OAuthProviderClient`] is built once at startup from explicit
//! configuration and shared through [`ProviderRegistry`].

use crate::config::{Config, ProviderSettings};
use crate::constants;
use crate::error::AuthError;
use crate::model::{Credential, PendingAuth, Provider, SessionData};
use crate::utils::{constant_time_eq, generate_secure_token};
use crate::{EmailBillError, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet,
    EndpointSet, ErrorResponse, RedirectUrl, RefreshToken, RequestTokenError, Scope,
    TokenResponse, TokenUrl, basic::BasicClient,
};
use std::collections::HashMap;
use std::sync::Arc;

/// oauth2 client with the authorization and token endpoints configured
type ConfiguredClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Uniform OAuth surface over one provider
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// Build the consent URL and record a fresh state nonce in `session`.
    /// Empty `scopes` means the provider's defaults.
    async fn begin_auth(&self, session: &mut SessionData, scopes: &[String]) -> Result<String>;

    /// Exchange a callback `code` for a credential.
    ///
    /// The stored nonce is consumed whether or not `state` matches, so a
    /// replayed callback always fails with `InvalidState`.
    async fn complete_auth(
        &self,
        session: &mut SessionData,
        code: &str,
        state: Option<&str>,
    ) -> Result<Credential>;

    /// Obtain a new access token; the input credential is left untouched.
    async fn refresh(&self, credential: &Credential) -> Result<Credential>;
}

/// Static description of one OAuth provider
#[derive(Clone)]
pub struct ProviderConfig {
    pub provider: Provider,
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub profile_url: Option<String>,
    pub default_scopes: Vec<String>,
    pub extra_auth_params: Vec<(String, String)>,
    /// Send client credentials in the form body instead of HTTP Basic auth
    pub credentials_in_body: bool,
}

impl ProviderConfig {
    /// Google with offline access so a refresh token is issued
    pub fn google(settings: &ProviderSettings) -> Self {
        Self {
            provider: Provider::Google,
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            auth_url: settings
                .auth_url
                .clone()
                .unwrap_or_else(|| constants::GOOGLE_AUTH_URL.to_string()),
            token_url: settings
                .token_url
                .clone()
                .unwrap_or_else(|| constants::GOOGLE_TOKEN_URL.to_string()),
            redirect_uri: settings.redirect_uri.clone(),
            profile_url: Some(
                settings
                    .profile_url
                    .clone()
                    .unwrap_or_else(|| constants::GOOGLE_PROFILE_URL.to_string()),
            ),
            default_scopes: constants::GOOGLE_DEFAULT_SCOPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            extra_auth_params: vec![
                ("access_type".to_string(), "offline".to_string()),
                ("prompt".to_string(), "consent".to_string()),
            ],
            credentials_in_body: false,
        }
    }

    /// Clio; scopes are granted per application, not per request
    pub fn clio(settings: &ProviderSettings) -> Self {
        Self {
            provider: Provider::Clio,
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            auth_url: settings
                .auth_url
                .clone()
                .unwrap_or_else(|| constants::CLIO_AUTH_URL.to_string()),
            token_url: settings
                .token_url
                .clone()
                .unwrap_or_else(|| constants::CLIO_TOKEN_URL.to_string()),
            redirect_uri: settings.redirect_uri.clone(),
            profile_url: Some(
                settings
                    .profile_url
                    .clone()
                    .unwrap_or_else(|| constants::CLIO_PROFILE_URL.to_string()),
            ),
            default_scopes: Vec::new(),
            extra_auth_params: Vec::new(),
            credentials_in_body: true,
        }
    }
}

/// [`ProviderAdapter`] backed by the oauth2 crate and a shared reqwest client
pub struct OAuthProviderClient {
    provider: Provider,
    client: ConfiguredClient,
    http_client: reqwest::Client,
    profile_url: Option<String>,
    default_scopes: Vec<String>,
    extra_auth_params: Vec<(String, String)>,
}

impl OAuthProviderClient {
    /// Create a provider client
    ///
    /// Redirects are disabled on the HTTP client to prevent authorization
    /// code interception; every call is bounded by `timeout`.
    pub fn new(config: ProviderConfig, timeout: std::time::Duration) -> Result<Self> {
        let http_client = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| EmailBillError::config(format!("Failed to build HTTP client: {}", e)))?;

        let auth_type = if config.credentials_in_body {
            AuthType::RequestBody
        } else {
            AuthType::BasicAuth
        };

        let client = BasicClient::new(ClientId::new(config.client_id))
            .set_client_secret(ClientSecret::new(config.client_secret))
            .set_auth_uri(AuthUrl::new(config.auth_url).map_err(|e| {
                EmailBillError::config(format!("Invalid {} auth URL: {}", config.provider, e))
            })?)
            .set_token_uri(TokenUrl::new(config.token_url).map_err(|e| {
                EmailBillError::config(format!("Invalid {} token URL: {}", config.provider, e))
            })?)
            .set_redirect_uri(RedirectUrl::new(config.redirect_uri).map_err(|e| {
                EmailBillError::config(format!(
                    "Invalid {} redirect URI: {}",
                    config.provider, e
                ))
            })?)
            .set_auth_type(auth_type);

        Ok(Self {
            provider: config.provider,
            client,
            http_client,
            profile_url: config.profile_url,
            default_scopes: config.default_scopes,
            extra_auth_params: config.extra_auth_params,
        })
    }

    fn rejected(&self, detail: impl Into<String>) -> EmailBillError {
        AuthError::ProviderRejected {
            provider: self.provider,
            detail: detail.into(),
        }
        .into()
    }

    fn refresh_failed(&self, reason: impl Into<String>) -> EmailBillError {
        AuthError::RefreshFailed {
            provider: self.provider,
            reason: reason.into(),
        }
        .into()
    }

    /// Fetch the provider profile with a freshly issued access token
    async fn fetch_profile(&self, access_token: &str) -> Result<serde_json::Value> {
        let Some(url) = &self.profile_url else {
            return Ok(serde_json::Value::Null);
        };

        let response = self
            .http_client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| self.rejected(format!("profile request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.rejected(format!("profile lookup returned {}: {}", status, body)));
        }

        let profile: serde_json::Value = response
            .json()
            .await
            .map_err(|e| self.rejected(format!("profile response unreadable: {}", e)))?;

        // Clio wraps resources in a `data` envelope
        Ok(match profile.get("data") {
            Some(data) if data.is_object() => data.clone(),
            _ => profile,
        })
    }
}

#[async_trait]
impl ProviderAdapter for OAuthProviderClient {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn begin_auth(&self, session: &mut SessionData, scopes: &[String]) -> Result<String> {
        let nonce = generate_secure_token();
        let scopes: &[String] = if scopes.is_empty() {
            &self.default_scopes
        } else {
            scopes
        };

        let mut request = self
            .client
            .authorize_url(|| CsrfToken::new(nonce.clone()))
            .add_scopes(scopes.iter().map(|s| Scope::new(s.clone())));
        for (name, value) in &self.extra_auth_params {
            request = request.add_extra_param(name.as_str(), value.as_str());
        }
        let (auth_url, _) = request.url();

        session.pending = Some(PendingAuth {
            provider: self.provider,
            nonce,
            created_at: Utc::now(),
        });

        tracing::debug!(provider = %self.provider, "Started OAuth authorization");
        Ok(auth_url.to_string())
    }

    async fn complete_auth(
        &self,
        session: &mut SessionData,
        code: &str,
        state: Option<&str>,
    ) -> Result<Credential> {
        let pending = session.pending.take();

        let state_matches = match (pending, state) {
            (Some(pending), Some(state)) => {
                pending.provider == self.provider && constant_time_eq(&pending.nonce, state)
            }
            _ => false,
        };
        if !state_matches {
            return Err(AuthError::InvalidState.into());
        }

        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| self.rejected(token_error_detail(&e)))?;

        let access_token = token.access_token().secret().clone();
        let profile = self.fetch_profile(&access_token).await?;

        tracing::info!(provider = %self.provider, "Exchanged authorization code");

        Ok(Credential {
            access_token,
            refresh_token: token.refresh_token().map(|t| t.secret().clone()),
            profile,
            expires_at: token.expires_in().and_then(expires_at_from),
        })
    }

    async fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let Some(refresh_token) = &credential.refresh_token else {
            return Err(self.refresh_failed("no refresh token available"));
        };

        let token = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.clone()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| self.refresh_failed(token_error_detail(&e)))?;

        tracing::info!(provider = %self.provider, "Refreshed access token");

        Ok(Credential {
            access_token: token.access_token().secret().clone(),
            refresh_token: token
                .refresh_token()
                .map(|t| t.secret().clone())
                .or_else(|| credential.refresh_token.clone()),
            profile: credential.profile.clone(),
            expires_at: token.expires_in().and_then(expires_at_from),
        })
    }
}

fn expires_at_from(expires_in: std::time::Duration) -> Option<chrono::DateTime<Utc>> {
    Duration::from_std(expires_in).ok().map(|d| Utc::now() + d)
}

/// Render a token endpoint failure for server-side logs
fn token_error_detail<RE, T>(err: &RequestTokenError<RE, T>) -> String
where
    RE: std::error::Error + 'static,
    T: ErrorResponse + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => {
            serde_json::to_string(response).unwrap_or_else(|_| response.to_string())
        }
        other => other.to_string(),
    }
}

/// Provider adapters keyed by provider
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the Google and Clio clients from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = std::time::Duration::from_secs(config.oauth.timeout_secs);

        Ok(Self::new()
            .with_adapter(Arc::new(OAuthProviderClient::new(
                ProviderConfig::google(&config.google),
                timeout,
            )?))
            .with_adapter(Arc::new(OAuthProviderClient::new(
                ProviderConfig::clio(&config.clio),
                timeout,
            )?)))
    }

    /// Register (or replace) the adapter for its provider
    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(adapter.provider(), adapter);
        self
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }
}
