//! HTTP server for EmailBill
//!
//! OAuth linking routes, the gated `/api` surface the dashboard talks to, and
//! the health and metrics endpoints.

pub mod handlers;
pub mod response;
pub mod session;

use self::session::{MemorySessionStore, SessionLayer, SessionSigner, SessionStore};
use crate::auth::client::{ProviderAdapter, ProviderRegistry};
use crate::auth::linker::RequiredProviders;
use crate::auth::middleware::{LinkGate, require_linked};
use crate::config::Config;
use crate::constants::MAX_BODY_BYTES;
use crate::downstream::{ClioClient, GmailClient, Summarizer, build_http_client};
use crate::model::Provider;
use crate::{EmailBillError, Result, telemetry};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use chrono::Duration;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    LatencyUnit,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<dyn SessionStore>,
    pub providers: Arc<ProviderRegistry>,
    pub gmail: GmailClient,
    pub clio: ClioClient,
    pub summarizer: Summarizer,
}

impl AppState {
    /// Wire every collaborator from configuration
    pub fn from_config(config: Config) -> Result<Self> {
        let providers = ProviderRegistry::from_config(&config)?;
        let sessions = MemorySessionStore::new(Duration::hours(config.session.ttl_hours));
        Self::with_parts(config, Arc::new(sessions), providers)
    }

    /// Same as [`AppState::from_config`] with an explicit store and provider set
    pub fn with_parts(
        config: Config,
        sessions: Arc<dyn SessionStore>,
        providers: ProviderRegistry,
    ) -> Result<Self> {
        let http = build_http_client(std::time::Duration::from_secs(config.oauth.timeout_secs))?;
        let downstream = &config.downstream;

        Ok(Self {
            gmail: GmailClient::new(http.clone(), downstream.gmail_api_base.clone()),
            clio: ClioClient::new(http.clone(), downstream.clio_api_base.clone()),
            summarizer: Summarizer::new(
                http,
                downstream.huggingface_api_base.clone(),
                downstream.huggingface_api_key.clone(),
            ),
            sessions,
            providers: Arc::new(providers),
            config: Arc::new(config),
        })
    }

    pub(crate) fn adapter(&self, provider: Provider) -> Result<Arc<dyn ProviderAdapter>> {
        self.providers.get(provider).ok_or_else(|| {
            EmailBillError::config(format!("no OAuth client configured for {}", provider))
        })
    }

    /// Link gate for routes needing `required`
    pub fn gate(&self, required: RequiredProviders) -> LinkGate {
        LinkGate::new(
            self.sessions.clone(),
            self.providers.clone(),
            required,
            Duration::seconds(self.config.oauth.refresh_margin_secs),
        )
    }

    fn session_layer(&self) -> Result<SessionLayer> {
        Ok(SessionLayer {
            store: self.sessions.clone(),
            signer: SessionSigner::new(&self.config.session.secret)?,
            ttl: Duration::hours(self.config.session.ttl_hours),
            secure: self.config.http.secure,
        })
    }
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<()> {
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let socket_addr: SocketAddr = addr
        .parse()
        .map_err(|e| EmailBillError::config(format!("Invalid address {}: {}", addr, e)))?;

    let state = AppState::from_config(config)?;
    let app = build_router(state)?;

    tracing::info!("Starting HTTP server on {}", socket_addr);

    let listener = tokio::net::TcpListener::bind(socket_addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| EmailBillError::config(format!("Server error: {}", e)))?;

    Ok(())
}

/// Build the router with all endpoints
pub fn build_router(state: AppState) -> Result<Router> {
    let gated = |required: RequiredProviders| {
        middleware::from_fn_with_state(state.gate(required), require_linked)
    };

    let google_routes = Router::new()
        .route("/api/emails", get(handlers::emails))
        .route("/api/summarize", post(handlers::summarize))
        .route_layer(gated(RequiredProviders::google()));

    let clio_routes = Router::new()
        .route("/api/matters", get(handlers::matters))
        .route("/api/time-entries", get(handlers::time_entries))
        .route_layer(gated(RequiredProviders::clio()));

    let billing_routes = Router::new()
        .route("/api/time-entry", post(handlers::create_time_entry))
        .route("/api/log-time", post(handlers::create_time_entry))
        .route_layer(gated(RequiredProviders::both()));

    let session_layer = state.session_layer()?;
    let cors = cors_layer(&state.config)?;

    Ok(Router::new()
        .route("/auth/logout", get(handlers::logout))
        .route("/auth/{provider}", get(handlers::begin_auth))
        .route("/auth/{provider}/callback", get(handlers::auth_callback))
        .route("/api/user", get(handlers::current_user))
        .merge(google_routes)
        .merge(clio_routes)
        .merge(billing_routes)
        .route("/healthz", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route_layer(middleware::from_fn(telemetry::metrics_middleware))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new())
                        .on_response(
                            DefaultOnResponse::new()
                                .level(tracing::Level::INFO)
                                .latency_unit(LatencyUnit::Micros),
                        ),
                )
                .layer(cors)
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
                .layer(middleware::from_fn_with_state(
                    session_layer,
                    session::session_middleware,
                )),
        ))
}

/// CORS limited to the dashboard origin, with credentials
fn cors_layer(config: &Config) -> Result<CorsLayer> {
    let frontend = url::Url::parse(&config.http.frontend_url)?;
    let origin = HeaderValue::from_str(&frontend.origin().ascii_serialization())
        .map_err(|e| EmailBillError::config(format!("invalid frontend origin: {}", e)))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true))
}
