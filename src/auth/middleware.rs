//! Link gate middleware for authenticated endpoints
//!
//! Every protected route carries a [`LinkGate`] naming the providers it needs.
//! The gate loads the caller's session, rejects with a 401 that explains what
//! is missing, refreshes stale credentials once, and hands the resulting
//! identity to the handler through the [`Linked`] extractor.

use crate::auth::client::ProviderRegistry;
use crate::auth::linker::{self, LinkState, RequiredProviders};
use crate::http::session::{SessionHandle, SessionStore, load_or_reset};
use crate::model::{Identity, Provider, SessionData};
use crate::{EmailBillError, telemetry};
use axum::{
    Json,
    extract::{FromRequestParts, Request, State},
    http::{StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;

/// Per-route gate configuration
#[derive(Clone)]
pub struct LinkGate {
    pub sessions: Arc<dyn SessionStore>,
    pub providers: Arc<ProviderRegistry>,
    pub required: RequiredProviders,
    pub refresh_margin: Duration,
}

/// Why the gate refused a request
#[derive(Debug)]
pub enum GateRejection {
    Unauthenticated,
    PartiallyLinked { missing: Vec<Provider> },
    RefreshFailed { provider: Provider },
    Internal(EmailBillError),
}

impl GateRejection {
    pub fn reason(&self) -> &'static str {
        match self {
            GateRejection::Unauthenticated => "unauthenticated",
            GateRejection::PartiallyLinked { .. } => "partially_linked",
            GateRejection::RefreshFailed { .. } => "refresh_failed",
            GateRejection::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        let reason = self.reason();
        let body = match self {
            GateRejection::Unauthenticated => json!({
                "error": "Not authenticated",
                "reason": reason,
            }),
            GateRejection::PartiallyLinked { missing } => {
                let names: Vec<&str> = missing.iter().map(|p| p.display_name()).collect();
                json!({
                    "error": format!("Not linked with {}", names.join(" and ")),
                    "reason": reason,
                    "missing": missing,
                })
            }
            GateRejection::RefreshFailed { provider } => json!({
                "error": "Re-authentication required",
                "reason": reason,
                "provider": provider,
            }),
            GateRejection::Internal(e) => {
                tracing::error!("Link gate failed: {}", e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "Internal server error"})),
                )
                    .into_response();
            }
        };

        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

impl LinkGate {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        providers: Arc<ProviderRegistry>,
        required: RequiredProviders,
        refresh_margin: Duration,
    ) -> Self {
        Self {
            sessions,
            providers,
            required,
            refresh_margin,
        }
    }

    /// Resolve the session's identity, refreshing stale required credentials.
    ///
    /// Each stale credential gets exactly one refresh attempt. When any
    /// refresh succeeded the merged identity is persisted before returning.
    pub async fn authorize(&self, session_id: &str) -> Result<Identity, GateRejection> {
        let session = load_or_reset(self.sessions.as_ref(), session_id)
            .await
            .map_err(GateRejection::Internal)?;
        let Some(mut session) = session else {
            return Err(GateRejection::Unauthenticated);
        };

        let mut identity = match linker::classify(session.identity.as_ref(), &self.required) {
            LinkState::Unauthenticated => return Err(GateRejection::Unauthenticated),
            LinkState::PartiallyLinked { missing } => {
                return Err(GateRejection::PartiallyLinked { missing });
            }
            LinkState::Linked => session.identity.take().unwrap_or_default(),
        };

        let now = Utc::now();
        let mut refreshed = false;
        for provider in self.required.iter() {
            let Some(credential) = identity.credential(provider) else {
                continue;
            };
            if !credential.is_stale(now, self.refresh_margin) {
                continue;
            }

            let adapter = self.providers.get(provider).ok_or_else(|| {
                GateRejection::Internal(EmailBillError::config(format!(
                    "no OAuth client configured for {}",
                    provider
                )))
            })?;

            match adapter.refresh(credential).await {
                Ok(fresh) => {
                    telemetry::record_token_refresh(provider.as_str(), "success");
                    identity = linker::merge(identity, provider, fresh);
                    refreshed = true;
                }
                Err(e) => {
                    tracing::warn!(provider = %provider, "Token refresh failed: {}", e);
                    telemetry::record_token_refresh(provider.as_str(), "failure");
                    // Earlier refreshes may have rotated refresh tokens; keep them.
                    if refreshed {
                        self.persist(session_id, &mut session, identity).await?;
                    }
                    return Err(GateRejection::RefreshFailed { provider });
                }
            }
        }

        if refreshed {
            self.persist(session_id, &mut session, identity.clone()).await?;
        }

        Ok(identity)
    }

    async fn persist(
        &self,
        session_id: &str,
        session: &mut SessionData,
        identity: Identity,
    ) -> Result<(), GateRejection> {
        session.identity = Some(identity);
        self.sessions
            .save(session_id, session)
            .await
            .map_err(GateRejection::Internal)
    }
}

/// Identity of a request that passed its route's [`LinkGate`]
#[derive(Debug, Clone)]
pub struct Linked(pub Identity);

/// Axum middleware enforcing a [`LinkGate`]
///
/// Must run inside the session middleware so a [`SessionHandle`] is present.
pub async fn require_linked(State(gate): State<LinkGate>, mut req: Request, next: Next) -> Response {
    let Some(handle) = req.extensions().get::<SessionHandle>().cloned() else {
        return GateRejection::Internal(EmailBillError::config("session middleware not configured"))
            .into_response();
    };

    let outcome = if handle.fresh {
        Err(GateRejection::Unauthenticated)
    } else {
        gate.authorize(&handle.id).await
    };

    match outcome {
        Ok(identity) => {
            req.extensions_mut().insert(Linked(identity));
            next.run(req).await
        }
        Err(rejection) => {
            telemetry::record_gate_rejection(rejection.reason());
            rejection.into_response()
        }
    }
}

impl<S> FromRequestParts<S> for Linked
where
    S: Send + Sync,
{
    type Rejection = GateRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Linked>()
            .cloned()
            .ok_or(GateRejection::Unauthenticated)
    }
}
