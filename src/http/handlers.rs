//! Route handlers
//!
//! OAuth entry points are open; `/api/*` handlers run behind a link gate and
//! receive the caller's identity through [`Linked`].

use super::AppState;
use super::response::{AppError, write_http_error};
use super::session::{RotatedSession, SessionHandle, clear_session_cookie, load_or_reset, rotate_session};
use crate::auth::linker;
use crate::auth::middleware::{GateRejection, Linked};
use crate::constants::AUTH_FAILED_ERROR;
use crate::downstream::{Email, Matter, NewTimeEntry, Summary, TimeEntry};
use crate::error::AuthError;
use crate::model::{Identity, Provider, SessionData};
use crate::{EmailBillError, Result, telemetry};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

type ApiResult<T> = std::result::Result<Json<T>, AppError>;

fn parse_provider(raw: &str) -> std::result::Result<Provider, Response> {
    raw.parse()
        .map_err(|_| write_http_error(StatusCode::NOT_FOUND, "Unknown provider"))
}

/// GET /auth/{provider}
pub async fn begin_auth(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    handle: SessionHandle,
) -> Response {
    let provider = match parse_provider(&provider) {
        Ok(provider) => provider,
        Err(response) => return response,
    };

    match start_flow(&state, provider, &handle).await {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(e) => AppError(e).into_response(),
    }
}

async fn start_flow(state: &AppState, provider: Provider, handle: &SessionHandle) -> Result<String> {
    let adapter = state.adapter(provider)?;
    let mut session = load_or_reset(state.sessions.as_ref(), &handle.id)
        .await?
        .unwrap_or_default();

    let url = adapter.begin_auth(&mut session, &[]).await?;
    state.sessions.save(&handle.id, &session).await?;

    tracing::info!(provider = %provider, "Starting OAuth flow");
    Ok(url)
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// GET /auth/{provider}/callback
///
/// Always redirects to the dashboard; failures add `?error=auth_failed`.
pub async fn auth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
    handle: SessionHandle,
) -> Response {
    let provider = match parse_provider(&provider) {
        Ok(provider) => provider,
        Err(response) => return response,
    };

    let dashboard = format!("{}/dashboard", state.config.frontend_base());
    match finish_flow(&state, provider, &handle, params).await {
        Ok(session_id) => {
            tracing::info!(provider = %provider, "Linked provider");
            telemetry::record_auth_flow(provider.as_str(), "success");
            let mut response = Redirect::to(&dashboard).into_response();
            response.extensions_mut().insert(RotatedSession(session_id));
            response
        }
        Err(e) => {
            let outcome = match &e {
                EmailBillError::Auth(auth) => auth.reason(),
                _ => "error",
            };
            tracing::warn!(provider = %provider, outcome, "OAuth callback failed: {}", e);
            telemetry::record_auth_flow(provider.as_str(), outcome);
            Redirect::to(&format!("{}?error={}", dashboard, AUTH_FAILED_ERROR)).into_response()
        }
    }
}

async fn finish_flow(
    state: &AppState,
    provider: Provider,
    handle: &SessionHandle,
    params: CallbackParams,
) -> Result<String> {
    let adapter = state.adapter(provider)?;
    let Some(mut session) = load_or_reset(state.sessions.as_ref(), &handle.id).await? else {
        return Err(AuthError::InvalidState.into());
    };

    let outcome = match (params.error, params.code) {
        (Some(error), _) => {
            session.pending = None;
            Err(AuthError::ProviderRejected {
                provider,
                detail: error,
            }
            .into())
        }
        (None, None) => {
            session.pending = None;
            Err(AuthError::ProviderRejected {
                provider,
                detail: "callback without code".to_string(),
            }
            .into())
        }
        (None, Some(code)) => {
            adapter
                .complete_auth(&mut session, &code, params.state.as_deref())
                .await
        }
    };

    // The nonce is gone either way; persist that before reporting.
    // A newly linked identity moves to a new session id.
    match outcome {
        Ok(credential) => {
            let identity = session.identity.take().unwrap_or_default();
            session.identity = Some(linker::merge(identity, provider, credential));
            rotate_session(state.sessions.as_ref(), &handle.id, &session).await
        }
        Err(e) => {
            state.sessions.save(&handle.id, &session).await?;
            Err(e)
        }
    }
}

/// GET /auth/logout
pub async fn logout(State(state): State<AppState>, handle: SessionHandle) -> Response {
    if !handle.fresh {
        if let Err(e) = state.sessions.delete(&handle.id).await {
            tracing::error!("Failed to delete session: {}", e);
        }
    }

    let cookie = clear_session_cookie(state.config.http.secure);
    (
        [(header::SET_COOKIE, cookie)],
        Redirect::to(&format!("{}/", state.config.frontend_base())),
    )
        .into_response()
}

/// GET /api/user
///
/// Profiles only; tokens never leave the server.
pub async fn current_user(State(state): State<AppState>, handle: SessionHandle) -> Response {
    let session = if handle.fresh {
        Ok(None)
    } else {
        load_or_reset(state.sessions.as_ref(), &handle.id).await
    };

    match session {
        Ok(Some(SessionData {
            identity: Some(identity),
            ..
        })) if !identity.is_empty() => Json(user_profiles(&identity)).into_response(),
        Ok(_) => {
            telemetry::record_gate_rejection(GateRejection::Unauthenticated.reason());
            GateRejection::Unauthenticated.into_response()
        }
        Err(e) => AppError(e).into_response(),
    }
}

fn user_profiles(identity: &Identity) -> Value {
    let profile = |provider| {
        identity
            .credential(provider)
            .map(|c| c.profile.clone())
            .unwrap_or(Value::Null)
    };
    json!({
        "google": profile(Provider::Google),
        "clio": profile(Provider::Clio),
    })
}

fn access_token(identity: &Identity, provider: Provider) -> Result<&str> {
    identity
        .credential(provider)
        .map(|c| c.access_token.as_str())
        .ok_or_else(|| {
            AuthError::RefreshFailed {
                provider,
                reason: "provider not linked".to_string(),
            }
            .into()
        })
}

/// GET /api/emails
pub async fn emails(State(state): State<AppState>, Linked(identity): Linked) -> ApiResult<Vec<Email>> {
    let token = access_token(&identity, Provider::Google)?;
    Ok(Json(state.gmail.sent_messages(token).await?))
}

#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    #[serde(default)]
    pub text: Option<String>,
}

/// POST /api/summarize
pub async fn summarize(
    State(state): State<AppState>,
    Linked(_identity): Linked,
    Json(request): Json<SummarizeRequest>,
) -> ApiResult<Summary> {
    let text = request.text.unwrap_or_default();
    Ok(Json(state.summarizer.summarize(&text).await?))
}

/// GET /api/matters
pub async fn matters(State(state): State<AppState>, Linked(identity): Linked) -> ApiResult<Vec<Matter>> {
    let token = access_token(&identity, Provider::Clio)?;
    Ok(Json(state.clio.matters(token).await?))
}

/// GET /api/time-entries
pub async fn time_entries(
    State(state): State<AppState>,
    Linked(identity): Linked,
) -> ApiResult<Vec<TimeEntry>> {
    let token = access_token(&identity, Provider::Clio)?;
    Ok(Json(state.clio.time_entries(token).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntryRequest {
    #[serde(default)]
    pub matter_id: Option<Value>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

impl TimeEntryRequest {
    /// Validate into a Clio time entry; `date` defaults to today (UTC)
    pub fn into_new_entry(self) -> Result<NewTimeEntry> {
        let matter_id = match &self.matter_id {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
        .ok_or_else(|| EmailBillError::validation("matterId is required"))?;

        let hours = self
            .duration
            .filter(|h| h.is_finite() && *h > 0.0)
            .ok_or_else(|| EmailBillError::validation("duration must be a positive number of hours"))?;

        let description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .ok_or_else(|| EmailBillError::validation("description is required"))?;

        let date = match self.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(raw) => {
                let day = raw.split('T').next().unwrap_or(raw);
                NaiveDate::parse_from_str(day, "%Y-%m-%d")
                    .map_err(|_| EmailBillError::validation(format!("invalid date '{}'", raw)))?
            }
            None => Utc::now().date_naive(),
        };

        Ok(NewTimeEntry {
            matter_id,
            hours,
            description,
            date,
        })
    }
}

/// POST /api/time-entry and /api/log-time
pub async fn create_time_entry(
    State(state): State<AppState>,
    Linked(identity): Linked,
    Json(request): Json<TimeEntryRequest>,
) -> ApiResult<Value> {
    let entry = request.into_new_entry()?;
    let token = access_token(&identity, Provider::Clio)?;

    let created = state.clio.create_time_entry(token, &entry).await?;
    tracing::info!(matter_id = entry.matter_id, "Logged time entry");

    Ok(Json(json!({ "timeEntry": created })))
}

/// GET /healthz
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// GET /metrics
pub async fn metrics() -> std::result::Result<(StatusCode, String), AppError> {
    let metrics = telemetry::get_metrics()?;
    Ok((StatusCode::OK, metrics))
}
