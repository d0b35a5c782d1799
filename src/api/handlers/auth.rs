//! OAuth login handlers.
//!
//! `login` stores a random `state` in a signed cookie and sends the browser to
//! LinkedIn; `callback` checks it, exchanges the code, stores the session and
//! hands the frontend a bearer token.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use axum_extra::extract::{CookieJar, SignedCookieJar};
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use chrono::{DateTime, Duration, Utc};
use cookie::{Cookie, CookieBuilder, SameSite};
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use crate::api::middlewares::{resolve_session, AuthFailure, Credential, SESSION_COOKIE};
use crate::api::schemas::{CallbackQuery, MeResponse};
use crate::api::state::AppState;
use crate::config::APP_CONFIG;
use crate::error::{AppError, AppResult};
use crate::models::{NewSession, SessionRepository, UserSession};
use crate::utils::{gen_oauth_state, gen_token};

/// Signed cookie carrying the OAuth CSRF state between login and callback.
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

const LINKEDIN: &str = "linkedin";

/// Why a callback did not produce a session. Reported to the frontend as
/// `auth_error={provider}:{code}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackError {
    MissingCodeOrState,
    StateMismatch,
    TokenFetchFailed,
    UserInfoFailed,
    DbError,
    CallbackFailed,
}

impl CallbackError {
    pub const fn code(self) -> &'static str {
        match self {
            Self::MissingCodeOrState => "missing_code_or_state",
            Self::StateMismatch => "state_mismatch",
            Self::TokenFetchFailed => "token_fetch_failed",
            Self::UserInfoFailed => "user_info_failed",
            Self::DbError => "db_error",
            Self::CallbackFailed => "callback_failed",
        }
    }
}

/// Redirect to the frontend with the given query parameters.
pub fn frontend_url(params: &[(&str, &str)]) -> String {
    match Url::parse_with_params(&APP_CONFIG.base_url, params) {
        Ok(url) => url.into(),
        Err(e) => {
            tracing::warn!(base_url = %APP_CONFIG.base_url, error = %e, "BASE_URL is not absolute");
            APP_CONFIG.base_url.clone()
        }
    }
}

fn auth_error_redirect(provider: &str, code: &str) -> Redirect {
    Redirect::temporary(&frontend_url(&[("auth_error", &format!("{provider}:{code}"))]))
}

/// Session cookie settings shared by login and logout.
fn session_cookie(value: String) -> CookieBuilder<'static> {
    let mut builder = Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);

    // Enable Secure flag in production (HTTPS only)
    if APP_CONFIG.is_production {
        builder = builder.secure(true);
    }
    if !APP_CONFIG.cookie_domain.is_empty() {
        builder = builder.domain(APP_CONFIG.cookie_domain.clone());
    }
    builder
}

/// OAuth login handler.
///
/// # Route
///
/// `GET /auth/login/{provider}`
pub async fn login_handler(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: SignedCookieJar,
) -> AppResult<(SignedCookieJar, Redirect)> {
    if provider != LINKEDIN {
        tracing::warn!(provider = %provider, "Unsupported OAuth provider requested");
        return Err(AppError::NotFound("Provider not supported".to_string()));
    }

    let csrf_state = gen_oauth_state();
    let authorization_url = state.linkedin.authorization_url(&csrf_state).map_err(|e| {
        tracing::error!(provider = %provider, error = %e, "OAuth client is not configured");
        AppError::Internal(format!("Server configuration error for {provider} login."))
    })?;

    let state_cookie = Cookie::build((OAUTH_STATE_COOKIE, csrf_state))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(cookie::time::Duration::minutes(10))
        .secure(APP_CONFIG.is_production);

    tracing::info!(provider = %provider, "Redirecting to OAuth consent screen");
    Ok((jar.add(state_cookie), Redirect::temporary(&authorization_url)))
}

/// OAuth callback handler.
///
/// Every outcome is a 307 to the frontend; failures carry `auth_error`.
///
/// # Route
///
/// `GET /auth/callback/{provider}`
pub async fn callback_handler(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    signed: SignedCookieJar,
    jar: CookieJar,
) -> Response {
    tracing::info!(provider = %provider, "Received OAuth callback");

    let stored_state = signed.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_string());
    let signed = signed.remove(Cookie::build(OAUTH_STATE_COOKIE).path("/"));

    if let Some(error) = query.error.as_deref() {
        tracing::warn!(
            provider = %provider,
            error = %error,
            description = ?query.error_description,
            "Provider returned an OAuth error"
        );
        return (signed, auth_error_redirect(&provider, error)).into_response();
    }

    let (Some(code), Some(returned_state)) = (query.code.as_deref(), query.state.as_deref())
    else {
        return (
            signed,
            auth_error_redirect(&provider, CallbackError::MissingCodeOrState.code()),
        )
            .into_response();
    };

    if stored_state.as_deref() != Some(returned_state) {
        tracing::warn!(provider = %provider, "OAuth state mismatch");
        return (
            signed,
            auth_error_redirect(&provider, CallbackError::StateMismatch.code()),
        )
            .into_response();
    }

    match complete_login(&state, &provider, code).await {
        Ok((session, user_info)) => {
            let bearer = match gen_token(session.session_id) {
                Ok(token) => token,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to sign session token");
                    return (
                        signed,
                        auth_error_redirect(&provider, CallbackError::CallbackFailed.code()),
                    )
                        .into_response();
                }
            };
            let user_info_b64 = URL_SAFE.encode(user_info.to_string());
            let target = frontend_url(&[
                ("auth_provider", provider.as_str()),
                ("auth_token", bearer.as_str()),
                ("user_info", user_info_b64.as_str()),
            ]);

            let cookie = session_cookie(session.session_id.to_string()).max_age(
                cookie::time::Duration::days(APP_CONFIG.session_cookie_max_age_days),
            );

            tracing::info!(
                provider = %provider,
                session_id = %session.session_id,
                "OAuth login completed"
            );
            (signed, jar.add(cookie), Redirect::temporary(&target)).into_response()
        }
        Err(failure) => {
            tracing::error!(provider = %provider, code = failure.code(), "OAuth callback failed");
            (signed, auth_error_redirect(&provider, failure.code())).into_response()
        }
    }
}

/// Exchanges the code, loads the profile and upserts the session row.
async fn complete_login(
    state: &AppState,
    provider: &str,
    code: &str,
) -> Result<(UserSession, Value), CallbackError> {
    if provider != LINKEDIN {
        return Err(CallbackError::CallbackFailed);
    }

    let token = state.linkedin.exchange_code(code).await.map_err(|e| {
        tracing::error!(error = %e, "Token exchange failed");
        CallbackError::TokenFetchFailed
    })?;

    let user_info = state
        .linkedin
        .user_info(&token.access_token)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Fetching user info failed");
            CallbackError::UserInfoFailed
        })?;

    let user_provider_id = ["sub", "id"]
        .iter()
        .find_map(|key| user_info.get(*key).and_then(Value::as_str))
        .filter(|id| !id.is_empty())
        .ok_or(CallbackError::UserInfoFailed)?
        .to_string();

    let new_session = NewSession {
        provider: provider.to_string(),
        user_provider_id,
        access_token: token.access_token,
        refresh_token: token.refresh_token,
        token_type: token.token_type,
        expires_at: token_expiry(Utc::now(), token.expires_in),
        user_info: user_info.clone(),
    };

    let session = SessionRepository::upsert(&state.db, &new_session)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Saving session failed");
            CallbackError::DbError
        })?;

    Ok((session, user_info))
}

/// Absolute expiry for a token lifetime in seconds. Lifetimes that do not fit
/// a timestamp are treated as absent.
fn token_expiry(now: DateTime<Utc>, expires_in: Option<i64>) -> Option<DateTime<Utc>> {
    expires_in
        .and_then(Duration::try_seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
}

fn bearer_credential(headers: &HeaderMap) -> Option<Credential> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| Credential::Bearer(token.to_string()))
}

async fn authenticated(state: &AppState, session: &UserSession) -> Json<MeResponse> {
    if let Err(e) = SessionRepository::touch(&state.db, session.session_id).await {
        tracing::warn!(session_id = %session.session_id, error = %e, "Failed to touch session");
    }
    Json(MeResponse {
        authenticated: true,
        provider: Some(session.provider.clone()),
        user_info: Some(session.user_info.clone()),
        token_data: Some(session.token_data()),
        reason: None,
    })
}

/// Current session lookup.
///
/// Always 200: tries the bearer token, then the session cookie, and explains
/// what went wrong when neither resolves.
///
/// # Route
///
/// `GET /auth/me`
pub async fn me_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    let bearer = bearer_credential(&headers);
    if let Some(credential) = &bearer {
        match resolve_session(&state.db, credential).await {
            Ok(session) => return authenticated(&state, &session).await.into_response(),
            Err(AuthFailure::Lookup(e)) => tracing::error!(error = %e, "Bearer session lookup failed"),
            Err(failure) => tracing::debug!(?failure, "Bearer token did not resolve"),
        }
    }

    let Some(cookie_value) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) else {
        let reason = if bearer.is_some() {
            "Bearer token invalid/expired or session not found"
        } else {
            "No valid session found via token or cookie"
        };
        return Json(MeResponse::unauthenticated(reason)).into_response();
    };

    match resolve_session(&state.db, &Credential::Cookie(cookie_value)).await {
        Ok(session) => authenticated(&state, &session).await.into_response(),
        Err(failure) => {
            match &failure {
                AuthFailure::Lookup(e) => tracing::error!(error = %e, "Cookie session lookup failed"),
                AuthFailure::NotFound => tracing::warn!("Session cookie has no matching session"),
                _ => tracing::debug!(?failure, "Session cookie did not resolve"),
            }
            let (reason, clear) = cookie_failure(&failure);
            let body = Json(MeResponse::unauthenticated(reason));
            if clear {
                (jar.remove(session_cookie(String::new())), body).into_response()
            } else {
                body.into_response()
            }
        }
    }
}

/// Reason reported for a cookie that did not resolve, and whether the cookie
/// should be cleared. Malformed and orphaned cookies can never succeed.
fn cookie_failure(failure: &AuthFailure) -> (&'static str, bool) {
    match failure {
        AuthFailure::NotFound => ("Session not found in DB", true),
        AuthFailure::Expired => ("Token expired", false),
        AuthFailure::InvalidToken => ("Cookie invalid, session expired, or session not found", true),
        AuthFailure::Lookup(_) => ("Cookie invalid, session expired, or session not found", false),
    }
}

/// Logout handler.
///
/// Deletes the cookie's session row; database errors are logged only.
///
/// # Route
///
/// `GET /auth/logout`
pub async fn logout_handler(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Redirect) {
    let session_id = jar
        .get(SESSION_COOKIE)
        .and_then(|c| Uuid::parse_str(c.value()).ok());
    tracing::info!(has_session = session_id.is_some(), "Logout requested");

    if let Some(session_id) = session_id {
        match SessionRepository::delete(&state.db, session_id).await {
            Ok(rows) => tracing::info!(session_id = %session_id, rows, "Session deleted"),
            Err(e) => tracing::error!(session_id = %session_id, error = %e, "Failed to delete session"),
        }
    }

    (
        jar.remove(session_cookie(String::new())),
        Redirect::temporary(&APP_CONFIG.base_url),
    )
}
