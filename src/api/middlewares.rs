//! Middleware module.
//!
//! Resolves the caller's login session for protected routes.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::state::AppState;
use crate::error::AppError;
use crate::models::{SessionRepository, UserSession};
use crate::utils::parse_token;

/// Cookie holding the session id.
pub const SESSION_COOKIE: &str = "session_id";

/// Session attached to the request by [`session_auth`].
#[derive(Clone)]
pub struct AuthSession(pub UserSession);

/// Where the caller's identity came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Bearer(String),
    Cookie(String),
}

/// Why a credential did not resolve to a live session.
#[derive(Debug)]
pub enum AuthFailure {
    InvalidToken,
    NotFound,
    Expired,
    Lookup(AppError),
}

impl From<AuthFailure> for AppError {
    fn from(failure: AuthFailure) -> Self {
        match failure {
            AuthFailure::InvalidToken => Self::Unauthorized("Invalid token".to_string()),
            AuthFailure::NotFound => Self::Unauthorized("Session not found".to_string()),
            AuthFailure::Expired => Self::Unauthorized("Session expired".to_string()),
            AuthFailure::Lookup(e) => e,
        }
    }
}

/// Session Authentication Middleware.
///
/// # Authentication Header Format
///
/// `Authorization: Bearer <token>`, falling back to the `session_id` cookie.
///
/// # Error Responses
///
/// - 401 Unauthorized: no credential, bad token, unknown or expired session
pub async fn session_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(credential) = extract_credential(request.headers(), &jar) else {
        return Err(AppError::Unauthorized("No token provided".to_string()));
    };

    let session = resolve_session(&state.db, &credential).await?;
    request.extensions_mut().insert(AuthSession(session));
    Ok(next.run(request).await)
}

/// Loads the live session a credential points to.
pub async fn resolve_session(
    db: &PgPool,
    credential: &Credential,
) -> Result<UserSession, AuthFailure> {
    let session_id = credential_session_id(credential).ok_or(AuthFailure::InvalidToken)?;

    let session = SessionRepository::find_by_id(db, session_id)
        .await
        .map_err(AuthFailure::Lookup)?
        .ok_or(AuthFailure::NotFound)?;

    if session.is_expired(Utc::now()) {
        tracing::warn!(session_id = %session_id, "Session expired");
        return Err(AuthFailure::Expired);
    }
    Ok(session)
}

fn credential_session_id(credential: &Credential) -> Option<Uuid> {
    match credential {
        Credential::Bearer(token) => parse_token(token).ok()?.session_id().ok(),
        Credential::Cookie(value) => Uuid::parse_str(value).ok(),
    }
}

/// Extracts the caller's credential.
///
/// First checks the Authorization header for a Bearer token,
/// then falls back to the session cookie.
pub fn extract_credential(headers: &HeaderMap, jar: &CookieJar) -> Option<Credential> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(Credential::Bearer(token.to_string()));
            }
        }
    }

    jar.get(SESSION_COOKIE)
        .map(|c| Credential::Cookie(c.value().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::gen_token;
    use axum::http::HeaderValue;
    use axum_extra::extract::cookie::Cookie;

    fn bearer(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    // ============ extract_credential ============

    #[test]
    fn test_extract_credential_from_bearer_header() {
        let credential = extract_credential(&bearer("Bearer test_token_123"), &CookieJar::new());
        assert_eq!(
            credential,
            Some(Credential::Bearer("test_token_123".to_string()))
        );
    }

    #[test]
    fn test_extract_credential_no_bearer_prefix() {
        assert!(extract_credential(&bearer("Basic abc123"), &CookieJar::new()).is_none());
    }

    #[test]
    fn test_extract_credential_case_sensitive_bearer() {
        assert!(extract_credential(&bearer("bearer lowercase"), &CookieJar::new()).is_none());
    }

    #[test]
    fn test_extract_credential_from_cookie() {
        let jar = CookieJar::new().add(Cookie::new(SESSION_COOKIE, "cookie_session"));
        assert_eq!(
            extract_credential(&HeaderMap::new(), &jar),
            Some(Credential::Cookie("cookie_session".to_string()))
        );
    }

    #[test]
    fn test_extract_credential_header_takes_precedence() {
        let jar = CookieJar::new().add(Cookie::new(SESSION_COOKIE, "cookie_session"));
        assert_eq!(
            extract_credential(&bearer("Bearer header_token"), &jar),
            Some(Credential::Bearer("header_token".to_string()))
        );
    }

    #[test]
    fn test_extract_credential_wrong_cookie_name() {
        let jar = CookieJar::new().add(Cookie::new("token", "legacy"));
        assert!(extract_credential(&HeaderMap::new(), &jar).is_none());
    }

    // ============ credential_session_id ============

    #[test]
    fn test_session_id_from_bearer_jwt() {
        let id = Uuid::new_v4();
        let token = gen_token(id).unwrap();
        assert_eq!(credential_session_id(&Credential::Bearer(token)), Some(id));
    }

    #[test]
    fn test_session_id_rejects_garbage() {
        assert!(credential_session_id(&Credential::Bearer("not-a-jwt".to_string())).is_none());
        assert!(credential_session_id(&Credential::Cookie("not-a-uuid".to_string())).is_none());
    }

    #[test]
    fn test_session_id_from_cookie() {
        let id = Uuid::new_v4();
        assert_eq!(
            credential_session_id(&Credential::Cookie(id.to_string())),
            Some(id)
        );
    }

    #[test]
    fn test_auth_failure_maps_to_unauthorized() {
        for failure in [AuthFailure::InvalidToken, AuthFailure::NotFound, AuthFailure::Expired] {
            assert!(matches!(AppError::from(failure), AppError::Unauthorized(_)));
        }
    }
}
