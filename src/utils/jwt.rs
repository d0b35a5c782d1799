//! Signed tokens and cookie signing key.
//!
//! Both derive from `SECRET_KEY`. Bearer tokens carry the session id as
//! subject; the same secret signs the OAuth state cookie.

use axum_extra::extract::cookie::Key;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{get_env, get_env_parsed, APP_CONFIG};
use crate::error::{AppError, AppResult};

/// Minimum recommended length for the secret.
const MIN_SECRET_LENGTH: usize = 32;

static SECRET_KEY: Lazy<String> = Lazy::new(|| {
    let secret = get_env("SECRET_KEY", None);

    if secret.is_empty() {
        assert!(
            !APP_CONFIG.is_production,
            "SECRET_KEY must be set in production environment"
        );
        tracing::warn!(
            "SECRET_KEY not set - using insecure default. \
             Set RUST_ENV=production to enforce security requirements."
        );
        "insecure-development-secret-change-me-now".to_string()
    } else {
        if secret.len() < MIN_SECRET_LENGTH {
            tracing::warn!(
                "SECRET_KEY is shorter than {} characters. \
                 Consider using a longer secret for better security.",
                MIN_SECRET_LENGTH
            );
        }
        secret
    }
});

static JWT_EXPIRATION_HOURS: Lazy<i64> = Lazy::new(|| {
    get_env_parsed(
        "JWT_EXPIRATION_HOURS",
        APP_CONFIG.session_cookie_max_age_days * 24,
    )
});

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Session id
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

impl Claims {
    pub fn session_id(&self) -> AppResult<Uuid> {
        Uuid::parse_str(&self.sub)
            .map_err(|_| AppError::Unauthorized("Malformed session token".to_string()))
    }
}

/// Issues a bearer token for a stored session.
#[must_use = "the generated token should be used"]
pub fn gen_token(session_id: Uuid) -> AppResult<String> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: session_id.to_string(),
        exp: now + (*JWT_EXPIRATION_HOURS * 3600),
        iat: now,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET_KEY.as_bytes()),
    )?;

    Ok(token)
}

/// Parses and validates a bearer token.
#[must_use = "the parsed claims should be used"]
pub fn parse_token(token: &str) -> AppResult<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(SECRET_KEY.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

/// Key for signed cookies, derived from `SECRET_KEY`.
pub fn cookie_key() -> Key {
    // Key derivation needs at least 32 bytes of material
    let material: Vec<u8> = SECRET_KEY
        .bytes()
        .cycle()
        .take(SECRET_KEY.len().max(MIN_SECRET_LENGTH))
        .collect();
    Key::derive_from(&material)
}
