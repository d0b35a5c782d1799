//! User session model.
//!
//! One row per (provider, provider user) pair holding the OAuth tokens and the
//! user profile captured at login.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::AppResult;

/// Persisted OAuth session.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserSession {
    pub session_id: Uuid,
    pub provider: String,
    pub user_provider_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub user_info: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

/// Token fields exposed by `/auth/me`.
#[derive(Debug, Clone, Serialize)]
pub struct TokenData {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl UserSession {
    /// A session without an expiry never expires.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now > exp)
    }

    pub fn token_data(&self) -> TokenData {
        TokenData {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            token_type: self.token_type.clone(),
            expires_at: self.expires_at,
        }
    }
}

/// Values written on login.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub provider: String,
    pub user_provider_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub user_info: serde_json::Value,
}

/// Session repository for database operations.
pub struct SessionRepository;

impl SessionRepository {
    /// Inserts a session, or replaces the existing one for the same provider user.
    ///
    /// A fresh session id is issued on every login so older cookies stop working.
    pub async fn upsert(pool: &sqlx::PgPool, new: &NewSession) -> AppResult<UserSession> {
        let session = sqlx::query_as::<_, UserSession>(
            r"
            INSERT INTO user_sessions (
                session_id, provider, user_provider_id, access_token,
                refresh_token, token_type, expires_at, user_info,
                created_at, last_accessed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
            ON CONFLICT (user_provider_id, provider)
            DO UPDATE SET
                session_id = EXCLUDED.session_id,
                access_token = EXCLUDED.access_token,
                refresh_token = EXCLUDED.refresh_token,
                token_type = EXCLUDED.token_type,
                expires_at = EXCLUDED.expires_at,
                user_info = EXCLUDED.user_info,
                last_accessed_at = NOW()
            RETURNING session_id, provider, user_provider_id, access_token,
                      refresh_token, token_type, expires_at, user_info,
                      created_at, last_accessed_at
            ",
        )
        .bind(Uuid::new_v4())
        .bind(&new.provider)
        .bind(&new.user_provider_id)
        .bind(&new.access_token)
        .bind(&new.refresh_token)
        .bind(&new.token_type)
        .bind(new.expires_at)
        .bind(&new.user_info)
        .fetch_one(pool)
        .await?;

        Ok(session)
    }

    /// Finds a session by id.
    pub async fn find_by_id(pool: &sqlx::PgPool, id: Uuid) -> AppResult<Option<UserSession>> {
        let session = sqlx::query_as::<_, UserSession>(
            r"
            SELECT session_id, provider, user_provider_id, access_token,
                   refresh_token, token_type, expires_at, user_info,
                   created_at, last_accessed_at
            FROM user_sessions
            WHERE session_id = $1
            LIMIT 1
            ",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(session)
    }

    /// Updates `last_accessed_at`.
    pub async fn touch(pool: &sqlx::PgPool, id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE user_sessions SET last_accessed_at = NOW() WHERE session_id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Deletes a session, returning the number of rows removed.
    pub async fn delete(pool: &sqlx::PgPool, id: Uuid) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE session_id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
