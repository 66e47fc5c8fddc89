//! Session & token store: issues/validates hashed
//! bearer and refresh tokens backed by Redis, with a `Session` row of
//! record in the database.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::RngCore;
use redis::AsyncCommands;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use computor_core::{ApiError, Session};

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert(&self, session: &Session) -> Result<(), ApiError>;

    /// Updates the access token's hash and expiry on a refresh, keyed on
    /// the stable session row so racing refreshes serialize here.
    async fn update_access(
        &self,
        session_id: Uuid,
        new_session_id_hash: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<(), ApiError>;

    async fn find_by_refresh_hash(&self, refresh_token_hash: &str) -> Result<Option<Session>, ApiError>;

    async fn mark_ended(&self, session_id: Uuid, ended_at: DateTime<Utc>) -> Result<(), ApiError>;
}

#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub struct SessionStore<R: SessionRepository> {
    redis: redis::Client,
    repository: R,
    access_ttl: ChronoDuration,
    refresh_ttl: ChronoDuration,
}

impl<R: SessionRepository> SessionStore<R> {
    pub fn new(
        redis: redis::Client,
        repository: R,
        access_ttl: ChronoDuration,
        refresh_ttl: ChronoDuration,
    ) -> Self {
        Self {
            redis,
            repository,
            access_ttl,
            refresh_ttl,
        }
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, ApiError> {
        Ok(self.redis.get_multiplexed_async_connection().await?)
    }

    /// Issues a fresh access/refresh token pair and persists the
    /// `Session` row.
    pub async fn login(
        &self,
        user_id: Uuid,
        device_label: Option<String>,
        user_agent: Option<String>,
        ip: Option<String>,
    ) -> Result<IssuedTokens, ApiError> {
        let access_token = random_token();
        let refresh_token = random_token();
        let now = Utc::now();
        let expires_at = now + self.access_ttl;
        let refresh_expires_at = now + self.refresh_ttl;

        let access_hash = sha256_hex(&access_token);
        let refresh_hash = sha256_hex(&refresh_token);

        let mut conn = self.conn().await?;
        let _: () = conn
            .set_ex(
                format!("session:{access_hash}"),
                serde_json::json!({"user_id": user_id, "kind": "access", "expires_at": expires_at}).to_string(),
                self.access_ttl.num_seconds().max(1) as u64,
            )
            .await?;
        let _: () = conn
            .set_ex(
                format!("refresh:{refresh_hash}"),
                serde_json::json!({
                    "user_id": user_id,
                    "kind": "refresh",
                    "expires_at": refresh_expires_at,
                    "access_hash": access_hash,
                })
                .to_string(),
                self.refresh_ttl.num_seconds().max(1) as u64,
            )
            .await?;

        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            session_id_hash: access_hash,
            refresh_token_hash: refresh_hash,
            device_label,
            user_agent,
            ip,
            expires_at,
            refresh_expires_at,
            ended_at: None,
        };
        self.repository.insert(&session).await?;

        Ok(IssuedTokens {
            access_token,
            refresh_token,
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    /// Mints a new access token for an existing, still-alive refresh
    /// token. The refresh token itself is reused, not rotated, until its
    /// own expiry.
    pub async fn refresh(&self, refresh_token: &str) -> Result<IssuedTokens, ApiError> {
        let refresh_hash = sha256_hex(refresh_token);
        let session = self
            .repository
            .find_by_refresh_hash(&refresh_hash)
            .await?
            .ok_or_else(|| ApiError::session_expired())?;

        let now = Utc::now();
        if now >= session.refresh_expires_at || session.ended_at.is_some() {
            return Err(ApiError::session_expired());
        }

        let new_access_token = random_token();
        let new_access_hash = sha256_hex(&new_access_token);
        let new_expires_at = now + self.access_ttl;

        let mut conn = self.conn().await?;
        let _: () = conn.del(format!("session:{}", session.session_id_hash)).await?;
        let _: () = conn
            .set_ex(
                format!("session:{new_access_hash}"),
                serde_json::json!({"user_id": session.user_id, "kind": "access", "expires_at": new_expires_at})
                    .to_string(),
                self.access_ttl.num_seconds().max(1) as u64,
            )
            .await?;

        self.repository
            .update_access(session.id, &new_access_hash, new_expires_at)
            .await?;

        Ok(IssuedTokens {
            access_token: new_access_token,
            refresh_token: refresh_token.to_string(),
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    /// Deletes both Redis entries and marks `Session.ended_at`.
    pub async fn logout(&self, access_token: &str, refresh_token: &str) -> Result<(), ApiError> {
        let access_hash = sha256_hex(access_token);
        let refresh_hash = sha256_hex(refresh_token);

        let session = self.repository.find_by_refresh_hash(&refresh_hash).await?;

        let mut conn = self.conn().await?;
        let _: () = conn.del(format!("session:{access_hash}")).await?;
        let _: () = conn.del(format!("refresh:{refresh_hash}")).await?;

        if let Some(session) = session {
            self.repository.mark_ended(session.id, Utc::now()).await?;
        }
        Ok(())
    }

    /// Validates a bearer access token by its Redis entry, returning the
    /// bound user id.
    pub async fn validate_access(&self, access_token: &str) -> Result<Uuid, ApiError> {
        let access_hash = sha256_hex(access_token);
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(format!("session:{access_hash}")).await?;
        let raw = raw.ok_or_else(|| ApiError::invalid_token("access token not found or expired"))?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        let user_id = value["user_id"]
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| ApiError::internal("corrupt session cache entry"))?;
        Ok(user_id)
    }

    /// Revoking a session deletes its cache entry immediately so all
    /// further auths for that credential fail.
    pub async fn revoke(&self, session: &Session) -> Result<(), ApiError> {
        let mut conn = self.conn().await?;
        let _: () = conn.del(format!("session:{}", session.session_id_hash)).await?;
        let _: () = conn.del(format!("refresh:{}", session.refresh_token_hash)).await?;
        self.repository.mark_ended(session.id, Utc::now()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_tokens_are_32_bytes_hex_encoded() {
        let token = random_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn sha256_hex_is_deterministic() {
        assert_eq!(sha256_hex("abc"), sha256_hex("abc"));
        assert_ne!(sha256_hex("abc"), sha256_hex("abd"));
    }
}
