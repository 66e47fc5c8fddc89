use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use computor_auth::{credentials::ResolvedUser, principal::PrincipalRepository, session::SessionRepository};
use computor_core::{ApiError, CourseRole, Session};

use super::PgRepositories;

#[async_trait]
impl PrincipalRepository for PgRepositories {
    async fn global_roles(&self, user_id: Uuid) -> Result<Vec<String>, ApiError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT role FROM user_roles WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(role,)| role).collect())
    }

    async fn course_memberships(&self, user_id: Uuid) -> Result<Vec<(Uuid, CourseRole)>, ApiError> {
        let rows: Vec<(Uuid, CourseRole)> =
            sqlx::query_as("SELECT course_id, course_role FROM course_members WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    async fn general_claims(&self, roles: &[String]) -> Result<Vec<(String, String)>, ApiError> {
        if roles.is_empty() {
            return Ok(vec![]);
        }
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT resource, action FROM role_claims WHERE role = ANY($1)",
        )
        .bind(roles)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// Resolves any of the four credential kinds to a user id.
/// `BearerSession`/`ApiToken` go through the session/token tables;
/// `Password` is verified by the caller against `Account` before this is
/// reached; `ProviderToken` is out of scope (opaque provider wire format).
impl PgRepositories {
    pub async fn resolve_password_user(&self, username: &str) -> Result<Option<(Uuid, String)>, ApiError> {
        let row: Option<(Uuid, String)> = sqlx::query_as(
            "SELECT user_id, password_hash FROM accounts WHERE provider = 'local' AND provider_account_id = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn resolve_api_token_user(&self, token_hash: &str) -> Result<Option<ResolvedUser>, ApiError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT user_id FROM api_tokens WHERE token_hash = $1 \
             AND revoked_at IS NULL AND (expires_at IS NULL OR expires_at > now())",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(user_id,)| ResolvedUser { user_id }))
    }
}

#[async_trait]
impl SessionRepository for PgRepositories {
    async fn insert(&self, session: &Session) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT INTO sessions (id, user_id, session_id_hash, refresh_token_hash, device_label, \
             user_agent, ip, expires_at, refresh_expires_at, ended_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.session_id_hash)
        .bind(&session.refresh_token_hash)
        .bind(&session.device_label)
        .bind(&session.user_agent)
        .bind(&session.ip)
        .bind(session.expires_at)
        .bind(session.refresh_expires_at)
        .bind(session.ended_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_access(
        &self,
        session_id: Uuid,
        new_session_id_hash: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        sqlx::query("UPDATE sessions SET session_id_hash = $1, expires_at = $2 WHERE id = $3")
            .bind(new_session_id_hash)
            .bind(new_expires_at)
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_by_refresh_hash(&self, refresh_token_hash: &str) -> Result<Option<Session>, ApiError> {
        let session = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE refresh_token_hash = $1")
            .bind(refresh_token_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(session)
    }

    async fn mark_ended(&self, session_id: Uuid, ended_at: DateTime<Utc>) -> Result<(), ApiError> {
        sqlx::query("UPDATE sessions SET ended_at = $1 WHERE id = $2")
            .bind(ended_at)
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
