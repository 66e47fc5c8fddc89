//! Error taxonomy for the computor control plane.
//!
//! Mirrors the source system's error registry: every error carries a
//! stable `error_code` string, a fixed `(category, severity, http_status)`
//! triple, and both a plain-text and markdown-flavored message. Handlers
//! never leak raw database errors to clients; [`ApiError`] is the single
//! boundary type every service in this workspace returns.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

/// Result type alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Error category, used for client-side handling and metrics labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Authentication,
    Authorization,
    Validation,
    NotFound,
    Conflict,
    RateLimit,
    ExternalService,
    Database,
    Internal,
    NotImplemented,
}

/// Severity, used for logging and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// The error sum type every core service returns.
///
/// Each variant owns a stable error code (`AUTH_002`, `DEPLOY_001`, ...)
/// so the catalog in [`ERROR_CATALOG`] can look up the fixed
/// `(category, severity, http status)` mapping from it, the same way the
/// source system's error registry is the single source of truth for
/// those three facts.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{code}: {message}")]
    Authentication { code: &'static str, message: String },

    #[error("{code}: {message}")]
    Authorization { code: &'static str, message: String },

    #[error("{code}: {message}")]
    Validation { code: &'static str, message: String },

    #[error("{code}: {message}")]
    NotFound { code: &'static str, message: String },

    #[error("{code}: {message}")]
    Conflict { code: &'static str, message: String },

    #[error("{code}: {message}")]
    RateLimit {
        code: &'static str,
        message: String,
        retry_after: Option<u64>,
    },

    #[error("{code}: {message}")]
    External {
        code: &'static str,
        message: String,
        retry_after: Option<u64>,
    },

    #[error("{code}: {message}")]
    Database { code: &'static str, message: String },

    #[error("{code}: {message}")]
    Internal { code: &'static str, message: String },

    #[error("{code}: {message}")]
    NotImplemented { code: &'static str, message: String },
}

impl ApiError {
    pub fn authentication<S: Into<String>>(message: S) -> Self {
        Self::Authentication {
            code: "AUTH_001",
            message: message.into(),
        }
    }

    pub fn invalid_token<S: Into<String>>(message: S) -> Self {
        Self::Authentication {
            code: "AUTH_002",
            message: message.into(),
        }
    }

    pub fn session_expired() -> Self {
        Self::Authentication {
            code: "AUTH_003",
            message: "session has expired, log in again".to_string(),
        }
    }

    pub fn forbidden<S: Into<String>>(message: S) -> Self {
        Self::Authorization {
            code: "AUTHZ_001",
            message: message.into(),
        }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            code: "VALIDATION_001",
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound {
            code: "NOT_FOUND_001",
            message: message.into(),
        }
    }

    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict {
            code: "CONFLICT_001",
            message: message.into(),
        }
    }

    /// A deployment reassignment attempted to change the example
    /// identifier of an already-`deployed` deployment.
    pub fn deployment_identity_violation<S: Into<String>>(message: S) -> Self {
        Self::Conflict {
            code: "DEPLOY_001",
            message: message.into(),
        }
    }

    pub fn test_already_running<S: Into<String>>(message: S) -> Self {
        Self::Conflict {
            code: "TEST_001",
            message: message.into(),
        }
    }

    pub fn test_already_finished<S: Into<String>>(message: S) -> Self {
        Self::Conflict {
            code: "TEST_002",
            message: message.into(),
        }
    }

    pub fn rate_limited(retry_after: u64) -> Self {
        Self::RateLimit {
            code: "RATE_001",
            message: "too many requests".to_string(),
            retry_after: Some(retry_after),
        }
    }

    pub fn external<S: Into<String>>(message: S) -> Self {
        Self::External {
            code: "EXTERNAL_001",
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn workflow_not_found(workflow_id: &str) -> Self {
        Self::External {
            code: "WORKFLOW_001",
            message: format!("workflow {workflow_id} not found in task executor"),
            retry_after: None,
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            code: "INTERNAL_001",
            message: message.into(),
        }
    }

    pub fn not_implemented<S: Into<String>>(message: S) -> Self {
        Self::NotImplemented {
            code: "NOT_IMPLEMENTED_001",
            message: message.into(),
        }
    }

    /// Stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Authentication { code, .. }
            | Self::Authorization { code, .. }
            | Self::Validation { code, .. }
            | Self::NotFound { code, .. }
            | Self::Conflict { code, .. }
            | Self::RateLimit { code, .. }
            | Self::External { code, .. }
            | Self::Database { code, .. }
            | Self::Internal { code, .. }
            | Self::NotImplemented { code, .. } => code,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication { .. } => ErrorCategory::Authentication,
            Self::Authorization { .. } => ErrorCategory::Authorization,
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::RateLimit { .. } => ErrorCategory::RateLimit,
            Self::External { .. } => ErrorCategory::ExternalService,
            Self::Database { .. } => ErrorCategory::Database,
            Self::Internal { .. } => ErrorCategory::Internal,
            Self::NotImplemented { .. } => ErrorCategory::NotImplemented,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Validation { .. } | Self::NotFound { .. } | Self::RateLimit { .. } => {
                ErrorSeverity::Low
            }
            Self::Authentication { .. } | Self::Authorization { .. } | Self::Conflict { .. } => {
                ErrorSeverity::Medium
            }
            Self::External { .. } | Self::Database { .. } => ErrorSeverity::High,
            Self::Internal { .. } | Self::NotImplemented { .. } => ErrorSeverity::Critical,
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Authentication { .. } => StatusCode::UNAUTHORIZED,
            Self::Authorization { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::External { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database { .. } | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotImplemented { .. } => StatusCode::NOT_IMPLEMENTED,
        }
    }

    fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimit { retry_after, .. } | Self::External { retry_after, .. } => {
                *retry_after
            }
            _ => None,
        }
    }
}

/// The wire envelope returned for every error response.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error_code: &'static str,
    pub message: String,
    pub severity: ErrorSeverity,
    pub category: ErrorCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        if matches!(self.severity(), ErrorSeverity::High | ErrorSeverity::Critical) {
            tracing::error!(error_code = self.code(), "{self}");
        } else {
            tracing::warn!(error_code = self.code(), "{self}");
        }
        let envelope = ErrorEnvelope {
            error_code: self.code(),
            message: self.to_string(),
            severity: self.severity(),
            category: self.category(),
            retry_after: self.retry_after(),
        };
        (status, axum::Json(envelope)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        // Integrity violations are translated into a user-facing message
        // that names the referenced table where derivable; everything
        // else maps to a generic database error, never leaking the raw
        // driver error text to the client log-free.
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return ApiError::conflict(format!(
                    "a conflicting row already exists: {}",
                    db_err.constraint().unwrap_or("unique constraint")
                ));
            }
            if db_err.is_foreign_key_violation() {
                return ApiError::validation(format!(
                    "referenced row does not exist: {}",
                    db_err.constraint().unwrap_or("foreign key constraint")
                ));
            }
        }
        tracing::error!("database error: {err}");
        Self::Database {
            code: "DB_001",
            message: "a database error occurred".to_string(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("serialization error: {err}"))
    }
}

impl From<jsonwebtoken::errors::Error> for ApiError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::invalid_token(err.to_string())
    }
}

impl From<redis::RedisError> for ApiError {
    fn from(err: redis::RedisError) -> Self {
        Self::External {
            code: "REDIS_001",
            message: format!("cache backend error: {err}"),
            retry_after: Some(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_spec_table() {
        assert_eq!(ApiError::authentication("x").http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").http_status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found("x").http_status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::validation("x").http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::conflict("x").http_status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::rate_limited(5).http_status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::internal("x").http_status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn deploy_001_is_a_conflict() {
        let err = ApiError::deployment_identity_violation("identity mismatch");
        assert_eq!(err.code(), "DEPLOY_001");
        assert_eq!(err.category(), ErrorCategory::Conflict);
    }

    #[test]
    fn rate_limit_carries_retry_after() {
        let err = ApiError::rate_limited(30);
        assert_eq!(err.retry_after(), Some(30));
    }
}
