//! Environment-backed configuration.
//!
//! Loaded with explicit `std::env::var` reads and defaults, the way
//! `mockforge-collab::config::CollabConfig::from_env` does it rather than
//! through a generic layered config loader — this process has one
//! environment, read once at startup.

use std::time::Duration;

/// All environment variables recognized by the control plane.
#[derive(Debug, Clone)]
pub struct ComputorConfig {
    pub postgres_host: String,
    pub postgres_port: u16,
    pub postgres_user: String,
    pub postgres_password: String,
    pub postgres_db: String,

    pub redis_host: String,
    pub redis_port: u16,
    pub redis_password: Option<String>,

    pub minio_endpoint: String,
    pub minio_access_key: String,
    pub minio_secret_key: String,
    pub minio_secure: bool,

    pub temporal_host: String,
    pub temporal_port: u16,
    pub temporal_namespace: String,

    pub api_admin_user: String,
    pub api_local_storage_dir: String,

    pub ws_max_total_connections: usize,
    pub ws_max_connections_per_user: usize,
    pub ws_presence_ttl: Duration,
    pub ws_send_timeout: Duration,

    pub auth_cache_ttl: Duration,

    pub bind_address: String,
    pub jwt_secret: String,
    pub log_json: bool,
}

impl Default for ComputorConfig {
    fn default() -> Self {
        Self {
            postgres_host: "localhost".to_string(),
            postgres_port: 5432,
            postgres_user: "computor".to_string(),
            postgres_password: String::new(),
            postgres_db: "computor".to_string(),

            redis_host: "localhost".to_string(),
            redis_port: 6379,
            redis_password: None,

            minio_endpoint: "localhost:9000".to_string(),
            minio_access_key: String::new(),
            minio_secret_key: String::new(),
            minio_secure: false,

            temporal_host: "localhost".to_string(),
            temporal_port: 7233,
            temporal_namespace: "default".to_string(),

            api_admin_user: "admin".to_string(),
            api_local_storage_dir: "/tmp/computor-storage".to_string(),

            ws_max_total_connections: 10_000,
            ws_max_connections_per_user: 8,
            ws_presence_ttl: Duration::from_secs(60),
            ws_send_timeout: Duration::from_secs(5),

            auth_cache_ttl: Duration::from_secs(10),

            bind_address: "0.0.0.0:8000".to_string(),
            jwt_secret: "change-me".to_string(),
            log_json: false,
        }
    }
}

impl ComputorConfig {
    /// Loads `.env` (if present) then overlays recognized environment
    /// variables on top of [`Default`].
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Self {
            postgres_host: env_or("POSTGRES_HOST", defaults.postgres_host),
            postgres_port: env_parsed("POSTGRES_PORT", defaults.postgres_port),
            postgres_user: env_or("POSTGRES_USER", defaults.postgres_user),
            postgres_password: env_or("POSTGRES_PASSWORD", defaults.postgres_password),
            postgres_db: env_or("POSTGRES_DB", defaults.postgres_db),

            redis_host: env_or("REDIS_HOST", defaults.redis_host),
            redis_port: env_parsed("REDIS_PORT", defaults.redis_port),
            redis_password: std::env::var("REDIS_PASSWORD").ok(),

            minio_endpoint: env_or("MINIO_ENDPOINT", defaults.minio_endpoint),
            minio_access_key: env_or("MINIO_ACCESS_KEY", defaults.minio_access_key),
            minio_secret_key: env_or("MINIO_SECRET_KEY", defaults.minio_secret_key),
            minio_secure: env_bool("MINIO_SECURE", defaults.minio_secure),

            temporal_host: env_or("TEMPORAL_HOST", defaults.temporal_host),
            temporal_port: env_parsed("TEMPORAL_PORT", defaults.temporal_port),
            temporal_namespace: env_or("TEMPORAL_NAMESPACE", defaults.temporal_namespace),

            api_admin_user: env_or("API_ADMIN_USER", defaults.api_admin_user),
            api_local_storage_dir: env_or("API_LOCAL_STORAGE_DIR", defaults.api_local_storage_dir),

            ws_max_total_connections: env_parsed(
                "WS_MAX_TOTAL_CONNECTIONS",
                defaults.ws_max_total_connections,
            ),
            ws_max_connections_per_user: env_parsed(
                "WS_MAX_CONNECTIONS_PER_USER",
                defaults.ws_max_connections_per_user,
            ),
            ws_presence_ttl: Duration::from_secs(env_parsed(
                "WS_PRESENCE_TTL",
                defaults.ws_presence_ttl.as_secs(),
            )),
            ws_send_timeout: Duration::from_secs(env_parsed(
                "WS_SEND_TIMEOUT",
                defaults.ws_send_timeout.as_secs(),
            )),

            auth_cache_ttl: Duration::from_secs(env_parsed(
                "AUTH_CACHE_TTL",
                defaults.auth_cache_ttl.as_secs(),
            )),

            bind_address: env_or("COMPUTOR_BIND_ADDRESS", defaults.bind_address),
            jwt_secret: env_or("COMPUTOR_JWT_SECRET", defaults.jwt_secret),
            log_json: env_bool("COMPUTOR_LOG_JSON", defaults.log_json),
        }
    }

    pub fn postgres_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.postgres_user, self.postgres_password, self.postgres_host, self.postgres_port, self.postgres_db
        )
    }

    pub fn redis_url(&self) -> String {
        match &self.redis_password {
            Some(pass) => format!("redis://:{pass}@{}:{}", self.redis_host, self.redis_port),
            None => format!("redis://{}:{}", self.redis_host, self.redis_port),
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"),
        Err(_) => default,
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let cfg = ComputorConfig::default();
        assert_eq!(cfg.ws_max_connections_per_user, 8);
        assert!(cfg.postgres_url().starts_with("postgres://"));
    }
}
