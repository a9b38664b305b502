//! Configuration for the adaptive assessment core.

use serde::Deserialize;
use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingVar(String),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Application configuration loaded once at startup from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Address to bind the HTTP server to.
    pub bind_address: String,
    /// Minutes of inactivity before an IN_PROGRESS session is eligible for expiry.
    pub session_ttl_minutes: i64,
    /// Interval, in seconds, between background `expireStaleSessions` sweeps.
    pub expiry_scan_interval_s: u64,
    /// Default wall-clock deadline for a single HTTP request, in milliseconds.
    pub default_request_deadline_ms: u64,
    /// Number of quadrature points the IRT kernel integrates EAP over.
    pub quadrature_size: u32,
    /// Number of equally-informative top candidates considered for randomesque selection.
    pub top_k_selection: u32,
    /// Default IRT model tier for newly authored templates: "1pl" | "2pl" | "3pl".
    pub irt_model: String,
    /// Default number of courses recommended per weak skill.
    pub recommendation_courses_per_skill: u32,
    /// Shared key for admin-only endpoints. Empty disables them.
    pub admin_api_key: String,
}

impl AppConfig {
    /// Load configuration from environment variables, with `.env` support for local dev.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: env_var("DATABASE_URL")?,
            bind_address: env_var_or("BIND_ADDRESS", "0.0.0.0:8080"),
            session_ttl_minutes: env_var_parsed_or("SESSION_TTL_MINUTES", 120)?,
            expiry_scan_interval_s: env_var_parsed_or("EXPIRY_SCAN_INTERVAL_S", 60)?,
            default_request_deadline_ms: env_var_parsed_or("DEFAULT_REQUEST_DEADLINE_MS", 5000)?,
            quadrature_size: env_var_parsed_or("QUADRATURE_SIZE", 41)?,
            top_k_selection: env_var_parsed_or("TOP_K_SELECTION", 1)?,
            irt_model: env_var_or("IRT_MODEL", "2pl"),
            recommendation_courses_per_skill: env_var_parsed_or(
                "RECOMMENDATION_COURSES_PER_SKILL",
                2,
            )?,
            admin_api_key: env_var_or("ADMIN_API_KEY", ""),
        })
    }
}

fn env_var(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

fn env_var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_var_parsed_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_var_or_uses_default_when_unset() {
        let val = env_var_or("NON_EXISTENT_VAR_12345", "default_value");
        assert_eq!(val, "default_value");
    }

    #[test]
    fn env_var_parsed_or_uses_default_when_unset() {
        let val: u32 = env_var_parsed_or("NON_EXISTENT_VAR_67890", 41).unwrap();
        assert_eq!(val, 41);
    }

    #[test]
    fn env_var_returns_missing_var_error() {
        let err = env_var("NON_EXISTENT_VAR_ABCDE").unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(_)));
    }
}
