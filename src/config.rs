//! Service configuration loaded from environment variables.
//!
//! ## Required
//! - `DATABASE_URL` - PostgreSQL connection string
//!
//! ## Optional
//! - `HOST` - bind address (default: 0.0.0.0)
//! - `PORT` - listen port (default: 8083)
//! - `DATABASE_MAX_CONNECTIONS` - pool size (default: 10)
//! - `NATS_URL` - event bus; events are only logged when unset
//! - `ACCOUNT_HEADER` - header set by the auth gateway (default: x-account-id)
//! - `ADMIN_TOKEN` - bearer token for `/api/v1/admin`; admin routes are closed when unset
//! - `SESSION_SECURE_COOKIE` - mark the session cookie `Secure` (default: false)

use std::net::{IpAddr, SocketAddr};

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_ADMIN_TOKEN_LENGTH: usize = 32;

const PLACEHOLDER_PATTERNS: &[&str] = &["changeme", "replace", "placeholder", "example", "your-", "xxx", "todo"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: SecretString,
    pub host: IpAddr,
    pub port: u16,
    pub max_connections: u32,
    pub nats_url: Option<String>,
    pub account_header: String,
    pub admin_token: Option<SecretString>,
    pub secure_cookie: bool,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &"[REDACTED]")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("max_connections", &self.max_connections)
            .field("nats_url", &self.nats_url)
            .field("account_header", &self.account_header)
            .field("admin_token", &self.admin_token.as_ref().map(|_| "[REDACTED]"))
            .field("secure_cookie", &self.secure_cookie)
            .finish()
    }
}

impl AppConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let database_url = SecretString::from(env.required("DATABASE_URL")?);
        let host = env.parsed("HOST", "0.0.0.0")?;
        let port = env.parsed("PORT", "8083")?;
        let max_connections = env.parsed("DATABASE_MAX_CONNECTIONS", "10")?;
        let nats_url = env.optional("NATS_URL");
        let account_header = env.or_default("ACCOUNT_HEADER", "x-account-id").to_ascii_lowercase();
        axum::http::HeaderName::from_bytes(account_header.as_bytes())
            .map_err(|e| ConfigError::InvalidEnvVar("ACCOUNT_HEADER".to_string(), e.to_string()))?;
        let admin_token = match env.optional("ADMIN_TOKEN") {
            Some(token) => Some(validate_admin_token(SecretString::from(token))?),
            None => None,
        };
        let secure_cookie = env.parsed("SESSION_SECURE_COOKIE", "false")?;

        Ok(Self { database_url, host, port, max_connections, nats_url, account_header, admin_token, secure_cookie })
    }

    pub fn socket_addr(&self) -> SocketAddr { SocketAddr::new(self.host, self.port) }
}

struct Env<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn optional(&self, key: &str) -> Option<String> { (self.0)(key).filter(|v| !v.trim().is_empty()) }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn or_default(&self, key: &str, default: &str) -> String { self.optional(key).unwrap_or_else(|| default.to_string()) }

    fn parsed<T>(&self, key: &str, default: &str) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.or_default(key, default)
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }
}

fn validate_admin_token(token: SecretString) -> Result<SecretString, ConfigError> {
    let value = token.expose_secret();
    if value.len() < MIN_ADMIN_TOKEN_LENGTH {
        return Err(ConfigError::InsecureSecret(
            "ADMIN_TOKEN".to_string(),
            format!("must be at least {MIN_ADMIN_TOKEN_LENGTH} characters (got {})", value.len()),
        ));
    }
    let lower = value.to_lowercase();
    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            "ADMIN_TOKEN".to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const TOKEN: &str = "k3J9xQ2mZ7vB1nR8tY4wL6pA0sD5fG3h";

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/shop")]).unwrap();
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8083");
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.account_header, "x-account-id");
        assert!(config.admin_token.is_none());
        assert!(config.nats_url.is_none());
        assert!(!config.secure_cookie);
    }

    #[test]
    fn test_missing_database_url() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingEnvVar(k)) if k == "DATABASE_URL"));
    }

    #[test]
    fn test_invalid_port() {
        let err = load(&[("DATABASE_URL", "postgres://x"), ("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(k, _) if k == "PORT"));
    }

    #[test]
    fn test_admin_token_validation() {
        let short = load(&[("DATABASE_URL", "postgres://x"), ("ADMIN_TOKEN", "short")]).unwrap_err();
        assert!(matches!(short, ConfigError::InsecureSecret(..)));

        let placeholder =
            load(&[("DATABASE_URL", "postgres://x"), ("ADMIN_TOKEN", "changeme-changeme-changeme-changeme")]).unwrap_err();
        assert!(matches!(placeholder, ConfigError::InsecureSecret(..)));

        let ok = load(&[("DATABASE_URL", "postgres://x"), ("ADMIN_TOKEN", TOKEN)]).unwrap();
        assert_eq!(ok.admin_token.unwrap().expose_secret(), TOKEN);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = load(&[("DATABASE_URL", "postgres://user:hunter2@db/shop"), ("ADMIN_TOKEN", TOKEN)]).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains(TOKEN));
    }
}
