use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub db_max_connections: u32,

    // Rate limiting
    pub rate_login_per_min: u32,

    /// Honour X-Real-IP / X-Forwarded-For. Only safe behind a proxy that overwrites them.
    pub trust_proxy_headers: bool,
    pub cookie_secure: bool,

    /// Base URL encoded into location QR codes
    pub public_base_url: String,
    pub log_dir: String,
}

/// Off unless a reverse proxy overwrites X-Real-IP / X-Forwarded-For; otherwise
/// clients could pick the address the allow-list sees.
const TRUST_PROXY_HEADERS_DEFAULT: bool = false;

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn parsed_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl: parsed_or("ACCESS_TOKEN_TTL", 43_200)?, // default 12h, one shift
            db_max_connections: parsed_or("DB_MAX_CONNECTIONS", 10)?,

            rate_login_per_min: parsed_or("RATE_LOGIN_PER_MIN", 60)?,

            trust_proxy_headers: parsed_or("TRUST_PROXY_HEADERS", TRUST_PROXY_HEADERS_DEFAULT)?,
            cookie_secure: parsed_or("COOKIE_SECURE", false)?,

            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string())
                .trim_end_matches('/')
                .to_string(),
            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
        })
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            database_url: "mysql://localhost/timeclock_test".to_string(),
            jwt_secret: "test-secret".to_string(),
            server_addr: "127.0.0.1:0".to_string(),
            access_token_ttl: 900,
            db_max_connections: 1,
            rate_login_per_min: 60,
            trust_proxy_headers: true,
            cookie_secure: false,
            public_base_url: "https://clock.example.com".to_string(),
            log_dir: "logs".to_string(),
        }
    }
}
