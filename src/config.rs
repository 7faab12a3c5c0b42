use std::{net::SocketAddr, path::PathBuf};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
    /// When set, `/auth/refresh` rejects access-kind tokens.
    pub refresh_requires_refresh_kind: bool,
}

/// Argon2 cost parameters. `None` keeps the argon2 crate default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PasswordConfig {
    pub memory_kib: Option<u32>,
    pub iterations: Option<u32>,
    pub parallelism: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenTtlConfig {
    pub password_reset_minutes: i64,
    pub email_verification_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub secret_key: String,
    pub base_url: String,
    pub currency: String,
    pub callback_url: String,
    pub return_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HasuraConfig {
    pub endpoint: String,
    pub admin_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub max_bytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
    pub tokens: TokenTtlConfig,
    pub payment: PaymentConfig,
    pub hasura: HasuraConfig,
    pub uploads: UploadConfig,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            issuer: env_or("JWT_ISSUER", "recipehub"),
            audience: env_or("JWT_AUDIENCE", "recipehub-users"),
            ttl_minutes: env_parse("JWT_TTL_MINUTES").unwrap_or(60),
            refresh_ttl_minutes: env_parse("JWT_REFRESH_TTL_MINUTES").unwrap_or(60 * 24 * 7),
            refresh_requires_refresh_kind: env_parse("JWT_REFRESH_REQUIRES_REFRESH_KIND")
                .unwrap_or(true),
        };
        let password = PasswordConfig {
            memory_kib: env_parse("ARGON2_MEMORY_KIB"),
            iterations: env_parse("ARGON2_ITERATIONS"),
            parallelism: env_parse("ARGON2_PARALLELISM"),
        };
        let tokens = TokenTtlConfig {
            password_reset_minutes: env_parse("PASSWORD_RESET_TTL_MINUTES").unwrap_or(60),
            email_verification_hours: env_parse("EMAIL_VERIFICATION_TTL_HOURS").unwrap_or(24),
        };
        let payment = PaymentConfig {
            secret_key: std::env::var("CHAPA_SECRET_KEY").context("CHAPA_SECRET_KEY is not set")?,
            base_url: env_or("CHAPA_BASE_URL", "https://api.chapa.co/v1"),
            currency: env_or("PAYMENT_CURRENCY", "ETB"),
            callback_url: env_or(
                "PAYMENT_CALLBACK_URL",
                "http://localhost:8000/payment/webhook",
            ),
            return_url: env_or("PAYMENT_RETURN_URL", "http://localhost:3000/payment/success"),
            timeout_secs: env_parse("PAYMENT_HTTP_TIMEOUT_SECS").unwrap_or(15),
        };
        let hasura = HasuraConfig {
            endpoint: std::env::var("HASURA_ENDPOINT").context("HASURA_ENDPOINT is not set")?,
            admin_secret: env_or("HASURA_ADMIN_SECRET", ""),
        };
        let uploads = UploadConfig {
            dir: PathBuf::from(env_or("UPLOAD_DIR", "./uploads")),
            max_bytes: env_parse("UPLOAD_MAX_BYTES").unwrap_or(10 * 1024 * 1024),
        };
        Ok(Self {
            host: env_or("APP_HOST", "0.0.0.0"),
            port: env_parse("APP_PORT").unwrap_or(8000),
            database_url,
            database_max_connections: env_parse("DATABASE_MAX_CONNECTIONS").unwrap_or(10),
            jwt,
            password,
            tokens,
            payment,
            hasura,
            uploads,
        })
    }

    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}
