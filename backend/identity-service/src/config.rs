//! Configuration management for Identity Service
//!
//! Loads settings from:
//! 1. Environment variables
//! 2. .env file (local development)
//!
//! # Example
//!
//! ```no_run
//! use identity_service::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     println!("JWT issuer: {}", settings.jwt.issuer);
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use crypto_core::jwt::TokenIssuer;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub jwt: JwtSettings,
    pub rbac: RbacSettings,
    pub server: ServerSettings,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self> {
        // Load .env file in development
        if cfg!(debug_assertions) && dotenvy::dotenv().is_ok() {
            info!("Loaded .env file for development");
        }

        Self::from_env()
    }

    /// Read the current process environment without consulting `.env`
    pub fn from_env() -> Result<Self> {
        Ok(Settings {
            database: DatabaseSettings::from_env()?,
            redis: RedisSettings::from_env(),
            jwt: JwtSettings::from_env()?,
            rbac: RbacSettings::from_env(),
            server: ServerSettings::from_env()?,
        })
    }
}

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection
    pub acquire_timeout: u64,
}

impl DatabaseSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 20)?,
            acquire_timeout: parse_env("DATABASE_ACQUIRE_TIMEOUT", 5)?,
        })
    }
}

/// Redis cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    pub url: String,
}

impl RedisSettings {
    fn from_env() -> Self {
        Self {
            url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
        }
    }
}

/// Where an RSA key comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeySource {
    Pem(String),
    File(String),
}

impl KeySource {
    fn from_env(pem_var: &str, path_var: &str) -> Option<Self> {
        env::var(pem_var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(KeySource::Pem)
            .or_else(|| env::var(path_var).ok().map(KeySource::File))
    }

    fn read(&self) -> Result<Vec<u8>> {
        match self {
            KeySource::Pem(pem) => Ok(pem.replace("\\n", "\n").into_bytes()),
            KeySource::File(path) => {
                std::fs::read(path).with_context(|| format!("Failed to read key file {}", path))
            }
        }
    }
}

/// JWT authentication settings
#[derive(Clone, Serialize, Deserialize)]
pub struct JwtSettings {
    pub private_key: Option<KeySource>,
    pub public_key: KeySource,
    pub issuer: String,
    pub audience: Vec<String>,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
}

impl std::fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSettings")
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .finish()
    }
}

impl JwtSettings {
    fn from_env() -> Result<Self> {
        let public_key = KeySource::from_env("JWT_PUBLIC_KEY", "JWT_PUBLIC_KEY_PATH")
            .context("JWT_PUBLIC_KEY or JWT_PUBLIC_KEY_PATH must be set")?;
        let private_key = KeySource::from_env("JWT_PRIVATE_KEY", "JWT_PRIVATE_KEY_PATH");
        if private_key.is_none() {
            warn!("No JWT private key configured; tokens can be validated but not issued");
        }

        let audience_str = env::var("JWT_AUDIENCE").unwrap_or_else(|_| "api".to_string());
        let audience = audience_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            private_key,
            public_key,
            issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "identity-service".to_string()),
            audience,
            access_ttl_secs: parse_env("JWT_ACCESS_TTL_SECS", 900)?,
            refresh_ttl_secs: parse_env("JWT_REFRESH_TTL_SECS", 604_800)?,
        })
    }

    /// Build the token issuer; verification-only when no private key is configured
    pub fn build_issuer(&self) -> Result<TokenIssuer> {
        let public_pem = self.public_key.read()?;
        let issuer = match &self.private_key {
            Some(private) => {
                let private_pem = private.read()?;
                TokenIssuer::new(&private_pem, &public_pem, &self.issuer, self.audience.clone())
            }
            None => TokenIssuer::verification_only(&public_pem, &self.issuer, self.audience.clone()),
        }
        .context("Failed to build JWT issuer")?;

        Ok(issuer.with_ttls(
            chrono::Duration::seconds(self.access_ttl_secs),
            chrono::Duration::seconds(self.refresh_ttl_secs),
        ))
    }
}

/// Role-based access control settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RbacSettings {
    pub default_role: String,
}

impl RbacSettings {
    fn from_env() -> Self {
        Self {
            default_role: env::var("RBAC_DEFAULT_ROLE").unwrap_or_else(|_| "customer".to_string()),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub admin_grpc_port: u16,
    pub operation_timeout_secs: u64,
}

impl ServerSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            admin_grpc_port: parse_env("ADMIN_GRPC_PORT", 50051)?,
            operation_timeout_secs: parse_env("OPERATION_TIMEOUT_SECS", 5)?,
        })
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", name)),
        Err(_) => Ok(default),
    }
}
