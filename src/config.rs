//! Service configuration.
//!
//! Loaded from a TOML file (every field optional) and then overridden by
//! environment variables:
//!
//! - `EMPLOYEE_AUTH_JWT_SECRET`: token signing secret
//! - `EMPLOYEE_AUTH_DB_PATH`: SQLite database path
//! - `EMPLOYEE_AUTH_HOST`, `EMPLOYEE_AUTH_PORT`: bind address
//!
//! ```toml
//! [gateway]
//! host = "127.0.0.1"
//! port = 8000
//! token_header = "x-token"
//!
//! [auth]
//! jwt_secret = "change-me"
//! jwt_algorithm = "HS256"
//! token_ttl_secs = 1800
//!
//! [storage]
//! db_path = "employee_auth.db"
//! ```

use anyhow::{bail, Context, Result};
use axum::http::HeaderName;
use jsonwebtoken::Algorithm;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "employee-auth.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Request header carrying the bearer token.
    pub token_header: String,
    pub request_timeout_secs: u64,
    pub max_body_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            token_header: "x-token".into(),
            request_timeout_secs: 30,
            max_body_bytes: 65_536,
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_algorithm: String,
    /// Lifetime of issued tokens and their sessions.
    pub token_ttl_secs: u64,
    /// Interval of the background expired-session sweep. 0 disables it.
    pub sweep_interval_secs: u64,
    pub password_hash_iterations: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_algorithm: "HS256".into(),
            token_ttl_secs: 1800,
            sweep_interval_secs: 300,
            password_hash_iterations: crate::auth::password::DEFAULT_HASH_ITERATIONS,
        }
    }
}

// Keep the secret out of logs.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &if self.jwt_secret.is_empty() { "<unset>" } else { "<redacted>" })
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("sweep_interval_secs", &self.sweep_interval_secs)
            .field("password_hash_iterations", &self.password_hash_iterations)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("employee_auth.db"),
        }
    }
}

impl Config {
    /// Load from `path`, or from [`DEFAULT_CONFIG_FILE`] when present, then
    /// apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply overrides from a variable lookup. Environment takes priority over file.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(secret) = lookup("EMPLOYEE_AUTH_JWT_SECRET") {
            let secret = secret.trim();
            if !secret.is_empty() {
                self.auth.jwt_secret = secret.to_owned();
            }
        }
        if let Some(path) = lookup("EMPLOYEE_AUTH_DB_PATH").filter(|p| !p.trim().is_empty()) {
            self.storage.db_path = PathBuf::from(path.trim());
        }
        if let Some(host) = lookup("EMPLOYEE_AUTH_HOST").filter(|h| !h.trim().is_empty()) {
            self.gateway.host = host.trim().to_owned();
        }
        if let Some(port) = lookup("EMPLOYEE_AUTH_PORT") {
            self.gateway.port = port
                .trim()
                .parse()
                .with_context(|| format!("EMPLOYEE_AUTH_PORT: '{port}' is not a valid port number"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() {
            bail!("auth.jwt_secret is empty; set it in the config file or EMPLOYEE_AUTH_JWT_SECRET");
        }
        self.jwt_algorithm()?;
        if self.auth.token_ttl_secs == 0 {
            bail!("auth.token_ttl_secs must be greater than 0");
        }
        if self.auth.password_hash_iterations == 0 {
            bail!("auth.password_hash_iterations must be greater than 0");
        }
        self.token_header()?;
        if self.gateway.request_timeout_secs == 0 {
            bail!("gateway.request_timeout_secs must be greater than 0");
        }
        Ok(())
    }

    /// Parsed signing algorithm. Only the HMAC family is accepted.
    pub fn jwt_algorithm(&self) -> Result<Algorithm> {
        let name = self.auth.jwt_algorithm.trim().to_ascii_uppercase();
        let algorithm = Algorithm::from_str(&name)
            .map_err(|_| anyhow::anyhow!("auth.jwt_algorithm: unknown algorithm '{name}'"))?;
        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
            other => bail!("auth.jwt_algorithm: {other:?} needs a key pair; use HS256, HS384 or HS512"),
        }
    }

    pub fn token_header(&self) -> Result<HeaderName> {
        HeaderName::try_from(self.gateway.token_header.trim().to_ascii_lowercase())
            .with_context(|| format!("gateway.token_header: '{}' is not a valid header name", self.gateway.token_header))
    }
}
