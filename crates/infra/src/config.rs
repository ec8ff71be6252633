//! Process configuration read from environment variables.
//!
//! | variable | default |
//! |---|---|
//! | `BIND_ADDR` | `0.0.0.0:3000` |
//! | `JWT_SECRET` | `dev-secret` (warns) |
//! | `PASSWORD_PEPPER` | `musicflow-dev-pepper` (warns) |
//! | `ARGON2_MEMORY_KIB` | `19456` |
//! | `ARGON2_ITERATIONS` | `2` |
//! | `DATABASE_URL` | unset: in-memory store |

use std::net::SocketAddr;

use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEV_JWT_SECRET: &str = "dev-secret";
pub const DEV_PASSWORD_PEPPER: &str = "musicflow-dev-pepper";
pub const DEFAULT_ARGON2_MEMORY_KIB: u32 = 19_456;
pub const DEFAULT_ARGON2_ITERATIONS: u32 = 2;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is not valid: {message}")]
    Invalid { var: &'static str, message: String },

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub password_pepper: String,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub database_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                var: "BIND_ADDR",
                message: e.to_string(),
            })?;

        let jwt_secret = secret(&lookup, "JWT_SECRET", DEV_JWT_SECRET)?;
        let password_pepper = secret(&lookup, "PASSWORD_PEPPER", DEV_PASSWORD_PEPPER)?;

        let argon2_memory_kib = number(&lookup, "ARGON2_MEMORY_KIB", DEFAULT_ARGON2_MEMORY_KIB)?;
        let argon2_iterations = number(&lookup, "ARGON2_ITERATIONS", DEFAULT_ARGON2_ITERATIONS)?;

        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());

        Ok(Self {
            bind_addr,
            jwt_secret,
            password_pepper,
            argon2_memory_kib,
            argon2_iterations,
            database_url,
        })
    }

    /// Defaults for tests and local runs: ephemeral port and cheap hashing.
    pub fn for_tests() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            password_pepper: DEV_PASSWORD_PEPPER.to_string(),
            argon2_memory_kib: 1024,
            argon2_iterations: 1,
            database_url: None,
        }
    }
}

impl core::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("jwt_secret", &"<redacted>")
            .field("password_pepper", &"<redacted>")
            .field("argon2_memory_kib", &self.argon2_memory_kib)
            .field("argon2_iterations", &self.argon2_iterations)
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn secret(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    dev_default: &str,
) -> Result<String, ConfigError> {
    match lookup(var) {
        Some(v) if v.is_empty() => Err(ConfigError::Empty(var)),
        Some(v) => Ok(v),
        None => {
            tracing::warn!("{var} not set; using insecure dev default");
            Ok(dev_default.to_string())
        }
    }
}

fn number(lookup: &impl Fn(&str) -> Option<String>, var: &'static str, default: u32) -> Result<u32, ConfigError> {
    match lookup(var) {
        Some(v) => v.trim().parse::<u32>().map_err(|e| ConfigError::Invalid {
            var,
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}
