//! Configuration loading from environment variables.

use std::net::SocketAddr;
use std::str::FromStr;

use chrono::Duration;
use thiserror::Error;
use tracing::warn;

use gatekeeper_auth::{AuthPolicy, BcryptHasher, Hs256TokenManager};

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be set{context}")]
    Missing { var: &'static str, context: &'static str },

    #[error("invalid {var}='{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Process settings, read once at startup.
#[derive(Clone)]
pub struct Settings {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub token_ttl_secs: i64,
    pub bcrypt_cost: u32,
    pub lockout_threshold: u32,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub seed_admin_password: Option<String>,
}

impl core::fmt::Debug for Settings {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Settings")
            .field("bind_addr", &self.bind_addr)
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("lockout_threshold", &self.lockout_threshold)
            .field("use_persistent_stores", &self.use_persistent_stores)
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .field("seed_admin_password", &self.seed_admin_password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl_secs: Hs256TokenManager::DEFAULT_TTL_SECS,
            bcrypt_cost: BcryptHasher::DEFAULT_COST,
            lockout_threshold: AuthPolicy::DEFAULT_LOCKOUT_THRESHOLD,
            use_persistent_stores: false,
            database_url: None,
            seed_admin_password: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let jwt_secret = match lookup("JWT_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => secret,
            None => {
                warn!("JWT_SECRET not set; using insecure dev default");
                defaults.jwt_secret
            }
        };

        let bcrypt_cost = parse_or(&lookup, "BCRYPT_COST", defaults.bcrypt_cost)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid {
                var: "BCRYPT_COST",
                value: bcrypt_cost.to_string(),
                reason: "must be within 4..=31".to_string(),
            });
        }

        let token_ttl_secs = parse_or(&lookup, "TOKEN_TTL_SECS", defaults.token_ttl_secs)?;
        if token_ttl_secs <= 0 {
            return Err(ConfigError::Invalid {
                var: "TOKEN_TTL_SECS",
                value: token_ttl_secs.to_string(),
                reason: "must be positive".to_string(),
            });
        }

        let lockout_threshold = parse_or(&lookup, "LOCKOUT_THRESHOLD", defaults.lockout_threshold)?;
        if lockout_threshold == 0 {
            return Err(ConfigError::Invalid {
                var: "LOCKOUT_THRESHOLD",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let use_persistent_stores =
            parse_or(&lookup, "USE_PERSISTENT_STORES", defaults.use_persistent_stores)?;
        let database_url = lookup("DATABASE_URL").filter(|s| !s.is_empty());
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::Missing {
                var: "DATABASE_URL",
                context: " when USE_PERSISTENT_STORES=true",
            });
        }

        Ok(Self {
            bind_addr: parse_or(&lookup, "BIND_ADDR", defaults.bind_addr)?,
            jwt_secret,
            token_ttl_secs,
            bcrypt_cost,
            lockout_threshold,
            use_persistent_stores,
            database_url,
            seed_admin_password: lookup("SEED_ADMIN_PASSWORD").filter(|s| !s.is_empty()),
        })
    }

    pub fn auth_policy(&self) -> AuthPolicy {
        AuthPolicy {
            lockout_threshold: self.lockout_threshold,
            token_ttl: Duration::seconds(self.token_ttl_secs),
            bcrypt_cost: self.bcrypt_cost,
        }
    }
}

fn parse_or<T, F>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(s.token_ttl_secs, 3600);
        assert_eq!(s.bcrypt_cost, 10);
        assert_eq!(s.lockout_threshold, 5);
        assert!(!s.use_persistent_stores);
        assert_eq!(s.auth_policy(), AuthPolicy::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let s = settings(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("JWT_SECRET", "s3cret"),
            ("TOKEN_TTL_SECS", "60"),
            ("BCRYPT_COST", "4"),
            ("LOCKOUT_THRESHOLD", "3"),
        ])
        .unwrap();
        assert_eq!(s.bind_addr.port(), 9000);
        assert_eq!(s.jwt_secret, "s3cret");
        assert_eq!(s.auth_policy().token_ttl, Duration::seconds(60));
        assert_eq!(s.auth_policy().lockout_threshold, 3);
    }

    #[test]
    fn malformed_values_fail() {
        assert!(matches!(
            settings(&[("TOKEN_TTL_SECS", "soon")]),
            Err(ConfigError::Invalid { var: "TOKEN_TTL_SECS", .. })
        ));
        assert!(matches!(
            settings(&[("BCRYPT_COST", "3")]),
            Err(ConfigError::Invalid { var: "BCRYPT_COST", .. })
        ));
        assert!(matches!(
            settings(&[("LOCKOUT_THRESHOLD", "0")]),
            Err(ConfigError::Invalid { var: "LOCKOUT_THRESHOLD", .. })
        ));
    }

    #[test]
    fn persistent_mode_requires_database_url() {
        assert_eq!(
            settings(&[("USE_PERSISTENT_STORES", "true")]).unwrap_err(),
            ConfigError::Missing {
                var: "DATABASE_URL",
                context: " when USE_PERSISTENT_STORES=true",
            }
        );
    }

    #[test]
    fn debug_redacts_secrets() {
        let s = settings(&[("JWT_SECRET", "hunter2")]).unwrap();
        assert!(!format!("{s:?}").contains("hunter2"));
    }
}
