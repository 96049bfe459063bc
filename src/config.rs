// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the settings loaded from them
//! at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `AUTH_JWKS_URL` | JWKS endpoint of the identity provider | Required |
//! | `AUTH_ISSUER` | Expected `iss` claim | Required |
//! | `AUTH_AUDIENCE` | Expected `aud` claim (the client id) | Required |
//! | `AUTH_ROLE_CLAIM` | Claim carrying the caller's role | `custom:role` |
//! | `AUTH_EMPLOYEE_ID_CLAIM` | Claim carrying the employee id | `custom:employee_id` |
//! | `AUTH_JWKS_TIMEOUT_SECS` | JWKS fetch timeout | `10` |
//! | `AUTH_CLOCK_SKEW_SECS` | Leeway applied to `exp`/`nbf` | `0` |
//! | `AUTH_MISS_TTL_SECS` | How long an unknown `kid` is remembered | `60` |
//! | `AUTH_POLICY_FILE` | JSON file replacing the built-in route policies | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::SocketAddr;
use std::time::Duration;

use crate::auth::claims::{ClaimNames, DEFAULT_EMPLOYEE_ID_CLAIM, DEFAULT_ROLE_CLAIM};
use crate::auth::keys::{DEFAULT_FETCH_TIMEOUT, DEFAULT_MISS_TTL};
use crate::auth::VerifierSettings;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Environment variable name for the identity provider's JWKS endpoint.
///
/// Usually `<issuer>/.well-known/jwks.json`.
pub const JWKS_URL_ENV: &str = "AUTH_JWKS_URL";
pub const ISSUER_ENV: &str = "AUTH_ISSUER";
pub const AUDIENCE_ENV: &str = "AUTH_AUDIENCE";
pub const ROLE_CLAIM_ENV: &str = "AUTH_ROLE_CLAIM";
pub const EMPLOYEE_ID_CLAIM_ENV: &str = "AUTH_EMPLOYEE_ID_CLAIM";
pub const JWKS_TIMEOUT_ENV: &str = "AUTH_JWKS_TIMEOUT_SECS";

/// Seconds of clock skew tolerated on `exp` and `nbf`.
///
/// # Default
/// `0`: a token whose `exp` is in the past is rejected.
pub const CLOCK_SKEW_ENV: &str = "AUTH_CLOCK_SKEW_SECS";
pub const MISS_TTL_ENV: &str = "AUTH_MISS_TTL_SECS";
pub const POLICY_FILE_ENV: &str = "AUTH_POLICY_FILE";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Everything the server needs at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind: SocketAddr,
    pub log_format: LogFormat,
    pub auth: AuthSettings,
    pub policy_file: Option<String>,
}

/// Token verification settings.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwks_url: String,
    pub issuer: String,
    pub audience: String,
    pub claim_names: ClaimNames,
    pub fetch_timeout: Duration,
    pub clock_skew_secs: u64,
    pub miss_ttl: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings through `lookup`, which returns a variable's value if set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port: u16 = parse_or(&lookup, PORT_ENV, DEFAULT_PORT)?;
        let bind = format!("{host}:{port}")
            .parse()
            .map_err(|_| ConfigError::Invalid {
                name: HOST_ENV,
                value: host,
            })?;

        let log_format = match lookup(LOG_FORMAT_ENV).as_deref() {
            Some("json") => LogFormat::Json,
            Some("pretty") | None => LogFormat::Pretty,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: LOG_FORMAT_ENV,
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            bind,
            log_format,
            auth: AuthSettings::from_lookup(&lookup)?,
            policy_file: lookup(POLICY_FILE_ENV).filter(|path| !path.is_empty()),
        })
    }
}

impl AuthSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|name: &str| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let jwks_url = required(JWKS_URL_ENV)?;
        url::Url::parse(&jwks_url).map_err(|_| ConfigError::Invalid {
            name: JWKS_URL_ENV,
            value: jwks_url.clone(),
        })?;

        Ok(Self {
            jwks_url,
            issuer: required(ISSUER_ENV)?,
            audience: required(AUDIENCE_ENV)?,
            claim_names: ClaimNames {
                role: lookup(ROLE_CLAIM_ENV).unwrap_or_else(|| DEFAULT_ROLE_CLAIM.to_string()),
                employee_id: lookup(EMPLOYEE_ID_CLAIM_ENV)
                    .unwrap_or_else(|| DEFAULT_EMPLOYEE_ID_CLAIM.to_string()),
            },
            fetch_timeout: parse_or(lookup, JWKS_TIMEOUT_ENV, DEFAULT_FETCH_TIMEOUT.as_secs())
                .map(Duration::from_secs)?,
            clock_skew_secs: parse_or(lookup, CLOCK_SKEW_ENV, 0)?,
            miss_ttl: parse_or(lookup, MISS_TTL_ENV, DEFAULT_MISS_TTL.as_secs()).map(Duration::from_secs)?,
        })
    }

    pub fn verifier_settings(&self) -> VerifierSettings {
        VerifierSettings::new(&self.issuer, &self.audience)
            .with_leeway(self.clock_skew_secs)
            .with_claim_names(self.claim_names.clone())
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        (JWKS_URL_ENV, "https://issuer.example.com/.well-known/jwks.json"),
        (ISSUER_ENV, "https://issuer.example.com"),
        (AUDIENCE_ENV, "inventory-api"),
    ];

    #[test]
    fn defaults_apply() {
        let settings = Settings::from_lookup(lookup_from(&REQUIRED)).unwrap();
        assert_eq!(settings.bind, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(settings.log_format, LogFormat::Pretty);
        assert_eq!(settings.auth.claim_names.role, "custom:role");
        assert_eq!(settings.auth.claim_names.employee_id, "custom:employee_id");
        assert_eq!(settings.auth.fetch_timeout, Duration::from_secs(10));
        assert_eq!(settings.auth.clock_skew_secs, 0);
        assert_eq!(settings.auth.miss_ttl, Duration::from_secs(60));
        assert!(settings.policy_file.is_none());
    }

    #[test]
    fn overrides_apply() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            (HOST_ENV, "127.0.0.1"),
            (PORT_ENV, "9000"),
            (LOG_FORMAT_ENV, "json"),
            (ROLE_CLAIM_ENV, "roles"),
            (CLOCK_SKEW_ENV, "30"),
            (POLICY_FILE_ENV, "/etc/policies.json"),
        ]);
        let settings = Settings::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(settings.bind, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(settings.log_format, LogFormat::Json);
        assert_eq!(settings.auth.claim_names.role, "roles");
        assert_eq!(settings.auth.verifier_settings().leeway_secs, 30);
        assert_eq!(settings.policy_file.as_deref(), Some("/etc/policies.json"));
    }

    #[test]
    fn missing_required_variable() {
        let err = Settings::from_lookup(lookup_from(&REQUIRED[..2])).unwrap_err();
        assert_eq!(err, ConfigError::Missing(AUDIENCE_ENV));
    }

    #[test]
    fn invalid_values_are_reported() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push((PORT_ENV, "eighty"));
        assert!(matches!(
            Settings::from_lookup(lookup_from(&pairs)),
            Err(ConfigError::Invalid { name: PORT_ENV, .. })
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs[0] = (JWKS_URL_ENV, "not a url");
        assert!(matches!(
            Settings::from_lookup(lookup_from(&pairs)),
            Err(ConfigError::Invalid { name: JWKS_URL_ENV, .. })
        ));
    }
}
