// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names, default values and the
//! [`ServerConfig`] loaded from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory holding `messaging.redb` | `./data` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `AUTH_JWKS_URL` | JWKS endpoint for JWT verification | Unset = development mode |
//! | `AUTH_ISSUER` | Expected JWT issuer claim | Optional |
//! | `AUTH_AUDIENCE` | Expected JWT audience claim | Optional |
//! | `XMTP_NOTIFICATION_SERVER_URL` | XMTP notification service base URL | Unset = notifications disabled |
//! | `XMTP_WEBHOOK_SECRET` | HMAC secret for webhook signatures | Unset = unsigned webhooks accepted |
//! | `EXPO_PUSH_URL` | Expo push endpoint | `https://exp.host/--/api/v2/push/send` |
//! | `EXPO_ACCESS_TOKEN` | Expo access token | Optional |
//! | `TURNKEY_API_BASE_URL` | Turnkey API base URL | `https://api.turnkey.com` |
//! | `TURNKEY_ORGANIZATION_ID` | Parent organization id | Unset = Turnkey disabled |
//! | `TURNKEY_API_PUBLIC_KEY` | Compressed P-256 API public key (hex) | Required with org id |
//! | `TURNKEY_API_PRIVATE_KEY` | P-256 API private key (hex) | Required with org id |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM certificate chain and key | Unset = plain HTTP |

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::storage::DATABASE_FILE;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
pub const AUTH_JWKS_URL_ENV: &str = "AUTH_JWKS_URL";
pub const AUTH_ISSUER_ENV: &str = "AUTH_ISSUER";
pub const AUTH_AUDIENCE_ENV: &str = "AUTH_AUDIENCE";
pub const XMTP_NOTIFICATION_SERVER_URL_ENV: &str = "XMTP_NOTIFICATION_SERVER_URL";
pub const XMTP_WEBHOOK_SECRET_ENV: &str = "XMTP_WEBHOOK_SECRET";
pub const EXPO_PUSH_URL_ENV: &str = "EXPO_PUSH_URL";
pub const EXPO_ACCESS_TOKEN_ENV: &str = "EXPO_ACCESS_TOKEN";
pub const TURNKEY_API_BASE_URL_ENV: &str = "TURNKEY_API_BASE_URL";
pub const TURNKEY_ORGANIZATION_ID_ENV: &str = "TURNKEY_ORGANIZATION_ID";
pub const TURNKEY_API_PUBLIC_KEY_ENV: &str = "TURNKEY_API_PUBLIC_KEY";
pub const TURNKEY_API_PRIVATE_KEY_ENV: &str = "TURNKEY_API_PRIVATE_KEY";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";
pub const DEFAULT_EXPO_PUSH_URL: &str = "https://exp.host/--/api/v2/push/send";
pub const DEFAULT_TURNKEY_API_BASE_URL: &str = "https://api.turnkey.com";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("{present} is set but {missing} is not")]
    Incomplete {
        present: &'static str,
        missing: &'static str,
    },
}

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSettings {
    pub jwks_url: Option<String>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnkeySettings {
    pub base_url: String,
    pub organization_id: String,
    pub api_public_key: String,
    pub api_private_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Complete server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub log_format: LogFormat,
    pub auth: AuthSettings,
    pub xmtp_notification_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub expo_push_url: String,
    pub expo_access_token: Option<String>,
    pub turnkey: Option<TurnkeySettings>,
    pub tls: Option<TlsSettings>,
}

impl ServerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get(PORT_ENV) {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: PORT_ENV,
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        let log_format = match get(LOG_FORMAT_ENV).as_deref() {
            Some("json") => LogFormat::Json,
            Some("pretty") | None => LogFormat::Pretty,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: LOG_FORMAT_ENV,
                    value: other.to_string(),
                })
            }
        };

        let turnkey = match get(TURNKEY_ORGANIZATION_ID_ENV) {
            Some(organization_id) => Some(TurnkeySettings {
                base_url: get(TURNKEY_API_BASE_URL_ENV)
                    .unwrap_or_else(|| DEFAULT_TURNKEY_API_BASE_URL.to_string()),
                organization_id,
                api_public_key: get(TURNKEY_API_PUBLIC_KEY_ENV).ok_or(ConfigError::Incomplete {
                    present: TURNKEY_ORGANIZATION_ID_ENV,
                    missing: TURNKEY_API_PUBLIC_KEY_ENV,
                })?,
                api_private_key: get(TURNKEY_API_PRIVATE_KEY_ENV).ok_or(
                    ConfigError::Incomplete {
                        present: TURNKEY_ORGANIZATION_ID_ENV,
                        missing: TURNKEY_API_PRIVATE_KEY_ENV,
                    },
                )?,
            }),
            None => None,
        };

        let tls = match (get(TLS_CERT_PATH_ENV), get(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsSettings {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(ConfigError::Incomplete {
                    present: TLS_CERT_PATH_ENV,
                    missing: TLS_KEY_PATH_ENV,
                })
            }
            (None, Some(_)) => {
                return Err(ConfigError::Incomplete {
                    present: TLS_KEY_PATH_ENV,
                    missing: TLS_CERT_PATH_ENV,
                })
            }
        };

        Ok(Self {
            host: get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            data_dir: PathBuf::from(get(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())),
            log_format,
            auth: AuthSettings {
                jwks_url: get(AUTH_JWKS_URL_ENV),
                issuer: get(AUTH_ISSUER_ENV),
                audience: get(AUTH_AUDIENCE_ENV),
            },
            xmtp_notification_url: get(XMTP_NOTIFICATION_SERVER_URL_ENV),
            webhook_secret: get(XMTP_WEBHOOK_SECRET_ENV),
            expo_push_url: get(EXPO_PUSH_URL_ENV)
                .unwrap_or_else(|| DEFAULT_EXPO_PUSH_URL.to_string()),
            expo_access_token: get(EXPO_ACCESS_TOKEN_ENV),
            turnkey,
            tls,
        })
    }

    /// Socket address to bind.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse().map_err(|_| ConfigError::Invalid {
            name: HOST_ENV,
            value: raw,
        })
    }

    /// Path of the database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = load(&[]).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.expo_push_url, DEFAULT_EXPO_PUSH_URL);
        assert!(config.auth.jwks_url.is_none());
        assert!(config.turnkey.is_none());
        assert!(config.tls.is_none());
        assert_eq!(
            config.database_path(),
            PathBuf::from("./data").join("messaging.redb")
        );
        assert_eq!(config.bind_addr().unwrap().port(), 8080);
    }

    #[test]
    fn reads_values_and_ignores_blank_entries() {
        let config = load(&[
            (PORT_ENV, "9000"),
            (LOG_FORMAT_ENV, "json"),
            (AUTH_JWKS_URL_ENV, "https://auth.example.com/jwks.json"),
            (AUTH_AUDIENCE_ENV, "   "),
            (XMTP_WEBHOOK_SECRET_ENV, "secret"),
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.auth.jwks_url.as_deref(),
            Some("https://auth.example.com/jwks.json")
        );
        assert!(config.auth.audience.is_none());
        assert_eq!(config.webhook_secret.as_deref(), Some("secret"));
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = load(&[(PORT_ENV, "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: PORT_ENV, .. }));
    }

    #[test]
    fn turnkey_requires_keys() {
        let err = load(&[(TURNKEY_ORGANIZATION_ID_ENV, "org")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Incomplete {
                present: TURNKEY_ORGANIZATION_ID_ENV,
                missing: TURNKEY_API_PUBLIC_KEY_ENV,
            }
        );

        let config = load(&[
            (TURNKEY_ORGANIZATION_ID_ENV, "org"),
            (TURNKEY_API_PUBLIC_KEY_ENV, "02ab"),
            (TURNKEY_API_PRIVATE_KEY_ENV, "cd"),
        ])
        .unwrap();
        let turnkey = config.turnkey.unwrap();
        assert_eq!(turnkey.base_url, DEFAULT_TURNKEY_API_BASE_URL);
        assert_eq!(turnkey.organization_id, "org");
    }

    #[test]
    fn tls_requires_both_paths() {
        assert!(load(&[(TLS_CERT_PATH_ENV, "/cert.pem")]).is_err());
        let config = load(&[(TLS_CERT_PATH_ENV, "/cert.pem"), (TLS_KEY_PATH_ENV, "/key.pem")]).unwrap();
        assert_eq!(config.tls.unwrap().key_path, PathBuf::from("/key.pem"));
    }
}
