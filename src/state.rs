// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::JwksManager;
use crate::config::{AuthSettings, ServerConfig};
use crate::providers::{
    ExpoPushClient, ExpoPushError, TurnkeyClient, TurnkeyError, XmtpNotificationClient,
    XmtpNotificationError,
};
use crate::storage::{Database, DbError, IdempotencyCache};

/// JWT verification settings.
///
/// Without a JWKS manager the server runs in development mode and only
/// checks token structure and expiry.
#[derive(Clone, Default)]
pub struct AuthConfig {
    pub jwks: Option<JwksManager>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

impl AuthConfig {
    pub fn from_settings(settings: &AuthSettings) -> Self {
        Self {
            jwks: settings.jwks_url.as_deref().map(JwksManager::new),
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("database: {0}")]
    Database(#[from] DbError),

    #[error("XMTP notification client: {0}")]
    Notifications(#[from] XmtpNotificationError),

    #[error("Expo push client: {0}")]
    Push(#[from] ExpoPushError),

    #[error("Turnkey client: {0}")]
    Turnkey(#[from] TurnkeyError),
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub auth_config: AuthConfig,
    /// XMTP notification service; `None` disables push registration
    pub notifications: Option<Arc<XmtpNotificationClient>>,
    /// Expo push delivery; `None` makes the webhook unavailable
    pub push: Option<Arc<ExpoPushClient>>,
    /// Turnkey signup; `None` makes signup unavailable
    pub turnkey: Option<Arc<TurnkeyClient>>,
    pub webhook_secret: Option<Arc<str>>,
    pub idempotency: Arc<IdempotencyCache>,
}

impl AppState {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(db),
            auth_config: AuthConfig::default(),
            notifications: None,
            push: None,
            turnkey: None,
            webhook_secret: None,
            idempotency: Arc::new(IdempotencyCache::default()),
        }
    }

    /// Build the full state from configuration, opening the database.
    pub fn from_config(config: &ServerConfig) -> Result<Self, StateError> {
        let db = Database::open(&config.database_path())?;
        let mut state = Self::new(db)
            .with_auth_config(AuthConfig::from_settings(&config.auth))
            .with_push(ExpoPushClient::new(
                config.expo_push_url.clone(),
                config.expo_access_token.clone(),
            )?);

        if let Some(url) = &config.xmtp_notification_url {
            state = state.with_notifications(XmtpNotificationClient::new(url.clone())?);
        }
        if let Some(settings) = &config.turnkey {
            state = state.with_turnkey(TurnkeyClient::new(settings)?);
        }
        if let Some(secret) = &config.webhook_secret {
            state = state.with_webhook_secret(secret);
        }
        Ok(state)
    }

    pub fn with_auth_config(mut self, auth_config: AuthConfig) -> Self {
        self.auth_config = auth_config;
        self
    }

    pub fn with_notifications(mut self, client: XmtpNotificationClient) -> Self {
        self.notifications = Some(Arc::new(client));
        self
    }

    pub fn with_push(mut self, client: ExpoPushClient) -> Self {
        self.push = Some(Arc::new(client));
        self
    }

    pub fn with_turnkey(mut self, client: TurnkeyClient) -> Self {
        self.turnkey = Some(Arc::new(client));
        self
    }

    pub fn with_webhook_secret(mut self, secret: &str) -> Self {
        self.webhook_secret = Some(Arc::from(secret));
        self
    }
}
