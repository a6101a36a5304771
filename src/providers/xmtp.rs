// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! XMTP notification service client.
//!
//! The service speaks Connect over HTTP with JSON bodies: every RPC is a
//! `POST {base}/notifications.v1.Notifications/{Method}`. Field names follow
//! the proto3 JSON mapping (camelCase, 64-bit integers as strings).

use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::PushTokenType;

const SERVICE_PATH: &str = "notifications.v1.Notifications";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum XmtpNotificationError {
    #[error("notification service request failed: {0}")]
    Request(String),

    #[error("notification service returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("notification service response was invalid: {0}")]
    InvalidResponse(String),
}

/// How the notification service should address a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DeliveryMechanism {
    ApnsDeviceToken(String),
    FirebaseDeviceToken(String),
    CustomToken(String),
}

impl DeliveryMechanism {
    /// Pick the mechanism matching a device's native token type.
    pub fn for_token(token_type: PushTokenType, token: impl Into<String>) -> Self {
        let token = token.into();
        match token_type {
            PushTokenType::Apns => DeliveryMechanism::ApnsDeviceToken(token),
            PushTokenType::Fcm => DeliveryMechanism::FirebaseDeviceToken(token),
            PushTokenType::Expo => DeliveryMechanism::CustomToken(token),
        }
    }
}

/// HMAC key for one 30-day epoch of a topic.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HmacKey {
    pub thirty_day_periods_since_epoch: u32,
    /// Base64-encoded key bytes
    #[validate(length(min = 1))]
    pub key: String,
}

/// Topic subscription with the metadata needed to filter self-sent messages.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TopicSubscription {
    #[validate(length(min = 1))]
    pub topic: String,
    #[serde(default)]
    pub is_silent: bool,
    #[serde(default)]
    #[validate(nested)]
    pub hmac_keys: Vec<HmacKey>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInstallationResponse {
    pub installation_id: String,
    /// Unix seconds; encoded as a string by the proto3 JSON mapping
    #[serde(default)]
    pub valid_until: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConnectError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct XmtpNotificationClient {
    base_url: String,
    http: Client,
}

impl XmtpNotificationClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, XmtpNotificationError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| XmtpNotificationError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into(),
            http,
        })
    }

    pub async fn register_installation(
        &self,
        installation_id: &str,
        delivery_mechanism: &DeliveryMechanism,
    ) -> Result<RegisterInstallationResponse, XmtpNotificationError> {
        let payload = json!({
            "installationId": installation_id,
            "deliveryMechanism": delivery_mechanism,
        });
        self.call("RegisterInstallation", &payload).await
    }

    pub async fn subscribe_with_metadata(
        &self,
        installation_id: &str,
        subscriptions: &[TopicSubscription],
    ) -> Result<(), XmtpNotificationError> {
        let payload = json!({
            "installationId": installation_id,
            "subscriptions": subscriptions,
        });
        let _: Value = self.call("SubscribeWithMetadata", &payload).await?;
        Ok(())
    }

    pub async fn unsubscribe(
        &self,
        installation_id: &str,
        topics: &[String],
    ) -> Result<(), XmtpNotificationError> {
        let payload = json!({
            "installationId": installation_id,
            "topics": topics,
        });
        let _: Value = self.call("Unsubscribe", &payload).await?;
        Ok(())
    }

    pub async fn delete_installation(
        &self,
        installation_id: &str,
    ) -> Result<(), XmtpNotificationError> {
        let payload = json!({ "installationId": installation_id });
        let _: Value = self.call("DeleteInstallation", &payload).await?;
        Ok(())
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &Value,
    ) -> Result<T, XmtpNotificationError> {
        let url = format!(
            "{}/{SERVICE_PATH}/{method}",
            self.base_url.trim_end_matches('/')
        );
        let response = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| XmtpNotificationError::Request(format!("{method} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ConnectError>(&body) {
                Ok(ConnectError {
                    code: Some(code),
                    message,
                }) => format!("{code}: {}", message.unwrap_or_default()),
                _ => body,
            };
            return Err(XmtpNotificationError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| XmtpNotificationError::Request(format!("{method} body failed: {e}")))?;
        // Empty responses are valid for unary Connect calls returning Empty
        let body: &[u8] = if body.is_empty() { b"{}" } else { &body };
        serde_json::from_slice(body)
            .map_err(|e| XmtpNotificationError::InvalidResponse(format!("{method}: {e}")))
    }
}
