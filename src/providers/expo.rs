// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Expo push service client.
//!
//! Messages are posted as a JSON array; the response carries one ticket per
//! message in the same order.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Ticket error reported when the push token is no longer valid.
pub const DEVICE_NOT_REGISTERED: &str = "DeviceNotRegistered";

#[derive(Debug, thiserror::Error)]
pub enum ExpoPushError {
    #[error("Expo push request failed: {0}")]
    Request(String),

    #[error("Expo push returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Expo push response was invalid: {0}")]
    InvalidResponse(String),
}

/// One Expo push message.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExpoPushMessage {
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    /// iOS: let a notification service extension rewrite the content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mutable_content: Option<bool>,
    /// iOS: background (silent) delivery
    #[serde(rename = "_contentAvailable", skip_serializing_if = "Option::is_none")]
    pub content_available: Option<bool>,
}

impl ExpoPushMessage {
    /// Visible notification with a body the client may rewrite.
    pub fn alert(to: impl Into<String>, title: &str, body: &str, data: Value) -> Self {
        Self {
            to: to.into(),
            title: Some(title.to_string()),
            body: Some(body.to_string()),
            data: Some(data),
            sound: Some("default".to_string()),
            priority: Some("high".to_string()),
            mutable_content: Some(true),
            content_available: None,
        }
    }

    /// Data-only background message.
    pub fn silent(to: impl Into<String>, data: Value) -> Self {
        Self {
            to: to.into(),
            data: Some(data),
            priority: Some("high".to_string()),
            content_available: Some(true),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ExpoTicketDetails {
    #[serde(default)]
    pub error: Option<String>,
}

/// Push ticket returned for each message.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ExpoPushTicket {
    Ok {
        id: String,
    },
    Error {
        message: String,
        #[serde(default)]
        details: Option<ExpoTicketDetails>,
    },
}

impl ExpoPushTicket {
    /// Error code from `details.error`, if this is an error ticket.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            ExpoPushTicket::Ok { .. } => None,
            ExpoPushTicket::Error { details, .. } => {
                details.as_ref().and_then(|d| d.error.as_deref())
            }
        }
    }

    pub fn is_device_not_registered(&self) -> bool {
        self.error_code() == Some(DEVICE_NOT_REGISTERED)
    }
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    data: Vec<ExpoPushTicket>,
    #[serde(default)]
    errors: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct ExpoPushClient {
    push_url: String,
    access_token: Option<String>,
    http: Client,
}

impl ExpoPushClient {
    pub fn new(
        push_url: impl Into<String>,
        access_token: Option<String>,
    ) -> Result<Self, ExpoPushError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ExpoPushError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            push_url: push_url.into(),
            access_token,
            http,
        })
    }

    /// Send a batch of messages, returning one ticket per message.
    pub async fn send(
        &self,
        messages: &[ExpoPushMessage],
    ) -> Result<Vec<ExpoPushTicket>, ExpoPushError> {
        let mut request = self
            .http
            .post(&self.push_url)
            .header("Accept", "application/json")
            .json(messages);
        if let Some(token) = &self.access_token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExpoPushError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExpoPushError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SendResponse = response
            .json()
            .await
            .map_err(|e| ExpoPushError::InvalidResponse(e.to_string()))?;
        if let Some(errors) = parsed.errors {
            return Err(ExpoPushError::InvalidResponse(errors.to_string()));
        }
        if parsed.data.len() != messages.len() {
            return Err(ExpoPushError::InvalidResponse(format!(
                "expected {} tickets, got {}",
                messages.len(),
                parsed.data.len()
            )));
        }
        Ok(parsed.data)
    }

    /// Send a single message and return its ticket.
    pub async fn send_one(&self, message: ExpoPushMessage) -> Result<ExpoPushTicket, ExpoPushError> {
        let mut tickets = self.send(std::slice::from_ref(&message)).await?;
        tickets
            .pop()
            .ok_or_else(|| ExpoPushError::InvalidResponse("no ticket returned".to_string()))
    }
}
