// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Push registration and the XMTP -> Expo relay.
//!
//! Installations are registered with the XMTP notification service, which
//! calls back into [`xmtp_webhook`] for each message on a subscribed topic.
//! The webhook resolves the installation to a device and forwards the
//! still-encrypted payload through Expo; the app decrypts it locally.

use std::collections::HashSet;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use futures::future::join_all;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use sha2::Sha256;
use utoipa::ToSchema;
use validator::Validate;

use super::validation::ValidatedJson;
use crate::{
    auth::CurrentUser,
    error::ApiError,
    models::PushTokenType,
    providers::{
        DeliveryMechanism, ExpoPushClient, ExpoPushMessage, ExpoPushTicket, TopicSubscription,
        XmtpNotificationClient, XmtpNotificationError,
    },
    state::AppState,
    storage::{
        DbError, DeviceRepository, IdentityOnDevice, IdentityRepository, OwnershipCheck, PushTokens,
        User,
    },
};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying `hex(HMAC-SHA256(secret, body))` on webhook calls.
pub const SIGNATURE_HEADER: &str = "x-signature";

const ALERT_TITLE: &str = "New message";
const ALERT_BODY: &str = "You have a new message";

// =============================================================================
// Request / Response Types
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InstallationRegistration {
    #[validate(length(min = 1))]
    pub identity_id: String,
    #[validate(length(min = 1, max = 256))]
    pub xmtp_installation_id: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPushRequest {
    #[validate(length(min = 1))]
    pub device_id: String,
    #[validate(length(min = 1, max = 512))]
    pub push_token: String,
    pub push_token_type: PushTokenType,
    /// Defaults to `pushToken` when the token type is `expo`
    #[validate(length(min = 1, max = 512))]
    pub expo_token: Option<String>,
    #[validate(length(min = 1, max = 20), nested)]
    pub installations: Vec<InstallationRegistration>,
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RegistrationStatus {
    Registered,
    Failed,
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InstallationOutcome {
    pub identity_id: String,
    pub xmtp_installation_id: String,
    pub status: RegistrationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPushResponse {
    pub device_id: String,
    pub installations: Vec<InstallationOutcome>,
}

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    #[validate(length(min = 1))]
    pub installation_id: String,
    #[validate(length(min = 1, max = 500), nested)]
    pub subscriptions: Vec<TopicSubscription>,
}

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeRequest {
    #[validate(length(min = 1))]
    pub installation_id: String,
    #[validate(length(min = 1, max = 500))]
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub installation_id: String,
    pub topics: Vec<String>,
}

/// Message notification posted by the XMTP notification service.
///
/// Field names follow the service's snake_case HTTP delivery format;
/// camelCase spellings are accepted too.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct XmtpWebhookPayload {
    #[serde(alias = "idempotencyKey")]
    pub idempotency_key: String,
    pub message: WebhookMessage,
    #[serde(default, alias = "messageContext")]
    pub message_context: MessageContext,
    pub installation: WebhookInstallation,
    #[serde(default)]
    pub subscription: WebhookSubscription,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct WebhookMessage {
    #[serde(alias = "contentTopic")]
    pub content_topic: String,
    #[serde(default, alias = "timestampNs", deserialize_with = "lenient_u64")]
    pub timestamp_ns: Option<u64>,
    /// Base64 encrypted envelope, forwarded untouched
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct MessageContext {
    #[serde(default, alias = "messageType")]
    pub message_type: Option<String>,
    #[serde(default, alias = "shouldPush")]
    pub should_push: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct WebhookInstallation {
    pub id: String,
    #[serde(default, alias = "deliveryMechanism")]
    pub delivery_mechanism: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct WebhookSubscription {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default, alias = "isSilent")]
    pub is_silent: bool,
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum WebhookStatus {
    Delivered,
    Duplicate,
    Skipped,
    Orphaned,
    DeviceUnregistered,
    Failed,
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub status: WebhookStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl WebhookResponse {
    fn new(status: WebhookStatus) -> Self {
        Self {
            status,
            ticket_id: None,
            reason: None,
        }
    }

    fn with_reason(status: WebhookStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            ticket_id: None,
            reason: Some(reason.into()),
        }
    }
}

/// Accepts `u64` as a JSON number or a decimal string.
fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn notification_client(state: &AppState) -> Result<&XmtpNotificationClient, ApiError> {
    state
        .notifications
        .as_deref()
        .ok_or_else(|| ApiError::service_unavailable("Notification service is not configured"))
}

fn upstream_error(err: XmtpNotificationError) -> ApiError {
    tracing::warn!(error = %err, "Notification service call failed");
    ApiError::bad_gateway(format!("Notification service error: {err}"))
}

/// Link carrying `installation_id`, if it belongs to one of the caller's devices.
fn owned_installation(
    state: &AppState,
    user: &User,
    installation_id: &str,
) -> Result<IdentityOnDevice, ApiError> {
    let link = IdentityRepository::new(&state.db)
        .find_link_by_installation(installation_id)?
        .ok_or_else(|| ApiError::not_found("Installation not found"))?;
    DeviceRepository::new(&state.db)
        .get(&link.device_id)
        .verify_owner(&user.id)?;
    Ok(link)
}

/// Unregister installations with the notification service, logging failures.
pub(crate) async fn unregister_installations(state: &AppState, installation_ids: &[String]) {
    let Some(client) = state.notifications.as_deref() else {
        return;
    };
    let results = join_all(
        installation_ids
            .iter()
            .map(|id| client.delete_installation(id)),
    )
    .await;
    for (installation_id, result) in installation_ids.iter().zip(results) {
        if let Err(e) = result {
            tracing::warn!(
                installation_id = %installation_id,
                error = %e,
                "Failed to unregister installation"
            );
        }
    }
}

/// Each installation and each identity may appear once per registration.
fn reject_duplicate_installations(installations: &[InstallationRegistration]) -> Result<(), ApiError> {
    let mut installation_ids = HashSet::new();
    let mut identity_ids = HashSet::new();
    for installation in installations {
        if !installation_ids.insert(installation.xmtp_installation_id.as_str()) {
            return Err(ApiError::bad_request(format!(
                "Installation {} is listed more than once",
                installation.xmtp_installation_id
            )));
        }
        if !identity_ids.insert(installation.identity_id.as_str()) {
            return Err(ApiError::bad_request(format!(
                "Identity {} is listed more than once",
                installation.identity_id
            )));
        }
    }
    Ok(())
}

fn verify_signature(secret: &str, headers: &HeaderMap, body: &[u8]) -> Result<(), ApiError> {
    let provided = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Missing webhook signature"))?;
    let provided = provided.strip_prefix("sha256=").unwrap_or(provided);
    let signature =
        hex::decode(provided.trim()).map_err(|_| ApiError::unauthorized("Invalid webhook signature"))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| ApiError::internal("Invalid webhook secret"))?;
    mac.update(body);
    mac.verify_slice(&signature)
        .map_err(|_| ApiError::unauthorized("Invalid webhook signature"))
}

// =============================================================================
// Handlers
// =============================================================================

#[utoipa::path(
    post,
    path = "/api/v1/notifications/register",
    request_body = RegisterPushRequest,
    tag = "Notifications",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = RegisterPushResponse),
        (status = 403, description = "Device or identity belongs to another user"),
        (status = 404, description = "Device or identity not found"),
        (status = 503, description = "Notification service is not configured")
    )
)]
pub async fn register_push(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidatedJson(request): ValidatedJson<RegisterPushRequest>,
) -> Result<Json<RegisterPushResponse>, ApiError> {
    reject_duplicate_installations(&request.installations)?;
    let client = notification_client(&state)?;
    let device_id = DeviceRepository::new(&state.db)
        .get(&request.device_id)
        .verify_owner(&user.id)?
        .id;
    let identities = IdentityRepository::new(&state.db);
    for installation in &request.installations {
        identities
            .get(&installation.identity_id)
            .verify_owner(&user.id)?;
    }

    let mechanism = DeliveryMechanism::for_token(request.push_token_type, request.push_token.clone());
    let results = join_all(
        request
            .installations
            .iter()
            .map(|installation| client.register_installation(&installation.xmtp_installation_id, &mechanism)),
    )
    .await;

    let mut outcomes = Vec::with_capacity(results.len());
    let mut links = Vec::new();
    for (installation, result) in request.installations.iter().zip(results) {
        match result {
            Ok(registered) => {
                links.push(IdentityOnDevice::new(
                    &device_id,
                    &installation.identity_id,
                    Some(installation.xmtp_installation_id.clone()),
                ));
                outcomes.push(InstallationOutcome {
                    identity_id: installation.identity_id.clone(),
                    xmtp_installation_id: installation.xmtp_installation_id.clone(),
                    status: RegistrationStatus::Registered,
                    valid_until: registered.valid_until,
                    error: None,
                });
            }
            Err(e) => {
                tracing::warn!(
                    device_id = %device_id,
                    installation_id = %installation.xmtp_installation_id,
                    error = %e,
                    "Installation registration failed"
                );
                outcomes.push(InstallationOutcome {
                    identity_id: installation.identity_id.clone(),
                    xmtp_installation_id: installation.xmtp_installation_id.clone(),
                    status: RegistrationStatus::Failed,
                    valid_until: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    let tokens = PushTokens {
        push_token: request.push_token,
        push_token_type: request.push_token_type,
        expo_token: request.expo_token,
    };
    let device = DeviceRepository::new(&state.db).register_push(&device_id, &tokens, &links)?;

    tracing::info!(
        user_id = %user.id,
        device_id = %device.id,
        registered = links.len(),
        requested = outcomes.len(),
        "Push registration processed"
    );
    Ok(Json(RegisterPushResponse {
        device_id: device.id,
        installations: outcomes,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/subscribe",
    request_body = SubscribeRequest,
    tag = "Notifications",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = SubscriptionResponse),
        (status = 403, description = "Installation belongs to another user"),
        (status = 404, description = "Installation not found"),
        (status = 502, description = "Notification service rejected the call")
    )
)]
pub async fn subscribe(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidatedJson(request): ValidatedJson<SubscribeRequest>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let client = notification_client(&state)?;
    owned_installation(&state, &user, &request.installation_id)?;
    client
        .subscribe_with_metadata(&request.installation_id, &request.subscriptions)
        .await
        .map_err(upstream_error)?;

    Ok(Json(SubscriptionResponse {
        installation_id: request.installation_id,
        topics: request.subscriptions.into_iter().map(|s| s.topic).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/unsubscribe",
    request_body = UnsubscribeRequest,
    tag = "Notifications",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = SubscriptionResponse),
        (status = 403, description = "Installation belongs to another user"),
        (status = 404, description = "Installation not found"),
        (status = 502, description = "Notification service rejected the call")
    )
)]
pub async fn unsubscribe(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidatedJson(request): ValidatedJson<UnsubscribeRequest>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let client = notification_client(&state)?;
    owned_installation(&state, &user, &request.installation_id)?;
    client
        .unsubscribe(&request.installation_id, &request.topics)
        .await
        .map_err(upstream_error)?;

    Ok(Json(SubscriptionResponse {
        installation_id: request.installation_id,
        topics: request.topics,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/v1/notifications/installations/{installationId}",
    params(("installationId" = String, Path, description = "XMTP installation id")),
    tag = "Notifications",
    security(("bearer_auth" = [])),
    responses(
        (status = 204, description = "Installation unregistered"),
        (status = 403, description = "Installation belongs to another user"),
        (status = 404, description = "Installation not found")
    )
)]
pub async fn delete_installation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(installation_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    owned_installation(&state, &user, &installation_id)?;
    unregister_installations(&state, std::slice::from_ref(&installation_id)).await;
    IdentityRepository::new(&state.db).clear_installation(&installation_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/xmtp",
    request_body = XmtpWebhookPayload,
    tag = "Notifications",
    params(("X-Signature" = Option<String>, Header, description = "hex HMAC-SHA256 of the body")),
    responses(
        (status = 200, body = WebhookResponse),
        (status = 400, description = "Malformed payload"),
        (status = 401, description = "Missing or invalid signature"),
        (status = 500, description = "Push delivery failed; the call may be retried"),
        (status = 503, description = "Push delivery is not configured")
    )
)]
pub async fn xmtp_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    if let Some(secret) = state.webhook_secret.as_deref() {
        verify_signature(secret, &headers, &body)?;
    }
    let payload: XmtpWebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid webhook payload: {e}")))?;
    let push = state
        .push
        .as_deref()
        .ok_or_else(|| ApiError::service_unavailable("Push delivery is not configured"))?;

    if state.idempotency.check_and_insert(&payload.idempotency_key) {
        tracing::debug!(idempotency_key = %payload.idempotency_key, "Duplicate webhook delivery");
        return Ok(Json(WebhookResponse::new(WebhookStatus::Duplicate)));
    }

    let result = relay(&state, push, &payload).await;
    if result.is_err() {
        // Let the notification service retry this delivery
        state.idempotency.remove(&payload.idempotency_key);
    }
    let response = result?;
    tracing::info!(
        installation_id = %payload.installation.id,
        topic = %payload.message.content_topic,
        status = ?response.status,
        "Webhook processed"
    );
    Ok(Json(response))
}

async fn relay(
    state: &AppState,
    push: &ExpoPushClient,
    payload: &XmtpWebhookPayload,
) -> Result<WebhookResponse, ApiError> {
    if payload.message_context.should_push == Some(false) {
        return Ok(WebhookResponse::with_reason(
            WebhookStatus::Skipped,
            "Message is not meant to be pushed",
        ));
    }

    let installation_id = &payload.installation.id;
    let link = IdentityRepository::new(&state.db).find_link_by_installation(installation_id)?;
    let device = match link {
        Some(link) => match DeviceRepository::new(&state.db).get(&link.device_id) {
            Ok(device) => Some(device),
            Err(DbError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        },
        None => None,
    };
    let Some(device) = device else {
        tracing::warn!(installation_id = %installation_id, "Webhook for unknown installation");
        unregister_installations(state, std::slice::from_ref(installation_id)).await;
        return Ok(WebhookResponse::with_reason(
            WebhookStatus::Orphaned,
            "Installation is not linked to a device",
        ));
    };

    let Some(expo_token) = device.expo_token.clone() else {
        return Ok(WebhookResponse::with_reason(
            WebhookStatus::Skipped,
            "Device has no Expo push token",
        ));
    };

    let data = json!({
        "topic": payload.message.content_topic,
        "encryptedMessage": payload.message.message,
        "timestampNs": payload.message.timestamp_ns.map(|ts| ts.to_string()),
        "messageType": payload.message_context.message_type,
        "installationId": installation_id,
        "idempotencyKey": payload.idempotency_key,
    });
    let message = if payload.subscription.is_silent {
        ExpoPushMessage::silent(expo_token, data)
    } else {
        ExpoPushMessage::alert(expo_token, ALERT_TITLE, ALERT_BODY, data)
    };

    let ticket = push.send_one(message).await.map_err(|e| {
        tracing::error!(device_id = %device.id, error = %e, "Expo push failed");
        ApiError::internal("Push delivery failed")
    })?;

    match ticket {
        ExpoPushTicket::Ok { id } => Ok(WebhookResponse {
            status: WebhookStatus::Delivered,
            ticket_id: Some(id),
            reason: None,
        }),
        ticket if ticket.is_device_not_registered() => {
            tracing::info!(
                device_id = %device.id,
                installation_id = %installation_id,
                "Expo reports device not registered, disabling push"
            );
            DeviceRepository::new(&state.db).disable_push_for_installation(installation_id)?;
            unregister_installations(state, std::slice::from_ref(installation_id)).await;
            Ok(WebhookResponse::with_reason(
                WebhookStatus::DeviceUnregistered,
                "Expo push token is no longer registered",
            ))
        }
        ExpoPushTicket::Error { message, .. } => {
            tracing::warn!(device_id = %device.id, error = %message, "Expo rejected push");
            Ok(WebhookResponse::with_reason(WebhookStatus::Failed, message))
        }
    }
}
