// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::{HeaderName, Request, Response},
    routing::{delete, get, post, put},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{Level, Span};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{DeviceOs, PushTokenType},
    providers::{
        turnkey::{Passkey, PasskeyAttestation},
        xmtp::HmacKey,
        SubOrganization, TopicSubscription,
    },
    state::AppState,
    storage::{ConversationMetadata, Device, DeviceIdentity, IdentityOnDevice, Profile, User},
};

pub mod devices;
pub mod health;
pub mod identities;
pub mod metadata;
pub mod notifications;
pub mod profiles;
pub mod turnkey;
pub mod users;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        // Users
        .route("/users", post(users::onboard_user))
        .route("/users/me", get(users::get_me).delete(users::delete_me))
        // Devices
        .route(
            "/devices/{user_id}",
            get(devices::list_devices).post(devices::create_device),
        )
        .route(
            "/devices/{user_id}/{device_id}",
            get(devices::get_device)
                .put(devices::update_device)
                .delete(devices::delete_device),
        )
        // Identities
        .route("/identities", post(identities::create_identity))
        .route(
            "/identities/user/{user_id}",
            get(identities::list_user_identities),
        )
        .route(
            "/identities/device/{device_id}",
            get(identities::list_device_identities),
        )
        .route(
            "/identities/{identity_id}",
            get(identities::get_identity).put(identities::update_identity),
        )
        .route(
            "/identities/{identity_id}/devices/{device_id}",
            put(identities::link_identity_to_device).delete(identities::unlink_identity_from_device),
        )
        // Profiles
        .route("/profiles/batch", post(profiles::batch_profiles))
        .route("/profiles/search", get(profiles::search_profiles))
        .route("/profiles/check/{username}", get(profiles::check_username))
        .route(
            "/profiles/{xmtp_id}",
            get(profiles::get_profile).put(profiles::upsert_profile),
        )
        // Conversation metadata
        .route(
            "/metadata/conversations/{xmtp_id}",
            get(metadata::list_metadata),
        )
        .route(
            "/metadata/conversations/{xmtp_id}/{conversation_id}",
            get(metadata::get_metadata).put(metadata::upsert_metadata),
        )
        // Notifications
        .route("/notifications/register", post(notifications::register_push))
        .route("/notifications/subscribe", post(notifications::subscribe))
        .route("/notifications/unsubscribe", post(notifications::unsubscribe))
        .route(
            "/notifications/installations/{installation_id}",
            delete(notifications::delete_installation),
        )
        .route("/notifications/xmtp", post(notifications::xmtp_webhook))
        // Turnkey signup
        .route(
            "/turnkey/sub-organizations",
            post(turnkey::create_sub_organization),
        );

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .nest("/api/v1", v1_routes)
        .merge(health_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|req: &Request<_>| {
                            let request_id = req
                                .headers()
                                .get(REQUEST_ID_HEADER)
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or("-");
                            tracing::span!(
                                Level::INFO,
                                "http",
                                method = %req.method(),
                                uri = %req.uri().path(),
                                request_id = %request_id,
                            )
                        })
                        .on_response(|res: &Response<_>, latency: Duration, _span: &Span| {
                            tracing::info!(
                                status = %res.status(),
                                elapsed_ms = latency.as_millis() as u64,
                                "response"
                            );
                        }),
                )
                .layer(PropagateRequestIdLayer::new(request_id)),
        )
        .layer(CorsLayer::permissive())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        users::onboard_user,
        users::get_me,
        users::delete_me,
        devices::list_devices,
        devices::get_device,
        devices::create_device,
        devices::update_device,
        devices::delete_device,
        identities::list_user_identities,
        identities::list_device_identities,
        identities::get_identity,
        identities::create_identity,
        identities::update_identity,
        identities::link_identity_to_device,
        identities::unlink_identity_from_device,
        profiles::get_profile,
        profiles::batch_profiles,
        profiles::search_profiles,
        profiles::check_username,
        profiles::upsert_profile,
        metadata::list_metadata,
        metadata::get_metadata,
        metadata::upsert_metadata,
        notifications::register_push,
        notifications::subscribe,
        notifications::unsubscribe,
        notifications::delete_installation,
        notifications::xmtp_webhook,
        turnkey::create_sub_organization
    ),
    components(
        schemas(
            health::ReadyResponse,
            health::HealthChecks,
            health::CheckStatus,
            health::HealthResponse,
            User,
            Device,
            DeviceOs,
            PushTokenType,
            DeviceIdentity,
            IdentityOnDevice,
            Profile,
            ConversationMetadata,
            TopicSubscription,
            HmacKey,
            Passkey,
            PasskeyAttestation,
            SubOrganization,
            users::OnboardingRequest,
            users::OnboardingResponse,
            users::UserResponse,
            devices::CreateDeviceRequest,
            devices::UpdateDeviceRequest,
            identities::NewIdentityRequest,
            identities::CreateIdentityRequest,
            identities::UpdateIdentityRequest,
            identities::LinkIdentityRequest,
            identities::IdentityDetail,
            identities::LinkedIdentity,
            profiles::ProfileRequest,
            profiles::PublicProfile,
            profiles::BatchProfilesRequest,
            profiles::BatchProfilesResponse,
            profiles::SearchResponse,
            profiles::UsernameAvailability,
            metadata::UpdateMetadataRequest,
            notifications::RegisterPushRequest,
            notifications::RegisterPushResponse,
            notifications::InstallationRegistration,
            notifications::InstallationOutcome,
            notifications::RegistrationStatus,
            notifications::SubscribeRequest,
            notifications::UnsubscribeRequest,
            notifications::SubscriptionResponse,
            notifications::XmtpWebhookPayload,
            notifications::WebhookResponse,
            notifications::WebhookStatus,
            turnkey::CreateSubOrganizationRequest
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and readiness checks"),
        (name = "Users", description = "Onboarding and account lifecycle"),
        (name = "Devices", description = "Device registry"),
        (name = "Identities", description = "Wallet and XMTP identities per device"),
        (name = "Profiles", description = "Public profiles and usernames"),
        (name = "Metadata", description = "Per-conversation client state"),
        (name = "Notifications", description = "Push registration and the XMTP webhook"),
        (name = "Turnkey", description = "Passkey wallet signup")
    )
)]
pub struct ApiDoc;
