// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::devices::CreateDeviceRequest;
use super::identities::{identity_detail, IdentityDetail, NewIdentityRequest};
use super::notifications::unregister_installations;
use super::profiles::ProfileRequest;
use super::validation::ValidatedJson;
use crate::{
    auth::{Auth, CurrentUser},
    error::ApiError,
    state::AppState,
    storage::{
        Device, DeviceIdentity, DeviceRepository, IdentityRepository, Onboarding, Profile, User,
        UserRepository,
    },
};

/// First-run onboarding: the caller's user, first device and identity.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingRequest {
    #[validate(nested)]
    pub device: CreateDeviceRequest,
    #[validate(nested)]
    #[serde(default)]
    pub identity: NewIdentityRequest,
    #[validate(nested)]
    pub profile: Option<ProfileRequest>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingResponse {
    #[serde(flatten)]
    pub user: User,
    pub device: Device,
    pub identity: DeviceIdentity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
}

/// The caller with everything they own.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    #[serde(flatten)]
    pub user: User,
    pub devices: Vec<Device>,
    pub identities: Vec<IdentityDetail>,
}

#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = OnboardingRequest,
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 201, body = OnboardingResponse),
        (status = 400, description = "Invalid request body"),
        (status = 409, description = "Already onboarded, or a unique field is taken")
    )
)]
pub async fn onboard_user(
    State(state): State<AppState>,
    Auth(caller): Auth,
    ValidatedJson(request): ValidatedJson<OnboardingRequest>,
) -> Result<(StatusCode, Json<OnboardingResponse>), ApiError> {
    let repo = UserRepository::new(&state.db);
    if repo.find_by_turnkey_id(&caller.subject)?.is_some() {
        return Err(ApiError::conflict("User already exists"));
    }

    let user = User::new(&caller.subject);
    let device = request.device.into_device(&user.id);
    let (identity, link) = request.identity.into_records(&user.id, &device.id);
    let profile = request.profile.map(|p| p.into_profile(&identity.id));

    repo.onboard(&Onboarding {
        user: user.clone(),
        device: device.clone(),
        identity: identity.clone(),
        link,
        profile: profile.clone(),
    })?;

    tracing::info!(
        user_id = %user.id,
        device_id = %device.id,
        identity_id = %identity.id,
        with_profile = profile.is_some(),
        "User onboarded"
    );

    Ok((
        StatusCode::CREATED,
        Json(OnboardingResponse {
            user,
            device,
            identity,
            profile,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = UserResponse),
        (status = 403, description = "Caller has not onboarded")
    )
)]
pub async fn get_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<UserResponse>, ApiError> {
    let devices = DeviceRepository::new(&state.db).list_by_user(&user.id)?;
    let identities = IdentityRepository::new(&state.db)
        .list_by_user(&user.id)?
        .into_iter()
        .map(|identity| identity_detail(&state.db, identity))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(UserResponse {
        user,
        devices,
        identities,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/v1/users/me",
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 204, description = "User and everything it owns deleted"),
        (status = 403, description = "Caller has not onboarded")
    )
)]
pub async fn delete_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<StatusCode, ApiError> {
    let installations = UserRepository::new(&state.db).delete_cascade(&user.id)?;
    tracing::info!(
        user_id = %user.id,
        installations = installations.len(),
        "User deleted"
    );
    unregister_installations(&state, &installations).await;
    Ok(StatusCode::NO_CONTENT)
}
