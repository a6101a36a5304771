// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::notifications::unregister_installations;
use super::validation::ValidatedJson;
use crate::{
    auth::CurrentUser,
    error::ApiError,
    models::normalize_wallet_address,
    state::AppState,
    storage::{
        Database, DbResult, DeviceIdentity, DeviceRepository, IdentityOnDevice,
        IdentityRepository, OwnershipCheck, Profile, ProfileRepository, User,
    },
};

/// Identity fields supplied at onboarding.
#[derive(Debug, Clone, Default, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewIdentityRequest {
    #[validate(length(min = 1, max = 128))]
    pub wallet_address: Option<String>,
    #[validate(length(min = 1, max = 256))]
    pub xmtp_id: Option<String>,
    #[validate(length(min = 1, max = 256))]
    pub xmtp_installation_id: Option<String>,
}

impl NewIdentityRequest {
    /// Build the identity and its link to `device_id`.
    pub fn into_records(self, user_id: &str, device_id: &str) -> (DeviceIdentity, IdentityOnDevice) {
        let identity = DeviceIdentity::new(
            user_id,
            self.wallet_address.as_deref().map(normalize_wallet_address),
            self.xmtp_id,
        );
        let link = IdentityOnDevice::new(device_id, &identity.id, self.xmtp_installation_id);
        (identity, link)
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateIdentityRequest {
    #[validate(length(min = 1))]
    pub device_id: String,
    #[validate(length(min = 1, max = 128))]
    pub wallet_address: Option<String>,
    #[validate(length(min = 1, max = 256))]
    pub xmtp_id: Option<String>,
    #[validate(length(min = 1, max = 256))]
    pub xmtp_installation_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateIdentityRequest {
    #[validate(length(min = 1, max = 128))]
    pub wallet_address: Option<String>,
    #[validate(length(min = 1, max = 256))]
    pub xmtp_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LinkIdentityRequest {
    #[validate(length(min = 1, max = 256))]
    pub xmtp_installation_id: Option<String>,
}

/// Identity together with its profile and device links.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IdentityDetail {
    #[serde(flatten)]
    pub identity: DeviceIdentity,
    pub profile: Option<Profile>,
    pub devices: Vec<IdentityOnDevice>,
}

/// Identity as seen from one device.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LinkedIdentity {
    #[serde(flatten)]
    pub identity: DeviceIdentity,
    pub link: IdentityOnDevice,
}

pub(crate) fn identity_detail(db: &Database, identity: DeviceIdentity) -> DbResult<IdentityDetail> {
    let profile = ProfileRepository::new(db).get_by_identity(&identity.id)?;
    let devices = IdentityRepository::new(db).links_for_identity(&identity.id)?;
    Ok(IdentityDetail {
        identity,
        profile,
        devices,
    })
}

/// Resolve the caller's identity for an XMTP inbox id.
///
/// Unknown and foreign inbox ids are both rejected with 403.
pub(crate) fn owned_identity_by_xmtp_id(
    state: &AppState,
    user: &User,
    xmtp_id: &str,
) -> Result<DeviceIdentity, ApiError> {
    IdentityRepository::new(&state.db)
        .find_owned_by_xmtp_id(&user.id, xmtp_id)?
        .ok_or_else(|| ApiError::forbidden("You do not have access to this identity"))
}

#[utoipa::path(
    get,
    path = "/api/v1/identities/user/{userId}",
    params(("userId" = String, Path, description = "Owner of the identities")),
    tag = "Identities",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = [DeviceIdentity]),
        (status = 403, description = "Not the caller's user id")
    )
)]
pub async fn list_user_identities(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<DeviceIdentity>>, ApiError> {
    if user.id != user_id {
        return Err(ApiError::forbidden("You do not have access to this user's identities"));
    }
    let identities = IdentityRepository::new(&state.db).list_by_user(&user.id)?;
    Ok(Json(identities))
}

#[utoipa::path(
    get,
    path = "/api/v1/identities/device/{deviceId}",
    params(("deviceId" = String, Path, description = "Device identifier")),
    tag = "Identities",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = [LinkedIdentity]),
        (status = 403, description = "Device belongs to another user"),
        (status = 404, description = "Device not found")
    )
)]
pub async fn list_device_identities(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(device_id): Path<String>,
) -> Result<Json<Vec<LinkedIdentity>>, ApiError> {
    DeviceRepository::new(&state.db)
        .get(&device_id)
        .verify_owner(&user.id)?;
    let identities = IdentityRepository::new(&state.db)
        .list_by_device(&device_id)?
        .into_iter()
        .map(|(identity, link)| LinkedIdentity { identity, link })
        .collect();
    Ok(Json(identities))
}

#[utoipa::path(
    get,
    path = "/api/v1/identities/{identityId}",
    params(("identityId" = String, Path, description = "Identity identifier")),
    tag = "Identities",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = IdentityDetail),
        (status = 403, description = "Identity belongs to another user"),
        (status = 404, description = "Identity not found")
    )
)]
pub async fn get_identity(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(identity_id): Path<String>,
) -> Result<Json<IdentityDetail>, ApiError> {
    let identity = IdentityRepository::new(&state.db)
        .get(&identity_id)
        .verify_owner(&user.id)?;
    Ok(Json(identity_detail(&state.db, identity)?))
}

#[utoipa::path(
    post,
    path = "/api/v1/identities",
    request_body = CreateIdentityRequest,
    tag = "Identities",
    security(("bearer_auth" = [])),
    responses(
        (status = 201, body = LinkedIdentity),
        (status = 403, description = "Device belongs to another user"),
        (status = 404, description = "Device not found"),
        (status = 409, description = "XMTP id, wallet or installation already registered")
    )
)]
pub async fn create_identity(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidatedJson(request): ValidatedJson<CreateIdentityRequest>,
) -> Result<(StatusCode, Json<LinkedIdentity>), ApiError> {
    let device = DeviceRepository::new(&state.db)
        .get(&request.device_id)
        .verify_owner(&user.id)?;

    let (identity, link) = NewIdentityRequest {
        wallet_address: request.wallet_address,
        xmtp_id: request.xmtp_id,
        xmtp_installation_id: request.xmtp_installation_id,
    }
    .into_records(&user.id, &device.id);
    IdentityRepository::new(&state.db).create_with_link(&identity, &link)?;

    tracing::info!(
        user_id = %user.id,
        identity_id = %identity.id,
        device_id = %device.id,
        "Identity created"
    );
    Ok((StatusCode::CREATED, Json(LinkedIdentity { identity, link })))
}

#[utoipa::path(
    put,
    path = "/api/v1/identities/{identityId}",
    params(("identityId" = String, Path, description = "Identity identifier")),
    request_body = UpdateIdentityRequest,
    tag = "Identities",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = DeviceIdentity),
        (status = 403, description = "Identity belongs to another user"),
        (status = 404, description = "Identity not found"),
        (status = 409, description = "XMTP id or wallet already registered")
    )
)]
pub async fn update_identity(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(identity_id): Path<String>,
    ValidatedJson(request): ValidatedJson<UpdateIdentityRequest>,
) -> Result<Json<DeviceIdentity>, ApiError> {
    let repo = IdentityRepository::new(&state.db);
    let mut identity = repo.get(&identity_id).verify_owner(&user.id)?;
    if let Some(wallet_address) = request.wallet_address {
        identity.wallet_address = Some(normalize_wallet_address(&wallet_address));
    }
    if let Some(xmtp_id) = request.xmtp_id {
        identity.xmtp_id = Some(xmtp_id);
    }
    identity.updated_at = Utc::now();
    repo.update(&identity)?;
    Ok(Json(identity))
}

#[utoipa::path(
    put,
    path = "/api/v1/identities/{identityId}/devices/{deviceId}",
    params(
        ("identityId" = String, Path, description = "Identity identifier"),
        ("deviceId" = String, Path, description = "Device identifier")
    ),
    request_body = LinkIdentityRequest,
    tag = "Identities",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = IdentityOnDevice),
        (status = 403, description = "Identity or device belongs to another user"),
        (status = 404, description = "Identity or device not found"),
        (status = 409, description = "Installation id linked elsewhere")
    )
)]
pub async fn link_identity_to_device(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((identity_id, device_id)): Path<(String, String)>,
    ValidatedJson(request): ValidatedJson<LinkIdentityRequest>,
) -> Result<Json<IdentityOnDevice>, ApiError> {
    let repo = IdentityRepository::new(&state.db);
    repo.get(&identity_id).verify_owner(&user.id)?;
    DeviceRepository::new(&state.db)
        .get(&device_id)
        .verify_owner(&user.id)?;

    let link = IdentityOnDevice::new(&device_id, &identity_id, request.xmtp_installation_id);
    let (stored, replaced) = repo.upsert_link(&link)?;
    if let Some(installation_id) = replaced {
        unregister_installations(&state, &[installation_id]).await;
    }
    Ok(Json(stored))
}

#[utoipa::path(
    delete,
    path = "/api/v1/identities/{identityId}/devices/{deviceId}",
    params(
        ("identityId" = String, Path, description = "Identity identifier"),
        ("deviceId" = String, Path, description = "Device identifier")
    ),
    tag = "Identities",
    security(("bearer_auth" = [])),
    responses(
        (status = 204, description = "Link removed"),
        (status = 403, description = "Identity or device belongs to another user"),
        (status = 404, description = "Identity, device or link not found")
    )
)]
pub async fn unlink_identity_from_device(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((identity_id, device_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let repo = IdentityRepository::new(&state.db);
    repo.get(&identity_id).verify_owner(&user.id)?;
    DeviceRepository::new(&state.db)
        .get(&device_id)
        .verify_owner(&user.id)?;

    let removed = repo.remove_link(&device_id, &identity_id)?;
    if let Some(installation_id) = removed.xmtp_installation_id {
        unregister_installations(&state, &[installation_id]).await;
    }
    Ok(StatusCode::NO_CONTENT)
}
