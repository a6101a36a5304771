// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use super::notifications::unregister_installations;
use super::validation::ValidatedJson;
use crate::{
    auth::CurrentUser,
    error::ApiError,
    models::{DeviceOs, PushTokenType},
    state::AppState,
    storage::{Device, DeviceRepository, OwnershipCheck, User},
};

/// Request to register a new device.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeviceRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub os: DeviceOs,
    #[validate(length(min = 1, max = 512))]
    pub push_token: Option<String>,
    pub push_token_type: Option<PushTokenType>,
    #[validate(length(min = 1, max = 512))]
    pub expo_token: Option<String>,
    #[validate(length(max = 50))]
    pub app_version: Option<String>,
    #[validate(length(max = 50))]
    pub app_build: Option<String>,
}

impl CreateDeviceRequest {
    pub fn into_device(self, user_id: &str) -> Device {
        let mut device = Device::new(user_id, self.os, self.name);
        device.push_token = self.push_token;
        device.push_token_type = self.push_token_type;
        device.expo_token = self.expo_token;
        device.app_version = self.app_version;
        device.app_build = self.app_build;
        device
    }
}

/// Partial device update. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDeviceRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub os: Option<DeviceOs>,
    #[validate(length(min = 1, max = 512))]
    pub push_token: Option<String>,
    pub push_token_type: Option<PushTokenType>,
    #[validate(length(min = 1, max = 512))]
    pub expo_token: Option<String>,
    #[validate(length(max = 50))]
    pub app_version: Option<String>,
    #[validate(length(max = 50))]
    pub app_build: Option<String>,
}

impl UpdateDeviceRequest {
    fn apply(self, device: &mut Device) {
        if let Some(name) = self.name {
            device.name = Some(name);
        }
        if let Some(os) = self.os {
            device.os = os;
        }
        if let Some(push_token) = self.push_token {
            device.push_token = Some(push_token);
        }
        if let Some(push_token_type) = self.push_token_type {
            device.push_token_type = Some(push_token_type);
        }
        if let Some(expo_token) = self.expo_token {
            device.expo_token = Some(expo_token);
        }
        if let Some(app_version) = self.app_version {
            device.app_version = Some(app_version);
        }
        if let Some(app_build) = self.app_build {
            device.app_build = Some(app_build);
        }
        device.updated_at = Utc::now();
    }
}

fn ensure_caller(user: &User, user_id: &str) -> Result<(), ApiError> {
    if user.id == user_id {
        Ok(())
    } else {
        Err(ApiError::forbidden("You do not have access to this user's devices"))
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/devices/{userId}",
    params(("userId" = String, Path, description = "Owner of the devices")),
    tag = "Devices",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = [Device]),
        (status = 403, description = "Not the caller's user id")
    )
)]
pub async fn list_devices(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Device>>, ApiError> {
    ensure_caller(&user, &user_id)?;
    let devices = DeviceRepository::new(&state.db).list_by_user(&user.id)?;
    Ok(Json(devices))
}

#[utoipa::path(
    get,
    path = "/api/v1/devices/{userId}/{deviceId}",
    params(
        ("userId" = String, Path, description = "Owner of the device"),
        ("deviceId" = String, Path, description = "Device identifier")
    ),
    tag = "Devices",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = Device),
        (status = 403, description = "Device belongs to another user"),
        (status = 404, description = "Device not found")
    )
)]
pub async fn get_device(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((user_id, device_id)): Path<(String, String)>,
) -> Result<Json<Device>, ApiError> {
    ensure_caller(&user, &user_id)?;
    let device = DeviceRepository::new(&state.db)
        .get(&device_id)
        .verify_owner(&user.id)?;
    Ok(Json(device))
}

#[utoipa::path(
    post,
    path = "/api/v1/devices/{userId}",
    params(("userId" = String, Path, description = "Owner of the new device")),
    request_body = CreateDeviceRequest,
    tag = "Devices",
    security(("bearer_auth" = [])),
    responses(
        (status = 201, body = Device),
        (status = 400, description = "Invalid request body"),
        (status = 403, description = "Not the caller's user id")
    )
)]
pub async fn create_device(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(user_id): Path<String>,
    ValidatedJson(request): ValidatedJson<CreateDeviceRequest>,
) -> Result<(StatusCode, Json<Device>), ApiError> {
    ensure_caller(&user, &user_id)?;
    let device = request.into_device(&user.id);
    DeviceRepository::new(&state.db).create(&device)?;

    tracing::info!(user_id = %user.id, device_id = %device.id, os = ?device.os, "Device registered");
    Ok((StatusCode::CREATED, Json(device)))
}

#[utoipa::path(
    put,
    path = "/api/v1/devices/{userId}/{deviceId}",
    params(
        ("userId" = String, Path, description = "Owner of the device"),
        ("deviceId" = String, Path, description = "Device identifier")
    ),
    request_body = UpdateDeviceRequest,
    tag = "Devices",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = Device),
        (status = 403, description = "Device belongs to another user"),
        (status = 404, description = "Device not found")
    )
)]
pub async fn update_device(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((user_id, device_id)): Path<(String, String)>,
    ValidatedJson(request): ValidatedJson<UpdateDeviceRequest>,
) -> Result<Json<Device>, ApiError> {
    ensure_caller(&user, &user_id)?;
    let repo = DeviceRepository::new(&state.db);
    let mut device = repo.get(&device_id).verify_owner(&user.id)?;
    request.apply(&mut device);
    repo.update(&device)?;
    Ok(Json(device))
}

#[utoipa::path(
    delete,
    path = "/api/v1/devices/{userId}/{deviceId}",
    params(
        ("userId" = String, Path, description = "Owner of the device"),
        ("deviceId" = String, Path, description = "Device identifier")
    ),
    tag = "Devices",
    security(("bearer_auth" = [])),
    responses(
        (status = 204, description = "Device and its identity links removed"),
        (status = 403, description = "Device belongs to another user"),
        (status = 404, description = "Device not found")
    )
)]
pub async fn delete_device(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((user_id, device_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    ensure_caller(&user, &user_id)?;
    let repo = DeviceRepository::new(&state.db);
    repo.get(&device_id).verify_owner(&user.id)?;
    let installations = repo.delete(&device_id)?;

    tracing::info!(
        user_id = %user.id,
        device_id = %device_id,
        installations = installations.len(),
        "Device deleted"
    );
    unregister_installations(&state, &installations).await;
    Ok(StatusCode::NO_CONTENT)
}
