// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::identities::owned_identity_by_xmtp_id;
use super::validation::{
    validate_avatar_url, validate_not_blank, validate_username, validate_xmtp_ids, ValidatedJson,
};
use crate::{
    auth::{Auth, CurrentUser},
    error::ApiError,
    models::{normalize_username, username_rejection},
    state::AppState,
    storage::{Profile, ProfileRepository},
};

pub const DEFAULT_SEARCH_LIMIT: usize = 20;
pub const MAX_SEARCH_LIMIT: usize = 50;

/// Profile fields for create and update.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRequest {
    #[validate(length(min = 1, max = 50), custom(function = "validate_not_blank"))]
    pub name: String,
    /// Normalized (NFKC, lower-case) before storage
    #[validate(custom(function = "validate_username"))]
    pub username: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[validate(custom(function = "validate_avatar_url"))]
    pub avatar: Option<String>,
}

impl ProfileRequest {
    pub fn into_profile(self, identity_id: &str) -> Profile {
        Profile::new(
            identity_id,
            self.name.trim(),
            normalize_username(&self.username),
            self.description,
            self.avatar,
        )
    }
}

/// Profile as exposed to other users.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xmtp_id: Option<String>,
    #[serde(flatten)]
    pub profile: Profile,
}

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BatchProfilesRequest {
    #[validate(length(min = 1, max = 100), custom(function = "validate_xmtp_ids"))]
    pub xmtp_ids: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchProfilesResponse {
    /// Profiles keyed by XMTP inbox id; unknown ids are omitted
    pub profiles: HashMap<String, Profile>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchQuery {
    /// Username prefix or display-name fragment
    pub query: Option<String>,
    /// Maximum results (default 20, at most 50)
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    pub profiles: Vec<PublicProfile>,
}

#[derive(Debug, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UsernameAvailability {
    pub username: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/profiles/{xmtpId}",
    params(("xmtpId" = String, Path, description = "XMTP inbox id")),
    tag = "Profiles",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = PublicProfile),
        (status = 404, description = "No profile for this inbox id")
    )
)]
pub async fn get_profile(
    State(state): State<AppState>,
    Auth(_caller): Auth,
    Path(xmtp_id): Path<String>,
) -> Result<Json<PublicProfile>, ApiError> {
    let profile = ProfileRepository::new(&state.db)
        .find_by_xmtp_id(&xmtp_id)?
        .ok_or_else(|| ApiError::not_found("Profile not found"))?;
    Ok(Json(PublicProfile {
        xmtp_id: Some(xmtp_id),
        profile,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/profiles/batch",
    request_body = BatchProfilesRequest,
    tag = "Profiles",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = BatchProfilesResponse),
        (status = 400, description = "Between 1 and 100 non-empty ids of at most 256 characters are required")
    )
)]
pub async fn batch_profiles(
    State(state): State<AppState>,
    Auth(_caller): Auth,
    ValidatedJson(request): ValidatedJson<BatchProfilesRequest>,
) -> Result<Json<BatchProfilesResponse>, ApiError> {
    let profiles = ProfileRepository::new(&state.db).find_many_by_xmtp_ids(&request.xmtp_ids)?;
    Ok(Json(BatchProfilesResponse { profiles }))
}

#[utoipa::path(
    get,
    path = "/api/v1/profiles/search",
    params(SearchQuery),
    tag = "Profiles",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = SearchResponse),
        (status = 400, description = "Missing query")
    )
)]
pub async fn search_profiles(
    State(state): State<AppState>,
    Auth(_caller): Auth,
    Query(params): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = params
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::bad_request("query must not be empty"))?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);

    let profiles = ProfileRepository::new(&state.db)
        .search(query, limit)?
        .into_iter()
        .map(|(profile, xmtp_id)| PublicProfile { xmtp_id, profile })
        .collect();
    Ok(Json(SearchResponse { profiles }))
}

#[utoipa::path(
    get,
    path = "/api/v1/profiles/check/{username}",
    params(("username" = String, Path, description = "Username to check")),
    tag = "Profiles",
    security(("bearer_auth" = [])),
    responses((status = 200, body = UsernameAvailability))
)]
pub async fn check_username(
    State(state): State<AppState>,
    Auth(_caller): Auth,
    Path(username): Path<String>,
) -> Result<Json<UsernameAvailability>, ApiError> {
    let username = normalize_username(&username);
    if let Some(reason) = username_rejection(&username) {
        return Ok(Json(UsernameAvailability {
            username,
            available: false,
            reason: Some(reason.to_string()),
        }));
    }

    let taken = ProfileRepository::new(&state.db)
        .username_owner(&username)?
        .is_some();
    Ok(Json(UsernameAvailability {
        username,
        available: !taken,
        reason: taken.then(|| "Username is already taken".to_string()),
    }))
}

#[utoipa::path(
    put,
    path = "/api/v1/profiles/{xmtpId}",
    params(("xmtpId" = String, Path, description = "XMTP inbox id of the caller's identity")),
    request_body = ProfileRequest,
    tag = "Profiles",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = PublicProfile),
        (status = 400, description = "Invalid profile fields"),
        (status = 403, description = "Inbox id is not the caller's"),
        (status = 409, description = "Username already taken")
    )
)]
pub async fn upsert_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(xmtp_id): Path<String>,
    ValidatedJson(request): ValidatedJson<ProfileRequest>,
) -> Result<Json<PublicProfile>, ApiError> {
    let identity = owned_identity_by_xmtp_id(&state, &user, &xmtp_id)?;
    let profile = ProfileRepository::new(&state.db).upsert(&request.into_profile(&identity.id))?;

    tracing::info!(identity_id = %identity.id, username = %profile.username, "Profile saved");
    Ok(Json(PublicProfile {
        xmtp_id: Some(xmtp_id),
        profile,
    }))
}
