// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use utoipa::ToSchema;
use validator::Validate;

use super::identities::owned_identity_by_xmtp_id;
use super::validation::ValidatedJson;
use crate::{
    auth::CurrentUser,
    error::ApiError,
    state::AppState,
    storage::{ConversationMetadata, ConversationMetadataRepository, MetadataPatch},
};

/// Fields to change; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMetadataRequest {
    pub pinned: Option<bool>,
    pub unread: Option<bool>,
    pub deleted: Option<bool>,
    /// `null` clears the read marker
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub read_until: Option<Option<DateTime<Utc>>>,
}

/// Distinguishes an explicit `null` from an absent field.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl From<UpdateMetadataRequest> for MetadataPatch {
    fn from(request: UpdateMetadataRequest) -> Self {
        Self {
            pinned: request.pinned,
            unread: request.unread,
            deleted: request.deleted,
            read_until: request.read_until,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/metadata/conversations/{xmtpId}",
    params(("xmtpId" = String, Path, description = "XMTP inbox id of the caller's identity")),
    tag = "Metadata",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = [ConversationMetadata]),
        (status = 403, description = "Inbox id is not the caller's")
    )
)]
pub async fn list_metadata(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(xmtp_id): Path<String>,
) -> Result<Json<Vec<ConversationMetadata>>, ApiError> {
    let identity = owned_identity_by_xmtp_id(&state, &user, &xmtp_id)?;
    let rows = ConversationMetadataRepository::new(&state.db).list_by_identity(&identity.id)?;
    Ok(Json(rows))
}

#[utoipa::path(
    get,
    path = "/api/v1/metadata/conversations/{xmtpId}/{conversationId}",
    params(
        ("xmtpId" = String, Path, description = "XMTP inbox id of the caller's identity"),
        ("conversationId" = String, Path, description = "XMTP conversation id")
    ),
    tag = "Metadata",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = ConversationMetadata),
        (status = 403, description = "Inbox id is not the caller's"),
        (status = 404, description = "No metadata stored for this conversation")
    )
)]
pub async fn get_metadata(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((xmtp_id, conversation_id)): Path<(String, String)>,
) -> Result<Json<ConversationMetadata>, ApiError> {
    let identity = owned_identity_by_xmtp_id(&state, &user, &xmtp_id)?;
    let metadata = ConversationMetadataRepository::new(&state.db)
        .get(&identity.id, &conversation_id)?
        .ok_or_else(|| ApiError::not_found("Conversation metadata not found"))?;
    Ok(Json(metadata))
}

#[utoipa::path(
    put,
    path = "/api/v1/metadata/conversations/{xmtpId}/{conversationId}",
    params(
        ("xmtpId" = String, Path, description = "XMTP inbox id of the caller's identity"),
        ("conversationId" = String, Path, description = "XMTP conversation id")
    ),
    request_body = UpdateMetadataRequest,
    tag = "Metadata",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = ConversationMetadata),
        (status = 403, description = "Inbox id is not the caller's")
    )
)]
pub async fn upsert_metadata(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((xmtp_id, conversation_id)): Path<(String, String)>,
    ValidatedJson(request): ValidatedJson<UpdateMetadataRequest>,
) -> Result<Json<ConversationMetadata>, ApiError> {
    let identity = owned_identity_by_xmtp_id(&state, &user, &xmtp_id)?;
    let metadata = ConversationMetadataRepository::new(&state.db).upsert(
        &identity.id,
        &conversation_id,
        request.into(),
    )?;
    Ok(Json(metadata))
}
