// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JSON body extractor that runs `validator` rules.

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationError};

use crate::error::ApiError;
use crate::models::{normalize_username, username_rejection};

/// Like `Json<T>`, but rejects bodies failing `T::validate()`.
///
/// Malformed JSON and rule violations both map to 400.
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| ApiError::bad_request(rejection.body_text()))?;
        value
            .validate()
            .map_err(|e| ApiError::bad_request(format!("Validation failed: {e}")))?;
        Ok(Self(value))
    }
}

/// `validator` rule for usernames, applied to the normalized form.
pub fn validate_username(raw: &str) -> Result<(), ValidationError> {
    match username_rejection(&normalize_username(raw)) {
        None => Ok(()),
        Some(reason) => Err(ValidationError::new("username").with_message(reason.into())),
    }
}

/// `validator` rule rejecting blank strings.
pub fn validate_not_blank(raw: &str) -> Result<(), ValidationError> {
    if raw.trim().is_empty() {
        Err(ValidationError::new("blank").with_message("must not be blank".into()))
    } else {
        Ok(())
    }
}

/// `validator` rule for avatar links: absolute http(s) URLs only.
pub fn validate_avatar_url(raw: &str) -> Result<(), ValidationError> {
    match url::Url::parse(raw) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.host().is_some() => Ok(()),
        _ => Err(ValidationError::new("url").with_message("must be an http(s) URL".into())),
    }
}

/// Longest XMTP inbox id accepted in a list.
pub const MAX_XMTP_ID_LEN: usize = 256;

/// `validator` rule applied to each entry of an id list.
pub fn validate_xmtp_ids(ids: &[String]) -> Result<(), ValidationError> {
    if ids
        .iter()
        .any(|id| id.trim().is_empty() || id.len() > MAX_XMTP_ID_LEN)
    {
        Err(ValidationError::new("xmtp_id")
            .with_message(format!("ids must be 1 to {MAX_XMTP_ID_LEN} characters").into()))
    } else {
        Ok(())
    }
}
