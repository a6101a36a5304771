// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Rejections produced by the auth extractors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authorization header is required")]
    MissingAuthHeader,

    #[error("Authorization header must be 'Bearer <token>'")]
    InvalidAuthHeader,

    #[error("Token is malformed")]
    MalformedToken,

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token issuer is not accepted")]
    InvalidIssuer,

    #[error("Token audience is not accepted")]
    InvalidAudience,

    #[error("Token is not yet valid")]
    TokenNotYetValid,

    #[error("Failed to fetch signing keys: {0}")]
    JwksFetchError(String),

    #[error("Token was signed by an unknown key")]
    NoMatchingKey,

    #[error("Authentication failed: {0}")]
    InternalError(String),

    /// The token is valid but no user exists for its subject yet.
    #[error("No user exists for this account; complete onboarding first")]
    UserNotOnboarded,
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    code: &'static str,
}

impl AuthError {
    /// Stable machine-readable code returned next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::MalformedToken => "malformed_token",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::TokenExpired => "token_expired",
            AuthError::InvalidIssuer => "invalid_issuer",
            AuthError::InvalidAudience => "invalid_audience",
            AuthError::TokenNotYetValid => "token_not_yet_valid",
            AuthError::JwksFetchError(_) => "jwks_unavailable",
            AuthError::NoMatchingKey => "unknown_key",
            AuthError::InternalError(_) => "internal_error",
            AuthError::UserNotOnboarded => "user_not_onboarded",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::UserNotOnboarded => StatusCode::FORBIDDEN,
            AuthError::JwksFetchError(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Authentication failed");
        }
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            code: self.code(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body_of(err: AuthError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn missing_auth_returns_401() {
        let (status, body) = body_of(AuthError::MissingAuthHeader).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "missing_auth_header");
        assert_eq!(body["error"], "Authorization header is required");
    }

    #[tokio::test]
    async fn not_onboarded_returns_403() {
        let (status, body) = body_of(AuthError::UserNotOnboarded).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "user_not_onboarded");
    }

    #[test]
    fn unreachable_jwks_is_unavailable() {
        let err = AuthError::JwksFetchError("timeout".into());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.to_string(), "Failed to fetch signing keys: timeout");
    }
}
