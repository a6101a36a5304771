// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims and authenticated caller representation.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Claims read from the bearer token.
///
/// `sub` is the caller's Turnkey user id.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    /// Subject (Turnkey user id)
    pub sub: String,

    /// Expiration timestamp
    #[serde(default)]
    pub exp: i64,

    /// Issuer
    #[serde(default)]
    pub iss: String,

    /// Session ID
    #[serde(default)]
    pub sid: Option<String>,
}

/// Authenticated caller extracted from a verified JWT.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// Turnkey user id (`sub` claim)
    pub subject: String,

    /// Session ID (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(skip)]
    pub issuer: String,

    /// Token expiration (Unix timestamp)
    #[serde(skip)]
    pub expires_at: i64,
}

impl AuthenticatedUser {
    pub fn from_claims(claims: TokenClaims) -> Self {
        Self {
            subject: claims.sub,
            session_id: claims.sid,
            issuer: claims.iss,
            expires_at: claims.exp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_claims_extracts_subject_and_session() {
        let claims: TokenClaims = serde_json::from_str(
            r#"{"sub":"tk_user_1","iat":1700000000,"exp":1700003600,"iss":"https://auth.example.com","sid":"sess_abc"}"#,
        )
        .unwrap();
        let user = AuthenticatedUser::from_claims(claims);
        assert_eq!(user.subject, "tk_user_1");
        assert_eq!(user.session_id.as_deref(), Some("sess_abc"));
        assert_eq!(user.issuer, "https://auth.example.com");
        assert_eq!(user.expires_at, 1700003600);
    }

    #[test]
    fn optional_claims_default() {
        let claims: TokenClaims = serde_json::from_str(r#"{"sub":"tk_user_1"}"#).unwrap();
        let user = AuthenticatedUser::from_claims(claims);
        assert!(user.session_id.is_none());
        assert_eq!(user.expires_at, 0);
    }
}
