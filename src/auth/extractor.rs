// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated callers.
//!
//! Use the `Auth` extractor in handlers that only need a verified token,
//! and `CurrentUser` in handlers that need the caller's stored user:
//!
//! ```rust,ignore
//! async fn my_handler(CurrentUser(user): CurrentUser) -> impl IntoResponse {
//!     // user is the stored User bound to the token subject
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, decode_header, Validation};

use super::claims::TokenClaims;
use super::{AuthError, AuthenticatedUser, JwksManager};
use crate::state::{AppState, AuthConfig};
use crate::storage::{User, UserRepository};

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Extractor for authenticated callers.
///
/// ## Authentication Modes
///
/// - **Production mode** (`AUTH_JWKS_URL` set): full JWT verification against the JWKS
/// - **Development mode** (no JWKS): structure and expiry validation only (no signature check)
pub struct Auth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().cloned() {
            return Ok(Auth(user));
        }

        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::InvalidAuthHeader)?;

        let user = verify_jwt(token, &state.auth_config).await?;

        // Later extractors in the same request reuse the verified caller
        parts.extensions.insert(user.clone());
        Ok(Auth(user))
    }
}

/// Extractor resolving the caller's stored user.
///
/// Rejects with 403 when the token is valid but no user has been
/// onboarded for its subject.
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<User>().cloned() {
            return Ok(CurrentUser(user));
        }

        let Auth(caller) = Auth::from_request_parts(parts, state).await?;
        let user = UserRepository::new(&state.db)
            .find_by_turnkey_id(&caller.subject)
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to resolve user for token subject");
                AuthError::InternalError("user lookup failed".to_string())
            })?
            .ok_or(AuthError::UserNotOnboarded)?;

        parts.extensions.insert(user.clone());
        Ok(CurrentUser(user))
    }
}

/// Verify JWT and extract caller information.
async fn verify_jwt(token: &str, auth_config: &AuthConfig) -> Result<AuthenticatedUser, AuthError> {
    if let Some(ref jwks) = auth_config.jwks {
        verify_jwt_production(token, jwks, auth_config).await
    } else {
        verify_jwt_development(token)
    }
}

/// Production JWT verification with JWKS.
async fn verify_jwt_production(
    token: &str,
    jwks: &JwksManager,
    auth_config: &AuthConfig,
) -> Result<AuthenticatedUser, AuthError> {
    let header = decode_header(token).map_err(|_| AuthError::MalformedToken)?;

    let (decoding_key, algorithm) = if let Some(kid) = &header.kid {
        jwks.get_decoding_key(kid).await?
    } else {
        jwks.get_any_decoding_key().await?
    };

    let mut validation = Validation::new(algorithm);
    validation.leeway = CLOCK_SKEW_LEEWAY;

    if let Some(ref issuer) = auth_config.issuer {
        validation.set_issuer(&[issuer]);
    }

    if let Some(ref audience) = auth_config.audience {
        validation.set_audience(&[audience]);
    } else {
        validation.validate_aud = false;
    }

    let token_data = decode::<TokenClaims>(token, &decoding_key, &validation)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            jsonwebtoken::errors::ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
            jsonwebtoken::errors::ErrorKind::InvalidAudience => AuthError::InvalidAudience,
            jsonwebtoken::errors::ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
            _ => AuthError::MalformedToken,
        })?;

    Ok(AuthenticatedUser::from_claims(token_data.claims))
}

/// Development JWT verification (no signature check).
///
/// WARNING: This should only be used in development environments.
fn verify_jwt_development(token: &str) -> Result<AuthenticatedUser, AuthError> {
    let token_data = jsonwebtoken::dangerous::insecure_decode::<TokenClaims>(token)
        .map_err(|_| AuthError::MalformedToken)?;

    let claims = token_data.claims;
    if claims.sub.is_empty() {
        return Err(AuthError::MalformedToken);
    }

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .map_err(|e| AuthError::InternalError(e.to_string()))?;

    if claims.exp > 0 && claims.exp < now - CLOCK_SKEW_LEEWAY as i64 {
        return Err(AuthError::TokenExpired);
    }

    Ok(AuthenticatedUser::from_claims(claims))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, Device, DeviceIdentity, IdentityOnDevice, Onboarding};
    use crate::models::DeviceOs;
    use axum::http::Request;
    use tempfile::TempDir;

    /// Helper to create a test AppState with no JWKS (development mode)
    fn create_test_state() -> (AppState, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db = Database::open(&temp_dir.path().join("test.redb")).expect("Failed to open db");
        let state = AppState::new(db).with_auth_config(AuthConfig {
            jwks: None,
            issuer: Some("test".to_string()),
            audience: None,
        });
        (state, temp_dir)
    }

    /// Helper to create a test JWT token (unsigned, for testing only)
    fn create_test_jwt(subject: &str, exp: i64) -> String {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

        let header = r#"{"alg":"RS256","typ":"JWT"}"#;
        let claims = format!(
            r#"{{"sub":"{}","iat":1609459200,"exp":{},"iss":"test","sid":"sess_123"}}"#,
            subject, exp
        );

        let header_b64 = URL_SAFE_NO_PAD.encode(header.as_bytes());
        let claims_b64 = URL_SAFE_NO_PAD.encode(claims.as_bytes());

        // Signature doesn't matter in development mode
        format!("{}.{}.fake_signature", header_b64, claims_b64)
    }

    fn parts_with_token(token: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/test");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn auth_extractor_requires_auth_header() {
        let (state, _temp_dir) = create_test_state();
        let mut parts = parts_with_token(None);

        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::MissingAuthHeader)));
    }

    #[tokio::test]
    async fn auth_extractor_rejects_non_bearer_scheme() {
        let (state, _temp_dir) = create_test_state();
        let mut parts = Request::builder()
            .uri("/test")
            .header("Authorization", "Basic abc")
            .body(())
            .unwrap()
            .into_parts()
            .0;

        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::InvalidAuthHeader)));
    }

    #[tokio::test]
    async fn auth_extractor_succeeds_with_jwt() {
        let (state, _temp_dir) = create_test_state();
        let token = create_test_jwt("tk_user_123", 9999999999);
        let mut parts = parts_with_token(Some(&token));

        let result = Auth::from_request_parts(&mut parts, &state).await;
        let Auth(user) = result.unwrap();
        assert_eq!(user.subject, "tk_user_123");
        assert_eq!(user.session_id.as_deref(), Some("sess_123"));
    }

    #[tokio::test]
    async fn auth_extractor_rejects_expired_token() {
        let (state, _temp_dir) = create_test_state();
        let token = create_test_jwt("tk_user_123", 1609459300);
        let mut parts = parts_with_token(Some(&token));

        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::TokenExpired)));
    }

    #[tokio::test]
    async fn auth_extractor_rejects_garbage() {
        let (state, _temp_dir) = create_test_state();
        let mut parts = parts_with_token(Some("not-a-jwt"));

        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::MalformedToken)));
    }

    #[tokio::test]
    async fn auth_extractor_prefers_extensions() {
        let (state, _temp_dir) = create_test_state();
        let mut parts = parts_with_token(None);

        let user = AuthenticatedUser {
            subject: "from_middleware".to_string(),
            session_id: None,
            issuer: "middleware".to_string(),
            expires_at: 0,
        };
        parts.extensions.insert(user);

        let Auth(user) = Auth::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(user.subject, "from_middleware");
    }

    #[tokio::test]
    async fn current_user_requires_onboarding() {
        let (state, _temp_dir) = create_test_state();
        let token = create_test_jwt("tk_new", 9999999999);
        let mut parts = parts_with_token(Some(&token));

        let result = CurrentUser::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::UserNotOnboarded)));
    }

    #[tokio::test]
    async fn current_user_resolves_stored_user() {
        let (state, _temp_dir) = create_test_state();
        let user = User::new("tk_existing");
        let device = Device::new(&user.id, DeviceOs::Ios, None);
        let identity = DeviceIdentity::new(&user.id, None, Some("xmtp-1".into()));
        let link = IdentityOnDevice::new(&device.id, &identity.id, None);
        UserRepository::new(&state.db)
            .onboard(&Onboarding {
                user: user.clone(),
                device,
                identity,
                link,
                profile: None,
            })
            .unwrap();

        let token = create_test_jwt("tk_existing", 9999999999);
        let mut parts = parts_with_token(Some(&token));
        let CurrentUser(found) = CurrentUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert_eq!(found, user);
    }
}
