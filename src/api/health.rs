// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// Outcome of a single dependency check.
#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Unavailable,
    /// Not configured; never fails readiness.
    Disabled,
}

impl CheckStatus {
    fn configured(present: bool) -> Self {
        if present {
            CheckStatus::Ok
        } else {
            CheckStatus::Disabled
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// "ok" or "degraded"
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    pub database: CheckStatus,
    /// Signing keys; disabled in development mode
    pub jwks: CheckStatus,
    pub notifications: CheckStatus,
    pub push: CheckStatus,
    pub turnkey: CheckStatus,
}

impl HealthChecks {
    fn ready(&self) -> bool {
        self.database != CheckStatus::Unavailable && self.jwks != CheckStatus::Unavailable
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

fn check_database(state: &AppState) -> CheckStatus {
    match state.db.health_check() {
        Ok(()) => CheckStatus::Ok,
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            CheckStatus::Unavailable
        }
    }
}

async fn check_jwks(state: &AppState) -> CheckStatus {
    let Some(jwks) = state.auth_config.jwks.as_ref() else {
        return CheckStatus::Disabled;
    };
    if jwks.is_cached().await {
        return CheckStatus::Ok;
    }
    match jwks.refresh().await {
        Ok(()) => CheckStatus::Ok,
        Err(e) => {
            tracing::warn!(error = %e, "JWKS refresh failed during health check");
            CheckStatus::Unavailable
        }
    }
}

/// Dependency report; 503 when the database or signing keys are unreachable.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = ReadyResponse),
        (status = 503, description = "A required dependency is unavailable", body = ReadyResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let checks = HealthChecks {
        database: check_database(&state),
        jwks: check_jwks(&state).await,
        notifications: CheckStatus::configured(state.notifications.is_some()),
        push: CheckStatus::configured(state.push.is_some()),
        turnkey: CheckStatus::configured(state.turnkey.is_some()),
    };

    if checks.ready() {
        let body = ReadyResponse {
            status: "ok".to_string(),
            checks,
        };
        (StatusCode::OK, Json(body))
    } else {
        let body = ReadyResponse {
            status: "degraded".to_string(),
            checks,
        };
        (StatusCode::SERVICE_UNAVAILABLE, Json(body))
    }
}

#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Process is up", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Ready to serve traffic", body = ReadyResponse),
        (status = 503, description = "Not ready", body = ReadyResponse)
    )
)]
pub async fn readiness(state: State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    health(state).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::test_state;
    use crate::auth::JwksManager;
    use crate::state::AuthConfig;

    #[tokio::test]
    async fn healthy_in_development_mode() {
        let (state, _dir) = test_state();
        let (status, Json(body)) = health(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
        assert_eq!(body.checks.database, CheckStatus::Ok);
        assert_eq!(body.checks.jwks, CheckStatus::Disabled);
        assert_eq!(body.checks.turnkey, CheckStatus::Disabled);
    }

    #[tokio::test]
    async fn unreachable_jwks_degrades_readiness() {
        let (state, _dir) = test_state();
        let state = state.with_auth_config(AuthConfig {
            jwks: Some(JwksManager::new("http://127.0.0.1:9/jwks.json")),
            issuer: None,
            audience: None,
        });
        let (status, Json(body)) = readiness(State(state)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "degraded");
        assert_eq!(body.checks.jwks, CheckStatus::Unavailable);
    }

    #[tokio::test]
    async fn liveness_is_ok() {
        assert_eq!(liveness().await.0.status, "ok");
    }
}
