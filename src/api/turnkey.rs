// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use super::validation::{validate_not_blank, ValidatedJson};
use crate::{
    error::ApiError,
    providers::{turnkey::Passkey, CreateSubOrganization, SubOrganization, TurnkeyError},
    state::AppState,
};

/// Passkey signup: one sub-organization per new wallet user.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubOrganizationRequest {
    /// Defaults to `userName`
    #[validate(length(min = 1, max = 100))]
    pub sub_org_name: Option<String>,
    #[validate(length(min = 1, max = 100), custom(function = "validate_not_blank"))]
    pub user_name: String,
    #[validate(email)]
    pub user_email: Option<String>,
    #[validate(nested)]
    pub passkey: Passkey,
}

impl From<TurnkeyError> for ApiError {
    fn from(err: TurnkeyError) -> Self {
        match err {
            TurnkeyError::Configuration(message) => {
                tracing::error!(error = %message, "Turnkey client misconfigured");
                ApiError::internal("Wallet provider is misconfigured")
            }
            other => {
                tracing::warn!(error = %other, "Turnkey sub-organization creation failed");
                ApiError::bad_gateway(format!("Wallet provider error: {other}"))
            }
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/turnkey/sub-organizations",
    request_body = CreateSubOrganizationRequest,
    tag = "Turnkey",
    responses(
        (status = 201, body = SubOrganization),
        (status = 400, description = "Invalid signup request"),
        (status = 502, description = "Turnkey did not complete the activity"),
        (status = 503, description = "Turnkey is not configured")
    )
)]
pub async fn create_sub_organization(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<CreateSubOrganizationRequest>,
) -> Result<(StatusCode, Json<SubOrganization>), ApiError> {
    let client = state
        .turnkey
        .as_deref()
        .ok_or_else(|| ApiError::service_unavailable("Turnkey is not configured"))?;

    let user_name = request.user_name.trim().to_string();
    let created = client
        .create_sub_organization(&CreateSubOrganization {
            sub_org_name: request.sub_org_name.unwrap_or_else(|| user_name.clone()),
            user_name,
            user_email: request.user_email,
            passkey: request.passkey,
        })
        .await?;

    tracing::info!(
        sub_organization_id = %created.sub_organization_id,
        root_user_id = %created.root_user_id,
        "Turnkey sub-organization created"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::test_state;
    use crate::config::TurnkeySettings;
    use crate::providers::{turnkey::PasskeyAttestation, TurnkeyClient};
    use p256::ecdsa::SigningKey;
    use p256::elliptic_curve::sec1::ToEncodedPoint;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PRIVATE_KEY: &str = "0303030303030303030303030303030303030303030303030303030303030303";

    fn client(base_url: &str) -> TurnkeyClient {
        let key = SigningKey::from_slice(&hex::decode(PRIVATE_KEY).unwrap()).unwrap();
        let public = hex::encode(key.verifying_key().as_affine().to_encoded_point(true).as_bytes());
        TurnkeyClient::new(&TurnkeySettings {
            base_url: base_url.to_string(),
            organization_id: "org-parent".into(),
            api_public_key: public,
            api_private_key: PRIVATE_KEY.into(),
        })
        .unwrap()
    }

    fn request() -> CreateSubOrganizationRequest {
        CreateSubOrganizationRequest {
            sub_org_name: None,
            user_name: " Dana ".into(),
            user_email: None,
            passkey: Passkey {
                authenticator_name: "Pixel".into(),
                challenge: "chal".into(),
                attestation: PasskeyAttestation {
                    credential_id: "cred".into(),
                    client_data_json: "cdj".into(),
                    attestation_object: "ao".into(),
                    transports: Vec::new(),
                },
            },
        }
    }

    #[tokio::test]
    async fn unconfigured_turnkey_is_unavailable() {
        let (state, _dir) = test_state();
        let err = create_sub_organization(State(state), ValidatedJson(request()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn completed_activity_returns_wallet() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/public/v1/submit/create_sub_organization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "activity": {
                    "status": "ACTIVITY_STATUS_COMPLETED",
                    "result": {
                        "createSubOrganizationResultV7": {
                            "subOrganizationId": "sub-9",
                            "wallet": { "walletId": "w", "addresses": ["0xdana"] },
                            "rootUserIds": ["root-9"]
                        }
                    }
                }
            })))
            .mount(&mock)
            .await;
        let (state, _dir) = test_state();
        let state = state.with_turnkey(client(&mock.uri()));

        let (status, Json(created)) = create_sub_organization(State(state), ValidatedJson(request()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.wallet_address, "0xdana");

        let body: serde_json::Value =
            serde_json::from_slice(&mock.received_requests().await.unwrap()[0].body).unwrap();
        assert_eq!(body["parameters"]["subOrganizationName"], "Dana");
    }

    #[tokio::test]
    async fn failed_activity_is_bad_gateway() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "activity": { "status": "ACTIVITY_STATUS_FAILED" }
            })))
            .mount(&mock)
            .await;
        let (state, _dir) = test_state();
        let state = state.with_turnkey(client(&mock.uri()));

        let err = create_sub_organization(State(state), ValidatedJson(request()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
    }
}
