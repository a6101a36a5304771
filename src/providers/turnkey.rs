// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Turnkey API client for passkey-backed wallet signup.
//!
//! Requests are authenticated with an API key stamp: the P-256 ECDSA
//! signature of the exact request body, wrapped in a JSON document and sent
//! base64url-encoded in the `X-Stamp` header.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64ct::{Base64UrlUnpadded, Encoding};
use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;
use validator::Validate;

use crate::config::TurnkeySettings;

const CREATE_SUB_ORGANIZATION_PATH: &str = "/public/v1/submit/create_sub_organization";
const CREATE_SUB_ORGANIZATION_TYPE: &str = "ACTIVITY_TYPE_CREATE_SUB_ORGANIZATION_V7";
const ACTIVITY_STATUS_COMPLETED: &str = "ACTIVITY_STATUS_COMPLETED";
const STAMP_SCHEME: &str = "SIGNATURE_SCHEME_TK_API_P256";
const ETHEREUM_PATH: &str = "m/44'/60'/0'/0/0";
const DEFAULT_WALLET_NAME: &str = "Default Wallet";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum TurnkeyError {
    #[error("Turnkey configuration invalid: {0}")]
    Configuration(String),

    #[error("Turnkey request failed: {0}")]
    Request(String),

    #[error("Turnkey returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Turnkey activity did not complete: {0}")]
    ActivityNotCompleted(String),

    #[error("Turnkey response was invalid: {0}")]
    InvalidResponse(String),
}

/// WebAuthn attestation produced by the client during passkey creation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PasskeyAttestation {
    #[validate(length(min = 1))]
    pub credential_id: String,
    #[validate(length(min = 1))]
    pub client_data_json: String,
    #[validate(length(min = 1))]
    pub attestation_object: String,
    /// e.g. `AUTHENTICATOR_TRANSPORT_INTERNAL`
    #[serde(default)]
    pub transports: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Passkey {
    #[validate(length(min = 1, max = 100))]
    pub authenticator_name: String,
    #[validate(length(min = 1))]
    pub challenge: String,
    #[validate(nested)]
    pub attestation: PasskeyAttestation,
}

/// Input for creating a user's sub-organization.
#[derive(Debug, Clone)]
pub struct CreateSubOrganization {
    pub sub_org_name: String,
    pub user_name: String,
    pub user_email: Option<String>,
    pub passkey: Passkey,
}

/// Identifiers of a newly created sub-organization.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubOrganization {
    pub sub_organization_id: String,
    pub root_user_id: String,
    pub wallet_address: String,
}

#[derive(Debug, Deserialize)]
struct ActivityResponse {
    activity: Activity,
}

#[derive(Debug, Deserialize)]
struct Activity {
    status: String,
    #[serde(default)]
    result: Option<ActivityResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityResult {
    #[serde(default)]
    create_sub_organization_result_v7: Option<CreateSubOrganizationResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSubOrganizationResult {
    sub_organization_id: String,
    #[serde(default)]
    wallet: Option<WalletResult>,
    #[serde(default)]
    root_user_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WalletResult {
    #[serde(default)]
    addresses: Vec<String>,
}

#[derive(Clone)]
pub struct TurnkeyClient {
    base_url: String,
    organization_id: String,
    public_key_hex: String,
    signing_key: SigningKey,
    http: Client,
}

impl TurnkeyClient {
    /// Build a client, checking that the key pair is consistent.
    pub fn new(settings: &TurnkeySettings) -> Result<Self, TurnkeyError> {
        let private_bytes = hex::decode(settings.api_private_key.trim())
            .map_err(|e| TurnkeyError::Configuration(format!("private key is not hex: {e}")))?;
        let signing_key = SigningKey::from_slice(&private_bytes)
            .map_err(|e| TurnkeyError::Configuration(format!("invalid P-256 private key: {e}")))?;

        let derived = hex::encode(
            signing_key
                .verifying_key()
                .as_affine()
                .to_encoded_point(true)
                .as_bytes(),
        );
        let configured = settings.api_public_key.trim().to_ascii_lowercase();
        if derived != configured {
            return Err(TurnkeyError::Configuration(
                "public key does not match private key".to_string(),
            ));
        }

        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TurnkeyError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: settings.base_url.clone(),
            organization_id: settings.organization_id.clone(),
            public_key_hex: derived,
            signing_key,
            http,
        })
    }

    /// Create a sub-organization with one passkey root user and an
    /// Ethereum wallet.
    pub async fn create_sub_organization(
        &self,
        request: &CreateSubOrganization,
    ) -> Result<SubOrganization, TurnkeyError> {
        let mut root_user = json!({
            "userName": request.user_name,
            "apiKeys": [],
            "authenticators": [request.passkey],
            "oauthProviders": [],
        });
        if let Some(email) = &request.user_email {
            root_user["userEmail"] = Value::String(email.clone());
        }

        let payload = json!({
            "type": CREATE_SUB_ORGANIZATION_TYPE,
            "timestampMs": timestamp_ms().to_string(),
            "organizationId": self.organization_id,
            "parameters": {
                "subOrganizationName": request.sub_org_name,
                "rootUsers": [root_user],
                "rootQuorumThreshold": 1,
                "wallet": {
                    "walletName": DEFAULT_WALLET_NAME,
                    "accounts": [{
                        "curve": "CURVE_SECP256K1",
                        "pathFormat": "PATH_FORMAT_BIP32",
                        "path": ETHEREUM_PATH,
                        "addressFormat": "ADDRESS_FORMAT_ETHEREUM",
                    }],
                },
            },
        });

        let response: ActivityResponse = self
            .stamped_post(CREATE_SUB_ORGANIZATION_PATH, &payload)
            .await?;

        if response.activity.status != ACTIVITY_STATUS_COMPLETED {
            return Err(TurnkeyError::ActivityNotCompleted(response.activity.status));
        }

        let result = response
            .activity
            .result
            .and_then(|r| r.create_sub_organization_result_v7)
            .ok_or_else(|| {
                TurnkeyError::InvalidResponse("missing createSubOrganizationResultV7".to_string())
            })?;
        let root_user_id = result
            .root_user_ids
            .into_iter()
            .next()
            .ok_or_else(|| TurnkeyError::InvalidResponse("missing root user id".to_string()))?;
        let wallet_address = result
            .wallet
            .and_then(|w| w.addresses.into_iter().next())
            .ok_or_else(|| TurnkeyError::InvalidResponse("missing wallet address".to_string()))?;

        Ok(SubOrganization {
            sub_organization_id: result.sub_organization_id,
            root_user_id,
            wallet_address,
        })
    }

    /// `X-Stamp` header value for a request body.
    pub fn stamp(&self, body: &[u8]) -> String {
        let signature: Signature = self.signing_key.sign(body);
        let stamp = json!({
            "publicKey": self.public_key_hex,
            "scheme": STAMP_SCHEME,
            "signature": hex::encode(signature.to_der().as_bytes()),
        });
        Base64UrlUnpadded::encode_string(stamp.to_string().as_bytes())
    }

    async fn stamped_post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        payload: &Value,
    ) -> Result<T, TurnkeyError> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| TurnkeyError::Request(format!("serialize body failed: {e}")))?;
        let stamp = self.stamp(&body);

        let response = self
            .http
            .post(format!("{}{}", self.base_url.trim_end_matches('/'), path))
            .header("Content-Type", "application/json")
            .header("X-Stamp", stamp)
            .body(body)
            .send()
            .await
            .map_err(|e| TurnkeyError::Request(format!("POST {path} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TurnkeyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| TurnkeyError::InvalidResponse(format!("POST {path} invalid JSON: {e}")))
    }
}

fn timestamp_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::{signature::Verifier, VerifyingKey};
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PRIVATE_KEY: &str = "0101010101010101010101010101010101010101010101010101010101010101";

    fn public_key_for(private_hex: &str) -> String {
        let key = SigningKey::from_slice(&hex::decode(private_hex).unwrap()).unwrap();
        hex::encode(key.verifying_key().as_affine().to_encoded_point(true).as_bytes())
    }

    fn settings(base_url: &str) -> TurnkeySettings {
        TurnkeySettings {
            base_url: base_url.to_string(),
            organization_id: "org-parent".to_string(),
            api_public_key: public_key_for(PRIVATE_KEY),
            api_private_key: PRIVATE_KEY.to_string(),
        }
    }

    fn request() -> CreateSubOrganization {
        CreateSubOrganization {
            sub_org_name: "alice".to_string(),
            user_name: "Alice".to_string(),
            user_email: Some("alice@example.com".to_string()),
            passkey: Passkey {
                authenticator_name: "iPhone".to_string(),
                challenge: "challenge".to_string(),
                attestation: PasskeyAttestation {
                    credential_id: "cred".to_string(),
                    client_data_json: "cdj".to_string(),
                    attestation_object: "ao".to_string(),
                    transports: vec!["AUTHENTICATOR_TRANSPORT_INTERNAL".to_string()],
                },
            },
        }
    }

    #[test]
    fn mismatched_public_key_is_rejected() {
        let mut s = settings("https://api.turnkey.com");
        s.api_public_key = public_key_for(
            "0202020202020202020202020202020202020202020202020202020202020202",
        );
        assert!(matches!(
            TurnkeyClient::new(&s),
            Err(TurnkeyError::Configuration(_))
        ));
    }

    #[test]
    fn stamp_carries_verifiable_der_signature() {
        let client = TurnkeyClient::new(&settings("https://api.turnkey.com")).unwrap();
        let body = br#"{"hello":"world"}"#;
        let stamp = client.stamp(body);

        let decoded = Base64UrlUnpadded::decode_vec(&stamp).unwrap();
        let stamp: Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(stamp["scheme"], STAMP_SCHEME);
        assert_eq!(stamp["publicKey"], public_key_for(PRIVATE_KEY));

        let der = hex::decode(stamp["signature"].as_str().unwrap()).unwrap();
        let signature = Signature::from_der(&der).unwrap();
        let key_bytes = hex::decode(stamp["publicKey"].as_str().unwrap()).unwrap();
        let verifying_key = VerifyingKey::from_sec1_bytes(&key_bytes).unwrap();
        assert!(verifying_key.verify(body, &signature).is_ok());
    }

    #[tokio::test]
    async fn create_sub_organization_parses_completed_activity() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CREATE_SUB_ORGANIZATION_PATH))
            .and(header_exists("X-Stamp"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "activity": {
                    "id": "act-1",
                    "status": "ACTIVITY_STATUS_COMPLETED",
                    "result": {
                        "createSubOrganizationResultV7": {
                            "subOrganizationId": "sub-1",
                            "wallet": { "walletId": "w-1", "addresses": ["0xabc"] },
                            "rootUserIds": ["root-1"]
                        }
                    }
                }
            })))
            .expect(1)
            .mount(&mock)
            .await;

        let client = TurnkeyClient::new(&settings(&mock.uri())).unwrap();
        let created = client.create_sub_organization(&request()).await.unwrap();
        assert_eq!(
            created,
            SubOrganization {
                sub_organization_id: "sub-1".into(),
                root_user_id: "root-1".into(),
                wallet_address: "0xabc".into(),
            }
        );

        let received = &mock.received_requests().await.unwrap()[0];
        let body: Value = serde_json::from_slice(&received.body).unwrap();
        assert_eq!(body["type"], CREATE_SUB_ORGANIZATION_TYPE);
        assert_eq!(body["organizationId"], "org-parent");
        assert_eq!(body["parameters"]["rootQuorumThreshold"], 1);
        assert_eq!(
            body["parameters"]["wallet"]["accounts"][0]["path"],
            ETHEREUM_PATH
        );
        let root = &body["parameters"]["rootUsers"][0];
        assert_eq!(root["userEmail"], "alice@example.com");
        assert_eq!(
            root["authenticators"][0]["attestation"]["credentialId"],
            "cred"
        );
    }

    #[tokio::test]
    async fn pending_activity_is_not_completed() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "activity": { "id": "act-1", "status": "ACTIVITY_STATUS_PENDING" }
            })))
            .mount(&mock)
            .await;

        let client = TurnkeyClient::new(&settings(&mock.uri())).unwrap();
        let err = client.create_sub_organization(&request()).await.unwrap_err();
        assert!(matches!(err, TurnkeyError::ActivityNotCompleted(s) if s == "ACTIVITY_STATUS_PENDING"));
    }
}
