//! Push notifications through FCM HTTP v1, authorised with a Google service
//! account (RS256-signed JWT exchanged for an OAuth access token).

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const TOKEN_LIFETIME_SECS: i64 = 3600;
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("invalid service account: {0}")]
    Credentials(String),
    #[error("push request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("push rejected ({status}): {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, device_token: &str, notification: &Notification) -> Result<(), PushError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    TOKEN_LIFETIME_SECS
}

struct CachedToken {
    value: String,
    expires_at: i64,
}

pub struct FcmSender {
    http: reqwest::Client,
    account: ServiceAccount,
    signing_key: EncodingKey,
    token: Mutex<Option<CachedToken>>,
}

impl FcmSender {
    pub fn from_json(service_account_json: &str) -> Result<Self, PushError> {
        let account: ServiceAccount = serde_json::from_str(service_account_json)
            .map_err(|e| PushError::Credentials(e.to_string()))?;

        // PKCS#8 as issued by Google; PKCS#1 is accepted too
        let signing_key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
            .map_err(|e| PushError::Credentials(e.to_string()))?;

        Ok(Self {
            http: reqwest::Client::new(),
            signing_key,
            account,
            token: Mutex::new(None),
        })
    }

    fn signed_assertion(&self, now: i64) -> Result<String, PushError> {
        let claims = AssertionClaims {
            iss: &self.account.client_email,
            scope: FCM_SCOPE,
            aud: &self.account.token_uri,
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };

        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| PushError::Credentials(e.to_string()))
    }

    async fn access_token(&self) -> Result<String, PushError> {
        let now = chrono::Utc::now().timestamp();
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.expires_at - TOKEN_REFRESH_MARGIN_SECS > now {
                return Ok(token.value.clone());
            }
        }

        let assertion = self.signed_assertion(now)?;
        let resp = self
            .http
            .post(&self.account.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            tracing::error!("Service account token exchange failed: {}", body);
            return Err(PushError::Rejected { status, body });
        }

        let token: TokenResponse = resp.json().await?;
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: now + token.expires_in,
        });
        Ok(token.access_token)
    }
}

#[async_trait]
impl PushSender for FcmSender {
    async fn send(&self, device_token: &str, notification: &Notification) -> Result<(), PushError> {
        let access_token = self.access_token().await?;
        let url = format!(
            "https://fcm.googleapis.com/v1/projects/{}/messages:send",
            self.account.project_id
        );

        let message = serde_json::json!({
            "message": {
                "token": device_token,
                "notification": {
                    "title": notification.title,
                    "body": notification.body,
                },
                "data": notification.data,
            }
        });

        let resp = self
            .http
            .post(url)
            .bearer_auth(access_token)
            .json(&message)
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(PushError::Rejected { status, body })
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_account_defaults() {
        let account: ServiceAccount = serde_json::from_str(
            r#"{"project_id":"mp-alertify","client_email":"svc@example.iam","private_key":"x"}"#,
        )
        .unwrap();
        assert_eq!(account.token_uri, DEFAULT_TOKEN_URI);
    }

    const TEST_KEY: &str = include_str!("../testdata/fcm_test_key.pem");
    const TEST_PUBLIC_KEY: &str = include_str!("../testdata/fcm_test_key.pub.pem");

    fn sender() -> FcmSender {
        let account = serde_json::json!({
            "project_id": "mp-alertify",
            "client_email": "push@mp-alertify.iam.gserviceaccount.com",
            "private_key": TEST_KEY,
        });
        FcmSender::from_json(&account.to_string()).unwrap()
    }

    #[test]
    fn test_assertion_is_rs256_for_token_endpoint() {
        let now = chrono::Utc::now().timestamp();
        let assertion = sender().signed_assertion(now).unwrap();

        let header = jsonwebtoken::decode_header(&assertion).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);

        let key = jsonwebtoken::DecodingKey::from_rsa_pem(TEST_PUBLIC_KEY.as_bytes()).unwrap();
        let mut validation = jsonwebtoken::Validation::new(Algorithm::RS256);
        validation.set_audience(&[DEFAULT_TOKEN_URI]);
        validation.set_issuer(&["push@mp-alertify.iam.gserviceaccount.com"]);
        let claims = jsonwebtoken::decode::<serde_json::Value>(&assertion, &key, &validation)
            .unwrap()
            .claims;

        assert_eq!(claims["scope"], FCM_SCOPE);
        assert_eq!(claims["iat"], now);
        assert_eq!(claims["exp"], now + TOKEN_LIFETIME_SECS);
    }

    #[test]
    fn test_rejects_bad_private_key() {
        let err = FcmSender::from_json(
            r#"{"project_id":"p","client_email":"c","private_key":"not a pem"}"#,
        )
        .err()
        .unwrap();
        assert!(matches!(err, PushError::Credentials(_)));
    }
}
