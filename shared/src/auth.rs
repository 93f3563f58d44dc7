use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::CognitoConfig;
use crate::error::{DashboardError, IdentityError};
use crate::store::DataStore;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthTokens {
    pub id_token: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i32,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: AuthTokens,
    pub uid: String,
    /// Where the browser goes next: the dashboard, or the pending-approval page.
    pub redirect: String,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub access_token: String,
}

/// Identity provider collaborator.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthTokens, IdentityError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError>;

    async fn set_disabled(&self, uid: &str, disabled: bool) -> Result<(), IdentityError>;

    /// uid (`sub`) of the account an access token belongs to, if the token is live.
    async fn verify_access_token(&self, access_token: &str) -> Result<String, IdentityError>;
}

type HmacSha256 = Hmac<Sha256>;

/// Compute the SECRET_HASH for Cognito authentication
fn compute_secret_hash(username: &str, client_id: &str, client_secret: &str) -> String {
    let message = format!("{}{}", username, client_id);
    let mut mac = HmacSha256::new_from_slice(client_secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(message.as_bytes());
    let result = mac.finalize();
    general_purpose::STANDARD.encode(result.into_bytes())
}

/// Turn a Cognito error dump into something an admin can act on.
fn friendly_sign_in_message(error_message: &str) -> String {
    if error_message.contains("NotAuthorizedException") {
        "Incorrect username or password".to_string()
    } else if error_message.contains("UserNotConfirmedException") {
        "Please verify your email before logging in".to_string()
    } else if error_message.contains("UserNotFoundException") {
        "No account found for this username".to_string()
    } else if error_message.contains("PasswordResetRequiredException") {
        "Password reset required".to_string()
    } else if error_message.contains("TooManyRequestsException") {
        "Too many login attempts. Please try again later".to_string()
    } else {
        "Login failed. Please check your credentials".to_string()
    }
}

pub struct CognitoIdentity {
    client: CognitoClient,
    config: CognitoConfig,
}

impl CognitoIdentity {
    pub fn new(client: CognitoClient, config: CognitoConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl IdentityProvider for CognitoIdentity {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthTokens, IdentityError> {
        let secret_hash =
            compute_secret_hash(email, &self.config.client_id, &self.config.client_secret);

        let response = self
            .client
            .initiate_auth()
            .auth_flow(aws_sdk_cognitoidentityprovider::types::AuthFlowType::UserPasswordAuth)
            .client_id(&self.config.client_id)
            .auth_parameters("USERNAME", email)
            .auth_parameters("PASSWORD", password)
            .auth_parameters("SECRET_HASH", &secret_hash)
            .send()
            .await
            .map_err(|e| {
                let error_message = format!("{:?}", e);
                tracing::error!("Cognito authentication error: {}", error_message);
                IdentityError::Rejected(friendly_sign_in_message(&error_message))
            })?;

        let auth_result = response.authentication_result().ok_or_else(|| {
            tracing::error!("No authentication result returned");
            IdentityError::Rejected("No authentication result returned".to_string())
        })?;

        Ok(AuthTokens {
            id_token: auth_result.id_token().unwrap_or_default().to_string(),
            access_token: auth_result.access_token().unwrap_or_default().to_string(),
            refresh_token: auth_result.refresh_token().unwrap_or_default().to_string(),
            expires_in: auth_result.expires_in(),
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        self.client
            .global_sign_out()
            .access_token(access_token)
            .send()
            .await
            .map_err(|e| IdentityError::Backend(format!("{:?}", e)))?;
        Ok(())
    }

    async fn set_disabled(&self, uid: &str, disabled: bool) -> Result<(), IdentityError> {
        let result = if disabled {
            self.client
                .admin_disable_user()
                .user_pool_id(&self.config.user_pool_id)
                .username(uid)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| format!("{:?}", e))
        } else {
            self.client
                .admin_enable_user()
                .user_pool_id(&self.config.user_pool_id)
                .username(uid)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| format!("{:?}", e))
        };

        result.map_err(|error_message| {
            tracing::error!("Cognito enable/disable error for {}: {}", uid, error_message);
            if error_message.contains("UserNotFoundException") {
                IdentityError::Rejected("User not found".to_string())
            } else {
                IdentityError::Backend(error_message)
            }
        })
    }

    async fn verify_access_token(&self, access_token: &str) -> Result<String, IdentityError> {
        let response = self
            .client
            .get_user()
            .access_token(access_token)
            .send()
            .await
            .map_err(|e| {
                let error_message = format!("{:?}", e);
                if error_message.contains("NotAuthorizedException") {
                    IdentityError::Rejected("Session expired. Please log in again.".to_string())
                } else {
                    tracing::error!("Cognito get_user error: {}", error_message);
                    IdentityError::Backend(error_message)
                }
            })?;

        response
            .user_attributes()
            .iter()
            .find(|attr| attr.name() == "sub")
            .and_then(|attr| attr.value())
            .map(|sub| sub.to_string())
            .ok_or_else(|| IdentityError::Backend("Cognito user has no sub".to_string()))
    }
}

/// username -> uid -> email -> sign in -> approval check. The first failing
/// step aborts the chain with its own message.
pub async fn sign_in_with_username(
    store: &dyn DataStore,
    identity: &dyn IdentityProvider,
    request: &LoginRequest,
) -> Result<LoginResponse, DashboardError> {
    let username = request.username.trim();
    let password = request.password.trim();
    if username.is_empty() || password.is_empty() {
        return Err(DashboardError::BadRequest(
            "Please enter username and password.".to_string(),
        ));
    }

    let uid = store
        .lookup_username(username)
        .await?
        .ok_or_else(|| DashboardError::Lookup("Username not found.".to_string()))?;

    let email = store
        .get_user(&uid)
        .await?
        .and_then(|user| user.email)
        .filter(|email| !email.is_empty())
        .ok_or_else(|| DashboardError::Lookup("User email not found.".to_string()))?;

    tracing::info!("Authenticating user: {}", username);
    let tokens = identity.sign_in(&email, password).await?;

    // re-read: approval may have changed while signing in
    let is_approved = store
        .get_user(&uid)
        .await?
        .map(|user| user.is_approved)
        .unwrap_or(false);

    let redirect = if is_approved {
        "/admin/dashboard"
    } else {
        "/pending"
    };
    tracing::info!("Authentication successful for {} -> {}", username, redirect);

    Ok(LoginResponse {
        tokens,
        uid,
        redirect: redirect.to_string(),
    })
}

fn body_text(body: &Body) -> &str {
    match body {
        Body::Text(text) => text,
        Body::Binary(bytes) => std::str::from_utf8(bytes).unwrap_or(""),
        Body::Empty => "",
    }
}

/// Handle admin login by username
pub async fn login(
    store: &dyn DataStore,
    identity: &dyn IdentityProvider,
    body: &Body,
) -> Result<Response<Body>, Error> {
    tracing::info!("Login request received");

    let login_request: LoginRequest = match serde_json::from_str(body_text(body)) {
        Ok(req) => req,
        Err(e) => {
            tracing::error!("Failed to parse request body: {}", e);
            return DashboardError::BadRequest(format!("Invalid request body: {}", e))
                .into_response();
        }
    };

    match sign_in_with_username(store, identity, &login_request).await {
        Ok(login_response) => Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(serde_json::to_string(&login_response)?.into())
            .map_err(Box::new)?),
        Err(e) => {
            tracing::warn!("Login failed: {}", e);
            e.into_response()
        }
    }
}

/// Revoke the caller's tokens
pub async fn logout(identity: &dyn IdentityProvider, body: &Body) -> Result<Response<Body>, Error> {
    let request: LogoutRequest = match serde_json::from_str(body_text(body)) {
        Ok(req) => req,
        Err(e) => {
            return DashboardError::BadRequest(format!("Invalid request body: {}", e))
                .into_response();
        }
    };

    if let Err(e) = identity.sign_out(&request.access_token).await {
        tracing::error!("Logout failed: {}", e);
        return DashboardError::from(e).into_response();
    }

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::json!({"success": true}).to_string().into())
        .map_err(Box::new)?)
}
