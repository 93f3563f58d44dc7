//! Admin backend: the privileged operations the dashboard cannot do with
//! its own credentials (identity disable/enable, push fan-out).

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;

use crate::auth::IdentityProvider;
use crate::error::DashboardError;
use crate::publicize;
use crate::push::PushSender;
use crate::store::DataStore;
use crate::types::UserPatch;

/// Header a service caller puts its shared key in.
pub const SERVICE_KEY_HEADER: &str = "X-Admin-Key";

/// Constant-time comparison of a presented service key against the configured one.
pub fn service_key_matches(expected: &str, presented: &str) -> bool {
    let tag = |key: &str| {
        Hmac::<Sha256>::new_from_slice(key.as_bytes())
            .map(|mut mac| {
                mac.update(b"alertify-admin-backend");
                mac
            })
            .ok()
    };
    match (tag(expected), tag(presented)) {
        (Some(expected), Some(presented)) => {
            presented.verify_slice(&expected.finalize().into_bytes()).is_ok()
        }
        _ => false,
    }
}

/// `{success, message?, error?}` as returned by every backend endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BackendReply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DisableUserRequest {
    pub uid: Option<String>,
    pub disable: Option<bool>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PublicizeRequest {
    #[serde(rename = "reportId")]
    pub report_id: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RegisterTokenRequest {
    pub uid: Option<String>,
    pub token: Option<String>,
}

/// The dashboard's view of the backend. `Err` means the call itself failed;
/// a backend-side failure arrives as `Ok` with `success: false`.
#[async_trait]
pub trait AdminBackend: Send + Sync {
    async fn disable_user(&self, uid: &str, disable: bool) -> Result<BackendReply, DashboardError>;

    async fn publicize_report(&self, report_id: &str) -> Result<BackendReply, DashboardError>;
}

/// The backend operations themselves, run in-process.
pub struct LocalBackend {
    store: Arc<dyn DataStore>,
    identity: Arc<dyn IdentityProvider>,
    push: Option<Arc<dyn PushSender>>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

impl LocalBackend {
    pub fn new(
        store: Arc<dyn DataStore>,
        identity: Arc<dyn IdentityProvider>,
        push: Option<Arc<dyn PushSender>>,
    ) -> Self {
        Self {
            store,
            identity,
            push,
        }
    }

    /// Identity provider first, then the stored flag.
    pub async fn handle_disable_user(
        &self,
        request: &DisableUserRequest,
    ) -> Result<BackendReply, DashboardError> {
        let (Some(uid), Some(disable)) = (non_empty(request.uid.as_deref()), request.disable)
        else {
            return Err(DashboardError::BadRequest(
                "Missing uid or disable".to_string(),
            ));
        };

        self.identity.set_disabled(uid, disable).await?;
        self.store
            .update_user(
                uid,
                &UserPatch {
                    disabled: Some(disable),
                    ..Default::default()
                },
            )
            .await?;

        tracing::info!("User {} disabled={}", uid, disable);
        Ok(BackendReply::ok(format!("User {} updated", uid)))
    }

    pub async fn handle_publicize(
        &self,
        request: &PublicizeRequest,
    ) -> Result<BackendReply, DashboardError> {
        let report_id = request.report_id.as_deref().unwrap_or("");
        publicize::publicize_report(self.store.as_ref(), self.push.as_deref(), report_id).await?;
        Ok(BackendReply::ok("Report publicized & notifications sent"))
    }

    pub async fn handle_register_token(
        &self,
        request: &RegisterTokenRequest,
    ) -> Result<BackendReply, DashboardError> {
        let (Some(uid), Some(token)) = (
            non_empty(request.uid.as_deref()),
            non_empty(request.token.as_deref()),
        ) else {
            return Err(DashboardError::BadRequest(
                "Missing uid or token".to_string(),
            ));
        };

        self.store
            .update_user(
                uid,
                &UserPatch {
                    fcm_token: Some(token.to_string()),
                    ..Default::default()
                },
            )
            .await?;

        tracing::info!("Registered push token for {}", uid);
        Ok(BackendReply::ok("Token saved"))
    }
}

/// Failures become `{success: false, error}` replies, the way the HTTP
/// endpoints answer.
fn into_reply(result: Result<BackendReply, DashboardError>) -> BackendReply {
    result.unwrap_or_else(|e| {
        tracing::error!("Backend operation failed: {}", e);
        BackendReply::failed(e.to_string())
    })
}

#[async_trait]
impl AdminBackend for LocalBackend {
    async fn disable_user(&self, uid: &str, disable: bool) -> Result<BackendReply, DashboardError> {
        let request = DisableUserRequest {
            uid: Some(uid.to_string()),
            disable: Some(disable),
        };
        Ok(into_reply(self.handle_disable_user(&request).await))
    }

    async fn publicize_report(&self, report_id: &str) -> Result<BackendReply, DashboardError> {
        let request = PublicizeRequest {
            report_id: Some(report_id.to_string()),
        };
        Ok(into_reply(self.handle_publicize(&request).await))
    }
}

/// A backend deployed elsewhere, reached over HTTP. Every call carries the
/// shared service key in `X-Admin-Key`.
pub struct HttpAdminBackend {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl HttpAdminBackend {
    pub fn new(base_url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            service_key: service_key.into(),
        }
    }

    fn request<T: Serialize>(&self, path: &str, payload: &T) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}/{}", self.base_url, path))
            .header(SERVICE_KEY_HEADER, &self.service_key)
            .json(payload)
    }

    async fn post<T: Serialize + Sync>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<BackendReply, DashboardError> {
        let url = format!("{}/{}", self.base_url, path);
        let resp = self
            .request(path, payload)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Error calling {}: {}", url, e);
                DashboardError::Backend(e.to_string())
            })?;

        // error statuses still carry a {success: false, error} body
        let status = resp.status();
        resp.json::<BackendReply>().await.map_err(|e| {
            tracing::error!("Unreadable reply from {} ({}): {}", url, status, e);
            DashboardError::Backend(format!("Unexpected backend reply ({})", status))
        })
    }
}

#[async_trait]
impl AdminBackend for HttpAdminBackend {
    async fn disable_user(&self, uid: &str, disable: bool) -> Result<BackendReply, DashboardError> {
        let request = DisableUserRequest {
            uid: Some(uid.to_string()),
            disable: Some(disable),
        };
        self.post("disable_user", &request).await
    }

    async fn publicize_report(&self, report_id: &str) -> Result<BackendReply, DashboardError> {
        let request = PublicizeRequest {
            report_id: Some(report_id.to_string()),
        };
        self.post("publicize_report", &request).await
    }
}

/// Serve a backend result as an HTTP reply.
pub fn reply_response(result: Result<BackendReply, DashboardError>) -> Result<Response<Body>, Error> {
    match result {
        Ok(reply) => Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(serde_json::to_string(&reply)?.into())
            .map_err(Box::new)?),
        Err(e) => {
            tracing::error!("Backend request failed: {}", e);
            e.into_response()
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Scriptable backend: succeeds unless told to fail, and records calls.
    #[derive(Default)]
    pub struct FakeBackend {
        publicized: Mutex<Vec<String>>,
        disabled: Mutex<Vec<(String, bool)>>,
        failure: Mutex<Option<String>>,
        unreachable: Mutex<bool>,
    }

    impl FakeBackend {
        pub fn publicized(&self) -> Vec<String> {
            self.publicized.lock().unwrap().clone()
        }

        pub fn disabled(&self) -> Vec<(String, bool)> {
            self.disabled.lock().unwrap().clone()
        }

        /// Reply `{success: false, error}` from now on.
        pub fn fail_with(&self, error: &str) {
            *self.failure.lock().unwrap() = Some(error.to_string());
        }

        /// Fail the call itself from now on.
        pub fn go_offline(&self) {
            *self.unreachable.lock().unwrap() = true;
        }

        fn reply(&self) -> Result<Option<BackendReply>, DashboardError> {
            if *self.unreachable.lock().unwrap() {
                return Err(DashboardError::Backend("connection refused".to_string()));
            }
            Ok(self
                .failure
                .lock()
                .unwrap()
                .as_ref()
                .map(|e| BackendReply::failed(e.clone())))
        }
    }

    #[async_trait]
    impl AdminBackend for FakeBackend {
        async fn disable_user(&self, uid: &str, disable: bool) -> Result<BackendReply, DashboardError> {
            if let Some(failed) = self.reply()? {
                return Ok(failed);
            }
            self.disabled
                .lock()
                .unwrap()
                .push((uid.to_string(), disable));
            Ok(BackendReply::ok(format!("User {} updated", uid)))
        }

        async fn publicize_report(&self, report_id: &str) -> Result<BackendReply, DashboardError> {
            if let Some(failed) = self.reply()? {
                return Ok(failed);
            }
            self.publicized.lock().unwrap().push(report_id.to_string());
            Ok(BackendReply::ok("Report publicized & notifications sent"))
        }
    }
}
