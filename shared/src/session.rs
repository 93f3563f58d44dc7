use lambda_http::{Request, RequestExt};

use crate::error::DashboardError;
use crate::store::DataStore;
use crate::types::Role;

/// Who is calling, with the role resolved once and passed down explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub uid: String,
    pub role: Role,
}

/// `sub` claim placed on the request by the API Gateway JWT authorizer.
fn authorizer_sub(event: &Request) -> Option<String> {
    event
        .request_context_ref()
        .and_then(|ctx| ctx.authorizer())
        .and_then(|auth| auth.jwt.as_ref())
        .and_then(|jwt| jwt.claims.get("sub"))
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Caller uid. The authorizer claim always wins; `X-User-Id` is only read when
/// `dev_header` is on and the request carries no authorizer identity.
pub fn caller_uid(event: &Request, dev_header: bool) -> Option<String> {
    let sub = authorizer_sub(event);
    if sub.is_some() || !dev_header {
        return sub;
    }
    event
        .headers()
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

impl Session {
    /// Look up `users/{uid}/role`.
    pub async fn resolve(store: &dyn DataStore, uid: &str) -> Result<Session, DashboardError> {
        let user = store.get_user(uid).await.map_err(|e| {
            tracing::error!("Error checking role of {}: {}", uid, e);
            DashboardError::Forbidden("Failed to verify user role. Logging out.".to_string())
        })?;

        match user.and_then(|u| u.role) {
            Some(role) => Ok(Session {
                uid: uid.to_string(),
                role,
            }),
            None => Err(DashboardError::Forbidden(
                "Access denied. Admins only.".to_string(),
            )),
        }
    }

    /// Authenticated and admin, or the caller must be signed out.
    pub async fn require_admin(
        store: &dyn DataStore,
        event: &Request,
        dev_header: bool,
    ) -> Result<Session, DashboardError> {
        let uid = caller_uid(event, dev_header).ok_or(DashboardError::Unauthorized)?;
        let session = Self::resolve(store, &uid).await?;
        if session.role != Role::Admin {
            tracing::warn!("Non-admin {} tried to reach the dashboard", uid);
            return Err(DashboardError::Forbidden(
                "Access denied. Admins only.".to_string(),
            ));
        }
        Ok(session)
    }
}
