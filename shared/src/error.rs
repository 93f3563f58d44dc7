use lambda_http::{http::StatusCode, Body, Response};
use serde::Serialize;

use crate::workflow::{ReportAction, ReportStatus};

/// Failures of the data store collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    /// A conditional write lost against a concurrent change.
    #[error("record {0} was changed concurrently")]
    Conflict(String),
    #[error("store request failed: {0}")]
    Backend(String),
}

/// Failures of the identity provider collaborator.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("{0}")]
    Rejected(String),
    #[error("identity provider request failed: {0}")]
    Backend(String),
}

/// Everything that can go wrong while serving the dashboard.
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("authentication required")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("listener failed: {0}")]
    Subscription(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("cannot {action} a report that is {}", .from.as_ref().map(ReportStatus::as_str).unwrap_or("in an unknown state"))]
    InvalidTransition {
        action: ReportAction,
        from: Option<ReportStatus>,
    },
    /// A user action that does not apply to the user's current state.
    #[error("{0}")]
    NotApplicable(String),
    #[error("{0}")]
    Lookup(String),
    #[error("{0}")]
    Backend(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    error: &'a str,
}

impl DashboardError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DashboardError::Unauthorized => StatusCode::UNAUTHORIZED,
            DashboardError::Forbidden(_) => StatusCode::FORBIDDEN,
            DashboardError::BadRequest(_) => StatusCode::BAD_REQUEST,
            DashboardError::NotFound(_) | DashboardError::Store(StoreError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            DashboardError::Lookup(_) => StatusCode::NOT_FOUND,
            DashboardError::InvalidTransition { .. }
            | DashboardError::NotApplicable(_)
            | DashboardError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            DashboardError::Identity(IdentityError::Rejected(_)) => StatusCode::UNAUTHORIZED,
            DashboardError::Subscription(_)
            | DashboardError::Backend(_)
            | DashboardError::Store(StoreError::Backend(_))
            | DashboardError::Identity(IdentityError::Backend(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// JSON notice in the `{success: false, error}` shape the dashboard scripts read.
    pub fn into_response(self) -> Result<Response<Body>, lambda_http::Error> {
        let message = self.to_string();
        let body = ErrorBody {
            success: false,
            error: &message,
        };
        Ok(Response::builder()
            .status(self.status_code())
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(serde_json::to_string(&body)?.into())
            .map_err(Box::new)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_message() {
        let err = DashboardError::InvalidTransition {
            action: ReportAction::Respond,
            from: Some(ReportStatus::Respond),
        };
        assert_eq!(err.to_string(), "cannot respond a report that is Respond");
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_error_response_shape() {
        let resp = DashboardError::BadRequest("Missing reportId".into())
            .into_response()
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Missing reportId");
    }
}
