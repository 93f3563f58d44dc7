//! The single entry point behind every dashboard button: `{action, id}` in,
//! a notice for the admin out.

use serde::{Deserialize, Serialize};

use crate::backend::AdminBackend;
use crate::error::DashboardError;
use crate::session::Session;
use crate::store::DataStore;
use crate::users::{UserAction, UserAdmin};
use crate::workflow::{ReportAction, ReportWorkflow};

/// `data-action` / `data-id` of the clicked element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionTarget {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub id: String,
}

/// What the page shows after an action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub success: bool,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

impl Notice {
    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            title: title.into(),
            message: message.into(),
            html: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            title: "Error!".to_string(),
            message: message.into(),
            html: None,
        }
    }
}

/// Route an action to the report workflow or user administration. Nothing
/// here touches rendered state; changes arrive with the next snapshot.
pub async fn dispatch(
    store: &dyn DataStore,
    backend: &dyn AdminBackend,
    session: &Session,
    target: &ActionTarget,
) -> Result<Notice, DashboardError> {
    let id = target.id.trim();
    if id.is_empty() {
        return Err(DashboardError::BadRequest("Missing id".to_string()));
    }

    tracing::info!(
        "Action {} on {} by {} ({})",
        target.action,
        id,
        session.uid,
        session.role.as_str()
    );

    if let Some(action) = ReportAction::parse(&target.action) {
        let outcome = ReportWorkflow::new(store, backend)
            .apply(id, action, session.role)
            .await?;
        let title = match action {
            ReportAction::Publicize => "Publicized!",
            _ => "Updated",
        };
        return Ok(Notice::success(title, outcome.message()));
    }

    if let Some(action) = UserAction::parse(&target.action) {
        return UserAdmin::new(store, backend).apply(id, action).await;
    }

    tracing::warn!("Unknown action {:?}", target.action);
    Err(DashboardError::BadRequest(format!(
        "Unknown action: {}",
        target.action
    )))
}
