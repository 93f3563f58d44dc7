//! Report status state machine.
//!
//! pending -> {Rejected | Respond}, Respond -> onRoute, onRoute -> Responded.
//! Rejected and Responded are terminal. Publicize is an admin-only side action
//! on any non-terminal report and never changes the status.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::backend::AdminBackend;
use crate::error::{DashboardError, StoreError};
use crate::store::DataStore;
use crate::types::Role;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportStatus {
    #[serde(rename = "pending")]
    Pending,
    Respond,
    Rejected,
    #[serde(rename = "onRoute")]
    OnRoute,
    Responded,
}

impl ReportStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ReportStatus::Pending),
            "Respond" => Some(ReportStatus::Respond),
            "Rejected" => Some(ReportStatus::Rejected),
            "onRoute" => Some(ReportStatus::OnRoute),
            "Responded" => Some(ReportStatus::Responded),
            _ => None,
        }
    }

    /// Stored wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Respond => "Respond",
            ReportStatus::Rejected => "Rejected",
            ReportStatus::OnRoute => "onRoute",
            ReportStatus::Responded => "Responded",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportStatus::Rejected | ReportStatus::Responded)
    }

    /// Target status of a forward action, if the action is valid from here.
    pub fn next(&self, action: ReportAction) -> Option<ReportStatus> {
        TRANSITIONS
            .iter()
            .find(|(from, a, _)| from == self && *a == action)
            .map(|(_, _, to)| *to)
    }

    /// Forward actions valid from this status, in display order.
    pub fn forward_actions(&self) -> Vec<ReportAction> {
        TRANSITIONS
            .iter()
            .filter(|(from, _, _)| from == self)
            .map(|(_, action, _)| *action)
            .collect()
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Admin-triggered actions on a report, keyed by their `data-action` value.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ReportAction {
    Reject,
    Respond,
    #[serde(rename = "onroute")]
    OnRoute,
    Responded,
    Publicize,
}

impl ReportAction {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "reject" => Some(ReportAction::Reject),
            "respond" => Some(ReportAction::Respond),
            "onroute" => Some(ReportAction::OnRoute),
            "responded" => Some(ReportAction::Responded),
            "publicize" => Some(ReportAction::Publicize),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportAction::Reject => "reject",
            ReportAction::Respond => "respond",
            ReportAction::OnRoute => "onroute",
            ReportAction::Responded => "responded",
            ReportAction::Publicize => "publicize",
        }
    }

    /// Button caption.
    pub fn label(&self) -> &'static str {
        match self {
            ReportAction::Reject => "Reject",
            ReportAction::Respond => "Respond",
            ReportAction::OnRoute => "On Route",
            ReportAction::Responded => "Responded",
            ReportAction::Publicize => "Publicize",
        }
    }
}

impl fmt::Display for ReportAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const TRANSITIONS: &[(ReportStatus, ReportAction, ReportStatus)] = &[
    (ReportStatus::Pending, ReportAction::Reject, ReportStatus::Rejected),
    (ReportStatus::Pending, ReportAction::Respond, ReportStatus::Respond),
    (ReportStatus::Respond, ReportAction::OnRoute, ReportStatus::OnRoute),
    (ReportStatus::OnRoute, ReportAction::Responded, ReportStatus::Responded),
];

/// Every action button a viewer with `role` may see for a report in `status`.
/// Unknown statuses get no controls at all.
pub fn available_actions(status: Option<ReportStatus>, role: Role) -> Vec<ReportAction> {
    let Some(status) = status else {
        return Vec::new();
    };
    let mut actions = status.forward_actions();
    if role == Role::Admin && !status.is_terminal() {
        actions.push(ReportAction::Publicize);
    }
    actions
}

/// What a successful action did. Nothing here is applied to local view state;
/// the change shows up once the store's next snapshot is rendered.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    StatusChanged {
        from: ReportStatus,
        to: ReportStatus,
    },
    Publicized {
        message: String,
    },
}

impl Outcome {
    pub fn message(&self) -> String {
        match self {
            Outcome::StatusChanged { to, .. } => format!("Report marked as {}", to),
            Outcome::Publicized { message } => message.clone(),
        }
    }
}

pub struct ReportWorkflow<'a> {
    store: &'a dyn DataStore,
    backend: &'a dyn AdminBackend,
}

impl<'a> ReportWorkflow<'a> {
    pub fn new(store: &'a dyn DataStore, backend: &'a dyn AdminBackend) -> Self {
        Self { store, backend }
    }

    /// Validate `action` against the report's current status and perform it.
    pub async fn apply(
        &self,
        report_id: &str,
        action: ReportAction,
        role: Role,
    ) -> Result<Outcome, DashboardError> {
        let report = self
            .store
            .get_report(report_id)
            .await?
            .ok_or_else(|| DashboardError::NotFound("Report not found".to_string()))?;

        if !available_actions(report.status, role).contains(&action) {
            tracing::warn!(
                "Rejected {} on report {} (status {:?}, role {})",
                action,
                report_id,
                report.status,
                role.as_str()
            );
            if action == ReportAction::Publicize && role != Role::Admin {
                return Err(DashboardError::Forbidden(
                    "Only admins can publicize reports".to_string(),
                ));
            }
            return Err(DashboardError::InvalidTransition {
                action,
                from: report.status,
            });
        }

        if action == ReportAction::Publicize {
            return self.publicize(report_id).await;
        }

        // available_actions only yields forward actions for a known status
        let (from, to) = match report.status.and_then(|s| s.next(action).map(|to| (s, to))) {
            Some(pair) => pair,
            None => {
                return Err(DashboardError::InvalidTransition {
                    action,
                    from: report.status,
                })
            }
        };

        match self.store.transition_report_status(report_id, from, to).await {
            Ok(()) => {
                tracing::info!("Report {} moved {} -> {}", report_id, from, to);
                Ok(Outcome::StatusChanged { from, to })
            }
            Err(e) => {
                tracing::error!("Error updating status of report {}: {}", report_id, e);
                match e {
                    StoreError::NotFound(_) => {
                        Err(DashboardError::NotFound("Report not found".to_string()))
                    }
                    other => Err(other.into()),
                }
            }
        }
    }

    async fn publicize(&self, report_id: &str) -> Result<Outcome, DashboardError> {
        let reply = self.backend.publicize_report(report_id).await.map_err(|e| {
            tracing::error!("Error calling publicize_report for {}: {}", report_id, e);
            DashboardError::Backend("Failed to publicize report.".to_string())
        })?;

        if reply.success {
            Ok(Outcome::Publicized {
                message: reply
                    .message
                    .unwrap_or_else(|| "Report publicized & notifications sent!".to_string()),
            })
        } else {
            let error = reply.error.unwrap_or_else(|| "Unknown error".to_string());
            tracing::error!("Publicize error for {}: {}", report_id, error);
            Err(DashboardError::Backend(format!(
                "Error publicizing report: {}",
                error
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::FakeBackend;
    use crate::store::memory::MemoryStore;
    use crate::types::Report;

    fn report(status: Option<ReportStatus>) -> Report {
        Report {
            reporter: Some("u1".into()),
            emergency: Some("Fire".into()),
            additional_message: Some("Smoke near the market".into()),
            image_url: Some("https://img.example/1.jpg".into()),
            status,
            ..Default::default()
        }
    }

    #[test]
    fn test_transition_table() {
        use ReportAction as A;
        use ReportStatus as S;

        assert_eq!(S::Pending.next(A::Reject), Some(S::Rejected));
        assert_eq!(S::Pending.next(A::Respond), Some(S::Respond));
        assert_eq!(S::Respond.next(A::OnRoute), Some(S::OnRoute));
        assert_eq!(S::OnRoute.next(A::Responded), Some(S::Responded));

        assert_eq!(S::Pending.next(A::OnRoute), None);
        assert_eq!(S::Respond.next(A::Respond), None);
        assert_eq!(S::Rejected.next(A::Respond), None);
        assert_eq!(S::Responded.next(A::Reject), None);
        assert_eq!(S::Pending.next(A::Publicize), None);
    }

    #[test]
    fn test_actions_per_status_for_admin() {
        use ReportAction::{OnRoute, Publicize, Reject, Respond, Responded};

        assert_eq!(
            available_actions(Some(ReportStatus::Pending), Role::Admin),
            vec![Reject, Respond, Publicize]
        );
        assert_eq!(
            available_actions(Some(ReportStatus::Respond), Role::Admin),
            vec![OnRoute, Publicize]
        );
        assert_eq!(
            available_actions(Some(ReportStatus::OnRoute), Role::Admin),
            vec![Responded, Publicize]
        );
        assert!(available_actions(Some(ReportStatus::Rejected), Role::Admin).is_empty());
        assert!(available_actions(Some(ReportStatus::Responded), Role::Admin).is_empty());
        assert!(available_actions(None, Role::Admin).is_empty());
    }

    #[test]
    fn test_publicize_is_role_gated() {
        for status in [
            ReportStatus::Pending,
            ReportStatus::Respond,
            ReportStatus::OnRoute,
        ] {
            assert!(available_actions(Some(status), Role::Admin).contains(&ReportAction::Publicize));
            assert!(!available_actions(Some(status), Role::User).contains(&ReportAction::Publicize));
        }
    }

    #[test]
    fn test_wire_values() {
        for status in [
            ReportStatus::Pending,
            ReportStatus::Respond,
            ReportStatus::Rejected,
            ReportStatus::OnRoute,
            ReportStatus::Responded,
        ] {
            assert_eq!(ReportStatus::parse(status.as_str()), Some(status));
            assert_eq!(
                serde_json::to_value(status).unwrap(),
                serde_json::Value::String(status.as_str().to_string())
            );
        }
        assert_eq!(ReportStatus::parse("responded"), None);
        assert_eq!(ReportAction::parse("onroute"), Some(ReportAction::OnRoute));
    }

    #[tokio::test]
    async fn test_reject_only_touches_status() {
        let store = MemoryStore::new();
        store.put_report("r1", report(Some(ReportStatus::Pending)));
        let backend = FakeBackend::default();
        let workflow = ReportWorkflow::new(&store, &backend);

        let outcome = workflow
            .apply("r1", ReportAction::Reject, Role::Admin)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::StatusChanged {
                from: ReportStatus::Pending,
                to: ReportStatus::Rejected
            }
        );

        let stored = store.report("r1").unwrap();
        assert_eq!(stored, report(Some(ReportStatus::Rejected)));
    }

    #[tokio::test]
    async fn test_repeated_transition_is_rejected_without_write() {
        let store = MemoryStore::new();
        store.put_report("r1", report(Some(ReportStatus::Pending)));
        let backend = FakeBackend::default();
        let workflow = ReportWorkflow::new(&store, &backend);

        workflow
            .apply("r1", ReportAction::Respond, Role::Admin)
            .await
            .unwrap();
        let writes = store.write_count();

        let err = workflow
            .apply("r1", ReportAction::Respond, Role::Admin)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DashboardError::InvalidTransition {
                action: ReportAction::Respond,
                from: Some(ReportStatus::Respond)
            }
        ));
        assert_eq!(store.write_count(), writes);
        assert_eq!(
            store.report("r1").unwrap().status,
            Some(ReportStatus::Respond)
        );
    }

    #[tokio::test]
    async fn test_failed_write_leaves_report_unchanged() {
        let store = MemoryStore::new();
        store.put_report("r1", report(Some(ReportStatus::OnRoute)));
        store.fail_writes(true);
        let backend = FakeBackend::default();
        let workflow = ReportWorkflow::new(&store, &backend);

        let err = workflow
            .apply("r1", ReportAction::Responded, Role::Admin)
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::Store(StoreError::Backend(_))));
        assert_eq!(
            store.report("r1").unwrap().status,
            Some(ReportStatus::OnRoute)
        );
    }

    #[tokio::test]
    async fn test_concurrent_transition_conflicts() {
        let store = MemoryStore::new();
        store.put_report("r1", report(Some(ReportStatus::Pending)));

        // Another admin got there first.
        let err = store
            .transition_report_status("r1", ReportStatus::Respond, ReportStatus::OnRoute)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(
            store.report("r1").unwrap().status,
            Some(ReportStatus::Pending)
        );
    }

    #[tokio::test]
    async fn test_publicize_reports_backend_result() {
        let store = MemoryStore::new();
        store.put_report("r1", report(Some(ReportStatus::Pending)));
        let backend = FakeBackend::default();
        let workflow = ReportWorkflow::new(&store, &backend);

        let outcome = workflow
            .apply("r1", ReportAction::Publicize, Role::Admin)
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Publicized { .. }));
        assert_eq!(backend.publicized(), vec!["r1".to_string()]);
        // no status change, no write
        assert_eq!(store.write_count(), 0);

        backend.fail_with("push service down");
        let err = workflow
            .apply("r1", ReportAction::Publicize, Role::Admin)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error publicizing report: push service down"
        );
    }

    #[tokio::test]
    async fn test_publicize_requires_admin() {
        let store = MemoryStore::new();
        store.put_report("r1", report(Some(ReportStatus::Pending)));
        let backend = FakeBackend::default();
        let workflow = ReportWorkflow::new(&store, &backend);

        let err = workflow
            .apply("r1", ReportAction::Publicize, Role::User)
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::Forbidden(_)));
        assert!(backend.publicized().is_empty());
    }

    #[tokio::test]
    async fn test_missing_report() {
        let store = MemoryStore::new();
        let backend = FakeBackend::default();
        let workflow = ReportWorkflow::new(&store, &backend);

        let err = workflow
            .apply("nope", ReportAction::Reject, Role::Admin)
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::NotFound(_)));
    }
}
