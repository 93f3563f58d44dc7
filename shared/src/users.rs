use crate::backend::AdminBackend;
use crate::dispatch::Notice;
use crate::error::DashboardError;
use crate::store::DataStore;
use crate::types::{User, UserPatch};
use crate::view;

/// Actions on a user card, keyed by their `data-action` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserAction {
    ViewDetails,
    Approve,
    Resubmit,
    Disable,
    Enable,
}

impl UserAction {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "view-details" => Some(UserAction::ViewDetails),
            "approve" => Some(UserAction::Approve),
            "resubmit" => Some(UserAction::Resubmit),
            "disable" => Some(UserAction::Disable),
            "enable" => Some(UserAction::Enable),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserAction::ViewDetails => "view-details",
            UserAction::Approve => "approve",
            UserAction::Resubmit => "resubmit",
            UserAction::Disable => "disable",
            UserAction::Enable => "enable",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            UserAction::ViewDetails => "View More Details",
            UserAction::Approve => "Approve",
            UserAction::Resubmit => "Resubmit ID",
            UserAction::Disable => "Disable",
            UserAction::Enable => "Enable",
        }
    }
}

/// Buttons for a user card: approval controls until approved, then the
/// disable/enable toggle.
pub fn user_actions(user: &User) -> Vec<UserAction> {
    let mut actions = vec![UserAction::ViewDetails];
    if !user.is_approved {
        actions.push(UserAction::Approve);
        actions.push(UserAction::Resubmit);
    } else if user.disabled {
        actions.push(UserAction::Enable);
    } else {
        actions.push(UserAction::Disable);
    }
    actions
}

fn display_name(uid: &str, user: &User) -> String {
    user.username.clone().unwrap_or_else(|| uid.to_string())
}

pub struct UserAdmin<'a> {
    store: &'a dyn DataStore,
    backend: &'a dyn AdminBackend,
}

impl<'a> UserAdmin<'a> {
    pub fn new(store: &'a dyn DataStore, backend: &'a dyn AdminBackend) -> Self {
        Self { store, backend }
    }

    pub async fn apply(&self, uid: &str, action: UserAction) -> Result<Notice, DashboardError> {
        let user = self
            .store
            .get_user(uid)
            .await?
            .ok_or_else(|| DashboardError::NotFound("User not found".to_string()))?;

        if !user_actions(&user).contains(&action) {
            tracing::warn!("Rejected {} on user {}", action.as_str(), uid);
            return Err(DashboardError::NotApplicable(format!(
                "Cannot {} {} in its current state",
                action.as_str(),
                display_name(uid, &user)
            )));
        }

        match action {
            UserAction::ViewDetails => Ok(Notice {
                success: true,
                title: format!("{} - Full Details", display_name(uid, &user)),
                message: String::new(),
                html: Some(view::render_user_details(&user)),
            }),
            UserAction::Approve => self.approve(uid, &user).await,
            UserAction::Resubmit => self.require_resubmission(uid, &user).await,
            UserAction::Disable | UserAction::Enable => self.toggle_disabled(uid, &user).await,
        }
    }

    async fn approve(&self, uid: &str, user: &User) -> Result<Notice, DashboardError> {
        let patch = UserPatch {
            is_approved: Some(true),
            ..Default::default()
        };
        self.store.update_user(uid, &patch).await.map_err(|e| {
            tracing::error!("Error approving {}: {}", uid, e);
            DashboardError::Backend("Failed to approve user.".to_string())
        })?;

        tracing::info!("✅ Approved user {}", uid);
        Ok(Notice::success(
            "Approved!",
            format!("{} has been approved.", display_name(uid, user)),
        ))
    }

    async fn require_resubmission(&self, uid: &str, user: &User) -> Result<Notice, DashboardError> {
        let patch = UserPatch {
            resubmit_id: Some(true),
            is_approved: Some(false),
            ..Default::default()
        };
        self.store.update_user(uid, &patch).await.map_err(|e| {
            tracing::error!("Error requesting ID resubmission from {}: {}", uid, e);
            DashboardError::Backend("Failed to update user data.".to_string())
        })?;

        Ok(Notice::success(
            "Success",
            format!(
                "{} must now resubmit ID. Approval reset.",
                display_name(uid, user)
            ),
        ))
    }

    /// The backend owns both the identity flag and the stored flag; a
    /// `success: false` reply changes nothing here.
    async fn toggle_disabled(&self, uid: &str, user: &User) -> Result<Notice, DashboardError> {
        let disable = !user.disabled;
        let reply = self.backend.disable_user(uid, disable).await.map_err(|e| {
            tracing::error!("Error calling disable_user for {}: {}", uid, e);
            DashboardError::Backend("Failed to update user status.".to_string())
        })?;

        if reply.success {
            Ok(Notice::success(
                "Success!",
                reply
                    .message
                    .unwrap_or_else(|| format!("User {} updated", uid)),
            ))
        } else {
            let error = reply.error.unwrap_or_else(|| "Unknown error".to_string());
            tracing::warn!("disable_user({}, {}) refused: {}", uid, disable, error);
            Err(DashboardError::Backend(error))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::FakeBackend;
    use crate::store::memory::MemoryStore;
    use crate::types::Role;

    fn member(approved: bool, disabled: bool) -> User {
        User {
            username: Some("juan".into()),
            name: Some("Juan Dela Cruz".into()),
            role: Some(Role::User),
            is_approved: approved,
            disabled,
            ..Default::default()
        }
    }

    #[test]
    fn test_card_actions_follow_approval() {
        use UserAction::*;
        assert_eq!(
            user_actions(&member(false, false)),
            vec![ViewDetails, Approve, Resubmit]
        );
        assert_eq!(user_actions(&member(true, false)), vec![ViewDetails, Disable]);
        assert_eq!(user_actions(&member(true, true)), vec![ViewDetails, Enable]);
    }

    #[tokio::test]
    async fn test_approve() {
        let store = MemoryStore::new();
        store.put_user("u1", member(false, false));
        let backend = FakeBackend::default();

        let notice = UserAdmin::new(&store, &backend)
            .apply("u1", UserAction::Approve)
            .await
            .unwrap();
        assert_eq!(notice.title, "Approved!");
        assert!(store.user("u1").unwrap().is_approved);
    }

    #[tokio::test]
    async fn test_resubmit_resets_approval() {
        let store = MemoryStore::new();
        store.put_user("u1", member(false, false));
        let backend = FakeBackend::default();

        UserAdmin::new(&store, &backend)
            .apply("u1", UserAction::Resubmit)
            .await
            .unwrap();
        let user = store.user("u1").unwrap();
        assert!(user.resubmit_id);
        assert!(!user.is_approved);
    }

    #[tokio::test]
    async fn test_disable_goes_through_backend() {
        let store = MemoryStore::new();
        store.put_user("u1", member(true, false));
        let backend = FakeBackend::default();

        let notice = UserAdmin::new(&store, &backend)
            .apply("u1", UserAction::Disable)
            .await
            .unwrap();
        assert_eq!(notice.message, "User u1 updated");
        assert_eq!(backend.disabled(), vec![("u1".to_string(), true)]);
    }

    #[tokio::test]
    async fn test_backend_refusal_changes_nothing() {
        let store = MemoryStore::new();
        store.put_user("u1", member(true, false));
        let backend = FakeBackend::default();
        backend.fail_with("not found");

        let err = UserAdmin::new(&store, &backend)
            .apply("u1", UserAction::Disable)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "not found");
        let user = store.user("u1").unwrap();
        assert!(!user.disabled);
        assert_eq!(user_actions(&user), vec![UserAction::ViewDetails, UserAction::Disable]);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        let store = MemoryStore::new();
        store.put_user("u1", member(true, true));
        let backend = FakeBackend::default();
        backend.go_offline();

        let err = UserAdmin::new(&store, &backend)
            .apply("u1", UserAction::Enable)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to update user status.");
    }

    #[tokio::test]
    async fn test_action_must_match_state() {
        let store = MemoryStore::new();
        store.put_user("u1", member(true, false));
        let backend = FakeBackend::default();

        let err = UserAdmin::new(&store, &backend)
            .apply("u1", UserAction::Approve)
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::NotApplicable(_)));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_view_details_is_read_only() {
        let store = MemoryStore::new();
        store.put_user("u1", member(false, false));
        let backend = FakeBackend::default();

        let notice = UserAdmin::new(&store, &backend)
            .apply("u1", UserAction::ViewDetails)
            .await
            .unwrap();
        assert_eq!(notice.title, "juan - Full Details");
        assert!(notice.html.unwrap().contains("Juan Dela Cruz"));
        assert_eq!(store.write_count(), 0);
    }
}
