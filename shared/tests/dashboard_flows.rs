use alertify_shared::auth::{AuthTokens, IdentityProvider};
use alertify_shared::backend::{AdminBackend, LocalBackend};
use alertify_shared::dispatch::{dispatch, ActionTarget};
use alertify_shared::error::IdentityError;
use alertify_shared::session::Session;
use alertify_shared::store::memory::MemoryStore;
use alertify_shared::store::Collection;
use alertify_shared::sync::{Page, Region, Sequence, ViewSync};
use alertify_shared::types::{Report, Role, User};
use alertify_shared::view;
use alertify_shared::workflow::ReportStatus;
use async_trait::async_trait;
use std::sync::Arc;

/// Identity provider that knows no accounts at all.
struct EmptyDirectory;

#[async_trait]
impl IdentityProvider for EmptyDirectory {
    async fn sign_in(&self, _email: &str, _password: &str) -> Result<AuthTokens, IdentityError> {
        Err(IdentityError::Rejected("Incorrect username or password".into()))
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), IdentityError> {
        Ok(())
    }

    async fn set_disabled(&self, _uid: &str, _disabled: bool) -> Result<(), IdentityError> {
        Err(IdentityError::Rejected("not found".into()))
    }

    async fn verify_access_token(&self, _access_token: &str) -> Result<String, IdentityError> {
        Err(IdentityError::Rejected("Session expired. Please log in again.".into()))
    }
}

fn admin() -> Session {
    Session {
        uid: "admin-1".to_string(),
        role: Role::Admin,
    }
}

fn region<'a>(regions: &'a [Region], target: &str) -> &'a str {
    regions
        .iter()
        .find(|r| r.target == target)
        .map(|r| r.html.as_str())
        .unwrap_or_else(|| panic!("no {} region", target))
}

fn setup() -> (Arc<MemoryStore>, LocalBackend) {
    let store = Arc::new(MemoryStore::new());
    let backend = LocalBackend::new(store.clone(), Arc::new(EmptyDirectory), None);
    (store, backend)
}

#[tokio::test]
async fn active_report_counter_follows_transitions() {
    let (store, backend) = setup();
    store.put_report(
        "r1",
        Report {
            status: Some(ReportStatus::Pending),
            ..Default::default()
        },
    );
    store.put_report(
        "r2",
        Report {
            status: Some(ReportStatus::OnRoute),
            ..Default::default()
        },
    );

    let mut sync = ViewSync::for_page(Page::Dashboard, Role::Admin);
    let regions = sync
        .publish(store.as_ref(), Collection::Reports, Sequence::from(1))
        .await;
    assert_eq!(region(&regions, view::ACTIVE_REPORTS), "2");

    let target = ActionTarget {
        action: "responded".to_string(),
        id: "r2".to_string(),
    };
    dispatch(store.as_ref(), &backend, &admin(), &target)
        .await
        .unwrap();

    let regions = sync
        .publish(store.as_ref(), Collection::Reports, Sequence::from(2))
        .await;
    assert_eq!(region(&regions, view::ACTIVE_REPORTS), "1");
}

#[tokio::test]
async fn reject_changes_only_status_and_clears_buttons() {
    let (store, backend) = setup();
    let original = Report {
        reporter: Some("u1".to_string()),
        emergency: Some("Flood".to_string()),
        additional_message: Some("Water rising on Rizal St.".to_string()),
        location: Some("Lat: 14.1, Lng: 121.2".to_string()),
        timestamp: Some("1718000000000".to_string()),
        status: Some(ReportStatus::Pending),
        ..Default::default()
    };
    store.put_report("r1", original.clone());

    let mut sync = ViewSync::for_page(Page::Reports, Role::Admin);
    let before = sync
        .publish(store.as_ref(), Collection::Reports, Sequence::from(1))
        .await;
    assert!(region(&before, view::REPORTS_TABLE_BODY).contains(r#"data-action="reject""#));

    let target = ActionTarget {
        action: "reject".to_string(),
        id: "r1".to_string(),
    };
    dispatch(store.as_ref(), &backend, &admin(), &target)
        .await
        .unwrap();

    let stored = store.report("r1").unwrap();
    assert_eq!(
        stored,
        Report {
            status: Some(ReportStatus::Rejected),
            ..original
        }
    );

    let after = sync
        .publish(store.as_ref(), Collection::Reports, Sequence::from(2))
        .await;
    let html = region(&after, view::REPORTS_TABLE_BODY);
    assert!(html.contains("Rejected"));
    assert!(!html.contains("data-action"));
}

#[tokio::test]
async fn refused_disable_leaves_user_untouched() {
    let (store, backend) = setup();
    store.put_user(
        "u1",
        User {
            username: Some("pedro".to_string()),
            role: Some(Role::User),
            is_approved: true,
            ..Default::default()
        },
    );

    let reply = backend.disable_user("u1", true).await.unwrap();
    assert!(!reply.success);
    assert_eq!(reply.error.as_deref(), Some("not found"));

    let mut sync = ViewSync::for_page(Page::Users, Role::Admin);
    let before = sync
        .publish(store.as_ref(), Collection::Users, Sequence::from(1))
        .await;

    let target = ActionTarget {
        action: "disable".to_string(),
        id: "u1".to_string(),
    };
    let err = dispatch(store.as_ref(), &backend, &admin(), &target)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "not found");

    assert!(!store.user("u1").unwrap().disabled);
    assert_eq!(store.write_count(), 0);

    let after = sync
        .publish(store.as_ref(), Collection::Users, Sequence::from(2))
        .await;
    let cards = region(&after, view::USERS_CONTAINER);
    assert_eq!(cards, region(&before, view::USERS_CONTAINER));
    assert!(cards.contains(">Disable</button>"));
    assert!(!cards.contains("(Disabled)"));
}
