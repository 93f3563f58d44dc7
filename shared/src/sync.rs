//! ViewSync: keeps dashboard regions in step with the store.
//!
//! Each registered [`View`] listens to one collection. A delivery always
//! carries the whole current collection and the view rebuilds its regions
//! from it. Deliveries are ordered per collection by their stream sequence
//! number; anything not newer than what a view last saw is dropped.

use async_trait::async_trait;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::DashboardError;
use crate::store::{Collection, DataStore};
use crate::types::{Report, Role, User};
use crate::view::{self, ReportCounters, UserCounters};

// ========== SNAPSHOTS ==========

#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Users(BTreeMap<String, User>),
    Reports(BTreeMap<String, Report>),
}

impl Snapshot {
    pub fn collection(&self) -> Collection {
        match self {
            Snapshot::Users(_) => Collection::Users,
            Snapshot::Reports(_) => Collection::Reports,
        }
    }

    /// Read the full current collection.
    pub async fn load(store: &dyn DataStore, collection: Collection) -> Result<Self, DashboardError> {
        let result = match collection {
            Collection::Users => store.users().await.map(Snapshot::Users),
            Collection::Reports => store.reports().await.map(Snapshot::Reports),
        };
        result.map_err(|e| DashboardError::Subscription(e.to_string()))
    }
}

/// Stream sequence number. DynamoDB hands these out as decimal strings that
/// can outgrow any integer type, so they compare by digit count first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence(String);

impl Sequence {
    pub fn new(value: impl Into<String>) -> Self {
        Sequence(value.into())
    }

    fn digits(&self) -> &str {
        let trimmed = self.0.trim_start_matches('0');
        if trimmed.is_empty() {
            "0"
        } else {
            trimmed
        }
    }
}

impl From<u64> for Sequence {
    fn from(value: u64) -> Self {
        Sequence(value.to_string())
    }
}

impl Ord for Sequence {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = (self.digits(), other.digits());
        a.len().cmp(&b.len()).then_with(|| a.cmp(b))
    }
}

impl PartialOrd for Sequence {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ========== REGIONS & VIEWS ==========

/// A rebuilt region of a page: the element id and its new inner HTML.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Region {
    pub target: String,
    pub html: String,
    /// Only connections with this role receive the region; `None` means all.
    #[serde(skip)]
    pub audience: Option<Role>,
}

impl Region {
    pub fn new(target: &str, html: impl Into<String>) -> Self {
        Self {
            target: target.to_string(),
            html: html.into(),
            audience: None,
        }
    }

    pub fn for_role(mut self, role: Role) -> Self {
        self.audience = Some(role);
        self
    }
}

#[async_trait]
pub trait View: Send + Sync {
    fn name(&self) -> &'static str;

    fn collection(&self) -> Collection;

    /// Rebuild this view's regions from a full snapshot.
    async fn on_snapshot(
        &self,
        snapshot: &Snapshot,
        store: &dyn DataStore,
    ) -> Result<Vec<Region>, DashboardError>;

    /// Regions to show once the subscription has failed.
    fn on_error(&self, error: &DashboardError) -> Vec<Region>;
}

fn mismatch(view: &dyn View, snapshot: &Snapshot) -> DashboardError {
    DashboardError::Subscription(format!(
        "{} received a {} snapshot",
        view.name(),
        snapshot.collection().path()
    ))
}

/// `totalUsers` and `pendingUsers`.
pub struct UserCountersView;

#[async_trait]
impl View for UserCountersView {
    fn name(&self) -> &'static str {
        "user counters"
    }

    fn collection(&self) -> Collection {
        Collection::Users
    }

    async fn on_snapshot(
        &self,
        snapshot: &Snapshot,
        _store: &dyn DataStore,
    ) -> Result<Vec<Region>, DashboardError> {
        let Snapshot::Users(users) = snapshot else {
            return Err(mismatch(self, snapshot));
        };
        let counters = UserCounters::compute(users);
        Ok(vec![
            Region::new(view::TOTAL_USERS, counters.total_users.to_string()),
            Region::new(view::PENDING_USERS, counters.pending_users.to_string()),
        ])
    }

    fn on_error(&self, _error: &DashboardError) -> Vec<Region> {
        vec![
            Region::new(view::TOTAL_USERS, "Error"),
            Region::new(view::PENDING_USERS, "Error"),
        ]
    }
}

/// `activeReports`.
pub struct ActiveReportsView;

#[async_trait]
impl View for ActiveReportsView {
    fn name(&self) -> &'static str {
        "active reports"
    }

    fn collection(&self) -> Collection {
        Collection::Reports
    }

    async fn on_snapshot(
        &self,
        snapshot: &Snapshot,
        _store: &dyn DataStore,
    ) -> Result<Vec<Region>, DashboardError> {
        let Snapshot::Reports(reports) = snapshot else {
            return Err(mismatch(self, snapshot));
        };
        let counters = ReportCounters::compute(reports);
        Ok(vec![Region::new(
            view::ACTIVE_REPORTS,
            counters.active_reports.to_string(),
        )])
    }

    fn on_error(&self, _error: &DashboardError) -> Vec<Region> {
        vec![Region::new(view::ACTIVE_REPORTS, "Error")]
    }
}

pub struct UserCardsView;

#[async_trait]
impl View for UserCardsView {
    fn name(&self) -> &'static str {
        "user cards"
    }

    fn collection(&self) -> Collection {
        Collection::Users
    }

    async fn on_snapshot(
        &self,
        snapshot: &Snapshot,
        _store: &dyn DataStore,
    ) -> Result<Vec<Region>, DashboardError> {
        let Snapshot::Users(users) = snapshot else {
            return Err(mismatch(self, snapshot));
        };
        Ok(vec![Region::new(
            view::USERS_CONTAINER,
            view::render_user_cards(users),
        )])
    }

    fn on_error(&self, _error: &DashboardError) -> Vec<Region> {
        vec![Region::new(
            view::USERS_CONTAINER,
            "<p>Error loading users.</p>",
        )]
    }
}

/// Reports table as seen by one role. Each snapshot triggers one read of the
/// users collection for reporter details.
pub struct ReportsTableView {
    pub role: Role,
}

#[async_trait]
impl View for ReportsTableView {
    fn name(&self) -> &'static str {
        "reports table"
    }

    fn collection(&self) -> Collection {
        Collection::Reports
    }

    async fn on_snapshot(
        &self,
        snapshot: &Snapshot,
        store: &dyn DataStore,
    ) -> Result<Vec<Region>, DashboardError> {
        let Snapshot::Reports(reports) = snapshot else {
            return Err(mismatch(self, snapshot));
        };
        let users = store.users().await?;
        Ok(vec![Region::new(
            view::REPORTS_TABLE_BODY,
            view::render_report_rows(reports, &users, self.role),
        )
        .for_role(self.role)])
    }

    fn on_error(&self, _error: &DashboardError) -> Vec<Region> {
        vec![Region::new(
            view::REPORTS_TABLE_BODY,
            r#"<tr><td colspan="8" style="text-align:center;">Error loading reports</td></tr>"#,
        )
        .for_role(self.role)]
    }
}

// ========== PAGES ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Dashboard,
    Users,
    Reports,
}

impl Page {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "dashboard" => Some(Page::Dashboard),
            "users" => Some(Page::Users),
            "reports" => Some(Page::Reports),
            _ => None,
        }
    }

    pub fn views(&self, role: Role) -> Vec<Box<dyn View>> {
        match self {
            Page::Dashboard => vec![Box::new(UserCountersView), Box::new(ActiveReportsView)],
            Page::Users => vec![Box::new(UserCardsView)],
            Page::Reports => vec![Box::new(ReportsTableView { role })],
        }
    }
}

// ========== VIEWSYNC ==========

pub type SubscriptionId = usize;

struct Subscription {
    view: Box<dyn View>,
    last_seq: Option<Sequence>,
    failed: bool,
}

#[derive(Default)]
pub struct ViewSync {
    subscriptions: Vec<Subscription>,
}

impl ViewSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Views of one page as seen by `role`.
    pub fn for_page(page: Page, role: Role) -> Self {
        let mut sync = Self::new();
        for view in page.views(role) {
            sync.subscribe(view);
        }
        sync
    }

    /// Views of every dashboard page, for pushing to all open dashboards.
    pub fn all_pages(role: Role) -> Self {
        let mut sync = Self::new();
        for page in [Page::Dashboard, Page::Users, Page::Reports] {
            for view in page.views(role) {
                sync.subscribe(view);
            }
        }
        sync
    }

    pub fn subscribe(&mut self, view: Box<dyn View>) -> SubscriptionId {
        tracing::debug!("Subscribed {} to {}", view.name(), view.collection().path());
        self.subscriptions.push(Subscription {
            view,
            last_seq: None,
            failed: false,
        });
        self.subscriptions.len() - 1
    }

    pub fn is_failed(&self, id: SubscriptionId) -> bool {
        self.subscriptions.get(id).map(|s| s.failed).unwrap_or(false)
    }

    /// Collections at least one live subscription listens to.
    pub fn collections(&self) -> Vec<Collection> {
        let mut collections: Vec<Collection> = self
            .subscriptions
            .iter()
            .filter(|s| !s.failed)
            .map(|s| s.view.collection())
            .collect();
        collections.sort();
        collections.dedup();
        collections
    }

    /// Read the collection and deliver it.
    pub async fn publish(
        &mut self,
        store: &dyn DataStore,
        collection: Collection,
        seq: Sequence,
    ) -> Vec<Region> {
        let snapshot = Snapshot::load(store, collection).await;
        self.deliver(store, collection, seq, &snapshot).await
    }

    /// Hand one delivery to every live subscription of `collection`.
    pub async fn deliver(
        &mut self,
        store: &dyn DataStore,
        collection: Collection,
        seq: Sequence,
        delivery: &Result<Snapshot, DashboardError>,
    ) -> Vec<Region> {
        let mut regions = Vec::new();

        for sub in self
            .subscriptions
            .iter_mut()
            .filter(|s| s.view.collection() == collection)
        {
            if sub.failed {
                continue;
            }
            if sub.last_seq.as_ref().is_some_and(|last| *last >= seq) {
                tracing::debug!("Dropping stale {} delivery for {}", collection.path(), sub.view.name());
                continue;
            }
            sub.last_seq = Some(seq.clone());

            match delivery {
                Ok(snapshot) => match sub.view.on_snapshot(snapshot, store).await {
                    Ok(rendered) => regions.extend(rendered),
                    Err(e) => {
                        // region keeps its previous content
                        tracing::error!("Error rendering {}: {}", sub.view.name(), e);
                    }
                },
                Err(e) => {
                    tracing::error!("❌ Listener {} failed: {}", sub.view.name(), e);
                    sub.failed = true;
                    regions.extend(sub.view.on_error(e));
                }
            }
        }

        regions
    }

    /// Initial render of a page from a fresh read of each collection it uses.
    pub async fn render_page(
        store: &dyn DataStore,
        page: Page,
        role: Role,
    ) -> Vec<Region> {
        let mut sync = Self::for_page(page, role);
        let mut regions = Vec::new();
        for collection in sync.collections() {
            regions.extend(sync.publish(store, collection, Sequence::from(0)).await);
        }
        regions
    }
}
