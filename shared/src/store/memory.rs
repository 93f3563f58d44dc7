use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::DataStore;
use crate::error::StoreError;
use crate::types::{Connection, Report, User, UserPatch};
use crate::workflow::ReportStatus;

#[derive(Default)]
struct Inner {
    users: BTreeMap<String, User>,
    reports: BTreeMap<String, Report>,
    usernames: HashMap<String, String>,
    connections: BTreeMap<String, Connection>,
    writes: usize,
    fail_reads: bool,
    fail_writes: bool,
}

/// In-process store for local runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // a poisoned lock only means a test panicked mid-write
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed a user as if created by the mobile app.
    pub fn put_user(&self, uid: &str, user: User) {
        let mut inner = self.lock();
        if let Some(username) = &user.username {
            inner.usernames.insert(username.clone(), uid.to_string());
        }
        inner.users.insert(uid.to_string(), user);
    }

    /// Seed a report as if submitted by the mobile app.
    pub fn put_report(&self, report_id: &str, report: Report) {
        let mut inner = self.lock();
        inner.reports.insert(report_id.to_string(), report);
    }

    pub fn user(&self, uid: &str) -> Option<User> {
        self.lock().users.get(uid).cloned()
    }

    pub fn report(&self, report_id: &str) -> Option<Report> {
        self.lock().reports.get(report_id).cloned()
    }

    /// Number of writes accepted through the store interface.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    pub fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    fn check_read(inner: &Inner) -> Result<(), StoreError> {
        if inner.fail_reads {
            return Err(StoreError::Backend("permission denied".to_string()));
        }
        Ok(())
    }

    fn check_write(inner: &Inner) -> Result<(), StoreError> {
        if inner.fail_writes {
            return Err(StoreError::Backend("write rejected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn get_user(&self, uid: &str) -> Result<Option<User>, StoreError> {
        let inner = self.lock();
        Self::check_read(&inner)?;
        Ok(inner.users.get(uid).cloned())
    }

    async fn get_report(&self, report_id: &str) -> Result<Option<Report>, StoreError> {
        let inner = self.lock();
        Self::check_read(&inner)?;
        Ok(inner.reports.get(report_id).cloned())
    }

    async fn lookup_username(&self, username: &str) -> Result<Option<String>, StoreError> {
        let inner = self.lock();
        Self::check_read(&inner)?;
        Ok(inner.usernames.get(username).cloned())
    }

    async fn users(&self) -> Result<BTreeMap<String, User>, StoreError> {
        let inner = self.lock();
        Self::check_read(&inner)?;
        Ok(inner.users.clone())
    }

    async fn reports(&self) -> Result<BTreeMap<String, Report>, StoreError> {
        let inner = self.lock();
        Self::check_read(&inner)?;
        Ok(inner.reports.clone())
    }

    async fn update_user(&self, uid: &str, patch: &UserPatch) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::check_write(&inner)?;
        let user = inner
            .users
            .get_mut(uid)
            .ok_or_else(|| StoreError::NotFound(format!("users/{}", uid)))?;

        if let Some(is_approved) = patch.is_approved {
            user.is_approved = is_approved;
        }
        if let Some(resubmit) = patch.resubmit_id {
            user.resubmit_id = resubmit;
        }
        if let Some(disabled) = patch.disabled {
            user.disabled = disabled;
        }
        if let Some(token) = &patch.fcm_token {
            user.fcm_token = Some(token.clone());
        }

        inner.writes += 1;
        Ok(())
    }

    async fn transition_report_status(
        &self,
        report_id: &str,
        from: ReportStatus,
        to: ReportStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::check_write(&inner)?;
        let report = inner
            .reports
            .get_mut(report_id)
            .ok_or_else(|| StoreError::NotFound(format!("reports/{}", report_id)))?;

        if report.status != Some(from) {
            return Err(StoreError::Conflict(format!("reports/{}", report_id)));
        }
        report.status = Some(to);

        inner.writes += 1;
        Ok(())
    }

    async fn mark_publicized(&self, report_id: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::check_write(&inner)?;
        let report = inner
            .reports
            .get_mut(report_id)
            .ok_or_else(|| StoreError::NotFound(format!("reports/{}", report_id)))?;
        report.publicized = true;

        inner.writes += 1;
        Ok(())
    }

    async fn save_connection(&self, connection: &Connection) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::check_write(&inner)?;
        inner
            .connections
            .insert(connection.connection_id.clone(), connection.clone());
        Ok(())
    }

    async fn remove_connection(&self, connection_id: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::check_write(&inner)?;
        inner.connections.remove(connection_id);
        Ok(())
    }

    async fn get_connection(&self, connection_id: &str) -> Result<Option<Connection>, StoreError> {
        let inner = self.lock();
        Self::check_read(&inner)?;
        Ok(inner.connections.get(connection_id).cloned())
    }

    async fn connections(&self) -> Result<Vec<Connection>, StoreError> {
        let inner = self.lock();
        Self::check_read(&inner)?;
        Ok(inner.connections.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn connection(id: &str, uid: &str) -> Connection {
        Connection {
            connection_id: id.to_string(),
            user_id: uid.to_string(),
            role: Role::Admin,
            connected_at: "2024-06-10T00:00:00Z".to_string(),
        }
    }

    #[tokio::test]
    async fn test_connection_lookup_by_id() {
        let store = MemoryStore::new();
        store.save_connection(&connection("c1", "admin-1")).await.unwrap();
        store.save_connection(&connection("c2", "admin-2")).await.unwrap();

        let found = store.get_connection("c2").await.unwrap().unwrap();
        assert_eq!(found.user_id, "admin-2");
        assert!(store.get_connection("c3").await.unwrap().is_none());

        store.remove_connection("c2").await.unwrap();
        assert!(store.get_connection("c2").await.unwrap().is_none());

        store.fail_reads(true);
        assert!(store.get_connection("c1").await.is_err());
    }

    #[tokio::test]
    async fn test_connection_writes_are_not_counted() {
        let store = MemoryStore::new();
        store.save_connection(&connection("c1", "admin-1")).await.unwrap();
        store.remove_connection("c1").await.unwrap();
        assert_eq!(store.write_count(), 0);
    }
}
