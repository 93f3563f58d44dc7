//! Data store collaborator: point reads, merges and full collection reads.
//!
//! Hierarchical paths map onto single-table keys:
//! `users/{uid}` -> `USER#{uid}`, `reports/{id}` -> `REPORT#{id}`,
//! `usernames/{name}` -> `USERNAME#{name}`.

pub mod dynamo;
pub mod memory;

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::types::{Connection, Report, User, UserPatch};
use crate::workflow::ReportStatus;

pub const USER_PREFIX: &str = "USER#";
pub const REPORT_PREFIX: &str = "REPORT#";
pub const USERNAME_PREFIX: &str = "USERNAME#";
pub const CONNECTION_PREFIX: &str = "CONNECTION#";

/// A subscribable collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Users,
    Reports,
}

impl Collection {
    pub fn path(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Reports => "reports",
        }
    }

    /// Collection a partition key belongs to; connections and indexes belong to none.
    pub fn from_key(pk: &str) -> Option<Self> {
        if pk.starts_with(USERNAME_PREFIX) || pk.starts_with(CONNECTION_PREFIX) {
            None
        } else if pk.starts_with(USER_PREFIX) {
            Some(Collection::Users)
        } else if pk.starts_with(REPORT_PREFIX) {
            Some(Collection::Reports)
        } else {
            None
        }
    }
}

#[async_trait]
pub trait DataStore: Send + Sync {
    async fn get_user(&self, uid: &str) -> Result<Option<User>, StoreError>;

    async fn get_report(&self, report_id: &str) -> Result<Option<Report>, StoreError>;

    /// `usernames/{username}` -> uid
    async fn lookup_username(&self, username: &str) -> Result<Option<String>, StoreError>;

    /// Full current users collection, keyed by uid.
    async fn users(&self) -> Result<BTreeMap<String, User>, StoreError>;

    /// Full current reports collection, keyed by report id.
    async fn reports(&self) -> Result<BTreeMap<String, Report>, StoreError>;

    /// Merge the set fields of `patch` into an existing user.
    async fn update_user(&self, uid: &str, patch: &UserPatch) -> Result<(), StoreError>;

    /// Merge only `status`, and only while the stored status is still `from`.
    async fn transition_report_status(
        &self,
        report_id: &str,
        from: ReportStatus,
        to: ReportStatus,
    ) -> Result<(), StoreError>;

    async fn mark_publicized(&self, report_id: &str) -> Result<(), StoreError>;

    async fn save_connection(&self, connection: &Connection) -> Result<(), StoreError>;

    async fn remove_connection(&self, connection_id: &str) -> Result<(), StoreError>;

    /// `CONNECTION#{id}`, as stored at `$connect`.
    async fn get_connection(&self, connection_id: &str) -> Result<Option<Connection>, StoreError>;

    async fn connections(&self) -> Result<Vec<Connection>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_from_key() {
        assert_eq!(Collection::from_key("USER#abc"), Some(Collection::Users));
        assert_eq!(Collection::from_key("REPORT#r1"), Some(Collection::Reports));
        assert_eq!(Collection::from_key("USERNAME#juan"), None);
        assert_eq!(Collection::from_key("CONNECTION#x"), None);
        assert_eq!(Collection::from_key("AUDIT#x"), None);
    }
}
