//! Persistent subject (user account) storage.
//!
//! The store is the source of truth every freshness read goes to. It has no
//! locking or versioning across requests: two concurrent writers both succeed
//! and the last write wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use musicflow_auth::{Role, Subject};
use musicflow_core::UserId;

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemorySubjectStore;
pub use postgres::PostgresSubjectStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint (username, email) would be violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backing store could not be reached or failed mid-operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be mapped back to a subject.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// A subject together with its credential material.
///
/// Only login needs the hash, so only `find_by_username` returns this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub subject: Subject,
    pub password_hash: String,
}

/// Fields a subject may change on their own profile (already normalized).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none()
    }
}

/// Account storage.
///
/// Every mutation returns the record as written, or `None` when `id` does not
/// exist. Reads are never cached by implementations.
#[async_trait]
pub trait SubjectStore: Send + Sync {
    async fn get(&self, id: UserId) -> Result<Option<Subject>, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Fails with `Conflict` if the username or email is taken.
    async fn insert(&self, record: UserRecord) -> Result<Subject, StoreError>;

    /// All subjects, newest first.
    async fn list(&self) -> Result<Vec<Subject>, StoreError>;

    async fn update_profile(
        &self,
        id: UserId,
        update: ProfileUpdate,
        at: DateTime<Utc>,
    ) -> Result<Option<Subject>, StoreError>;

    /// Plain role write; ban metadata is left untouched.
    async fn set_role(&self, id: UserId, role: Role, at: DateTime<Utc>) -> Result<Option<Subject>, StoreError>;

    /// Role becomes `banned`, the reason is recorded and `banned_at` is set to `at`.
    async fn ban(
        &self,
        id: UserId,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<Subject>, StoreError>;

    /// Role becomes `user`; ban reason and timestamp are cleared.
    async fn unban(&self, id: UserId, at: DateTime<Utc>) -> Result<Option<Subject>, StoreError>;

    /// Flip `is_active` in a single write.
    async fn toggle_active(&self, id: UserId, at: DateTime<Utc>) -> Result<Option<Subject>, StoreError>;

    async fn delete(&self, id: UserId) -> Result<Option<Subject>, StoreError>;
}
