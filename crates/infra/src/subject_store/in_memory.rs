use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use musicflow_auth::{Role, Subject};
use musicflow_core::UserId;

use super::{ProfileUpdate, StoreError, SubjectStore, UserRecord};

/// In-memory subject store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemorySubjectStore {
    inner: RwLock<HashMap<UserId, UserRecord>>,
}

impl InMemorySubjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<UserId, UserRecord>>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("subject map lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<UserId, UserRecord>>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("subject map lock poisoned".to_string()))
    }

    fn modify(
        &self,
        id: UserId,
        at: DateTime<Utc>,
        f: impl FnOnce(&mut Subject),
    ) -> Result<Option<Subject>, StoreError> {
        let mut map = self.write()?;
        Ok(map.get_mut(&id).map(|record| {
            f(&mut record.subject);
            record.subject.updated_at = at;
            record.subject.clone()
        }))
    }
}

fn check_unique(
    map: &HashMap<UserId, UserRecord>,
    skip: Option<UserId>,
    username: Option<&str>,
    email: Option<&str>,
) -> Result<(), StoreError> {
    for (id, record) in map {
        if Some(*id) == skip {
            continue;
        }
        if username.is_some_and(|u| record.subject.username == u) {
            return Err(StoreError::Conflict("username already taken".to_string()));
        }
        if email.is_some_and(|e| record.subject.email == e) {
            return Err(StoreError::Conflict("email already registered".to_string()));
        }
    }
    Ok(())
}

#[async_trait]
impl SubjectStore for InMemorySubjectStore {
    async fn get(&self, id: UserId) -> Result<Option<Subject>, StoreError> {
        Ok(self.read()?.get(&id).map(|r| r.subject.clone()))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self
            .read()?
            .values()
            .find(|r| r.subject.username == username)
            .cloned())
    }

    async fn insert(&self, record: UserRecord) -> Result<Subject, StoreError> {
        let mut map = self.write()?;
        if map.contains_key(&record.subject.id) {
            return Err(StoreError::Conflict(format!("user {} already exists", record.subject.id)));
        }
        check_unique(
            &map,
            None,
            Some(&record.subject.username),
            Some(&record.subject.email),
        )?;

        let subject = record.subject.clone();
        map.insert(subject.id, record);
        Ok(subject)
    }

    async fn list(&self) -> Result<Vec<Subject>, StoreError> {
        let mut subjects: Vec<Subject> = self.read()?.values().map(|r| r.subject.clone()).collect();
        subjects.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(subjects)
    }

    async fn update_profile(
        &self,
        id: UserId,
        update: ProfileUpdate,
        at: DateTime<Utc>,
    ) -> Result<Option<Subject>, StoreError> {
        let mut map = self.write()?;
        if !map.contains_key(&id) {
            return Ok(None);
        }
        check_unique(&map, Some(id), update.username.as_deref(), update.email.as_deref())?;

        Ok(map.get_mut(&id).map(|record| {
            if let Some(username) = update.username {
                record.subject.username = username;
            }
            if let Some(email) = update.email {
                record.subject.email = email;
            }
            record.subject.updated_at = at;
            record.subject.clone()
        }))
    }

    async fn set_role(&self, id: UserId, role: Role, at: DateTime<Utc>) -> Result<Option<Subject>, StoreError> {
        self.modify(id, at, |s| s.role = role)
    }

    async fn ban(
        &self,
        id: UserId,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<Subject>, StoreError> {
        self.modify(id, at, |s| {
            s.role = Role::Banned;
            s.ban_reason = reason;
            s.banned_at = Some(at);
        })
    }

    async fn unban(&self, id: UserId, at: DateTime<Utc>) -> Result<Option<Subject>, StoreError> {
        self.modify(id, at, |s| {
            s.role = Role::User;
            s.ban_reason = None;
            s.banned_at = None;
        })
    }

    async fn toggle_active(&self, id: UserId, at: DateTime<Utc>) -> Result<Option<Subject>, StoreError> {
        self.modify(id, at, |s| s.is_active = !s.is_active)
    }

    async fn delete(&self, id: UserId) -> Result<Option<Subject>, StoreError> {
        Ok(self.write()?.remove(&id).map(|r| r.subject))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn record(username: &str, email: &str, at: DateTime<Utc>) -> UserRecord {
        UserRecord {
            subject: Subject::new(UserId::new(), username.to_string(), email.to_string(), at),
            password_hash: "$argon2id$stub".to_string(),
        }
    }

    #[tokio::test]
    async fn insert_then_get_and_find() {
        let store = InMemorySubjectStore::new();
        let created = store.insert(record("alice", "alice@example.com", Utc::now())).await.unwrap();

        assert_eq!(store.get(created.id).await.unwrap(), Some(created.clone()));
        let found = store.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(found.subject.id, created.id);
        assert_eq!(found.password_hash, "$argon2id$stub");
        assert!(store.find_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_username_or_email_conflicts() {
        let store = InMemorySubjectStore::new();
        store.insert(record("alice", "alice@example.com", Utc::now())).await.unwrap();

        let err = store.insert(record("alice", "other@example.com", Utc::now())).await.unwrap_err();
        assert_eq!(err, StoreError::Conflict("username already taken".to_string()));

        let err = store.insert(record("alicia", "alice@example.com", Utc::now())).await.unwrap_err();
        assert_eq!(err, StoreError::Conflict("email already registered".to_string()));
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let store = InMemorySubjectStore::new();
        let t0 = Utc::now();
        store.insert(record("old", "old@example.com", t0)).await.unwrap();
        store.insert(record("new", "new@example.com", t0 + Duration::seconds(5))).await.unwrap();

        let names: Vec<String> = store.list().await.unwrap().into_iter().map(|s| s.username).collect();
        assert_eq!(names, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn latest_role_write_wins() {
        let store = InMemorySubjectStore::new();
        let s = store.insert(record("frank", "frank@example.com", Utc::now())).await.unwrap();

        store.set_role(s.id, Role::Moderator, Utc::now()).await.unwrap();
        assert_eq!(store.get(s.id).await.unwrap().unwrap().role, Role::Moderator);

        store.set_role(s.id, Role::User, Utc::now()).await.unwrap();
        assert_eq!(store.get(s.id).await.unwrap().unwrap().role, Role::User);
    }

    #[tokio::test]
    async fn ban_and_unban_manage_metadata() {
        let store = InMemorySubjectStore::new();
        let s = store.insert(record("gina", "gina@example.com", Utc::now())).await.unwrap();
        let at = Utc::now();

        let banned = store.ban(s.id, Some("spam".to_string()), at).await.unwrap().unwrap();
        assert_eq!(banned.role, Role::Banned);
        assert_eq!(banned.ban_reason.as_deref(), Some("spam"));
        assert_eq!(banned.banned_at, Some(at));

        let no_reason = store.ban(s.id, None, at).await.unwrap().unwrap();
        assert_eq!(no_reason.banned_at, Some(at));
        assert!(no_reason.ban_reason.is_none());

        let unbanned = store.unban(s.id, Utc::now()).await.unwrap().unwrap();
        assert_eq!(unbanned.role, Role::User);
        assert!(unbanned.ban_reason.is_none());
        assert!(unbanned.banned_at.is_none());
    }

    #[tokio::test]
    async fn set_role_banned_leaves_ban_metadata_alone() {
        let store = InMemorySubjectStore::new();
        let s = store.insert(record("hank", "hank@example.com", Utc::now())).await.unwrap();

        let banned = store.set_role(s.id, Role::Banned, Utc::now()).await.unwrap().unwrap();
        assert_eq!(banned.role, Role::Banned);
        assert!(banned.banned_at.is_none());
    }

    #[tokio::test]
    async fn toggle_active_flips() {
        let store = InMemorySubjectStore::new();
        let s = store.insert(record("ivy", "ivy@example.com", Utc::now())).await.unwrap();

        assert!(!store.toggle_active(s.id, Utc::now()).await.unwrap().unwrap().is_active);
        assert!(store.toggle_active(s.id, Utc::now()).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn profile_update_enforces_uniqueness_against_others_only() {
        let store = InMemorySubjectStore::new();
        let a = store.insert(record("jack", "jack@example.com", Utc::now())).await.unwrap();
        store.insert(record("kate", "kate@example.com", Utc::now())).await.unwrap();

        let same = ProfileUpdate {
            username: Some("jack".to_string()),
            email: None,
        };
        assert!(store.update_profile(a.id, same, Utc::now()).await.unwrap().is_some());

        let taken = ProfileUpdate {
            username: Some("kate".to_string()),
            email: None,
        };
        assert!(matches!(
            store.update_profile(a.id, taken, Utc::now()).await,
            Err(StoreError::Conflict(_))
        ));

        let renamed = ProfileUpdate {
            username: None,
            email: Some("jack@new.example.com".to_string()),
        };
        let updated = store.update_profile(a.id, renamed, Utc::now()).await.unwrap().unwrap();
        assert_eq!(updated.email, "jack@new.example.com");
    }

    #[tokio::test]
    async fn mutations_on_missing_ids_return_none() {
        let store = InMemorySubjectStore::new();
        let ghost = UserId::new();
        assert!(store.set_role(ghost, Role::Admin, Utc::now()).await.unwrap().is_none());
        assert!(store.ban(ghost, None, Utc::now()).await.unwrap().is_none());
        assert!(store.unban(ghost, Utc::now()).await.unwrap().is_none());
        assert!(store.toggle_active(ghost, Utc::now()).await.unwrap().is_none());
        assert!(store.delete(ghost).await.unwrap().is_none());
        assert!(store
            .update_profile(ghost, ProfileUpdate::default(), Utc::now())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let store = InMemorySubjectStore::new();
        let s = store.insert(record("lena", "lena@example.com", Utc::now())).await.unwrap();
        assert_eq!(store.delete(s.id).await.unwrap().map(|d| d.id), Some(s.id));
        assert!(store.get(s.id).await.unwrap().is_none());
    }
}
