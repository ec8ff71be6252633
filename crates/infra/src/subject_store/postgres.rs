//! Postgres-backed subject store.
//!
//! ## Error Mapping
//!
//! | SQLx error | PostgreSQL code | StoreError |
//! |------------|-----------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` (username or email taken) |
//! | Database (other) | any other | `Unavailable` |
//! | PoolClosed / Io / Tls / timeouts | n/a | `Unavailable` |
//! | Row decode failures | n/a | `Corrupt` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::instrument;

use musicflow_auth::{Role, Subject};
use musicflow_core::UserId;

use super::{ProfileUpdate, StoreError, SubjectStore, UserRecord};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id            UUID PRIMARY KEY,
    username      TEXT NOT NULL,
    email         TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    role          TEXT NOT NULL DEFAULT 'user'
                  CHECK (role IN ('user', 'moderator', 'admin', 'banned')),
    is_active     BOOLEAN NOT NULL DEFAULT TRUE,
    ban_reason    TEXT NULL,
    banned_at     TIMESTAMPTZ NULL,
    created_at    TIMESTAMPTZ NOT NULL,
    updated_at    TIMESTAMPTZ NOT NULL,
    CONSTRAINT users_username_key UNIQUE (username),
    CONSTRAINT users_email_key UNIQUE (email)
)
"#;

const SUBJECT_COLUMNS: &str =
    "id, username, email, role, is_active, ban_reason, banned_at, created_at, updated_at";

/// Subject store over a `users` table.
#[derive(Debug, Clone)]
pub struct PostgresSubjectStore {
    pool: Arc<PgPool>,
}

impl PostgresSubjectStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Connect and make sure the `users` table exists.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn fetch_subject(
        &self,
        operation: &'static str,
        query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Option<Subject>, StoreError> {
        let row = query
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        row.as_ref().map(subject_from_row).transpose()
    }
}

#[async_trait]
impl SubjectStore for PostgresSubjectStore {
    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn get(&self, id: UserId) -> Result<Option<Subject>, StoreError> {
        let sql = format!("SELECT {SUBJECT_COLUMNS} FROM users WHERE id = $1");
        self.fetch_subject("get", sqlx::query(&sql).bind(id.as_uuid())).await
    }

    #[instrument(skip(self), err)]
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let sql = format!("SELECT {SUBJECT_COLUMNS}, password_hash FROM users WHERE username = $1");
        let row = sqlx::query(&sql)
            .bind(username)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_username", e))?;

        match row {
            Some(row) => Ok(Some(UserRecord {
                subject: subject_from_row(&row)?,
                password_hash: row
                    .try_get("password_hash")
                    .map_err(|e| StoreError::Corrupt(format!("password_hash: {e}")))?,
            })),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, record), fields(user_id = %record.subject.id), err)]
    async fn insert(&self, record: UserRecord) -> Result<Subject, StoreError> {
        let s = &record.subject;
        let sql = format!(
            "INSERT INTO users ({SUBJECT_COLUMNS}, password_hash) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {SUBJECT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(s.id.as_uuid())
            .bind(&s.username)
            .bind(&s.email)
            .bind(s.role.as_str())
            .bind(s.is_active)
            .bind(s.ban_reason.as_deref())
            .bind(s.banned_at)
            .bind(s.created_at)
            .bind(s.updated_at)
            .bind(&record.password_hash)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert", e))?;
        subject_from_row(&row)
    }

    #[instrument(skip(self), err)]
    async fn list(&self) -> Result<Vec<Subject>, StoreError> {
        let sql = format!("SELECT {SUBJECT_COLUMNS} FROM users ORDER BY created_at DESC, id DESC");
        let rows = sqlx::query(&sql)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list", e))?;
        rows.iter().map(subject_from_row).collect()
    }

    #[instrument(skip(self, update), fields(user_id = %id), err)]
    async fn update_profile(
        &self,
        id: UserId,
        update: ProfileUpdate,
        at: DateTime<Utc>,
    ) -> Result<Option<Subject>, StoreError> {
        let sql = format!(
            "UPDATE users SET username = COALESCE($2, username), email = COALESCE($3, email), \
             updated_at = $4 WHERE id = $1 RETURNING {SUBJECT_COLUMNS}"
        );
        let query = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(update.username)
            .bind(update.email)
            .bind(at);
        self.fetch_subject("update_profile", query).await
    }

    #[instrument(skip(self), fields(user_id = %id, role = %role), err)]
    async fn set_role(&self, id: UserId, role: Role, at: DateTime<Utc>) -> Result<Option<Subject>, StoreError> {
        let sql = format!("UPDATE users SET role = $2, updated_at = $3 WHERE id = $1 RETURNING {SUBJECT_COLUMNS}");
        let query = sqlx::query(&sql).bind(id.as_uuid()).bind(role.as_str()).bind(at);
        self.fetch_subject("set_role", query).await
    }

    #[instrument(skip(self, reason), fields(user_id = %id), err)]
    async fn ban(
        &self,
        id: UserId,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<Subject>, StoreError> {
        let sql = format!(
            "UPDATE users SET role = 'banned', ban_reason = $2, banned_at = $3, updated_at = $3 \
             WHERE id = $1 RETURNING {SUBJECT_COLUMNS}"
        );
        let query = sqlx::query(&sql).bind(id.as_uuid()).bind(reason).bind(at);
        self.fetch_subject("ban", query).await
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn unban(&self, id: UserId, at: DateTime<Utc>) -> Result<Option<Subject>, StoreError> {
        let sql = format!(
            "UPDATE users SET role = 'user', ban_reason = NULL, banned_at = NULL, updated_at = $2 \
             WHERE id = $1 RETURNING {SUBJECT_COLUMNS}"
        );
        let query = sqlx::query(&sql).bind(id.as_uuid()).bind(at);
        self.fetch_subject("unban", query).await
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn toggle_active(&self, id: UserId, at: DateTime<Utc>) -> Result<Option<Subject>, StoreError> {
        let sql = format!(
            "UPDATE users SET is_active = NOT is_active, updated_at = $2 WHERE id = $1 RETURNING {SUBJECT_COLUMNS}"
        );
        let query = sqlx::query(&sql).bind(id.as_uuid()).bind(at);
        self.fetch_subject("toggle_active", query).await
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn delete(&self, id: UserId) -> Result<Option<Subject>, StoreError> {
        let sql = format!("DELETE FROM users WHERE id = $1 RETURNING {SUBJECT_COLUMNS}");
        self.fetch_subject("delete", sqlx::query(&sql).bind(id.as_uuid())).await
    }
}

fn subject_from_row(row: &PgRow) -> Result<Subject, StoreError> {
    fn col<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
    where
        T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    {
        row.try_get(name).map_err(|e| StoreError::Corrupt(format!("{name}: {e}")))
    }

    let role: String = col(row, "role")?;
    let role: Role = role
        .parse()
        .map_err(|e| StoreError::Corrupt(format!("role: {e}")))?;

    Ok(Subject {
        id: UserId::from_uuid(col::<uuid::Uuid>(row, "id")?),
        username: col(row, "username")?,
        email: col(row, "email")?,
        role,
        is_active: col(row, "is_active")?,
        ban_reason: col(row, "ban_reason")?,
        banned_at: col(row, "banned_at")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            if db_err.code().as_deref() == Some("23505") {
                let message = match db_err.constraint() {
                    Some(c) if c.contains("email") => "email already registered",
                    _ => "username already taken",
                };
                return StoreError::Conflict(message.to_string());
            }
            StoreError::Unavailable(format!("database error in {operation}: {}", db_err.message()))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(format!("decode error in {operation}: {err}"))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Runs against `TEST_DATABASE_URL` when set; otherwise a no-op.
    async fn store() -> Option<PostgresSubjectStore> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        Some(PostgresSubjectStore::connect(&url).await.unwrap())
    }

    fn record(name: &str) -> UserRecord {
        let suffix = UserId::new();
        UserRecord {
            subject: Subject::new(
                UserId::new(),
                format!("{name}-{suffix}"),
                format!("{name}-{suffix}@example.com"),
                Utc::now(),
            ),
            password_hash: "$argon2id$placeholder".into(),
        }
    }

    #[tokio::test]
    async fn postgres_round_trip_and_conflicts() {
        let Some(store) = store().await else {
            return;
        };

        let rec = record("alice");
        let inserted = store.insert(rec.clone()).await.unwrap();
        assert_eq!(inserted.username, rec.subject.username);

        let dup = UserRecord {
            subject: Subject::new(UserId::new(), rec.subject.username.clone(), "x@example.com".into(), Utc::now()),
            ..rec.clone()
        };
        assert!(matches!(store.insert(dup).await, Err(StoreError::Conflict(_))));

        let found = store.find_by_username(&rec.subject.username).await.unwrap().unwrap();
        assert_eq!(found.password_hash, rec.password_hash);

        let banned = store.ban(inserted.id, Some("spam".into()), Utc::now()).await.unwrap().unwrap();
        assert_eq!(banned.role, Role::Banned);
        assert_eq!(banned.ban_reason.as_deref(), Some("spam"));

        let unbanned = store.unban(inserted.id, Utc::now()).await.unwrap().unwrap();
        assert_eq!(unbanned.role, Role::User);
        assert!(unbanned.banned_at.is_none());

        let toggled = store.toggle_active(inserted.id, Utc::now()).await.unwrap().unwrap();
        assert!(!toggled.is_active);

        assert!(store.delete(inserted.id).await.unwrap().is_some());
        assert!(store.get(inserted.id).await.unwrap().is_none());
        assert!(store.set_role(inserted.id, Role::Admin, Utc::now()).await.unwrap().is_none());
    }
}
