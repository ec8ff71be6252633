//! Subjects: the persisted account state authorization decisions run on, and
//! the normalized identity extracted from a credential.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use musicflow_core::{DomainError, DomainResult, UserId};

use crate::Role;

/// Maximum username length accepted at registration / profile update.
pub const MAX_USERNAME_LEN: usize = 64;

/// Authoritative account state, as read from storage.
///
/// Serialized in camelCase because that is what browser clients consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub ban_reason: Option<String>,
    pub banned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subject {
    /// A freshly registered account: role `user`, active, never banned.
    pub fn new(id: UserId, username: String, email: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            username,
            email,
            role: Role::User,
            is_active: true,
            ban_reason: None,
            banned_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_banned(&self) -> bool {
        self.role.is_banned()
    }

    /// The `(id, role)` pair decision functions operate on.
    pub fn party(&self) -> Party {
        Party {
            id: self.id,
            role: self.role,
        }
    }
}

/// One side (actor or target) of a privileged action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Party {
    pub id: UserId,
    pub role: Role,
}

impl Party {
    pub fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }
}

/// Identity extracted from a verified credential.
///
/// `claimed_role` is the role at issuance time. It is informational only:
/// every decision re-reads the subject from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectIdentity {
    pub subject_id: UserId,
    pub username: String,
    pub claimed_role: Role,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Trim and check a username.
pub fn normalize_username(raw: &str) -> DomainResult<String> {
    let username = raw.trim();
    if username.is_empty() {
        return Err(DomainError::validation("username cannot be empty"));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(DomainError::validation(format!(
            "username must be at most {MAX_USERNAME_LEN} characters"
        )));
    }
    Ok(username.to_string())
}

/// Trim, lowercase and check an email address (basic shape check only).
pub fn normalize_email(raw: &str) -> DomainResult<String> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(DomainError::validation("invalid email format")),
    }
}
