use serde::{Deserialize, Serialize};

use musicflow_auth::{Action, Role, Subject, SubjectIdentity};

// -------------------------
// Request DTOs
// -------------------------

// Fields are optional so a missing one is a 400 from the handler rather than
// an extractor rejection.

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub email: Option<String>,
}

/// Used by both the JSON API and the admin panel form.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChangeRoleRequest {
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BanRequest {
    pub reason: Option<String>,
}

/// Present and non-blank, trimmed.
pub fn required(field: Option<String>) -> Option<String> {
    field.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: &'static str,
    pub token: String,
    pub user: Subject,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub user: Subject,
}

impl UserResponse {
    pub fn new(user: Subject) -> Self {
        Self {
            success: true,
            message: None,
            user,
        }
    }

    pub fn with_message(user: Subject, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            user,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub success: bool,
    pub count: usize,
    pub users: Vec<Subject>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

/// Token identity next to the stored record, so stale claims are visible.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhoAmIResponse {
    pub success: bool,
    pub identity: SubjectIdentity,
    pub current: Subject,
    pub current_role: Role,
    pub role_is_stale: bool,
    pub capabilities: Vec<&'static str>,
}

impl WhoAmIResponse {
    pub fn new(identity: SubjectIdentity, current: Subject) -> Self {
        let role_is_stale = identity.claimed_role != current.role;
        let capabilities = current.role.capabilities().iter().map(Action::as_str).collect();
        Self {
            success: true,
            current_role: current.role,
            identity,
            current,
            role_is_stale,
            capabilities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use musicflow_core::UserId;

    #[test]
    fn required_trims_and_rejects_blank() {
        assert_eq!(required(Some("  bob ".into())).as_deref(), Some("bob"));
        assert_eq!(required(Some("   ".into())), None);
        assert_eq!(required(None), None);
    }

    #[test]
    fn whoami_flags_stale_role() {
        let mut current = Subject::new(UserId::new(), "root".into(), "root@example.com".into(), Utc::now());
        let identity = SubjectIdentity {
            subject_id: current.id,
            username: "root".into(),
            claimed_role: Role::Admin,
            issued_at: Utc::now(),
            expires_at: Utc::now(),
        };
        current.role = Role::User;

        let res = WhoAmIResponse::new(identity, current);
        assert!(res.role_is_stale);
        assert_eq!(res.capabilities, vec!["view_profile", "update_profile", "manage_own_content"]);

        let json = serde_json::to_value(&res).unwrap();
        assert_eq!(json["identity"]["claimedRole"], "admin");
        assert_eq!(json["currentRole"], "user");
    }
}
