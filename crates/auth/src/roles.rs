use core::str::FromStr;

use serde::{Deserialize, Serialize};

use musicflow_core::DomainError;

/// Account role.
///
/// `Banned` is a role rather than a flag so that a single write both revokes
/// every capability and records the moderation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Moderator,
    Admin,
    Banned,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::User, Role::Moderator, Role::Admin, Role::Banned];

    /// Roles a moderator may hand out.
    pub const MODERATOR_ASSIGNABLE: [Role; 3] = [Role::Moderator, Role::User, Role::Banned];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
            Role::Banned => "banned",
        }
    }

    pub fn is_admin(&self) -> bool {
        *self == Role::Admin
    }

    pub fn is_banned(&self) -> bool {
        *self == Role::Banned
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "user" => Ok(Role::User),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            "banned" => Ok(Role::Banned),
            other => Err(DomainError::validation(format!(
                "unknown role '{other}' (expected one of: user, moderator, admin, banned)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_matches_display() {
        for role in Role::ALL {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn unknown_role_is_a_validation_error() {
        let err = "superuser".parse::<Role>().unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        // Case matters: stored roles are always lowercase.
        assert!("Admin".parse::<Role>().is_err());
    }

    #[test]
    fn serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&Role::Moderator).unwrap(), "\"moderator\"");
        let role: Role = serde_json::from_str("\"banned\"").unwrap();
        assert_eq!(role, Role::Banned);
    }
}
