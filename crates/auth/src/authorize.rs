//! Authorization decisions.
//!
//! Every function here is pure: it decides over state that has already been
//! read fresh from storage. No IO, no panics, no retries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use musicflow_core::UserId;

use crate::{Action, Party, Role, Subject};

/// Machine-readable reason attached to every denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    InsufficientPrivilege,
    SelfTargetForbidden,
    TargetIsAdmin,
    AccountBanned,
    AccountInactive,
    TokenInvalid,
    TokenExpired,
    SubjectNotFound,
}

impl DenyReason {
    pub fn code(&self) -> &'static str {
        match self {
            DenyReason::InsufficientPrivilege => "insufficient_privilege",
            DenyReason::SelfTargetForbidden => "self_target_forbidden",
            DenyReason::TargetIsAdmin => "target_is_admin",
            DenyReason::AccountBanned => "account_banned",
            DenyReason::AccountInactive => "account_inactive",
            DenyReason::TokenInvalid => "token_invalid",
            DenyReason::TokenExpired => "token_expired",
            DenyReason::SubjectNotFound => "subject_not_found",
        }
    }

    /// Credential failures; these never reveal anything about the account.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, DenyReason::TokenInvalid | DenyReason::TokenExpired)
    }

    fn default_message(&self) -> &'static str {
        match self {
            DenyReason::InsufficientPrivilege => "insufficient privilege",
            DenyReason::SelfTargetForbidden => "cannot perform this action on your own account",
            DenyReason::TargetIsAdmin => "cannot modify admin",
            DenyReason::AccountBanned => "account is banned",
            DenyReason::AccountInactive => "account is deactivated",
            DenyReason::TokenInvalid | DenyReason::TokenExpired => "not authorized",
            DenyReason::SubjectNotFound => "user not found",
        }
    }
}

impl core::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

/// A DENY outcome.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{reason}: {}", render(.reason, .detail.as_deref()))]
pub struct Denial {
    pub reason: DenyReason,
    /// Extra context, e.g. the moderator's ban reason.
    pub detail: Option<String>,
}

impl Denial {
    pub fn new(reason: DenyReason) -> Self {
        Self { reason, detail: None }
    }

    pub fn with_detail(reason: DenyReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: Some(detail.into()),
        }
    }

    pub fn message(&self) -> String {
        render(&self.reason, self.detail.as_deref())
    }
}

fn render(reason: &DenyReason, detail: Option<&str>) -> String {
    match detail {
        Some(detail) => format!("{}: {}", reason.default_message(), detail),
        None => reason.default_message().to_string(),
    }
}

impl From<DenyReason> for Denial {
    fn from(reason: DenyReason) -> Self {
        Denial::new(reason)
    }
}

/// `Ok(())` is ALLOW.
pub type Decision = Result<(), Denial>;

/// Account-state gate, evaluated before any capability check.
///
/// A banned or deactivated account is denied whatever its role would grant.
pub fn gate_request(subject: &Subject) -> Decision {
    if subject.is_banned() {
        return Err(match &subject.ban_reason {
            Some(reason) => Denial::with_detail(DenyReason::AccountBanned, reason.clone()),
            None => Denial::new(DenyReason::AccountBanned),
        });
    }
    if !subject.is_active {
        return Err(Denial::new(DenyReason::AccountInactive));
    }
    Ok(())
}

/// Gate, then look the action up in the subject's capability set.
pub fn authorize_action(subject: &Subject, action: Action) -> Decision {
    gate_request(subject)?;
    require_capability(subject.role, action)
}

/// Owners may act on their own resources; anyone else needs `moderate_content`.
///
/// Guard for the track and playlist services, which own their resources and
/// call in with the resource owner.
pub fn authorize_owned_resource(subject: &Subject, owner: UserId) -> Decision {
    gate_request(subject)?;
    if subject.id == owner {
        return require_capability(subject.role, Action::ManageOwnContent);
    }
    require_capability(subject.role, Action::ModerateContent)
}

/// Decide whether `actor` may set `target`'s role to `requested`.
///
/// Self-targeting is refused for every role, admins included.
pub fn authorize_role_change(actor: Party, target: Party, requested: Role) -> Decision {
    if actor.id == target.id {
        return Err(Denial::new(DenyReason::SelfTargetForbidden));
    }

    match actor.role {
        Role::Admin => Ok(()),
        Role::Moderator => {
            if !Role::MODERATOR_ASSIGNABLE.contains(&requested) {
                return Err(Denial::with_detail(
                    DenyReason::InsufficientPrivilege,
                    "moderators may only assign the roles moderator, user or banned",
                ));
            }
            if target.role.is_admin() {
                return Err(Denial::new(DenyReason::TargetIsAdmin));
            }
            Ok(())
        }
        Role::User | Role::Banned => Err(Denial::new(DenyReason::InsufficientPrivilege)),
    }
}

/// Ban or unban. Admin only, never on oneself.
///
/// The target's current ban state is irrelevant: re-banning is allowed.
pub fn authorize_ban(actor_role: Role, actor_id: UserId, target_id: UserId) -> Decision {
    admin_on_other(actor_role, Action::BanUsers, actor_id, target_id)
}

/// Account deletion. Admin only, never on oneself.
pub fn authorize_delete(actor_role: Role, actor_id: UserId, target_id: UserId) -> Decision {
    admin_on_other(actor_role, Action::DeleteUsers, actor_id, target_id)
}

/// Activate/deactivate an account. Admin only, never on oneself.
pub fn authorize_toggle_active(actor_role: Role, actor_id: UserId, target_id: UserId) -> Decision {
    admin_on_other(actor_role, Action::ToggleActive, actor_id, target_id)
}

fn admin_on_other(actor_role: Role, action: Action, actor_id: UserId, target_id: UserId) -> Decision {
    require_capability(actor_role, action)?;
    if actor_id == target_id {
        return Err(Denial::new(DenyReason::SelfTargetForbidden));
    }
    Ok(())
}

fn require_capability(role: Role, action: Action) -> Decision {
    if role.permits(action) {
        Ok(())
    } else {
        Err(Denial::with_detail(
            DenyReason::InsufficientPrivilege,
            format!("role '{role}' may not {action}"),
        ))
    }
}
