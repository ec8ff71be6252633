//! The fixed capability set: which role may perform which action.

use serde::{Deserialize, Serialize};

use crate::Role;

/// An action a subject can attempt.
///
/// The content actions are checked by the services that own tracks and
/// playlists; this service only routes the account actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ViewProfile,
    UpdateProfile,
    /// Own playlists, favorites and listening history.
    ManageOwnContent,
    ListUsers,
    ChangeRole,
    UploadTracks,
    CreateTracks,
    /// Edit or delete content owned by somebody else.
    ModerateContent,
    /// Ban and unban.
    BanUsers,
    DeleteUsers,
    ToggleActive,
    AdminPanel,
}

impl Action {
    pub const ALL: [Action; 12] = [
        Action::ViewProfile,
        Action::UpdateProfile,
        Action::ManageOwnContent,
        Action::ListUsers,
        Action::ChangeRole,
        Action::UploadTracks,
        Action::CreateTracks,
        Action::ModerateContent,
        Action::BanUsers,
        Action::DeleteUsers,
        Action::ToggleActive,
        Action::AdminPanel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ViewProfile => "view_profile",
            Action::UpdateProfile => "update_profile",
            Action::ManageOwnContent => "manage_own_content",
            Action::ListUsers => "list_users",
            Action::ChangeRole => "change_role",
            Action::UploadTracks => "upload_tracks",
            Action::CreateTracks => "create_tracks",
            Action::ModerateContent => "moderate_content",
            Action::BanUsers => "ban_users",
            Action::DeleteUsers => "delete_users",
            Action::ToggleActive => "toggle_active",
            Action::AdminPanel => "admin_panel",
        }
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

const USER_CAPABILITIES: &[Action] = &[
    Action::ViewProfile,
    Action::UpdateProfile,
    Action::ManageOwnContent,
];

const MODERATOR_CAPABILITIES: &[Action] = &[
    Action::ViewProfile,
    Action::UpdateProfile,
    Action::ManageOwnContent,
    Action::ListUsers,
    Action::ChangeRole,
    Action::UploadTracks,
];

impl Role {
    /// Actions granted to this role. `Banned` grants nothing.
    pub fn capabilities(&self) -> &'static [Action] {
        match self {
            Role::User => USER_CAPABILITIES,
            Role::Moderator => MODERATOR_CAPABILITIES,
            Role::Admin => &Action::ALL,
            Role::Banned => &[],
        }
    }

    pub fn permits(&self, action: Action) -> bool {
        self.capabilities().contains(&action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banned_grants_nothing() {
        for action in Action::ALL {
            assert!(!Role::Banned.permits(action), "banned must not permit {action}");
        }
    }

    #[test]
    fn admin_grants_everything() {
        for action in Action::ALL {
            assert!(Role::Admin.permits(action));
        }
    }

    #[test]
    fn capabilities_are_nested_by_privilege() {
        for action in Role::User.capabilities() {
            assert!(Role::Moderator.permits(*action));
        }
        for action in Role::Moderator.capabilities() {
            assert!(Role::Admin.permits(*action));
        }
    }

    #[test]
    fn moderation_of_accounts_is_admin_only() {
        for action in [Action::BanUsers, Action::DeleteUsers, Action::ToggleActive, Action::AdminPanel] {
            assert!(!Role::Moderator.permits(action));
            assert!(!Role::User.permits(action));
        }
        assert!(Role::Moderator.permits(Action::ChangeRole));
        assert!(Role::Moderator.permits(Action::ListUsers));
    }
}
