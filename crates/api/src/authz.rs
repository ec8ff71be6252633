//! API-side authorization guard.
//!
//! The engine is the only place that turns a verified credential into a
//! decision. The role embedded in the credential is never used here: every
//! check starts from a fresh read of the subject.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use musicflow_auth::{
    Action, Denial, DenyReason, Party, Role, Subject, SubjectIdentity, TokenCodec, authorize_action,
    authorize_ban, authorize_delete, authorize_owned_resource, authorize_role_change, authorize_toggle_active,
    gate_request,
};
use musicflow_core::UserId;
use musicflow_infra::{StoreError, SubjectStore};

#[derive(Debug, Error)]
pub enum GuardError {
    /// Credential missing, invalid or expired, or its subject no longer exists.
    #[error("unauthenticated: {0}")]
    Unauthenticated(DenyReason),

    #[error("forbidden: {0}")]
    Forbidden(Denial),

    /// The target of the action does not exist.
    #[error("target not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GuardError {
    /// Machine-readable reason code for responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            GuardError::Unauthenticated(reason) => reason.code(),
            GuardError::Forbidden(denial) => denial.reason.code(),
            GuardError::NotFound => DenyReason::SubjectNotFound.code(),
            GuardError::Store(_) => "internal_error",
        }
    }
}

impl From<Denial> for GuardError {
    fn from(denial: Denial) -> Self {
        GuardError::Forbidden(denial)
    }
}

/// Decides ALLOW/DENY for (credential, action, target) tuples.
pub struct AuthzEngine {
    store: Arc<dyn SubjectStore>,
    tokens: Arc<dyn TokenCodec>,
}

impl AuthzEngine {
    pub fn new(store: Arc<dyn SubjectStore>, tokens: Arc<dyn TokenCodec>) -> Self {
        Self { store, tokens }
    }

    /// Verify signature and expiry and extract the identity.
    pub fn authenticate(&self, token: &str, now: DateTime<Utc>) -> Result<SubjectIdentity, GuardError> {
        self.tokens.verify(token, now).map_err(|e| {
            tracing::debug!(error = %e, "credential rejected");
            GuardError::Unauthenticated(e.reason())
        })
    }

    /// Fresh read of the whole subject record.
    pub async fn resolve_current_subject(&self, subject_id: UserId) -> Result<Subject, GuardError> {
        self.store.get(subject_id).await?.ok_or(GuardError::NotFound)
    }

    /// Fresh read of the subject's role.
    pub async fn resolve_current_role(&self, subject_id: UserId) -> Result<Role, GuardError> {
        Ok(self.resolve_current_subject(subject_id).await?.role)
    }

    /// Resolve the caller and run the account-state gate.
    ///
    /// A caller whose record is gone is treated as unauthenticated, not 404.
    pub async fn actor(&self, identity: &SubjectIdentity) -> Result<Subject, GuardError> {
        let subject = match self.resolve_current_subject(identity.subject_id).await {
            Ok(subject) => subject,
            Err(GuardError::NotFound) => {
                tracing::info!(subject_id = %identity.subject_id, "credential subject no longer exists");
                return Err(GuardError::Unauthenticated(DenyReason::SubjectNotFound));
            }
            Err(e) => return Err(e),
        };

        if subject.role != identity.claimed_role {
            tracing::debug!(
                subject_id = %subject.id,
                claimed = %identity.claimed_role,
                current = %subject.role,
                "credential role is stale"
            );
        }

        gate_request(&subject).map_err(|d| denied(&subject, "gate", d))?;
        Ok(subject)
    }

    /// `actor` followed by the capability check for `action`.
    pub async fn authorize_action(&self, identity: &SubjectIdentity, action: Action) -> Result<Subject, GuardError> {
        let actor = self.actor(identity).await?;
        self.check_action(&actor, action)?;
        Ok(actor)
    }

    pub fn check_action(&self, actor: &Subject, action: Action) -> Result<(), GuardError> {
        authorize_action(actor, action).map_err(|d| denied(actor, action.as_str(), d))
    }

    /// For track and playlist collaborators; no route in this service owns content.
    pub fn check_owned_resource(&self, actor: &Subject, owner: UserId) -> Result<(), GuardError> {
        authorize_owned_resource(actor, owner).map_err(|d| denied(actor, "owned_resource", d))
    }

    /// Role change guard.
    ///
    /// The target is only read when the actor could change anyone's role at
    /// all, so callers without the capability cannot use it to discover ids.
    pub async fn check_role_change(&self, actor: &Subject, target_id: UserId, requested: Role) -> Result<(), GuardError> {
        let target = if target_id == actor.id {
            actor.party()
        } else if !actor.role.permits(Action::ChangeRole) {
            return Err(denied(
                actor,
                Action::ChangeRole.as_str(),
                Denial::new(DenyReason::InsufficientPrivilege),
            ));
        } else {
            let role = self.resolve_current_role(target_id).await?;
            Party::new(target_id, role)
        };

        authorize_role_change(actor.party(), target, requested).map_err(|d| denied(actor, Action::ChangeRole.as_str(), d))
    }

    /// Ban and unban guard.
    pub fn check_ban(&self, actor: &Subject, target_id: UserId) -> Result<(), GuardError> {
        authorize_ban(actor.role, actor.id, target_id).map_err(|d| denied(actor, Action::BanUsers.as_str(), d))
    }

    pub fn check_delete(&self, actor: &Subject, target_id: UserId) -> Result<(), GuardError> {
        authorize_delete(actor.role, actor.id, target_id).map_err(|d| denied(actor, Action::DeleteUsers.as_str(), d))
    }

    pub fn check_toggle_active(&self, actor: &Subject, target_id: UserId) -> Result<(), GuardError> {
        authorize_toggle_active(actor.role, actor.id, target_id)
            .map_err(|d| denied(actor, Action::ToggleActive.as_str(), d))
    }
}

impl core::fmt::Debug for AuthzEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthzEngine").finish_non_exhaustive()
    }
}

fn denied(actor: &Subject, check: &str, denial: Denial) -> GuardError {
    tracing::info!(
        subject_id = %actor.id,
        role = %actor.role,
        check,
        reason = denial.reason.code(),
        "request denied"
    );
    GuardError::Forbidden(denial)
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;
    use musicflow_auth::Hs256TokenCodec;
    use musicflow_infra::InMemorySubjectStore;

    struct Fixture {
        store: Arc<InMemorySubjectStore>,
        tokens: Arc<Hs256TokenCodec>,
        engine: AuthzEngine,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemorySubjectStore::new());
        let tokens = Arc::new(Hs256TokenCodec::new("test-secret"));
        let engine = AuthzEngine::new(store.clone(), tokens.clone());
        Fixture { store, tokens, engine }
    }

    impl Fixture {
        async fn subject(&self, name: &str, role: Role) -> Subject {
            let mut subject = Subject::new(UserId::new(), name.into(), format!("{name}@example.com"), Utc::now());
            subject.role = role;
            self.store
                .insert(musicflow_infra::UserRecord {
                    subject: subject.clone(),
                    password_hash: "unused".into(),
                })
                .await
                .unwrap()
        }

        fn identity(&self, subject: &Subject) -> SubjectIdentity {
            let token = self.tokens.issue(subject, Utc::now()).unwrap();
            self.engine.authenticate(&token, Utc::now()).unwrap()
        }
    }

    fn forbidden_reason(err: GuardError) -> DenyReason {
        match err {
            GuardError::Forbidden(d) => d.reason,
            other => panic!("expected Forbidden, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn authenticate_maps_token_failures() {
        let fx = fixture();
        let alice = fx.subject("alice", Role::User).await;
        let token = fx.tokens.issue(&alice, Utc::now()).unwrap();

        let err = fx.engine.authenticate(&token, Utc::now() + Duration::hours(25)).unwrap_err();
        assert!(matches!(err, GuardError::Unauthenticated(DenyReason::TokenExpired)));

        let err = fx.engine.authenticate("garbage", Utc::now()).unwrap_err();
        assert!(matches!(err, GuardError::Unauthenticated(DenyReason::TokenInvalid)));
    }

    #[tokio::test]
    async fn stale_admin_claim_does_not_grant_admin() {
        let fx = fixture();
        let admin = fx.subject("root", Role::Admin).await;
        let identity = fx.identity(&admin);
        assert_eq!(identity.claimed_role, Role::Admin);

        fx.store.set_role(admin.id, Role::User, Utc::now()).await.unwrap();

        assert_eq!(fx.engine.resolve_current_role(admin.id).await.unwrap(), Role::User);
        let err = fx.engine.authorize_action(&identity, Action::AdminPanel).await.unwrap_err();
        assert_eq!(forbidden_reason(err), DenyReason::InsufficientPrivilege);
    }

    #[tokio::test]
    async fn resolve_current_role_follows_latest_write() {
        let fx = fixture();
        let bob = fx.subject("bob", Role::User).await;

        fx.store.set_role(bob.id, Role::Moderator, Utc::now()).await.unwrap();
        assert_eq!(fx.engine.resolve_current_role(bob.id).await.unwrap(), Role::Moderator);

        fx.store.set_role(bob.id, Role::User, Utc::now()).await.unwrap();
        assert_eq!(fx.engine.resolve_current_role(bob.id).await.unwrap(), Role::User);
    }

    #[tokio::test]
    async fn banned_actor_is_gated_before_capabilities() {
        let fx = fixture();
        let admin = fx.subject("root", Role::Admin).await;
        let identity = fx.identity(&admin);

        fx.store.ban(admin.id, Some("spam".into()), Utc::now()).await.unwrap();

        let err = fx.engine.actor(&identity).await.unwrap_err();
        match err {
            GuardError::Forbidden(d) => {
                assert_eq!(d.reason, DenyReason::AccountBanned);
                assert_eq!(d.detail.as_deref(), Some("spam"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn inactive_actor_is_gated() {
        let fx = fixture();
        let user = fx.subject("carol", Role::Moderator).await;
        let identity = fx.identity(&user);
        fx.store.toggle_active(user.id, Utc::now()).await.unwrap();

        let err = fx.engine.authorize_action(&identity, Action::ViewProfile).await.unwrap_err();
        assert_eq!(forbidden_reason(err), DenyReason::AccountInactive);
    }

    #[tokio::test]
    async fn deleted_actor_is_unauthenticated() {
        let fx = fixture();
        let user = fx.subject("dave", Role::User).await;
        let identity = fx.identity(&user);
        fx.store.delete(user.id).await.unwrap();

        let err = fx.engine.actor(&identity).await.unwrap_err();
        assert!(matches!(err, GuardError::Unauthenticated(DenyReason::SubjectNotFound)));
    }

    #[tokio::test]
    async fn moderator_role_changes() {
        let fx = fixture();
        let moderator = fx.subject("mod", Role::Moderator).await;
        let admin = fx.subject("root", Role::Admin).await;
        let user = fx.subject("eve", Role::User).await;

        let err = fx.engine.check_role_change(&moderator, admin.id, Role::User).await.unwrap_err();
        assert_eq!(forbidden_reason(err), DenyReason::TargetIsAdmin);

        let err = fx.engine.check_role_change(&moderator, user.id, Role::Admin).await.unwrap_err();
        assert_eq!(forbidden_reason(err), DenyReason::InsufficientPrivilege);

        fx.engine.check_role_change(&moderator, user.id, Role::Banned).await.unwrap();

        let err = fx.engine.check_role_change(&moderator, moderator.id, Role::User).await.unwrap_err();
        assert_eq!(forbidden_reason(err), DenyReason::SelfTargetForbidden);
    }

    #[tokio::test]
    async fn role_change_on_missing_target_is_not_found() {
        let fx = fixture();
        let admin = fx.subject("root", Role::Admin).await;
        let err = fx.engine.check_role_change(&admin, UserId::new(), Role::User).await.unwrap_err();
        assert!(matches!(err, GuardError::NotFound));
    }

    #[tokio::test]
    async fn plain_user_role_change_never_reads_the_target() {
        let fx = fixture();
        let user = fx.subject("eve", Role::User).await;
        let err = fx.engine.check_role_change(&user, UserId::new(), Role::User).await.unwrap_err();
        assert_eq!(forbidden_reason(err), DenyReason::InsufficientPrivilege);
    }

    #[tokio::test]
    async fn admin_cannot_ban_or_delete_self() {
        let fx = fixture();
        let admin = fx.subject("root", Role::Admin).await;

        assert_eq!(
            forbidden_reason(fx.engine.check_ban(&admin, admin.id).unwrap_err()),
            DenyReason::SelfTargetForbidden
        );
        assert_eq!(
            forbidden_reason(fx.engine.check_delete(&admin, admin.id).unwrap_err()),
            DenyReason::SelfTargetForbidden
        );
        assert_eq!(
            forbidden_reason(fx.engine.check_toggle_active(&admin, admin.id).unwrap_err()),
            DenyReason::SelfTargetForbidden
        );
    }

    #[tokio::test]
    async fn banning_twice_is_allowed_and_target_stays_gated() {
        let fx = fixture();
        let admin = fx.subject("root", Role::Admin).await;
        let user = fx.subject("eve", Role::User).await;
        let user_identity = fx.identity(&user);

        for _ in 0..2 {
            fx.engine.check_ban(&admin, user.id).unwrap();
            fx.store.ban(user.id, None, Utc::now()).await.unwrap();
            let err = fx.engine.actor(&user_identity).await.unwrap_err();
            assert_eq!(forbidden_reason(err), DenyReason::AccountBanned);
        }
    }

    #[tokio::test]
    async fn owned_resources_need_moderation_rights_for_others() {
        let fx = fixture();
        let user = fx.subject("eve", Role::User).await;
        let admin = fx.subject("root", Role::Admin).await;

        fx.engine.check_owned_resource(&user, user.id).unwrap();
        assert_eq!(
            forbidden_reason(fx.engine.check_owned_resource(&user, admin.id).unwrap_err()),
            DenyReason::InsufficientPrivilege
        );
        fx.engine.check_owned_resource(&admin, user.id).unwrap();
    }
}
