//! `musicflow-auth` — pure authentication/authorization policy.
//!
//! No HTTP and no storage here: callers read subject state and hand it in.

pub mod authorize;
pub mod claims;
pub mod password;
pub mod permissions;
pub mod roles;
pub mod subject;
pub mod token;

pub use authorize::{
    Decision, Denial, DenyReason, authorize_action, authorize_ban, authorize_delete,
    authorize_owned_resource, authorize_role_change, authorize_toggle_active, gate_request,
};
pub use claims::{CredentialClaims, TokenError, validate_claims};
pub use password::{PasswordError, PasswordHasher};
pub use permissions::Action;
pub use roles::Role;
pub use subject::{Party, Subject, SubjectIdentity, normalize_email, normalize_username};
pub use token::{Hs256TokenCodec, TOKEN_TTL_HOURS, TokenCodec, token_ttl};
