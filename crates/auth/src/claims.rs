use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use musicflow_core::UserId;

use crate::{DenyReason, Role, SubjectIdentity};

/// Claims carried by a credential (JWT body).
///
/// Timestamps are unix seconds, as registered JWT claims require.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialClaims {
    /// Subject identifier.
    pub sub: UserId,

    pub username: String,

    /// Role snapshot at issuance time.
    pub role: Role,

    /// Issued-at.
    pub iat: i64,

    /// Expiration.
    pub exp: i64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed or its signature does not verify: {0}")]
    Malformed(String),

    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (iat is in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,

    #[error("failed to encode token: {0}")]
    Encoding(String),
}

impl TokenError {
    /// Machine-readable denial reason for this failure.
    pub fn reason(&self) -> DenyReason {
        match self {
            TokenError::Expired => DenyReason::TokenExpired,
            _ => DenyReason::TokenInvalid,
        }
    }
}

impl CredentialClaims {
    pub fn issued_at(&self) -> Result<DateTime<Utc>, TokenError> {
        DateTime::from_timestamp(self.iat, 0).ok_or(TokenError::InvalidTimeWindow)
    }

    pub fn expires_at(&self) -> Result<DateTime<Utc>, TokenError> {
        DateTime::from_timestamp(self.exp, 0).ok_or(TokenError::InvalidTimeWindow)
    }

    pub fn into_identity(self) -> Result<SubjectIdentity, TokenError> {
        Ok(SubjectIdentity {
            issued_at: self.issued_at()?,
            expires_at: self.expires_at()?,
            subject_id: self.sub,
            username: self.username,
            claimed_role: self.role,
        })
    }
}

/// Deterministically validate the claim time window against `now`.
///
/// Signature verification happens before this, in the token codec.
pub fn validate_claims(claims: &CredentialClaims, now: DateTime<Utc>) -> Result<(), TokenError> {
    let issued_at = claims.issued_at()?;
    let expires_at = claims.expires_at()?;

    if expires_at <= issued_at {
        return Err(TokenError::InvalidTimeWindow);
    }
    if now < issued_at {
        return Err(TokenError::NotYetValid);
    }
    if now >= expires_at {
        return Err(TokenError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn claims(iat: DateTime<Utc>, exp: DateTime<Utc>) -> CredentialClaims {
        CredentialClaims {
            sub: UserId::new(),
            username: "alice".to_string(),
            role: Role::User,
            iat: iat.timestamp(),
            exp: exp.timestamp(),
        }
    }

    #[test]
    fn accepts_inside_window() {
        let now = Utc::now();
        let c = claims(now - Duration::minutes(1), now + Duration::hours(1));
        assert_eq!(validate_claims(&c, now), Ok(()));
    }

    #[test]
    fn expiry_is_exclusive() {
        let now = Utc::now();
        let c = claims(now - Duration::hours(1), now);
        assert_eq!(validate_claims(&c, now), Err(TokenError::Expired));
        assert_eq!(TokenError::Expired.reason(), DenyReason::TokenExpired);
    }

    #[test]
    fn future_and_inverted_windows_are_invalid() {
        let now = Utc::now();
        let future = claims(now + Duration::hours(1), now + Duration::hours(2));
        assert_eq!(validate_claims(&future, now), Err(TokenError::NotYetValid));

        let inverted = claims(now, now - Duration::hours(1));
        assert_eq!(validate_claims(&inverted, now), Err(TokenError::InvalidTimeWindow));
        assert_eq!(TokenError::InvalidTimeWindow.reason(), DenyReason::TokenInvalid);
    }
}
