//! Credential issuing and verification (HS256 JWT).

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::{CredentialClaims, Subject, SubjectIdentity, TokenError, validate_claims};

/// Fixed credential lifetime.
pub const TOKEN_TTL_HOURS: i64 = 24;

pub fn token_ttl() -> Duration {
    Duration::hours(TOKEN_TTL_HOURS)
}

/// Issues and verifies bearer credentials.
///
/// `now` is always passed in so expiry is deterministic under test.
pub trait TokenCodec: Send + Sync {
    fn issue(&self, subject: &Subject, now: DateTime<Utc>) -> Result<String, TokenError>;

    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<SubjectIdentity, TokenError>;
}

/// HMAC-SHA256 signed JWTs keyed by a server-side secret.
pub struct Hs256TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl Hs256TokenCodec {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked by `validate_claims` against the caller's clock, without leeway.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl core::fmt::Debug for Hs256TokenCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec for Hs256TokenCodec {
    fn issue(&self, subject: &Subject, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = CredentialClaims {
            sub: subject.id,
            username: subject.username.clone(),
            role: subject.role,
            iat: now.timestamp(),
            exp: (now + token_ttl()).timestamp(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<SubjectIdentity, TokenError> {
        let data = jsonwebtoken::decode::<CredentialClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| TokenError::Malformed(e.to_string()))?;

        validate_claims(&data.claims, now)?;
        data.claims.into_identity()
    }
}

#[cfg(test)]
mod tests {
    use musicflow_core::UserId;

    use super::*;
    use crate::Role;

    fn subject(role: Role) -> Subject {
        let mut s = Subject::new(UserId::new(), "erin".into(), "erin@example.com".into(), Utc::now());
        s.role = role;
        s
    }

    #[test]
    fn issued_token_verifies_to_same_identity() {
        let codec = Hs256TokenCodec::new("secret");
        let now = Utc::now();
        let s = subject(Role::Moderator);

        let token = codec.issue(&s, now).unwrap();
        let identity = codec.verify(&token, now).unwrap();

        assert_eq!(identity.subject_id, s.id);
        assert_eq!(identity.username, "erin");
        assert_eq!(identity.claimed_role, Role::Moderator);
        assert_eq!(identity.expires_at.timestamp() - identity.issued_at.timestamp(), 24 * 3600);
    }

    #[test]
    fn token_expires_after_ttl() {
        let codec = Hs256TokenCodec::new("secret");
        let issued = Utc::now();
        let token = codec.issue(&subject(Role::User), issued).unwrap();

        assert!(codec.verify(&token, issued + Duration::hours(23)).is_ok());
        let err = codec.verify(&token, issued + token_ttl()).unwrap_err();
        assert_eq!(err, TokenError::Expired);
    }

    #[test]
    fn wrong_secret_is_malformed() {
        let now = Utc::now();
        let token = Hs256TokenCodec::new("one").issue(&subject(Role::Admin), now).unwrap();
        let err = Hs256TokenCodec::new("two").verify(&token, now).unwrap_err();
        assert!(matches!(err, TokenError::Malformed(_)));
        assert_eq!(err.reason(), crate::DenyReason::TokenInvalid);
    }

    #[test]
    fn garbage_is_malformed() {
        let codec = Hs256TokenCodec::new("secret");
        assert!(matches!(codec.verify("not.a.jwt", Utc::now()), Err(TokenError::Malformed(_))));
        assert!(matches!(codec.verify("", Utc::now()), Err(TokenError::Malformed(_))));
    }
}
