use musicflow_auth::{Role, SubjectIdentity};
use musicflow_core::UserId;

/// Principal context for a request (identity extracted from the credential).
///
/// Carries the claimed role for display only; authorization always re-reads
/// the subject through the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    identity: SubjectIdentity,
}

impl PrincipalContext {
    pub fn new(identity: SubjectIdentity) -> Self {
        Self { identity }
    }

    pub fn subject_id(&self) -> UserId {
        self.identity.subject_id
    }

    pub fn claimed_role(&self) -> Role {
        self.identity.claimed_role
    }

    pub fn identity(&self) -> &SubjectIdentity {
        &self.identity
    }
}

/// How errors should be rendered for this request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResponseFormat {
    Json,
    Html,
}

impl ResponseFormat {
    /// JSON when the client asks for it or the path is under `/api`.
    pub fn negotiate(accept: Option<&str>, path: &str) -> Self {
        let wants_json = accept.is_some_and(|a| a.contains("application/json"));
        if wants_json || path.starts_with("/api") {
            ResponseFormat::Json
        } else {
            ResponseFormat::Html
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_paths_always_get_json() {
        assert_eq!(ResponseFormat::negotiate(None, "/api/users"), ResponseFormat::Json);
        assert_eq!(ResponseFormat::negotiate(Some("text/html"), "/api/users"), ResponseFormat::Json);
    }

    #[test]
    fn browser_paths_get_html_unless_json_is_accepted() {
        assert_eq!(ResponseFormat::negotiate(Some("text/html"), "/admin/users"), ResponseFormat::Html);
        assert_eq!(ResponseFormat::negotiate(None, "/admin/users"), ResponseFormat::Html);
        assert_eq!(
            ResponseFormat::negotiate(Some("text/html, application/json;q=0.9"), "/admin/users"),
            ResponseFormat::Json
        );
    }
}
