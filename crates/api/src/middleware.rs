use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use musicflow_auth::DenyReason;

use crate::app::errors;
use crate::authz::{AuthzEngine, GuardError};
use crate::context::{PrincipalContext, ResponseFormat};

/// Name of the cookie browser clients carry the credential in.
pub const TOKEN_COOKIE: &str = "token";

#[derive(Clone)]
pub struct AuthState {
    pub engine: Arc<AuthzEngine>,
}

/// Insert the response format for every request, so handlers and the auth
/// layer render errors the same way.
pub async fn negotiate_format(mut req: axum::http::Request<axum::body::Body>, next: Next) -> Response {
    let accept = req.headers().get(header::ACCEPT).and_then(|v| v.to_str().ok());
    let format = ResponseFormat::negotiate(accept, req.uri().path());
    req.extensions_mut().insert(format);
    next.run(req).await
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let format = req
        .extensions()
        .get::<ResponseFormat>()
        .copied()
        .unwrap_or(ResponseFormat::Json);

    let identity = {
        let Some(token) = extract_token(req.headers()) else {
            return errors::guard_error_to_response(GuardError::Unauthenticated(DenyReason::TokenInvalid), format);
        };
        match state.engine.authenticate(token, Utc::now()) {
            Ok(identity) => identity,
            Err(e) => return errors::guard_error_to_response(e, format),
        }
    };

    req.extensions_mut().insert(PrincipalContext::new(identity));

    next.run(req).await
}

/// Bearer header first, then the `token` cookie.
fn extract_token(headers: &HeaderMap) -> Option<&str> {
    extract_bearer(headers).or_else(|| extract_cookie(headers, TOKEN_COOKIE))
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

fn extract_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim())
        .filter(|v| !v.is_empty())
}
