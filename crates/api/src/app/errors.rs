use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use serde_json::json;

use musicflow_core::{DomainError, UserId};
use musicflow_infra::StoreError;

use crate::authz::GuardError;
use crate::context::ResponseFormat;

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Minimal error page for browser clients.
pub fn html_error(status: StatusCode, message: impl Into<String>) -> Response {
    let title = status.canonical_reason().unwrap_or("Error");
    let body = format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{code} {title}</title></head>\n\
         <body>\n<h1>{code} {title}</h1>\n<p>{message}</p>\n<p><a href=\"/\">Back to home</a></p>\n</body>\n</html>\n",
        code = status.as_u16(),
        title = escape_html(title),
        message = escape_html(&message.into()),
    );
    (status, Html(body)).into_response()
}

pub fn error_response(
    format: ResponseFormat,
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> Response {
    match format {
        ResponseFormat::Json => json_error(status, code, message),
        ResponseFormat::Html => html_error(status, message),
    }
}

/// `map_err` adapter for engine results.
pub fn guard(format: ResponseFormat) -> impl Fn(GuardError) -> Response {
    move |e| guard_error_to_response(e, format)
}

/// `map_err` adapter for store results.
pub fn store(format: ResponseFormat) -> impl Fn(StoreError) -> Response {
    move |e| store_error_to_response(e, format)
}

/// Parse a user id taken from the path.
pub fn parse_user_id(raw: &str, format: ResponseFormat) -> Result<UserId, Response> {
    raw.parse::<UserId>()
        .map_err(|_| error_response(format, StatusCode::BAD_REQUEST, "invalid_id", "invalid user id"))
}

pub fn guard_error_to_response(err: GuardError, format: ResponseFormat) -> Response {
    match err {
        // Authentication failures never say why beyond the code.
        GuardError::Unauthenticated(reason) => {
            error_response(format, StatusCode::UNAUTHORIZED, reason.code(), "not authorized")
        }
        GuardError::Forbidden(denial) => {
            error_response(format, StatusCode::FORBIDDEN, denial.reason.code(), denial.message())
        }
        GuardError::NotFound => error_response(format, StatusCode::NOT_FOUND, "subject_not_found", "user not found"),
        GuardError::Store(e) => store_error_to_response(e, format),
    }
}

pub fn store_error_to_response(err: StoreError, format: ResponseFormat) -> Response {
    match err {
        StoreError::Conflict(msg) => error_response(format, StatusCode::CONFLICT, "conflict", msg),
        e => {
            tracing::error!(error = %e, "subject store failure");
            internal_error(format)
        }
    }
}

pub fn domain_error_to_response(err: DomainError, format: ResponseFormat) -> Response {
    match err {
        DomainError::Validation(msg) => error_response(format, StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => error_response(format, StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::NotFound => error_response(format, StatusCode::NOT_FOUND, "not_found", "not found"),
        DomainError::Conflict(msg) => error_response(format, StatusCode::CONFLICT, "conflict", msg),
    }
}

pub fn internal_error(format: ResponseFormat) -> Response {
    error_response(
        format,
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "internal server error",
    )
}

pub(crate) fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use musicflow_auth::{Denial, DenyReason};

    #[test]
    fn guard_errors_map_to_statuses() {
        let f = ResponseFormat::Json;
        let cases = [
            (GuardError::Unauthenticated(DenyReason::TokenExpired), StatusCode::UNAUTHORIZED),
            (GuardError::Unauthenticated(DenyReason::SubjectNotFound), StatusCode::UNAUTHORIZED),
            (GuardError::Forbidden(Denial::new(DenyReason::AccountBanned)), StatusCode::FORBIDDEN),
            (GuardError::Forbidden(Denial::new(DenyReason::TargetIsAdmin)), StatusCode::FORBIDDEN),
            (GuardError::NotFound, StatusCode::NOT_FOUND),
            (GuardError::Store(StoreError::Unavailable("down".into())), StatusCode::INTERNAL_SERVER_ERROR),
            (GuardError::Store(StoreError::Conflict("taken".into())), StatusCode::CONFLICT),
        ];
        for (err, status) in cases {
            assert_eq!(guard_error_to_response(err, f).status(), status);
        }
    }

    #[test]
    fn html_errors_are_html() {
        let res = guard_error_to_response(
            GuardError::Forbidden(Denial::new(DenyReason::InsufficientPrivilege)),
            ResponseFormat::Html,
        );
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        let content_type = res.headers().get(axum::http::header::CONTENT_TYPE).unwrap();
        assert!(content_type.to_str().unwrap().starts_with("text/html"));
    }

    #[test]
    fn html_is_escaped() {
        assert_eq!(escape_html("<b>\"x\" & 'y'</b>"), "&lt;b&gt;&quot;x&quot; &amp; &#39;y&#39;&lt;/b&gt;");
    }
}
