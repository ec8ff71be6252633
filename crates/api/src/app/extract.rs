//! Body extractors that reject with the same error envelope as handlers.
//!
//! `axum::Json` and `axum::Form` answer malformed input with a plain-text
//! body; these wrappers render the rejection as JSON or HTML depending on the
//! negotiated `ResponseFormat`.

use axum::{
    Form, Json, async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::Response,
};
use serde::de::DeserializeOwned;

use crate::app::errors;
use crate::context::ResponseFormat;

/// JSON request body.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

/// `application/x-www-form-urlencoded` request body.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiForm<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let format = request_format(&req);
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(rejection_response(format, rejection.status(), rejection.body_text())),
        }
    }
}

#[async_trait]
impl<T, S> FromRequest<S> for ApiForm<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let format = request_format(&req);
        match Form::<T>::from_request(req, state).await {
            Ok(Form(value)) => Ok(Self(value)),
            Err(rejection) => Err(rejection_response(format, rejection.status(), rejection.body_text())),
        }
    }
}

fn request_format(req: &Request) -> ResponseFormat {
    req.extensions()
        .get::<ResponseFormat>()
        .copied()
        .unwrap_or(ResponseFormat::Json)
}

fn rejection_response(format: ResponseFormat, status: StatusCode, message: String) -> Response {
    let code = match status {
        StatusCode::UNSUPPORTED_MEDIA_TYPE => "unsupported_media_type",
        StatusCode::PAYLOAD_TOO_LARGE => "payload_too_large",
        _ => "invalid_body",
    };
    tracing::debug!(status = status.as_u16(), code, "request body rejected");
    errors::error_response(format, status, code, message)
}
