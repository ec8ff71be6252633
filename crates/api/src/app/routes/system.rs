use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use musicflow_auth::DenyReason;

use crate::app::{dto, errors, services::AppServices};
use crate::authz::GuardError;
use crate::context::{PrincipalContext, ResponseFormat};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn api_health() -> impl IntoResponse {
    Json(json!({ "success": true, "status": "ok" }))
}

/// GET /api/debug/whoami
///
/// Not gated: a banned or stale caller can still see what the server thinks
/// of their credential.
pub async fn whoami(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, Response> {
    let current = services
        .engine
        .resolve_current_subject(principal.subject_id())
        .await
        .map_err(|e| match e {
            GuardError::NotFound => GuardError::Unauthenticated(DenyReason::SubjectNotFound),
            other => other,
        })
        .map_err(errors::guard(ResponseFormat::Json))?;

    Ok(Json(dto::WhoAmIResponse::new(principal.identity().clone(), current)).into_response())
}
