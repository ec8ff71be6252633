//! User management over the JSON API.
//!
//! Handlers are thin: the caller is resolved and gated first, then input is
//! validated, then one store write. A write that finds no row is a 404.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;

use musicflow_auth::{Action, Role, normalize_email, normalize_username};
use musicflow_infra::ProfileUpdate;

use crate::app::extract::ApiJson;
use crate::app::{dto, errors, services::AppServices};
use crate::authz::GuardError;
use crate::context::{PrincipalContext, ResponseFormat};

const FORMAT: ResponseFormat = ResponseFormat::Json;

/// GET /api/users
pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, Response> {
    services
        .engine
        .authorize_action(principal.identity(), Action::ListUsers)
        .await
        .map_err(errors::guard(FORMAT))?;

    let users = services.store.list().await.map_err(errors::store(FORMAT))?;

    Ok(Json(dto::UserListResponse {
        success: true,
        count: users.len(),
        users,
    })
    .into_response())
}

/// GET /api/users/profile
pub async fn get_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, Response> {
    let actor = services
        .engine
        .authorize_action(principal.identity(), Action::ViewProfile)
        .await
        .map_err(errors::guard(FORMAT))?;

    Ok(Json(dto::UserResponse::new(actor)).into_response())
}

/// PUT /api/users/profile
pub async fn update_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::UpdateProfileRequest>,
) -> Result<Response, Response> {
    let actor = services
        .engine
        .authorize_action(principal.identity(), Action::UpdateProfile)
        .await
        .map_err(errors::guard(FORMAT))?;

    let update = ProfileUpdate {
        username: body
            .username
            .map(|u| normalize_username(&u))
            .transpose()
            .map_err(|e| errors::domain_error_to_response(e, FORMAT))?,
        email: body
            .email
            .map(|e| normalize_email(&e))
            .transpose()
            .map_err(|e| errors::domain_error_to_response(e, FORMAT))?,
    };
    if update.is_empty() {
        return Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "nothing to update",
        ));
    }

    let user = services
        .store
        .update_profile(actor.id, update, Utc::now())
        .await
        .map_err(errors::store(FORMAT))?
        .ok_or_else(|| errors::guard_error_to_response(GuardError::NotFound, FORMAT))?;

    Ok(Json(dto::UserResponse::with_message(user, "Profile updated successfully")).into_response())
}

/// PUT /api/users/:id/role
pub async fn change_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::ChangeRoleRequest>,
) -> Result<Response, Response> {
    let actor = services
        .engine
        .actor(principal.identity())
        .await
        .map_err(errors::guard(FORMAT))?;
    let target_id = errors::parse_user_id(&id, FORMAT)?;
    let requested = parse_role(body.role, FORMAT)?;
    services
        .engine
        .check_role_change(&actor, target_id, requested)
        .await
        .map_err(errors::guard(FORMAT))?;

    let user = services
        .store
        .set_role(target_id, requested, Utc::now())
        .await
        .map_err(errors::store(FORMAT))?
        .ok_or_else(|| errors::guard_error_to_response(GuardError::NotFound, FORMAT))?;

    tracing::info!(actor = %actor.id, target = %target_id, role = %requested, "role changed");
    Ok(Json(dto::UserResponse::with_message(user, format!("User role updated to {requested}"))).into_response())
}

/// POST /api/users/:id/ban
///
/// Records the reason (if any) and the ban time.
pub async fn ban_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<ApiJson<dto::BanRequest>>,
) -> Result<Response, Response> {
    let actor = services
        .engine
        .actor(principal.identity())
        .await
        .map_err(errors::guard(FORMAT))?;
    let target_id = errors::parse_user_id(&id, FORMAT)?;
    services
        .engine
        .check_ban(&actor, target_id)
        .map_err(errors::guard(FORMAT))?;

    let reason = body.and_then(|ApiJson(b)| dto::required(b.reason));
    let user = services
        .store
        .ban(target_id, reason, Utc::now())
        .await
        .map_err(errors::store(FORMAT))?
        .ok_or_else(|| errors::guard_error_to_response(GuardError::NotFound, FORMAT))?;

    tracing::info!(actor = %actor.id, target = %target_id, "user banned");
    Ok(Json(dto::UserResponse::with_message(user, "User banned successfully")).into_response())
}

/// POST /api/users/:id/unban
pub async fn unban_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, Response> {
    let actor = services
        .engine
        .actor(principal.identity())
        .await
        .map_err(errors::guard(FORMAT))?;
    let target_id = errors::parse_user_id(&id, FORMAT)?;
    services
        .engine
        .check_ban(&actor, target_id)
        .map_err(errors::guard(FORMAT))?;

    let user = services
        .store
        .unban(target_id, Utc::now())
        .await
        .map_err(errors::store(FORMAT))?
        .ok_or_else(|| errors::guard_error_to_response(GuardError::NotFound, FORMAT))?;

    tracing::info!(actor = %actor.id, target = %target_id, "user unbanned");
    Ok(Json(dto::UserResponse::with_message(user, "User unbanned successfully")).into_response())
}

/// DELETE /api/users/:id
pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, Response> {
    let actor = services
        .engine
        .actor(principal.identity())
        .await
        .map_err(errors::guard(FORMAT))?;
    let target_id = errors::parse_user_id(&id, FORMAT)?;
    services
        .engine
        .check_delete(&actor, target_id)
        .map_err(errors::guard(FORMAT))?;

    services
        .store
        .delete(target_id)
        .await
        .map_err(errors::store(FORMAT))?
        .ok_or_else(|| errors::guard_error_to_response(GuardError::NotFound, FORMAT))?;

    tracing::info!(actor = %actor.id, target = %target_id, "user deleted");
    Ok(Json(dto::MessageResponse {
        success: true,
        message: "User deleted successfully".to_string(),
    })
    .into_response())
}

/// Missing or unknown role names are a 400.
pub(crate) fn parse_role(raw: Option<String>, format: ResponseFormat) -> Result<Role, Response> {
    let allowed = Role::ALL.map(|r| r.as_str()).join(", ");
    dto::required(raw)
        .and_then(|r| r.parse::<Role>().ok())
        .ok_or_else(|| {
            errors::error_response(
                format,
                StatusCode::BAD_REQUEST,
                "invalid_role",
                format!("role must be one of: {allowed}"),
            )
        })
}
