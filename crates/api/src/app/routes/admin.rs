//! Admin panel: dashboard, user list and form endpoints.
//!
//! Browser form posts: success redirects back to the user list (303), failure
//! renders an error page unless the client asked for JSON. Every route needs
//! the `admin_panel` capability on the caller's current role, checked before
//! any input is looked at.
//!
//! Panel ban/unban only flip the role; ban reason and time are API-only.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::Utc;

use musicflow_auth::{Action, Role, Subject};
use musicflow_core::UserId;

use crate::app::extract::ApiForm;
use crate::app::routes::users::parse_role;
use crate::app::{dto, errors, services::AppServices};
use crate::authz::GuardError;
use crate::context::{PrincipalContext, ResponseFormat};

const USERS_PAGE: &str = "/admin/users";

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/users", get(list_users))
        .route("/users/:id/role", post(change_role))
        .route("/users/:id/ban", post(ban_user))
        .route("/users/:id/unban", post(unban_user))
        .route("/users/:id/toggle-active", post(toggle_active))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET /admin
pub async fn dashboard(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(format): Extension<ResponseFormat>,
) -> Result<Response, Response> {
    let actor = panel_actor(&services, &principal, format).await?;
    let users = services.store.list().await.map_err(errors::store(format))?;

    let count = |role: Role| users.iter().filter(|u| u.role == role).count();
    let counts: Vec<(Role, usize)> = Role::ALL.iter().map(|&r| (r, count(r))).collect();

    if format == ResponseFormat::Json {
        let by_role: serde_json::Map<String, serde_json::Value> = counts
            .iter()
            .map(|(role, n)| (role.as_str().to_string(), serde_json::Value::from(*n)))
            .collect();
        return Ok(Json(serde_json::json!({
            "success": true,
            "total": users.len(),
            "byRole": by_role,
        }))
        .into_response());
    }

    let items: String = counts
        .iter()
        .map(|(role, n)| format!("<li>{role}: {n}</li>"))
        .collect();
    let body = format!(
        "<h1>Admin panel</h1>\n<p>Signed in as {}</p>\n<p>{} users</p>\n<ul>{items}</ul>\n\
         <p><a href=\"{USERS_PAGE}\">Manage users</a></p>",
        errors::escape_html(&actor.username),
        users.len(),
    );
    Ok(page("Admin panel", &body))
}

/// GET /admin/users
///
/// All users, newest first.
pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(format): Extension<ResponseFormat>,
) -> Result<Response, Response> {
    panel_actor(&services, &principal, format).await?;
    let users = services.store.list().await.map_err(errors::store(format))?;

    if format == ResponseFormat::Json {
        return Ok(Json(dto::UserListResponse {
            success: true,
            count: users.len(),
            users,
        })
        .into_response());
    }

    let rows: String = users.iter().map(user_row).collect();
    let body = format!(
        "<h1>Users</h1>\n<table>\n<thead><tr><th>Username</th><th>Email</th><th>Role</th>\
         <th>Active</th><th>Created</th><th>Actions</th></tr></thead>\n<tbody>\n{rows}</tbody>\n</table>"
    );
    Ok(page("Users", &body))
}

/// POST /admin/users/:id/role
pub async fn change_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(format): Extension<ResponseFormat>,
    Path(id): Path<String>,
    ApiForm(form): ApiForm<dto::ChangeRoleRequest>,
) -> Result<Response, Response> {
    let actor = panel_actor(&services, &principal, format).await?;
    let target_id = errors::parse_user_id(&id, format)?;
    let requested = parse_role(form.role, format)?;

    services
        .engine
        .check_role_change(&actor, target_id, requested)
        .await
        .map_err(errors::guard(format))?;

    set_role(&services, target_id, requested, format).await?;
    tracing::info!(actor = %actor.id, target = %target_id, role = %requested, "role changed from admin panel");
    Ok(back_to_users())
}

/// POST /admin/users/:id/ban
pub async fn ban_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(format): Extension<ResponseFormat>,
    Path(id): Path<String>,
) -> Result<Response, Response> {
    let actor = panel_actor(&services, &principal, format).await?;
    let target_id = errors::parse_user_id(&id, format)?;
    services
        .engine
        .check_ban(&actor, target_id)
        .map_err(errors::guard(format))?;

    set_role(&services, target_id, Role::Banned, format).await?;
    tracing::info!(actor = %actor.id, target = %target_id, "user banned from admin panel");
    Ok(back_to_users())
}

/// POST /admin/users/:id/unban
pub async fn unban_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(format): Extension<ResponseFormat>,
    Path(id): Path<String>,
) -> Result<Response, Response> {
    let actor = panel_actor(&services, &principal, format).await?;
    let target_id = errors::parse_user_id(&id, format)?;
    services
        .engine
        .check_ban(&actor, target_id)
        .map_err(errors::guard(format))?;

    set_role(&services, target_id, Role::User, format).await?;
    tracing::info!(actor = %actor.id, target = %target_id, "user unbanned from admin panel");
    Ok(back_to_users())
}

/// POST /admin/users/:id/toggle-active
pub async fn toggle_active(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(format): Extension<ResponseFormat>,
    Path(id): Path<String>,
) -> Result<Response, Response> {
    let actor = panel_actor(&services, &principal, format).await?;
    let target_id = errors::parse_user_id(&id, format)?;
    services
        .engine
        .check_toggle_active(&actor, target_id)
        .map_err(errors::guard(format))?;

    let user = services
        .store
        .toggle_active(target_id, Utc::now())
        .await
        .map_err(errors::store(format))?
        .ok_or_else(|| errors::guard_error_to_response(GuardError::NotFound, format))?;

    tracing::info!(actor = %actor.id, target = %target_id, active = user.is_active, "user activity toggled");
    Ok(back_to_users())
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

async fn panel_actor(
    services: &AppServices,
    principal: &PrincipalContext,
    format: ResponseFormat,
) -> Result<Subject, Response> {
    services
        .engine
        .authorize_action(principal.identity(), Action::AdminPanel)
        .await
        .map_err(errors::guard(format))
}

async fn set_role(services: &AppServices, target_id: UserId, role: Role, format: ResponseFormat) -> Result<Subject, Response> {
    services
        .store
        .set_role(target_id, role, Utc::now())
        .await
        .map_err(errors::store(format))?
        .ok_or_else(|| errors::guard_error_to_response(GuardError::NotFound, format))
}

fn user_row(user: &Subject) -> String {
    let id = user.id;
    let ban_action = if user.is_banned() { "unban" } else { "ban" };
    let toggle_label = if user.is_active { "Deactivate" } else { "Activate" };
    let options: String = Role::ALL
        .iter()
        .map(|r| {
            let selected = if *r == user.role { " selected" } else { "" };
            format!("<option value=\"{r}\"{selected}>{r}</option>")
        })
        .collect();

    format!(
        "<tr><td>{username}</td><td>{email}</td><td>{role}</td><td>{active}</td><td>{created}</td><td>\
         <form method=\"post\" action=\"/admin/users/{id}/role\"><select name=\"role\">{options}</select>\
         <button type=\"submit\">Set role</button></form>\
         <form method=\"post\" action=\"/admin/users/{id}/{ban_action}\"><button type=\"submit\">{ban_action}</button></form>\
         <form method=\"post\" action=\"/admin/users/{id}/toggle-active\"><button type=\"submit\">{toggle_label}</button></form>\
         </td></tr>\n",
        username = errors::escape_html(&user.username),
        email = errors::escape_html(&user.email),
        role = user.role,
        active = if user.is_active { "yes" } else { "no" },
        created = user.created_at.format("%Y-%m-%d %H:%M"),
    )
}

fn page(title: &str, body: &str) -> Response {
    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n<body>\n{body}\n</body>\n</html>\n"
    ))
    .into_response()
}

fn back_to_users() -> Response {
    Redirect::to(USERS_PAGE).into_response()
}
