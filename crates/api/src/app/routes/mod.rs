use axum::{
    Router,
    routing::{delete, get, post, put},
};

pub mod admin;
pub mod auth;
pub mod system;
pub mod users;

/// Endpoints that need no credential.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/api/health", get(system::api_health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
}

/// Endpoints behind the bearer/cookie credential check.
pub fn protected_router() -> Router {
    Router::new()
        .route("/api/debug/whoami", get(system::whoami))
        .route("/api/users", get(users::list_users))
        .route("/api/users/profile", get(users::get_profile).put(users::update_profile))
        .route("/api/users/:id", delete(users::delete_user))
        .route("/api/users/:id/role", put(users::change_role))
        .route("/api/users/:id/ban", post(users::ban_user))
        .route("/api/users/:id/unban", post(users::unban_user))
        .nest("/admin", admin::router())
}
