//! Registration and login.

use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;

use musicflow_auth::{DenyReason, Subject, normalize_email, normalize_username};
use musicflow_core::UserId;
use musicflow_infra::UserRecord;

use crate::app::extract::ApiJson;
use crate::app::{dto, errors, services::AppServices};
use crate::context::ResponseFormat;

const FORMAT: ResponseFormat = ResponseFormat::Json;

/// POST /api/auth/register
pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<dto::RegisterRequest>,
) -> Result<Response, Response> {
    let (Some(username), Some(email), Some(password)) = (
        dto::required(body.username),
        dto::required(body.email),
        body.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "username, email and password are required",
        ));
    };

    let username = normalize_username(&username).map_err(|e| errors::domain_error_to_response(e, FORMAT))?;
    let email = normalize_email(&email).map_err(|e| errors::domain_error_to_response(e, FORMAT))?;

    let password_hash = services.hash_password(password).await.map_err(|e| {
        tracing::error!(error = %e, "password hashing failed");
        errors::internal_error(FORMAT)
    })?;

    let subject = Subject::new(UserId::new(), username, email, Utc::now());
    let subject = services
        .store
        .insert(UserRecord { subject, password_hash })
        .await
        .map_err(errors::store(FORMAT))?;

    let token = issue(&services, &subject)?;
    tracing::info!(user_id = %subject.id, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(dto::AuthResponse {
            success: true,
            message: "User registered successfully",
            token,
            user: subject,
        }),
    )
        .into_response())
}

/// POST /api/auth/login
///
/// Unknown user and wrong password get the same 401. Banned users may log in;
/// every protected route then gates them.
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<dto::LoginRequest>,
) -> Result<Response, Response> {
    let (Some(username), Some(password)) = (
        dto::required(body.username),
        body.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "username and password are required",
        ));
    };

    let invalid = || errors::json_error(StatusCode::UNAUTHORIZED, "invalid_credentials", "invalid username or password");

    let Some(record) = services
        .store
        .find_by_username(&username)
        .await
        .map_err(errors::store(FORMAT))?
    else {
        return Err(invalid());
    };

    let verified = services
        .verify_password(password, record.password_hash)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, user_id = %record.subject.id, "password verification failed");
            errors::internal_error(FORMAT)
        })?;
    if !verified {
        tracing::info!(user_id = %record.subject.id, "login rejected: bad password");
        return Err(invalid());
    }

    let subject = record.subject;
    if !subject.is_active {
        return Err(errors::json_error(
            StatusCode::FORBIDDEN,
            DenyReason::AccountInactive.code(),
            "account is deactivated",
        ));
    }

    let token = issue(&services, &subject)?;
    tracing::info!(user_id = %subject.id, role = %subject.role, "login succeeded");

    Ok(Json(dto::AuthResponse {
        success: true,
        message: "Login successful",
        token,
        user: subject,
    })
    .into_response())
}

fn issue(services: &AppServices, subject: &Subject) -> Result<String, Response> {
    services.issue_token(subject).map_err(|e| {
        tracing::error!(error = %e, "token issuing failed");
        errors::internal_error(FORMAT)
    })
}
