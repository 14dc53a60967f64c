//! Login, token refresh, logout and self-service password change.

use axum::{extract::State, Json};
use chrono::Utc;
use metrics::counter;
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime};
use service_core::error::AppError;

use crate::dtos::auth::{
    ChangePasswordRequest, LoginRequest, LoginResponse, RefreshRequest, RefreshResponse,
    UserResponse,
};
use crate::dtos::ApiResponse;
use crate::middleware::auth::DEACTIVATED_MESSAGE;
use crate::middleware::CurrentUser;
use crate::models::user::normalize_email;
use crate::models::{AuditAction, EntityType, User};
use crate::services::{hash_refresh_token, AuditEntry};
use crate::utils::{
    hash_password, verify_password, Password, PasswordHashString, RequestMeta, ValidatedJson,
};
use crate::AppState;

const INVALID_CREDENTIALS: &str = "Invalid credentials";
const INVALID_REFRESH_TOKEN: &str = "Invalid refresh token";
const REFRESH_EXPIRED: &str = "Refresh token expired. Please login again.";

fn check_password(user: &User, candidate: &str) -> bool {
    let hash = PasswordHashString::new(user.password_hash.clone());
    verify_password(&Password::new(candidate), &hash).is_ok()
}

/// Exchange credentials for an access/refresh token pair.
///
/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    meta: RequestMeta,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, AppError> {
    let email = normalize_email(&req.email);

    let user = match state.db.users().find_one(doc! { "email": email.as_str() }, None).await? {
        Some(user) => user,
        None => {
            counter!("login_attempts_total", "outcome" => "unknown_user").increment(1);
            tracing::info!(email = %email, "Login failed: unknown email");
            return Err(AppError::unauthorized(INVALID_CREDENTIALS));
        }
    };

    if !user.is_active {
        counter!("login_attempts_total", "outcome" => "deactivated").increment(1);
        tracing::info!(user_id = %user.id, "Login refused for deactivated account");
        return Err(AppError::unauthorized(DEACTIVATED_MESSAGE));
    }

    if !check_password(&user, &req.password) {
        counter!("login_attempts_total", "outcome" => "bad_password").increment(1);
        tracing::info!(user_id = %user.id, "Login failed: wrong password");
        return Err(AppError::unauthorized(INVALID_CREDENTIALS));
    }

    let user_id = user.id.to_hex();
    let access_token = state.jwt.generate_access_token(&user_id, user.role)?;
    let refresh_token = state.jwt.generate_refresh_token(&user_id)?;

    let now = Utc::now();
    state
        .db
        .users()
        .update_one(
            doc! { "_id": user.id },
            doc! { "$set": {
                "refresh_token_hash": hash_refresh_token(&refresh_token),
                "last_login": BsonDateTime::from_chrono(now),
            } },
            None,
        )
        .await?;

    let mut user = user;
    user.last_login = Some(BsonDateTime::from_chrono(now));

    counter!("login_attempts_total", "outcome" => "success").increment(1);
    tracing::info!(user_id = %user.id, role = user.role.as_str(), "User logged in");

    state.audit.record(
        AuditEntry::new(
            AuditAction::Login,
            EntityType::User,
            Some(user.id),
            format!("User {} logged in", user.email),
        ),
        &user,
        &meta,
    );

    Ok(Json(ApiResponse::ok(LoginResponse {
        user: UserResponse::from(&user),
        access_token,
        refresh_token,
    })))
}

/// Issue a new access token for a still-current refresh token.
///
/// POST /api/auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<Json<ApiResponse<RefreshResponse>>, AppError> {
    let claims = state
        .jwt
        .validate_refresh_token(&req.refresh_token)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                AppError::unauthorized(REFRESH_EXPIRED)
            }
            _ => {
                tracing::debug!(error = %e, "Refresh token rejected");
                AppError::unauthorized(INVALID_REFRESH_TOKEN)
            }
        })?;

    let user_id = ObjectId::parse_str(&claims.sub)
        .map_err(|_| AppError::unauthorized(INVALID_REFRESH_TOKEN))?;

    let user = state
        .db
        .find_user(&user_id)
        .await?
        .ok_or_else(|| AppError::unauthorized(INVALID_REFRESH_TOKEN))?;

    // Only the most recently issued refresh token is honoured.
    let presented = hash_refresh_token(&req.refresh_token);
    if user.refresh_token_hash.as_deref() != Some(presented.as_str()) {
        tracing::info!(user_id = %user.id, "Refresh token does not match stored token");
        return Err(AppError::unauthorized(INVALID_REFRESH_TOKEN));
    }

    if !user.is_active {
        return Err(AppError::unauthorized(DEACTIVATED_MESSAGE));
    }

    let access_token = state
        .jwt
        .generate_access_token(&user.id.to_hex(), user.role)?;

    Ok(Json(ApiResponse::ok(RefreshResponse { access_token })))
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    user: CurrentUser,
    meta: RequestMeta,
) -> Result<Json<ApiResponse<()>>, AppError> {
    state
        .db
        .users()
        .update_one(
            doc! { "_id": user.id },
            doc! { "$unset": { "refresh_token_hash": "" } },
            None,
        )
        .await?;

    tracing::info!(user_id = %user.id, "User logged out");

    state.audit.record(
        AuditEntry::new(
            AuditAction::Logout,
            EntityType::User,
            Some(user.id),
            format!("User {} logged out", user.email),
        ),
        &user,
        &meta,
    );

    Ok(Json(ApiResponse::message("Logged out successfully")))
}

/// GET /api/auth/me
pub async fn me(user: CurrentUser) -> Json<ApiResponse<UserResponse>> {
    Json(ApiResponse::ok(UserResponse::from(&*user)))
}

/// PUT /api/auth/password
pub async fn change_password(
    State(state): State<AppState>,
    user: CurrentUser,
    meta: RequestMeta,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let new_password = Password::new(req.new_password);
    if !new_password.meets_min_length() {
        return Err(AppError::bad_request(
            "New password must be at least 6 characters",
        ));
    }

    if !check_password(&user, &req.current_password) {
        tracing::info!(user_id = %user.id, "Password change refused: wrong current password");
        return Err(AppError::unauthorized("Current password is incorrect"));
    }

    let hash = hash_password(&new_password)?;
    state
        .db
        .users()
        .update_one(
            doc! { "_id": user.id },
            doc! { "$set": {
                "password_hash": hash.into_string(),
                "updated_at": BsonDateTime::from_chrono(Utc::now()),
            } },
            None,
        )
        .await?;

    tracing::info!(user_id = %user.id, "Password changed");

    state.audit.record(
        AuditEntry::new(
            AuditAction::PasswordChange,
            EntityType::User,
            Some(user.id),
            format!("User {} changed their password", user.email),
        ),
        &user,
        &meta,
    );

    Ok(Json(ApiResponse::message("Password changed successfully")))
}
