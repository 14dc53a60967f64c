use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use mongodb::bson::oid::ObjectId;
use service_core::error::AppError;
use std::ops::Deref;

use crate::models::User;
use crate::AppState;

pub const NO_TOKEN_MESSAGE: &str = "Access denied. No token provided.";
pub const DEACTIVATED_MESSAGE: &str = "Account is deactivated. Please contact administrator.";

/// The authenticated caller, loaded fresh from the database on every request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl Deref for CurrentUser {
    type Target = User;

    fn deref(&self) -> &User {
        &self.0
    }
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Verify the bearer token, load its user and attach it as [`CurrentUser`].
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req).ok_or_else(|| AppError::unauthorized(NO_TOKEN_MESSAGE))?;

    let claims = state.jwt.validate_access_token(token).map_err(|e| {
        tracing::debug!(error = %e, "Access token rejected");
        AppError::from(e)
    })?;

    let user_id = ObjectId::parse_str(&claims.sub)
        .map_err(|_| AppError::unauthorized("Invalid token."))?;

    let user = state
        .db
        .find_user(&user_id)
        .await?
        .ok_or_else(|| AppError::unauthorized("User not found."))?;

    if !user.is_active {
        tracing::info!(user_id = %user.id, "Deactivated account attempted access");
        return Err(AppError::unauthorized(DEACTIVATED_MESSAGE));
    }

    tracing::Span::current().record("user_id", tracing::field::display(&user.id));
    req.extensions_mut().insert(CurrentUser(user));

    Ok(next.run(req).await)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized(NO_TOKEN_MESSAGE))
    }
}
