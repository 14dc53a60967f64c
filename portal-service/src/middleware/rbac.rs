//! Static role gates.
//!
//! Each gate is a marker type listing the roles it admits. Handlers take
//! `Authorized<Gate>` instead of [`CurrentUser`] to require one:
//!
//! ```ignore
//! async fn update_driver(user: Authorized<OpsOrAdmin>, ...) -> Result<..., AppError>
//! ```

use axum::{extract::FromRequestParts, http::request::Parts};
use service_core::error::AppError;
use std::marker::PhantomData;
use std::ops::Deref;

use super::auth::CurrentUser;
use crate::models::{Role, User};

pub const INSUFFICIENT_PERMISSIONS: &str = "Access denied. Insufficient permissions.";

pub trait RoleGate: Send + Sync + 'static {
    const ROLES: &'static [Role];

    fn admits(role: Role) -> bool {
        Self::ROLES.contains(&role)
    }
}

pub struct AdminOnly;
pub struct OpsOrAdmin;
pub struct AgentOrAdmin;

impl RoleGate for AdminOnly {
    const ROLES: &'static [Role] = &[Role::Admin];
}

impl RoleGate for OpsOrAdmin {
    const ROLES: &'static [Role] = &[Role::Operations, Role::Admin];
}

impl RoleGate for AgentOrAdmin {
    const ROLES: &'static [Role] = &[Role::SalesAgent, Role::Admin];
}

/// An authenticated caller whose role passed gate `G`.
pub struct Authorized<G: RoleGate> {
    user: CurrentUser,
    _gate: PhantomData<G>,
}

impl<G: RoleGate> Authorized<G> {
    pub fn into_inner(self) -> CurrentUser {
        self.user
    }
}

impl<G: RoleGate> Deref for Authorized<G> {
    type Target = User;

    fn deref(&self) -> &User {
        &self.user
    }
}

#[axum::async_trait]
impl<S, G> FromRequestParts<S> for Authorized<G>
where
    S: Send + Sync,
    G: RoleGate,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;

        if !G::admits(user.role) {
            tracing::warn!(
                user_id = %user.id,
                role = user.role.as_str(),
                path = %parts.uri.path(),
                "Role gate denied request"
            );
            return Err(AppError::forbidden(INSUFFICIENT_PERMISSIONS));
        }

        Ok(Self {
            user,
            _gate: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::get,
        Extension, Router,
    };
    use tower::ServiceExt;

    fn user(role: Role) -> User {
        User::new(
            "someone@littleride.et",
            "hash".to_string(),
            "Someone".to_string(),
            role,
            None,
        )
    }

    async fn admin_only(user: Authorized<AdminOnly>) -> String {
        user.name.clone()
    }

    async fn status_for(role: Option<Role>) -> StatusCode {
        let mut app = Router::new().route("/", get(admin_only));
        if let Some(role) = role {
            app = app.layer(Extension(CurrentUser(user(role))));
        }
        app.oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[test]
    fn gate_membership() {
        assert!(AdminOnly::admits(Role::Admin));
        assert!(!AdminOnly::admits(Role::Operations));
        assert!(OpsOrAdmin::admits(Role::Operations));
        assert!(!OpsOrAdmin::admits(Role::SalesAgent));
        assert!(AgentOrAdmin::admits(Role::SalesAgent));
        assert!(AgentOrAdmin::admits(Role::Admin));
        assert!(!AgentOrAdmin::admits(Role::Operations));
    }

    #[tokio::test]
    async fn extractor_maps_roles_to_status_codes() {
        assert_eq!(status_for(Some(Role::Admin)).await, StatusCode::OK);
        assert_eq!(status_for(Some(Role::SalesAgent)).await, StatusCode::FORBIDDEN);
        assert_eq!(status_for(None).await, StatusCode::UNAUTHORIZED);
    }
}
