pub mod auth;
pub mod rbac;

pub use auth::{auth_middleware, CurrentUser};
pub use rbac::{AdminOnly, AgentOrAdmin, Authorized, OpsOrAdmin, RoleGate};
