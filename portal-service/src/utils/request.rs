use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use mongodb::bson::oid::ObjectId;
use service_core::error::AppError;
use service_core::middleware::{ClientIpPolicy, RequestId};
use std::convert::Infallible;

/// Caller details recorded alongside audit entries.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
    ClientIpPolicy: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let policy = ClientIpPolicy::from_ref(state);
        Ok(RequestMeta {
            ip_address: policy
                .client_ip(&parts.headers, &parts.extensions)
                .map(|ip| ip.to_string()),
            user_agent: parts
                .headers
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            request_id: parts
                .extensions
                .get::<RequestId>()
                .map(|RequestId(id)| id.clone()),
        })
    }
}

/// Parse a path id, mapping malformed values to 400 "Invalid id".
pub fn parse_object_id(id: &str) -> Result<ObjectId, AppError> {
    ObjectId::parse_str(id).map_err(|_| AppError::bad_request("Invalid id"))
}
