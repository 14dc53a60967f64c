//! Requests that are answered before any database round trip.

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use mongodb::bson::oid::ObjectId;
use portal_service::models::Role;
use portal_service::services::AccessTokenClaims;
use serde_json::Value;
use tower::ServiceExt;

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn access_token(secret: &str, expires_in: Duration) -> String {
    let now = Utc::now();
    let claims = AccessTokenClaims {
        sub: ObjectId::new().to_hex(),
        role: Role::Admin,
        exp: (now + expires_in).timestamp(),
        iat: now.timestamp(),
        jti: "test".to_string(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn protected_route_without_token_is_rejected() {
    let (app, _uploads) = common::hermetic_router().await;

    let response = app.oneshot(get("/api/drivers", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Access denied. No token provided.");
}

#[tokio::test]
async fn malformed_and_foreign_tokens_are_rejected() {
    let (app, _uploads) = common::hermetic_router().await;

    let response = app
        .clone()
        .oneshot(get("/api/auth/me", Some("not-a-jwt")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["message"], "Invalid token.");

    // Signed with the refresh secret, so it must not pass as an access token.
    let foreign = access_token(common::REFRESH_SECRET, Duration::minutes(5));
    let response = app
        .oneshot(get("/api/auth/me", Some(&foreign)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(body_json(response).await.get("code").is_none());
}

#[tokio::test]
async fn expired_access_token_reports_token_expired() {
    let (app, _uploads) = common::hermetic_router().await;
    let expired = access_token(common::ACCESS_SECRET, Duration::hours(-1));

    let response = app
        .oneshot(get("/api/drivers", Some(&expired)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "TOKEN_EXPIRED");
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn login_body_is_validated_before_lookup() {
    let (app, _uploads) = common::hermetic_router().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"email":"not-an-email","password":""}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["success"], false);
}

#[tokio::test]
async fn unknown_routes_return_json_404_with_request_id() {
    let (app, _uploads) = common::hermetic_router().await;

    let response = app
        .oneshot(get("/api/nowhere", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(
        response.headers().get(header::X_CONTENT_TYPE_OPTIONS).unwrap(),
        "nosniff"
    );
    assert_eq!(body_json(response).await["message"], "Route not found");
}

#[tokio::test]
async fn health_reports_unreachable_database() {
    let (app, _uploads) = common::hermetic_router().await;

    let response = app.oneshot(get("/health", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["status"], "unavailable");
    assert_eq!(body["checks"]["mongodb"], "down");
    assert_eq!(body["service"], "portal-service-test");
}
