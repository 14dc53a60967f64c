pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
pub mod utils;

use axum::{
    extract::{DefaultBodyLimit, FromRef},
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{ip_rate_limit_middleware, ClientIpPolicy, IpRateLimit},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
    REQUEST_ID_HEADER,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::PortalConfig;
use crate::services::{AuditLogger, JwtService, MongoDb, Storage};

/// Multipart framing on top of the file itself.
const UPLOAD_OVERHEAD_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PortalConfig>,
    pub db: MongoDb,
    pub jwt: JwtService,
    pub storage: Arc<dyn Storage>,
    pub audit: AuditLogger,
    pub login_rate_limiter: IpRateLimit,
}

impl FromRef<AppState> for ClientIpPolicy {
    fn from_ref(state: &AppState) -> Self {
        ClientIpPolicy::new(state.config.security.trust_proxy)
    }
}

impl AppState {
    pub fn new(config: PortalConfig, db: MongoDb, storage: Arc<dyn Storage>) -> Self {
        let jwt = JwtService::new(&config.jwt);
        let audit = AuditLogger::new(db.audit_logs());
        let login_rate_limiter = IpRateLimit::new(
            config.rate_limit.login_attempts,
            config.rate_limit.login_window_seconds,
            ClientIpPolicy::new(config.security.trust_proxy),
        );

        Self {
            config: Arc::new(config),
            db,
            jwt,
            storage,
            audit,
            login_rate_limiter,
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins = if allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(allowed_origins.iter().filter_map(|origin| {
            origin
                .parse::<HeaderValue>()
                .map_err(|e| tracing::error!("Invalid CORS origin '{}': {}", origin, e))
                .ok()
        }))
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .expose_headers([
            header::CONTENT_DISPOSITION,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
}

pub fn build_router(state: AppState) -> Router {
    use handlers::{audit, auth, documents, drivers, health, users};

    let upload_limit = state.config.storage.max_file_size + UPLOAD_OVERHEAD_BYTES;

    let login_route = Router::new()
        .route("/auth/login", post(auth::login))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let protected = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/auth/password", put(auth::change_password))
        .route(
            "/drivers",
            post(drivers::create_driver).get(drivers::list_drivers),
        )
        .route("/drivers/stats", get(drivers::driver_stats))
        .route(
            "/drivers/:id",
            get(drivers::get_driver).put(drivers::update_driver),
        )
        .route("/drivers/:id/status", put(drivers::update_driver_status))
        .route("/documents/queue", get(documents::document_queue))
        .route(
            "/documents/:id",
            post(documents::upload_document)
                .layer(DefaultBodyLimit::max(upload_limit))
                .delete(documents::delete_document),
        )
        .route("/documents/:id/file", get(documents::document_file))
        .route(
            "/documents/:id/status",
            put(documents::update_document_status),
        )
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/users/:id/reset-password", put(users::reset_password))
        .route("/audit", get(audit::list_audit_logs))
        .route("/audit/stats", get(audit::audit_stats))
        .route("/audit/entity/:type/:id", get(audit::entity_history))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let api = Router::new()
        .route("/auth/refresh", post(auth::refresh))
        .merge(login_route)
        .merge(protected);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        .nest("/api", api)
        .fallback(|| async { AppError::not_found("Route not found") })
        .with_state(state.clone())
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    user_id = tracing::field::Empty,
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config.security.allowed_origins))
}
