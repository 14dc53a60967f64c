//! Shared setup for portal-service integration tests.
//!
//! `hermetic_router` needs nothing running: the MongoDB client connects
//! lazily and the requests under test are rejected before any query.
//! `TestApp::spawn` serves the full app against a throwaway database on
//! `MONGODB_URI` and is only used by `#[ignore]`d tests.

#![allow(dead_code)]

use axum::Router;
use portal_service::{
    build_router,
    config::{
        JwtConfig, MongoConfig, PortalConfig, RateLimitConfig, SecurityConfig, StorageConfig,
        DEFAULT_MAX_FILE_SIZE,
    },
    models::{Role, User},
    services::{LocalStorage, MongoDb, Storage},
    utils::{hash_password, Password},
    AppState,
};
use serde_json::{json, Value};
use service_core::config::{Config as CoreConfig, Environment};
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;
use uuid::Uuid;

pub const ACCESS_SECRET: &str = "integration-access-secret";
pub const REFRESH_SECRET: &str = "integration-refresh-secret";
pub const PASSWORD: &str = "secret123";

pub fn test_config(mongodb_uri: &str, database: &str, upload_dir: &str) -> PortalConfig {
    PortalConfig {
        common: CoreConfig { port: 0 },
        environment: Environment::Dev,
        service_name: "portal-service-test".to_string(),
        service_version: "0.0.0".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        mongodb: MongoConfig {
            uri: mongodb_uri.to_string(),
            database: database.to_string(),
        },
        jwt: JwtConfig {
            secret: ACCESS_SECRET.to_string(),
            refresh_secret: REFRESH_SECRET.to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        },
        storage: StorageConfig {
            upload_dir: upload_dir.to_string(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            trust_proxy: false,
        },
        rate_limit: RateLimitConfig {
            login_attempts: 100,
            login_window_seconds: 60,
        },
    }
}

/// Router backed by an unreachable MongoDB. Only suitable for requests that
/// never reach the database.
pub async fn hermetic_router() -> (Router, TempDir) {
    let uploads = TempDir::new().expect("Failed to create upload dir");
    let config = test_config(
        "mongodb://127.0.0.1:1/?serverSelectionTimeoutMS=200",
        "portal_hermetic",
        uploads.path().to_str().expect("Non UTF-8 temp path"),
    );

    let db = MongoDb::connect(&config.mongodb.uri, &config.mongodb.database)
        .await
        .expect("Failed to build MongoDB client");
    let storage: Arc<dyn Storage> = Arc::new(
        LocalStorage::new(uploads.path())
            .await
            .expect("Failed to init storage"),
    );

    (build_router(AppState::new(config, db, storage)), uploads)
}

pub struct TestApp {
    pub address: String,
    pub state: AppState,
    pub client: reqwest::Client,
    database: String,
    _uploads: TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        dotenvy::dotenv().ok();
        let uri = std::env::var("MONGODB_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
        let database = format!("portal_test_{}", Uuid::new_v4().simple());
        let uploads = TempDir::new().expect("Failed to create upload dir");

        let config = test_config(
            &uri,
            &database,
            uploads.path().to_str().expect("Non UTF-8 temp path"),
        );

        let db = MongoDb::connect(&uri, &database)
            .await
            .expect("Failed to connect to MongoDB");
        db.initialize_indexes()
            .await
            .expect("Failed to create indexes");
        let storage: Arc<dyn Storage> = Arc::new(
            LocalStorage::new(uploads.path())
                .await
                .expect("Failed to init storage"),
        );

        let state = AppState::new(config, db, storage);
        let app = build_router(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind random port");
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("Server error");
        });

        Self {
            address: format!("http://127.0.0.1:{}", port),
            state,
            client: reqwest::Client::new(),
            database,
            _uploads: uploads,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.address, path)
    }

    /// Insert an active account directly, bypassing the API.
    pub async fn create_user(&self, email: &str, role: Role) -> User {
        let hash = hash_password(&Password::new(PASSWORD)).expect("Failed to hash password");
        let user = User::new(
            email,
            hash.into_string(),
            format!("Test {}", role.as_str()),
            role,
            None,
        );
        self.state
            .db
            .users()
            .insert_one(&user, None)
            .await
            .expect("Failed to insert user");
        user
    }

    /// Log in through the API and return the access token.
    pub async fn login(&self, email: &str) -> String {
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": PASSWORD }))
            .send()
            .await
            .expect("Login request failed");
        assert_eq!(response.status(), 200, "login failed for {}", email);

        let body: Value = response.json().await.unwrap();
        body["data"]["accessToken"]
            .as_str()
            .expect("Missing access token")
            .to_string()
    }

    pub async fn user_with_token(&self, email: &str, role: Role) -> (User, String) {
        let user = self.create_user(email, role).await;
        let token = self.login(email).await;
        (user, token)
    }

    /// Register a driver as the given caller and return its id.
    pub async fn create_driver(&self, token: &str, name: &str, phone: &str) -> String {
        let response = self
            .client
            .post(self.url("/drivers"))
            .bearer_auth(token)
            .json(&json!({
                "driverInfo": {
                    "name": name,
                    "phone": phone,
                    "plateNumber": "AA-3-12345",
                }
            }))
            .send()
            .await
            .expect("Create driver request failed");
        assert_eq!(response.status(), 201);

        let body: Value = response.json().await.unwrap();
        body["data"]["_id"].as_str().unwrap().to_string()
    }

    /// Post a single-file upload form without asserting on the outcome.
    pub async fn send_upload(
        &self,
        token: &str,
        driver_id: &str,
        doc_type: &str,
        mime: &str,
        data: Vec<u8>,
    ) -> reqwest::Response {
        let file = reqwest::multipart::Part::bytes(data)
            .file_name("scan")
            .mime_str(mime)
            .unwrap();
        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("type", doc_type.to_string());

        self.client
            .post(self.url(&format!("/documents/{}", driver_id)))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .expect("Upload request failed")
    }

    /// Upload a small PNG for the driver and return the document id.
    pub async fn upload_document(&self, token: &str, driver_id: &str, doc_type: &str) -> String {
        let response = self
            .send_upload(
                token,
                driver_id,
                doc_type,
                "image/png",
                b"\x89PNG\r\n\x1a\nfake".to_vec(),
            )
            .await;
        assert_eq!(response.status(), 201);

        let body: Value = response.json().await.unwrap();
        body["data"]["_id"].as_str().unwrap().to_string()
    }

    pub async fn teardown(self) {
        self.state
            .db
            .database()
            .drop(None)
            .await
            .unwrap_or_else(|e| panic!("Failed to drop {}: {}", self.database, e));
    }
}
