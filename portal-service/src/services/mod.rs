pub mod audit;
pub mod database;
pub mod jwt;
pub mod metrics;
pub mod storage;

pub use audit::{AuditEntry, AuditLogger};
pub use database::MongoDb;
pub use jwt::{hash_refresh_token, AccessTokenClaims, JwtService, RefreshTokenClaims};
pub use storage::{LocalStorage, Storage};
