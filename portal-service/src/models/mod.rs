pub mod audit_log;
pub mod document;
pub mod driver;
pub mod user;

pub use audit_log::{AuditAction, AuditLog, EntityType};
pub use document::{Document, DocumentStatus, DocumentType, NewDocument};
pub use driver::{Driver, DriverInfo, DriverStatus, RegistrationStatus, REQUIRED_DOCUMENT_TYPES};
pub use user::{Role, User};
