pub mod password;
pub mod request;
pub mod validation;

pub use password::{hash_password, verify_password, Password, PasswordHashString};
pub use request::{parse_object_id, RequestMeta};
pub use validation::{QueryParams, ValidatedJson};
