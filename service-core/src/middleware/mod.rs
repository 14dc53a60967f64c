pub mod metrics;
pub mod rate_limit;
pub mod security_headers;
pub mod tracing;

pub use rate_limit::ClientIpPolicy;
pub use self::tracing::{REQUEST_ID_HEADER, RequestId};
