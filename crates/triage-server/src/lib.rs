pub mod config;
pub mod error;
pub mod policy;
pub mod realtime;
pub mod routes;
pub mod server;

pub use config::{ConfigError, RateLimitConfig, ServerConfig};
pub use error::{ApiError, ErrorBody};
pub use policy::body::ParsedBody;
pub use realtime::{CaseAccess, CaseAction, CaseChannel, ConnectionInfo, OpenCaseAccess};
pub use routes::{RouteGroup, RouteTable};
pub use server::{build_router, start, ServerError, ServerHandle};
