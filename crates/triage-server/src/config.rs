//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

use axum::http::HeaderValue;
use triage_core::RuntimeMode;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";

/// 50 MB, shared by the JSON and URL-encoded parsers.
pub const DEFAULT_BODY_LIMIT: usize = 50 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid frontend url {url:?}: {reason}")]
    InvalidFrontendUrl { url: String, reason: String },

    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),

    #[error("invalid interval: {0}")]
    InvalidInterval(String),
}

/// Per-address admission control for `/api/` paths.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(15 * 60),
            max_requests: 100,
        }
    }
}

/// Configuration for the triage server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` picks an ephemeral port).
    pub port: u16,
    /// Single origin allowed by CORS and the WebSocket handshake.
    pub frontend_url: String,
    pub mode: RuntimeMode,
    pub uploads_dir: PathBuf,
    pub public_dir: PathBuf,
    pub rate_limit: RateLimitConfig,
    /// Cap for JSON and URL-encoded request bodies.
    pub body_limit: usize,
    /// Interval between WebSocket pings.
    pub heartbeat_interval: Duration,
    /// A client silent for this long is considered dead.
    pub client_timeout: Duration,
    /// How often dead clients and expired rate-limit windows are swept.
    pub sweep_interval: Duration,
    /// Outbound queue bound per WebSocket client.
    pub max_send_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            frontend_url: DEFAULT_FRONTEND_URL.into(),
            mode: RuntimeMode::default(),
            uploads_dir: PathBuf::from("uploads"),
            public_dir: PathBuf::from("public"),
            rate_limit: RateLimitConfig::default(),
            body_limit: DEFAULT_BODY_LIMIT,
            heartbeat_interval: Duration::from_secs(25),
            client_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60),
            max_send_queue: 256,
        }
    }
}

impl ServerConfig {
    /// The frontend URL reduced to its origin (`scheme://host[:port]`).
    ///
    /// Browsers send the bare origin, so a configured trailing slash or path
    /// would otherwise never match.
    pub fn allowed_origin(&self) -> Result<HeaderValue, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidFrontendUrl {
            url: self.frontend_url.clone(),
            reason,
        };
        let url = url::Url::parse(&self.frontend_url).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {}", url.scheme())));
        }
        if url.host_str().is_none() {
            return Err(invalid("missing host".into()));
        }
        let origin = url.origin().ascii_serialization();
        HeaderValue::from_str(&origin).map_err(|e| invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.allowed_origin()?;
        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::InvalidRateLimit("max_requests must be > 0".into()));
        }
        if self.rate_limit.window.is_zero() {
            return Err(ConfigError::InvalidRateLimit("window must be > 0".into()));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::InvalidInterval("heartbeat_interval must be > 0".into()));
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidInterval("sweep_interval must be > 0".into()));
        }
        Ok(())
    }
}
