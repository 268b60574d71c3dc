//! The HTTP admission pipeline.
//!
//! Stages, outermost first: security headers, rate limit (`/api` only),
//! CORS, access log, error responder, body parser. [`Pipeline::apply`] is
//! the single place that order is fixed. Static file serving is not a
//! layer; it is the router fallback installed by
//! [`static_files::mount_static`].

pub mod access_log;
pub mod body;
pub mod cors;
pub mod headers;
pub mod rate_limit;
pub mod static_files;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::connect_info::MockConnectInfo;
use axum::extract::{ConnectInfo, DefaultBodyLimit, Request};
use axum::http::HeaderValue;
use axum::{middleware, Router};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use triage_core::RuntimeMode;

use crate::config::{ConfigError, ServerConfig};
use crate::error::{error_responder, panic_response};
use body::BodyLimit;
use headers::SecurityHeaders;
use rate_limit::FixedWindowLimiter;

/// Peer address of the connection carrying `request`, if the server was
/// started with connect info (or a test installed [`MockConnectInfo`]).
pub fn client_ip(request: &Request) -> Option<IpAddr> {
    let extensions = request.extensions();
    if let Some(ConnectInfo(addr)) = extensions.get::<ConnectInfo<SocketAddr>>() {
        return Some(addr.ip());
    }
    extensions
        .get::<MockConnectInfo<SocketAddr>>()
        .map(|MockConnectInfo(addr)| addr.ip())
}

/// Shared state of the layered stages, built once per server.
#[derive(Clone)]
pub struct Pipeline {
    headers: Arc<SecurityHeaders>,
    limiter: Arc<FixedWindowLimiter>,
    origin: HeaderValue,
    mode: RuntimeMode,
    body_limit: BodyLimit,
}

impl Pipeline {
    pub fn from_config(config: &ServerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            headers: Arc::new(SecurityHeaders::default()),
            limiter: Arc::new(FixedWindowLimiter::new(&config.rate_limit)),
            origin: config.allowed_origin()?,
            mode: config.mode,
            body_limit: BodyLimit(config.body_limit),
        })
    }

    /// Handle to the limiter, for the periodic sweep.
    pub fn limiter(&self) -> Arc<FixedWindowLimiter> {
        self.limiter.clone()
    }

    /// Wrap every route and the fallback of `router` in the pipeline.
    ///
    /// Must be called after all routes are registered; later routes would
    /// bypass the layers.
    pub fn apply<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn_with_state(
                    self.headers.clone(),
                    headers::security_headers,
                ))
                .layer(middleware::from_fn_with_state(
                    self.limiter.clone(),
                    rate_limit::rate_limit,
                ))
                .layer(cors::cors_layer(self.origin.clone()))
                .layer(middleware::from_fn(access_log::access_log))
                .layer(middleware::from_fn_with_state(self.mode, error_responder))
                .layer(middleware::from_fn_with_state(self.body_limit, body::body_parser))
                // Extractors reading the raw body (`Json`, `Bytes`) honour
                // the same cap instead of axum's 2 MB default.
                .layer(DefaultBodyLimit::max(self.body_limit.0))
                .layer(CatchPanicLayer::custom(panic_response)),
        )
    }
}
