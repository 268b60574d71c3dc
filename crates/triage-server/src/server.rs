use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, ServerConfig};
use crate::policy::rate_limit::FixedWindowLimiter;
use crate::policy::static_files::mount_static;
use crate::policy::Pipeline;
use crate::realtime::{ws_handler, CaseAccess, CaseChannel, SocketState, WS_PATH};
use crate::routes::{RouteGroup, RouteTable};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// State shared by the built-in HTTP endpoints.
#[derive(Clone)]
pub struct AppState {
    pub channel: Arc<CaseChannel>,
    pub started: Instant,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub connections: usize,
    pub rooms: usize,
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthReport {
        status: "ok",
        uptime_secs: state.started.elapsed().as_secs(),
        connections: state.channel.client_count(),
        rooms: state.channel.room_count(),
    })
}

/// Assemble routes, socket endpoint, static roots and the policy pipeline.
pub fn build_router(
    config: &ServerConfig,
    routes: RouteTable,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(Router, Pipeline), ServerError> {
    let pipeline = Pipeline::from_config(config)?;
    let socket_state = SocketState {
        channel: Arc::clone(&state.channel),
        allowed_origin: config.allowed_origin()?,
        heartbeat_interval: config.heartbeat_interval,
        shutdown,
    };

    let router = routes
        .into_router()
        .route("/health", get(health_handler).with_state(state))
        .route(WS_PATH, get(ws_handler).with_state(socket_state));
    let router = mount_static(router, &config.uploads_dir, &config.public_dir);
    let router = pipeline.apply(router);
    Ok((router, pipeline))
}

/// Create and start the server. Returns a handle to shut it down.
pub async fn start(
    config: ServerConfig,
    routes: RouteTable,
    access: Arc<dyn CaseAccess>,
) -> Result<ServerHandle, ServerError> {
    config.validate()?;
    for dir in [&config.uploads_dir, &config.public_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| ServerError::CreateDir {
                path: dir.display().to_string(),
                source,
            })?;
    }

    let mounted: Vec<RouteGroup> = routes.mounted().collect();
    for group in RouteGroup::ALL.iter().filter(|g| !mounted.contains(g)) {
        tracing::debug!(prefix = group.prefix(), "route group not mounted, requests get 404");
    }

    let shutdown = CancellationToken::new();
    let channel = Arc::new(CaseChannel::new(
        access,
        config.max_send_queue,
        config.client_timeout,
    ));
    let state = AppState {
        channel: Arc::clone(&channel),
        started: Instant::now(),
    };
    let (router, pipeline) = build_router(&config, routes, state, shutdown.clone())?;

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    let local_addr = listener.local_addr()?;

    let server_token = shutdown.clone();
    let server = tokio::spawn(async move {
        let service = router.into_make_service_with_connect_info::<SocketAddr>();
        if let Err(e) = axum::serve(listener, service)
            .with_graceful_shutdown(server_token.cancelled_owned())
            .await
        {
            tracing::error!(error = %e, "server error");
        }
    });

    let cleanup = start_cleanup_task(
        Arc::clone(&channel),
        pipeline.limiter(),
        config.sweep_interval,
        shutdown.clone(),
    );

    tracing::info!("Cyber Triage Backend running on port {}", local_addr.port());
    tracing::info!("Environment: {}", config.mode);

    Ok(ServerHandle {
        local_addr,
        channel,
        shutdown,
        server,
        cleanup,
    })
}

/// Periodically drop dead sockets and expired rate-limit windows.
fn start_cleanup_task(
    channel: Arc<CaseChannel>,
    limiter: Arc<FixedWindowLimiter>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = channel.sweep_dead();
                    if removed > 0 {
                        tracing::info!(removed, "Dead client cleanup");
                    }
                    let expired = limiter.sweep_at(Instant::now());
                    if expired > 0 {
                        tracing::debug!(expired, "rate limit windows expired");
                    }
                }
            }
        }
    })
}

/// Handle returned by [`start`]; keeps the server and its background tasks
/// alive until [`ServerHandle::shutdown`].
pub struct ServerHandle {
    local_addr: SocketAddr,
    channel: Arc<CaseChannel>,
    shutdown: CancellationToken,
    server: JoinHandle<()>,
    cleanup: JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn channel(&self) -> &Arc<CaseChannel> {
        &self.channel
    }

    /// Token cancelled on shutdown; clone it to tie other tasks to the server.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop accepting connections, close sockets, and wait for in-flight
    /// requests to finish.
    pub async fn shutdown(self) {
        tracing::info!("Shutting down");
        self.shutdown.cancel();
        if let Err(e) = self.server.await {
            tracing::warn!(error = %e, "server task ended abnormally");
        }
        let _ = self.cleanup.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::OpenCaseAccess;
    use crate::routes::RouteGroup;
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;
    use triage_core::RuntimeMode;

    struct Fixture {
        _dir: tempfile::TempDir,
        config: ServerConfig,
    }

    fn fixture(mode: RuntimeMode) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let uploads_dir = dir.path().join("uploads");
        let public_dir = dir.path().join("public");
        std::fs::create_dir_all(&uploads_dir).unwrap();
        std::fs::create_dir_all(&public_dir).unwrap();
        std::fs::write(public_dir.join("index.html"), "<h1>triage</h1>").unwrap();
        Fixture {
            _dir: dir,
            config: ServerConfig {
                mode,
                uploads_dir,
                public_dir,
                ..Default::default()
            },
        }
    }

    fn app(config: &ServerConfig, routes: RouteTable) -> Router {
        let state = AppState {
            channel: Arc::new(CaseChannel::new(
                Arc::new(OpenCaseAccess),
                8,
                Duration::from_secs(60),
            )),
            started: Instant::now(),
        };
        let (router, _) = build_router(config, routes, state, CancellationToken::new()).unwrap();
        router.layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 9000))))
    }

    fn failing_routes() -> RouteTable {
        let cases = Router::new()
            .route(
                "/broken",
                get(|| async {
                    Err::<(), _>(crate::error::ApiError::internal("database unavailable"))
                }),
            )
            .route(
                "/teapot",
                get(|| async {
                    Err::<(), _>(crate::error::ApiError::new(StatusCode::IM_A_TEAPOT, "short and stout"))
                }),
            );
        RouteTable::new().mount(RouteGroup::Cases, cases)
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, body)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_reports_counts() {
        let fx = fixture(RuntimeMode::Production);
        let (status, headers, body) = send(app(&fx.config, RouteTable::new()), get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
        assert_eq!(body["rooms"], 0);
        assert!(headers.contains_key("content-security-policy"));
        assert!(!headers.contains_key("ratelimit-limit"));
    }

    #[tokio::test]
    async fn unmatched_path_is_uniform_404() {
        let fx = fixture(RuntimeMode::Production);
        for uri in ["/api/nothing", "/api/reports/1", "/missing.css"] {
            let (status, _, body) = send(app(&fx.config, RouteTable::new()), get_req(uri)).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body, serde_json::json!({"success": false, "message": "Route not found"}));
        }
    }

    #[tokio::test]
    async fn handler_error_hides_stack_outside_development() {
        let fx = fixture(RuntimeMode::Production);
        let (status, _, body) = send(app(&fx.config, failing_routes()), get_req("/api/cases/broken")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, serde_json::json!({"success": false, "message": "database unavailable"}));
    }

    #[tokio::test]
    async fn handler_error_shows_stack_in_development() {
        let fx = fixture(RuntimeMode::Development);
        let (status, _, body) = send(app(&fx.config, failing_routes()), get_req("/api/cases/teapot")).await;
        assert_eq!(status, StatusCode::IM_A_TEAPOT);
        assert_eq!(body["message"], "short and stout");
        assert!(body["stack"].as_str().unwrap().contains("short and stout"));
    }

    #[tokio::test]
    async fn api_paths_are_rate_limited() {
        let mut fx = fixture(RuntimeMode::Production);
        fx.config.rate_limit.max_requests = 2;
        let app = app(&fx.config, failing_routes());

        for _ in 0..2 {
            let (status, headers, _) = send(app.clone(), get_req("/api/cases/teapot")).await;
            assert_eq!(status, StatusCode::IM_A_TEAPOT);
            assert!(headers.contains_key("ratelimit-remaining"));
        }
        let resp = app.clone().oneshot(get_req("/api/cases/teapot")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(resp.headers().contains_key(header::RETRY_AFTER));
        assert!(resp.headers().contains_key("x-frame-options"));

        let (status, _, _) = send(app, get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn static_public_root_is_served() {
        let fx = fixture(RuntimeMode::Production);
        let resp = app(&fx.config, RouteTable::new())
            .oneshot(get_req("/index.html"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key("x-content-type-options"));
    }

    #[tokio::test]
    async fn start_binds_ephemeral_port_and_shuts_down() {
        let fx = fixture(RuntimeMode::Test);
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..fx.config.clone()
        };
        let handle = start(config, RouteTable::new(), Arc::new(OpenCaseAccess))
            .await
            .unwrap();
        assert_ne!(handle.port(), 0);
        let token = handle.shutdown_token();
        handle.shutdown().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn start_rejects_invalid_config() {
        let config = ServerConfig {
            frontend_url: "not a url".into(),
            ..Default::default()
        };
        let err = start(config, RouteTable::new(), Arc::new(OpenCaseAccess))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ServerError::Config(_)));
    }
}
