#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::extract::Path;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use triage_core::{CaseId, RuntimeMode};
use triage_server::{
    CaseAccess, OpenCaseAccess, ParsedBody, RouteGroup, RouteTable, ServerConfig, ServerHandle,
};

pub const FRONTEND: &str = "http://localhost:3000";

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub handle: ServerHandle,
    pub dir: TempDir,
}

/// Stand-in for the externally owned cases group.
pub fn case_routes() -> RouteTable {
    let cases = Router::new()
        .route(
            "/",
            post(|Extension(ParsedBody(body)): Extension<ParsedBody>| async move {
                Json(json!({"success": true, "received": body}))
            }),
        )
        .route(
            "/{id}",
            get(|Path(id): Path<String>| async move { Json(json!({"id": id})) }),
        );
    RouteTable::new().mount(RouteGroup::Cases, cases)
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(case_routes(), Arc::new(OpenCaseAccess), |_| {}).await
    }

    pub async fn start_with(
        routes: RouteTable,
        access: Arc<dyn CaseAccess>,
        tweak: impl FnOnce(&mut ServerConfig),
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            mode: RuntimeMode::Test,
            uploads_dir: dir.path().join("uploads"),
            public_dir: dir.path().join("public"),
            ..Default::default()
        };
        tweak(&mut config);
        let handle = triage_server::start(config, routes, access).await.unwrap();
        Self { handle, dir }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", self.handle.port())
    }

    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/ws", self.handle.port())
    }

    pub async fn connect(&self) -> Ws {
        let mut request = self.ws_url().into_client_request().unwrap();
        request
            .headers_mut()
            .insert("origin", FRONTEND.parse().unwrap());
        let (ws, _) = tokio_tungstenite::connect_async(request).await.unwrap();
        ws
    }

    /// Block until the room has `n` members; joins are processed on the
    /// server's reader task, not in the sender's program order.
    pub async fn wait_for_members(&self, case: &str, n: usize) {
        let case = CaseId::new(case).unwrap();
        let rooms = self.handle.channel().rooms();
        tokio::time::timeout(Duration::from_secs(5), async {
            while rooms.members(&case).len() < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("room never reached expected size");
    }

    pub async fn wait_for_clients(&self, n: usize) {
        let channel = self.handle.channel();
        tokio::time::timeout(Duration::from_secs(5), async {
            while channel.client_count() != n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("client count never settled");
    }
}

pub async fn emit(ws: &mut Ws, event: &str, data: Value) {
    let frame = json!({"event": event, "data": data}).to_string();
    ws.send(Message::text(frame)).await.unwrap();
}

/// Next JSON text frame, or `None` if nothing arrives within `wait`.
pub async fn recv_within(ws: &mut Ws, wait: Duration) -> Option<Value> {
    tokio::time::timeout(wait, async {
        while let Some(msg) = ws.next().await {
            if let Message::Text(text) = msg.unwrap() {
                return Some(serde_json::from_str(text.as_str()).unwrap());
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

pub async fn recv(ws: &mut Ws) -> Value {
    recv_within(ws, Duration::from_secs(5))
        .await
        .expect("expected a frame")
}
