use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{
    close_code, CloseFrame, Message as WsMessage, Utf8Bytes, WebSocket, WebSocketUpgrade,
};
use axum::extract::{FromRequestParts, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use triage_core::ClientId;

use super::access::ConnectionInfo;
use super::channel::CaseChannel;
use crate::error::ErrorBody;
use crate::policy::client_ip;

pub const WS_PATH: &str = "/ws";

/// State for the WebSocket endpoint.
#[derive(Clone)]
pub struct SocketState {
    pub channel: Arc<CaseChannel>,
    pub allowed_origin: HeaderValue,
    pub heartbeat_interval: Duration,
    pub shutdown: CancellationToken,
}

fn token_from(request: &Request) -> Option<String> {
    let from_query = request.uri().query().and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(k, _)| k == "token")
            .map(|(_, v)| v.into_owned())
    });
    from_query.or_else(|| bearer(request.headers()))
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Upgrade to a case-channel socket.
///
/// A handshake whose `Origin` is not the frontend origin is refused with 403.
/// Handshakes without `Origin` (non-browser clients) are accepted.
pub async fn ws_handler(State(state): State<SocketState>, request: Request) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());
    if let Some(origin) = &origin {
        if origin.as_bytes() != state.allowed_origin.as_bytes() {
            tracing::warn!(origin = %origin, "websocket origin rejected");
            return (
                StatusCode::FORBIDDEN,
                Json(ErrorBody::new("Origin not allowed")),
            )
                .into_response();
        }
    }

    let info = ConnectionInfo {
        client_id: ClientId::new(),
        remote_addr: client_ip(&request),
        origin,
        token: token_from(&request),
    };

    let (mut parts, _body) = request.into_parts();
    let ws = match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };
    ws.on_upgrade(move |socket| handle_socket(socket, state, info))
}

type SocketSink = SplitSink<WebSocket, WsMessage>;
type SocketStream = SplitStream<WebSocket>;

/// Why the outbound half stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutboundEnd {
    /// The channel dropped the client's queue (sweep or disconnect).
    Removed,
    ShuttingDown,
    PeerGone,
}

impl OutboundEnd {
    fn close_frame(self) -> Option<CloseFrame> {
        let (code, reason) = match self {
            OutboundEnd::Removed => (close_code::POLICY, "client removed"),
            OutboundEnd::ShuttingDown => (close_code::AWAY, "server shutting down"),
            OutboundEnd::PeerGone => return None,
        };
        Some(CloseFrame {
            code,
            reason: Utf8Bytes::from_static(reason),
        })
    }
}

/// Forward queued events to the peer and ping it every `heartbeat`. Ends
/// with a Close frame unless the peer is already unreachable.
async fn pump_outbound(
    mut sink: SocketSink,
    mut queue: mpsc::Receiver<String>,
    heartbeat: Duration,
    shutdown: CancellationToken,
) -> OutboundEnd {
    let mut pings = interval_at(Instant::now() + heartbeat, heartbeat);
    pings.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let end = loop {
        let frame = tokio::select! {
            queued = queue.recv() => match queued {
                Some(text) => WsMessage::Text(text.into()),
                None => break OutboundEnd::Removed,
            },
            _ = pings.tick() => WsMessage::Ping(Bytes::new()),
            () = shutdown.cancelled() => break OutboundEnd::ShuttingDown,
        };
        if sink.send(frame).await.is_err() {
            break OutboundEnd::PeerGone;
        }
    };

    if let Some(frame) = end.close_frame() {
        if let Err(err) = sink.send(WsMessage::Close(Some(frame))).await {
            tracing::debug!(error = %err, "close frame not delivered");
        }
    }
    end
}

/// Feed inbound frames to the channel until the peer closes or errors.
async fn pump_inbound(mut stream: SocketStream, channel: Arc<CaseChannel>, client_id: ClientId) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => channel.handle_text(&client_id, text.as_str()).await,
            Ok(WsMessage::Ping(_) | WsMessage::Pong(_)) => channel.record_activity(&client_id),
            Ok(WsMessage::Binary(_)) => {
                tracing::debug!(client_id = %client_id, "ignoring binary frame");
            }
            Ok(WsMessage::Close(_)) => break,
            Err(err) => {
                tracing::debug!(client_id = %client_id, error = %err, "socket read failed");
                break;
            }
        }
    }
}

/// Run both halves of a connection. Whichever half finishes first takes
/// the other down with it, then the client leaves the channel.
async fn handle_socket(socket: WebSocket, state: SocketState, info: ConnectionInfo) {
    let client_id = info.client_id.clone();
    let queue = state.channel.connect(info);
    let (sink, stream) = socket.split();

    let mut outbound = tokio::spawn(pump_outbound(
        sink,
        queue,
        state.heartbeat_interval,
        state.shutdown.clone(),
    ));
    let mut inbound = tokio::spawn(pump_inbound(
        stream,
        Arc::clone(&state.channel),
        client_id.clone(),
    ));

    tokio::select! {
        end = &mut outbound => {
            inbound.abort();
            if let Ok(end) = end {
                tracing::debug!(client_id = %client_id, ?end, "outbound half finished");
            }
        }
        _ = &mut inbound => outbound.abort(),
    }

    state.channel.disconnect(&client_id);
}
