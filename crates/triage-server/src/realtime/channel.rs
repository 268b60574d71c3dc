//! Per-case publish/subscribe over connected clients.
//!
//! [`CaseChannel`] is the only owner of room membership. Socket tasks feed it
//! raw text frames; it decodes them, checks [`CaseAccess`], and fans relayed
//! events out through each member's bounded queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use triage_core::{CaseId, ChannelError, ClientEvent, ClientId, ServerEvent};

use super::access::{CaseAccess, CaseAction, ConnectionInfo};
use super::registry::ClientRegistry;
use super::rooms::CaseRooms;

pub struct CaseChannel {
    registry: ClientRegistry,
    rooms: CaseRooms,
    access: Arc<dyn CaseAccess>,
    client_timeout: Duration,
}

impl CaseChannel {
    pub fn new(access: Arc<dyn CaseAccess>, max_send_queue: usize, client_timeout: Duration) -> Self {
        Self {
            registry: ClientRegistry::new(max_send_queue),
            rooms: CaseRooms::new(),
            access,
            client_timeout,
        }
    }

    pub fn connect(&self, info: ConnectionInfo) -> mpsc::Receiver<String> {
        tracing::info!(
            client_id = %info.client_id,
            remote_addr = ?info.remote_addr,
            "New client connected"
        );
        self.registry.register(info)
    }

    /// Handle one inbound text frame from `client_id`.
    pub async fn handle_text(&self, client_id: &ClientId, text: &str) {
        self.registry.touch(client_id);
        let event = match ClientEvent::parse(text) {
            Ok(event) => event,
            Err(e) => {
                self.reject(client_id, &e);
                return;
            }
        };
        self.handle_event(client_id, event).await;
    }

    pub async fn handle_event(&self, client_id: &ClientId, event: ClientEvent) {
        let Some(conn) = self.registry.get(client_id) else {
            tracing::debug!(client_id = %client_id, event = event.name(), "event from unknown client");
            return;
        };
        let case_id = event.case_id().clone();

        match event {
            ClientEvent::JoinCase(_) => {
                if !self.permitted(&conn.info, &case_id, CaseAction::Join).await {
                    return;
                }
                self.rooms.join(&case_id, client_id);
                tracing::info!(client_id = %client_id, "Client joined case {case_id}");
            }
            ClientEvent::LeaveCase(_) => {
                if self.rooms.leave(&case_id, client_id) {
                    tracing::info!(client_id = %client_id, "Client left case {case_id}");
                }
            }
            ClientEvent::NewFinding(_) | ClientEvent::AnalysisProgress(_) => {
                if !self.permitted(&conn.info, &case_id, CaseAction::Publish).await {
                    return;
                }
                if let Some(relay) = ServerEvent::relay_of(&event) {
                    let delivered = self.broadcast(&case_id, &relay);
                    tracing::debug!(
                        client_id = %client_id,
                        case_id = %case_id,
                        event = event.name(),
                        delivered,
                        "relayed"
                    );
                }
            }
        }
    }

    async fn permitted(&self, conn: &ConnectionInfo, case_id: &CaseId, action: CaseAction) -> bool {
        if self.access.authorize(conn, case_id, action).await {
            return true;
        }
        tracing::warn!(
            client_id = %conn.client_id,
            case_id = %case_id,
            action = action.as_str(),
            "case access denied"
        );
        self.send_event(
            &conn.client_id,
            &ServerEvent::error(format!("not allowed to {} case {case_id}", action.as_str())),
        );
        false
    }

    fn reject(&self, client_id: &ClientId, err: &ChannelError) {
        tracing::warn!(client_id = %client_id, error = %err, "rejected frame");
        self.send_event(client_id, &ServerEvent::error(err.to_string()));
    }

    fn send_event(&self, client_id: &ClientId, event: &ServerEvent) -> bool {
        match event.to_json() {
            Ok(json) => self.registry.send_to(client_id, json),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode server event");
                false
            }
        }
    }

    /// Queue `event` for every member of the case room. Returns the number of
    /// members it was queued for.
    pub fn broadcast(&self, case_id: &CaseId, event: &ServerEvent) -> usize {
        let json = match event.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode server event");
                return 0;
            }
        };
        self.rooms
            .members(case_id)
            .iter()
            .filter(|member| self.registry.send_to(member, json.clone()))
            .count()
    }

    /// Forget the client. Safe to call more than once.
    pub fn disconnect(&self, client_id: &ClientId) -> bool {
        let cases = self.rooms.leave_all(client_id);
        if !self.registry.unregister(client_id) {
            return false;
        }
        tracing::info!(client_id = %client_id, rooms_left = cases.len(), "Client disconnected");
        true
    }

    pub fn record_activity(&self, client_id: &ClientId) {
        self.registry.touch(client_id);
    }

    /// Disconnect every client silent for longer than the client timeout.
    pub fn sweep_dead(&self) -> usize {
        let dead = self.registry.dead_clients(self.client_timeout);
        let mut removed = 0;
        for id in dead {
            if self.disconnect(&id) {
                tracing::info!(client_id = %id, "Cleaned up dead client");
                removed += 1;
            }
        }
        removed
    }

    pub fn rooms(&self) -> &CaseRooms {
        &self.rooms
    }

    pub fn client_count(&self) -> usize {
        self.registry.count()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.room_count()
    }
}
