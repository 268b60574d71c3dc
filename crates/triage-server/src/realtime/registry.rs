use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use triage_core::ClientId;

use super::access::ConnectionInfo;

/// A connected WebSocket client.
pub struct ClientConnection {
    pub info: ConnectionInfo,
    tx: mpsc::Sender<String>,
    last_seen: AtomicU64,
    dropped: AtomicU64,
}

impl ClientConnection {
    fn new(info: ConnectionInfo, tx: mpsc::Sender<String>) -> Self {
        Self {
            info,
            tx,
            last_seen: AtomicU64::new(now_secs()),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn touch(&self) {
        self.last_seen.store(now_secs(), Ordering::Relaxed);
    }

    fn is_alive_at(&self, now: u64, timeout: Duration) -> bool {
        let last = self.last_seen.load(Ordering::Relaxed);
        now.saturating_sub(last) < timeout.as_secs()
    }

    /// Messages dropped because the outbound queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub(crate) fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Registry of all connected WebSocket clients.
pub struct ClientRegistry {
    clients: DashMap<ClientId, Arc<ClientConnection>>,
    max_send_queue: usize,
}

impl ClientRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            clients: DashMap::new(),
            max_send_queue,
        }
    }

    /// Register a client and return the receiving end of its outbound queue.
    pub fn register(&self, info: ConnectionInfo) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(self.max_send_queue.max(1));
        let id = info.client_id.clone();
        self.clients.insert(id, Arc::new(ClientConnection::new(info, tx)));
        rx
    }

    /// Remove a client. Dropping its sender ends the socket's writer.
    pub fn unregister(&self, id: &ClientId) -> bool {
        self.clients.remove(id).is_some()
    }

    pub fn get(&self, id: &ClientId) -> Option<Arc<ClientConnection>> {
        self.clients.get(id).map(|c| Arc::clone(c.value()))
    }

    /// Queue a message for one client. Never waits: a full queue drops the
    /// message.
    pub fn send_to(&self, id: &ClientId, message: String) -> bool {
        let Some(client) = self.clients.get(id) else {
            return false;
        };
        match client.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                client.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    client_id = %id,
                    msg_len = msg.len(),
                    "Send queue full, dropping message"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn touch(&self, id: &ClientId) {
        if let Some(client) = self.clients.get(id) {
            client.touch();
        }
    }

    pub fn dead_clients(&self, timeout: Duration) -> Vec<ClientId> {
        self.dead_clients_at(now_secs(), timeout)
    }

    /// Clients silent for at least `timeout` as of `now` (unix seconds).
    pub fn dead_clients_at(&self, now: u64, timeout: Duration) -> Vec<ClientId> {
        self.clients
            .iter()
            .filter(|entry| !entry.value().is_alive_at(now, timeout))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Number of connected clients.
    pub fn count(&self) -> usize {
        self.clients.len()
    }
}
