use std::net::IpAddr;

use async_trait::async_trait;
use triage_core::{CaseId, ClientId};

/// What the server knows about a socket at handshake time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub client_id: ClientId,
    pub remote_addr: Option<IpAddr>,
    pub origin: Option<String>,
    /// Bearer token from the `token` query parameter or `Authorization` header.
    pub token: Option<String>,
}

impl ConnectionInfo {
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            remote_addr: None,
            origin: None,
            token: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaseAction {
    Join,
    Publish,
}

impl CaseAction {
    pub fn as_str(self) -> &'static str {
        match self {
            CaseAction::Join => "join",
            CaseAction::Publish => "publish",
        }
    }
}

/// Case-level capability check consulted before every join and publish.
#[async_trait]
pub trait CaseAccess: Send + Sync {
    async fn authorize(&self, conn: &ConnectionInfo, case_id: &CaseId, action: CaseAction) -> bool;
}

/// Allows every action.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenCaseAccess;

#[async_trait]
impl CaseAccess for OpenCaseAccess {
    async fn authorize(&self, _conn: &ConnectionInfo, _case_id: &CaseId, _action: CaseAction) -> bool {
        true
    }
}
