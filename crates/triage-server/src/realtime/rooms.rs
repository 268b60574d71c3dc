//! Case room membership.
//!
//! Two indexes are kept in step under one lock: case to members and client
//! to joined cases. A room exists only while it has members.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use triage_core::{CaseId, ClientId};

#[derive(Default)]
struct Membership {
    rooms: HashMap<CaseId, HashSet<ClientId>>,
    joined: HashMap<ClientId, HashSet<CaseId>>,
}

impl Membership {
    fn remove(&mut self, case_id: &CaseId, client_id: &ClientId) -> bool {
        let Some(members) = self.rooms.get_mut(case_id) else {
            return false;
        };
        let removed = members.remove(client_id);
        if members.is_empty() {
            self.rooms.remove(case_id);
        }
        removed
    }
}

#[derive(Default)]
pub struct CaseRooms {
    inner: Mutex<Membership>,
}

impl CaseRooms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the client was already a member.
    pub fn join(&self, case_id: &CaseId, client_id: &ClientId) -> bool {
        let mut inner = self.inner.lock();
        let added = inner
            .rooms
            .entry(case_id.clone())
            .or_default()
            .insert(client_id.clone());
        if added {
            inner
                .joined
                .entry(client_id.clone())
                .or_default()
                .insert(case_id.clone());
        }
        added
    }

    /// Returns `false` if the client was not a member.
    pub fn leave(&self, case_id: &CaseId, client_id: &ClientId) -> bool {
        let mut inner = self.inner.lock();
        if !inner.remove(case_id, client_id) {
            return false;
        }
        if let Some(cases) = inner.joined.get_mut(client_id) {
            cases.remove(case_id);
            if cases.is_empty() {
                inner.joined.remove(client_id);
            }
        }
        true
    }

    /// Drop the client from every room; returns the cases it had joined.
    pub fn leave_all(&self, client_id: &ClientId) -> Vec<CaseId> {
        let mut inner = self.inner.lock();
        let Some(cases) = inner.joined.remove(client_id) else {
            return Vec::new();
        };
        for case_id in &cases {
            inner.remove(case_id, client_id);
        }
        cases.into_iter().collect()
    }

    /// Snapshot of the room's members.
    pub fn members(&self, case_id: &CaseId) -> Vec<ClientId> {
        self.inner
            .lock()
            .rooms
            .get(case_id)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, case_id: &CaseId, client_id: &ClientId) -> bool {
        self.inner
            .lock()
            .rooms
            .get(case_id)
            .is_some_and(|m| m.contains(client_id))
    }

    pub fn room_count(&self) -> usize {
        self.inner.lock().rooms.len()
    }
}
