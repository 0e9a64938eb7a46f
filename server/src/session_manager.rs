//! Session lifecycle management for the server
//!
//! This module owns every live session, keyed by its transport handle:
//! - Session creation on transport connect, with capacity enforcement
//! - Idempotent removal on transport disconnect
//! - Lookup by handle or display name for packet dispatch and broadcast
//!
//! At most one session exists per handle at any time. Removed sessions are
//! marked `Disconnected` and handed back to the caller for teardown; they are
//! never reinserted.

use crate::network::ConnectionHandle;
use crate::session::{Session, SessionState};
use log::{debug, info};
use std::collections::HashMap;
use std::net::SocketAddr;

/// Result of a connect callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Created,
    /// The handle already had a session; it was left untouched.
    Existing,
    /// The server is at capacity.
    Full,
}

/// Manages all live sessions
///
/// The SessionManager is the single place sessions are created and
/// destroyed, which keeps the one-session-per-handle invariant local to this
/// type. Everything else borrows sessions through `lookup`/`lookup_mut`.
pub struct SessionManager {
    /// Live sessions indexed by their transport handle
    sessions: HashMap<ConnectionHandle, Session>,
    /// Next session id; ids also seed entity ids and are never reused
    next_session_id: u32,
    /// Maximum number of concurrent sessions allowed
    max_sessions: usize,
}

impl SessionManager {
    /// Creates an empty manager with the given capacity
    ///
    /// Session ids start from 1 and increment for each new connection.
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            next_session_id: 1,
            max_sessions,
        }
    }

    /// Handles a transport connect callback
    ///
    /// Creates a session in the `Connecting` state unless the handle already
    /// has one or the server is full.
    pub fn on_connect(
        &mut self,
        handle: ConnectionHandle,
        addr: Option<SocketAddr>,
    ) -> ConnectOutcome {
        if self.sessions.contains_key(&handle) {
            debug!("Connection {} already has a session", handle);
            return ConnectOutcome::Existing;
        }

        // Enforce server capacity limits
        if self.sessions.len() >= self.max_sessions {
            info!("Rejecting connection {}: server full", handle);
            return ConnectOutcome::Full;
        }

        let id = self.next_session_id;
        self.next_session_id = self.next_session_id.wrapping_add(1);

        match addr {
            Some(addr) => info!("Session {} connected from {} ({})", id, addr, handle),
            None => info!("Session {} connected ({})", id, handle),
        }
        self.sessions.insert(handle, Session::new(id, handle, addr));
        ConnectOutcome::Created
    }

    /// Handles a transport disconnect callback
    ///
    /// Removes the session and returns it marked `Disconnected` so the
    /// caller can release its interest and announce the departure. A second
    /// call for the same handle is a no-op returning `None`.
    pub fn on_disconnect(&mut self, handle: ConnectionHandle) -> Option<Session> {
        match self.sessions.remove(&handle) {
            Some(mut session) => {
                session.mark_disconnected();
                info!("Session {} disconnected ({})", session.id(), handle);
                Some(session)
            }
            None => {
                debug!("Disconnect for unknown connection {}", handle);
                None
            }
        }
    }

    pub fn lookup(&self, handle: ConnectionHandle) -> Option<&Session> {
        self.sessions.get(&handle)
    }

    pub fn lookup_mut(&mut self, handle: ConnectionHandle) -> Option<&mut Session> {
        self.sessions.get_mut(&handle)
    }

    /// Finds an active session by display name
    pub fn find_by_name(&self, name: &str) -> Option<&Session> {
        self.sessions
            .values()
            .find(|session| session.is_active() && session.display_name() == name)
    }

    pub fn all(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn all_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut()
    }

    pub fn active(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values().filter(|session| session.is_active())
    }

    pub fn active_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions
            .values_mut()
            .filter(|session| session.is_active())
    }

    /// Handles of every session in the given state, in ascending order
    pub fn handles_in(&self, state: SessionState) -> Vec<ConnectionHandle> {
        let mut handles: Vec<ConnectionHandle> = self
            .sessions
            .values()
            .filter(|session| session.state() == state)
            .map(|session| session.handle())
            .collect();
        handles.sort();
        handles
    }

    /// Display names of active sessions, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .active()
            .map(|session| session.display_name().to_string())
            .collect();
        names.sort();
        names
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    /// Returns the number of live sessions in any state
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::ProtocolVersion;

    fn handle(n: u64) -> ConnectionHandle {
        ConnectionHandle(n)
    }

    fn activate(manager: &mut SessionManager, h: ConnectionHandle, name: &str) {
        let session = manager.lookup_mut(h).unwrap();
        session.begin_handshake(ProtocolVersion::V220, name);
        session.activate();
    }

    #[test]
    fn test_session_manager_creation() {
        let manager = SessionManager::new(5);
        assert_eq!(manager.max_sessions(), 5);
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn test_connect_creates_connecting_session() {
        let mut manager = SessionManager::new(2);
        assert_eq!(manager.on_connect(handle(1), None), ConnectOutcome::Created);

        let session = manager.lookup(handle(1)).unwrap();
        assert_eq!(session.id(), 1);
        assert_eq!(session.state(), SessionState::Connecting);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_connect_twice_keeps_one_session() {
        let mut manager = SessionManager::new(4);
        manager.on_connect(handle(1), None);
        activate(&mut manager, handle(1), "alice");

        assert_eq!(manager.on_connect(handle(1), None), ConnectOutcome::Existing);
        assert_eq!(manager.len(), 1);
        assert!(manager.lookup(handle(1)).unwrap().is_active());
    }

    #[test]
    fn test_session_ids_wrap_instead_of_overflowing() {
        let mut manager = SessionManager::new(4);
        manager.next_session_id = u32::MAX;
        manager.on_connect(handle(1), None);
        manager.on_connect(handle(2), None);
        assert_eq!(manager.lookup(handle(1)).unwrap().id(), u32::MAX);
        assert_eq!(manager.lookup(handle(2)).unwrap().id(), 0);
    }

    #[test]
    fn test_connect_at_capacity() {
        let mut manager = SessionManager::new(1);
        assert_eq!(manager.on_connect(handle(1), None), ConnectOutcome::Created);
        assert_eq!(manager.on_connect(handle(2), None), ConnectOutcome::Full);
        assert_eq!(manager.len(), 1);
        assert!(manager.lookup(handle(2)).is_none());
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut manager = SessionManager::new(2);
        manager.on_connect(handle(1), None);

        let removed = manager.on_disconnect(handle(1)).unwrap();
        assert_eq!(removed.state(), SessionState::Disconnected);
        assert!(manager.on_disconnect(handle(1)).is_none());
        assert!(manager.on_disconnect(handle(99)).is_none());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_ids_not_reused() {
        let mut manager = SessionManager::new(2);
        manager.on_connect(handle(1), None);
        manager.on_disconnect(handle(1));
        manager.on_connect(handle(1), None);
        assert_eq!(manager.lookup(handle(1)).unwrap().id(), 2);
    }

    #[test]
    fn test_names_and_lookup_by_name() {
        let mut manager = SessionManager::new(4);
        for n in 1..=3 {
            manager.on_connect(handle(n), None);
        }
        activate(&mut manager, handle(2), "zed");
        activate(&mut manager, handle(3), "amy");

        assert_eq!(manager.names(), vec!["amy".to_string(), "zed".to_string()]);
        assert_eq!(manager.active_count(), 2);
        assert_eq!(manager.find_by_name("zed").unwrap().handle(), handle(2));
        assert!(manager.find_by_name("nobody").is_none());
        assert_eq!(manager.handles_in(SessionState::Connecting), vec![handle(1)]);
        assert_eq!(
            manager.handles_in(SessionState::Active),
            vec![handle(2), handle(3)]
        );
    }
}
