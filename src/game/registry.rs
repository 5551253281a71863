//! Session registry
//!
//! Tracks the game state of every connected socket. The registry does no
//! network I/O; the engine mutates it while processing one frame at a time.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{ClientId, ConnId};

/// Per-connection game state.
///
/// Created unauthenticated the moment a connection is accepted and removed
/// the moment the connection terminates. `opponent_id` and `secret_word`
/// stay `None` until a challenge pairs two sessions; `secret_word` is set
/// once, on the master's side only.
#[derive(Debug, Clone)]
pub struct Session {
    pub client_id: ClientId,
    pub logged_in: bool,
    pub in_game: bool,
    pub is_guessing: bool,
    pub opponent_id: Option<ClientId>,
    pub secret_word: Option<String>,
}

impl Session {
    fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            logged_in: false,
            in_game: false,
            is_guessing: false,
            opponent_id: None,
            secret_word: None,
        }
    }
}

/// Mapping from connection slot to session.
///
/// Slot ids are assigned monotonically by the transport, so the BTreeMap's
/// key order is connection order; opponent listings rely on that.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: BTreeMap<ConnId, Session>,
    next_client_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: BTreeMap::new(),
            next_client_id: AtomicU64::new(1),
        }
    }

    /// Allocate and store a fresh unauthenticated session.
    pub fn create(&mut self, conn: ConnId) -> ClientId {
        let client_id = ClientId(self.next_client_id.fetch_add(1, Ordering::SeqCst));
        self.sessions.insert(conn, Session::new(client_id));
        client_id
    }

    /// Forget the session. Does not touch the transport.
    pub fn remove(&mut self, conn: ConnId) -> Option<Session> {
        self.sessions.remove(&conn)
    }

    pub fn get(&self, conn: ConnId) -> Option<&Session> {
        self.sessions.get(&conn)
    }

    pub fn get_mut(&mut self, conn: ConnId) -> Option<&mut Session> {
        self.sessions.get_mut(&conn)
    }

    /// All sessions that are logged in and not in a game, excluding the
    /// caller, in connection order.
    pub fn list_available_opponents(&self, excluding: ConnId) -> Vec<ClientId> {
        self.sessions
            .iter()
            .filter(|(conn, session)| {
                **conn != excluding && session.logged_in && !session.in_game
            })
            .map(|(_, session)| session.client_id)
            .collect()
    }

    /// Reverse lookup. `None` covers opponents that already disconnected.
    pub fn find_by_client_id(&self, id: ClientId) -> Option<ConnId> {
        self.sessions
            .iter()
            .find(|(_, session)| session.client_id == id)
            .map(|(conn, _)| *conn)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ids_are_monotonic_and_never_reused() {
        let mut registry = SessionRegistry::new();
        let a = registry.create(ConnId(1));
        let b = registry.create(ConnId(2));
        assert_eq!(a, ClientId(1));
        assert_eq!(b, ClientId(2));

        registry.remove(ConnId(1));
        let c = registry.create(ConnId(3));
        assert_eq!(c, ClientId(3));
    }

    #[test]
    fn test_opponent_listing_excludes_caller() {
        let mut registry = SessionRegistry::new();
        registry.create(ConnId(1));
        registry.create(ConnId(2));
        registry.get_mut(ConnId(1)).unwrap().logged_in = true;
        registry.get_mut(ConnId(2)).unwrap().logged_in = true;

        assert_eq!(
            registry.list_available_opponents(ConnId(1)),
            vec![ClientId(2)]
        );
        assert_eq!(
            registry.list_available_opponents(ConnId(2)),
            vec![ClientId(1)]
        );
    }

    #[test]
    fn test_opponent_listing_skips_unauthenticated_and_paired() {
        let mut registry = SessionRegistry::new();
        registry.create(ConnId(1));
        registry.create(ConnId(2)); // never logs in
        registry.create(ConnId(3));
        registry.create(ConnId(4));
        registry.get_mut(ConnId(1)).unwrap().logged_in = true;
        registry.get_mut(ConnId(3)).unwrap().logged_in = true;
        registry.get_mut(ConnId(4)).unwrap().logged_in = true;
        registry.get_mut(ConnId(4)).unwrap().in_game = true;

        assert_eq!(
            registry.list_available_opponents(ConnId(1)),
            vec![ClientId(3)]
        );
    }

    #[test]
    fn test_opponent_listing_is_in_connection_order() {
        let mut registry = SessionRegistry::new();
        for n in 1..=4 {
            registry.create(ConnId(n));
            registry.get_mut(ConnId(n)).unwrap().logged_in = true;
        }

        assert_eq!(
            registry.list_available_opponents(ConnId(3)),
            vec![ClientId(1), ClientId(2), ClientId(4)]
        );
    }

    #[test]
    fn test_find_by_client_id() {
        let mut registry = SessionRegistry::new();
        let id = registry.create(ConnId(7));
        assert_eq!(registry.find_by_client_id(id), Some(ConnId(7)));

        registry.remove(ConnId(7));
        assert_eq!(registry.find_by_client_id(id), None);
    }
}
