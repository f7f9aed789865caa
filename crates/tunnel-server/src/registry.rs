//! Registry of connected client sessions, keyed by tunnel ID.
//!
//! A session is registered once its handshake succeeds and removed when its control connection
//! closes. Registering a tunnel ID that is already live supersedes the previous session: the old
//! one is closed before the new one becomes visible to lookups.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, info};
use tunnel_core::MuxControl;

/// A connected client, ready to receive forwarded requests.
#[derive(Clone)]
pub struct ClientSession {
    pub tunnel_id: String,
    pub bearer: String,
    pub control: MuxControl,
    pub closed: watch::Receiver<bool>,
    pub connected_at: Instant,
}

impl ClientSession {
    pub fn has_bearer(&self) -> bool {
        !self.bearer.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// Concurrent map of tunnel ID to live client session.
#[derive(Clone, Default)]
pub struct Registry {
    sessions: Arc<DashMap<String, ClientSession>>,
}

impl Registry {
    pub fn new() -> Self {
        Self { sessions: Arc::new(DashMap::new()) }
    }

    /// Register a session under its tunnel ID, superseding and closing any previous session
    /// registered under the same ID. Returns the superseded session, if any, so the caller can
    /// tear down its control connection after this call returns.
    pub fn register(&self, session: ClientSession) -> Option<ClientSession> {
        let id = session.tunnel_id.clone();
        let previous = self.sessions.insert(id.clone(), session);
        if previous.is_some() {
            info!(tunnel_id = %id, "session superseded");
        } else {
            info!(tunnel_id = %id, "session registered");
        }
        previous
    }

    pub fn lookup(&self, tunnel_id: &str) -> Option<ClientSession> {
        self.sessions.get(tunnel_id).map(|entry| entry.clone())
    }

    /// Remove the entry for `tunnel_id`, but only if it still refers to `expect_connected_at`
    /// (guards against unregistering a session that has already been superseded).
    pub fn unregister(&self, tunnel_id: &str, expect_connected_at: Instant) {
        if let Some(entry) = self.sessions.get(tunnel_id) {
            if entry.connected_at != expect_connected_at {
                return;
            }
        } else {
            return;
        }
        self.sessions.remove(tunnel_id);
        debug!(tunnel_id = %tunnel_id, "session unregistered");
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str) -> (ClientSession, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let (control, _) = yamux_control_pair();
        (
            ClientSession {
                tunnel_id: id.to_string(),
                bearer: "tok".to_string(),
                control,
                closed: rx,
                connected_at: Instant::now(),
            },
            tx,
        )
    }

    // yamux::Control has no public constructor outside a Connection; tests that need a real
    // Control build one over a loopback pair.
    fn yamux_control_pair() -> (MuxControl, ()) {
        // A session's `control` field is never exercised by the registry itself (only stored and
        // cloned), so for unit tests we construct a Connection over an in-memory duplex pair and
        // immediately discard everything except its Control handle.
        let (a, _b) = tokio::io::duplex(64);
        let mut conn = yamux::Connection::new(
            tokio_util::compat::TokioAsyncReadCompatExt::compat(a),
            yamux::Config::default(),
            yamux::Mode::Client,
        );
        let control = conn.control();
        std::mem::forget(conn);
        (control, ())
    }

    #[test]
    fn register_then_lookup_returns_same_session() {
        let registry = Registry::new();
        let (session, _tx) = session("abcde");
        assert!(registry.register(session).is_none());
        let found = registry.lookup("abcde").expect("session present");
        assert_eq!(found.tunnel_id, "abcde");
    }

    #[test]
    fn register_supersedes_existing_session() {
        let registry = Registry::new();
        let (s1, _tx1) = session("abcde");
        let (s2, _tx2) = session("abcde");
        let first_connected_at = s1.connected_at;

        registry.register(s1);
        let previous = registry.register(s2);

        assert!(previous.is_some());
        assert_eq!(previous.unwrap().connected_at, first_connected_at);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn unregister_ignores_stale_generation() {
        let registry = Registry::new();
        let (s1, _tx1) = session("abcde");
        let stale_connected_at = s1.connected_at;
        registry.register(s1);

        let (s2, _tx2) = session("abcde");
        registry.register(s2);

        // An unregister carrying the superseded session's timestamp must not evict the new one.
        registry.unregister("abcde", stale_connected_at);
        assert!(registry.lookup("abcde").is_some());
    }

    #[test]
    fn unregister_removes_current_session() {
        let registry = Registry::new();
        let (s1, _tx1) = session("abcde");
        let connected_at = s1.connected_at;
        registry.register(s1);
        registry.unregister("abcde", connected_at);
        assert!(registry.lookup("abcde").is_none());
    }

    #[test]
    fn lookup_unknown_tunnel_is_none() {
        let registry = Registry::new();
        assert!(registry.lookup("zzzzz").is_none());
    }
}
