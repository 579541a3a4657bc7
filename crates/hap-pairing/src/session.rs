//! Pairing state scoped to a connection.
//!
//! Pair-setup and pair-verify span several HTTP requests on one TCP
//! connection. The registry keeps their state per connection id until the
//! connection closes or stays idle for longer than the timeout.

use crate::pair_setup::PairSetup;
use crate::pair_verify::PairVerify;
use crate::traits::Pairing;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Idle time after which an unfinished pairing exchange is dropped.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(60);

/// Pairing state of one connection.
pub struct ConnectionSession {
    pub setup: PairSetup,
    pub verify: PairVerify,
    /// Controller authenticated through pair-verify, if any.
    pub controller: Option<Pairing>,
    expires_at: Instant,
}

impl ConnectionSession {
    fn new(expires_at: Instant) -> Self {
        Self {
            setup: PairSetup::new(),
            verify: PairVerify::new(),
            controller: None,
            expires_at,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.controller.is_some()
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }
}

pub struct SessionRegistry {
    sessions: HashMap<u64, ConnectionSession>,
    timeout: Duration,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TIMEOUT)
    }
}

impl SessionRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            timeout,
        }
    }

    /// Session for `connection`, created on first use. Every access
    /// pushes the expiry back.
    pub fn session(&mut self, connection: u64) -> &mut ConnectionSession {
        let expires_at = Instant::now() + self.timeout;
        let session = self
            .sessions
            .entry(connection)
            .or_insert_with(|| ConnectionSession::new(expires_at));
        session.expires_at = expires_at;
        session
    }

    /// Take the session of `connection` out of the registry so it can be
    /// driven across await points. Hand it back with [`Self::checkin`].
    pub fn checkout(&mut self, connection: u64) -> ConnectionSession {
        let expires_at = Instant::now() + self.timeout;
        self.sessions
            .remove(&connection)
            .unwrap_or_else(|| ConnectionSession::new(expires_at))
    }

    pub fn checkin(&mut self, connection: u64, mut session: ConnectionSession) {
        session.expires_at = Instant::now() + self.timeout;
        self.sessions.insert(connection, session);
    }

    pub fn get(&self, connection: u64) -> Option<&ConnectionSession> {
        self.sessions.get(&connection)
    }

    /// Drop the state of a closed connection.
    pub fn remove(&mut self, connection: u64) -> Option<ConnectionSession> {
        let removed = self.sessions.remove(&connection);
        if removed.is_some() {
            debug!(connection, "Pairing session discarded");
        }
        removed
    }

    /// Drop sessions idle past their expiry. Verified sessions are kept.
    pub fn evict_expired(&mut self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.is_verified() || session.expires_at > now);

        let evicted = before - self.sessions.len();
        if evicted > 0 {
            debug!(evicted, "Evicted idle pairing sessions");
        }
        evicted
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
    use hap_core::ClientPermission;

    #[tokio::test]
    async fn sessions_are_per_connection() {
        let mut registry = SessionRegistry::default();
        registry.session(1).controller =
            Some(Pairing::new("phone", [0; 32], ClientPermission::Admin));
        registry.session(2);

        assert!(registry.get(1).unwrap().is_verified());
        assert!(!registry.get(2).unwrap().is_verified());

        registry.remove(1);
        assert!(registry.get(1).is_none());
        assert!(registry.get(2).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_expire() {
        let mut registry = SessionRegistry::new(Duration::from_secs(60));
        registry.session(1);
        registry.session(2);

        tokio::time::advance(Duration::from_secs(30)).await;
        registry.session(2);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(registry.evict_expired(), 1);
        assert!(registry.get(1).is_none());
        assert!(registry.get(2).is_some());
    }

    #[tokio::test]
    async fn checkout_keeps_state_across_checkin() {
        let mut registry = SessionRegistry::default();

        let mut session = registry.checkout(3);
        assert!(registry.get(3).is_none());
        session.controller = Some(Pairing::new("phone", [0; 32], ClientPermission::Admin));
        registry.checkin(3, session);

        assert!(registry.checkout(3).is_verified());
    }

    #[tokio::test(start_paused = true)]
    async fn verified_sessions_survive_eviction() {
        let mut registry = SessionRegistry::new(Duration::from_secs(1));
        registry.session(7).controller =
            Some(Pairing::new("phone", [0; 32], ClientPermission::User));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(registry.evict_expired(), 0);
        assert_eq!(registry.len(), 1);
    }
}
