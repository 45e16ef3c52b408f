//! In-memory session store.
//!
//! Holds the current identity (user, tenant, token) and publishes every
//! transition on a watch channel. A token refresh replaces the token and
//! expiry in place without changing the identity generation — consumers
//! must not treat a token-only change as an identity change, so the
//! connection manager keys its teardown decisions off `identity`, not off
//! snapshot equality.

use crate::error::{RestoLinkError, Result};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;

/// Refresh the token once it is due to expire within this margin.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// The authenticated session: identity plus its validity window.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user_id: String,
    pub tenant_id: String,
    pub token: String,
    pub refresh_token: Option<String>,
    /// Token expiry in milliseconds since the Unix epoch. `None` means the
    /// token does not carry an expiry (opaque tokens).
    pub token_expiry_ms: Option<u64>,
    /// Restaurants this user may access; used for the default scope joins.
    pub restaurant_ids: Vec<String>,
}

impl Session {
    /// Whether the token is past its expiry.
    pub fn is_token_expired(&self) -> bool {
        match self.token_expiry_ms {
            Some(expiry) => now_ms() >= expiry,
            None => false,
        }
    }

    /// Whether the token expires soon enough that a refresh should be
    /// started (within a 5-minute margin).
    pub fn needs_refresh(&self) -> bool {
        match self.token_expiry_ms {
            Some(expiry) => now_ms() + TOKEN_REFRESH_MARGIN.as_millis() as u64 >= expiry,
            None => false,
        }
    }

    /// Whether `other` carries the same user and tenant.
    pub fn same_identity(&self, other: &Session) -> bool {
        self.user_id == other.user_id && self.tenant_id == other.tenant_id
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A published view of the session state.
///
/// `identity` increments whenever the logged-in user or tenant changes,
/// including logout. It does NOT change on token refresh. Async work
/// records the identity it was started under and discards its results if
/// the identity has moved on.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session: Option<Session>,
    pub identity: u64,
}

impl SessionSnapshot {
    /// Whether this snapshot represents a connectable session: present,
    /// with a token that is not already expired.
    pub fn is_valid(&self) -> bool {
        self.session.as_ref().map(|s| !s.is_token_expired()).unwrap_or(false)
    }
}

/// Explicitly constructed session store, injected into the connection
/// manager and the API client rather than accessed as ambient global state.
///
/// Cloning is cheap; all clones share the same underlying channel.
#[derive(Clone)]
pub struct SessionStore {
    tx: Arc<watch::Sender<SessionSnapshot>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create an empty store (no session).
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot { session: None, identity: 0 });
        Self { tx: Arc::new(tx) }
    }

    /// Replace the current session.
    ///
    /// Bumps the identity generation when the user/tenant changes or the
    /// session transitions between present and absent. Setting a session
    /// with the same identity (e.g. a re-login as the same user) still
    /// bumps, forcing a clean reconnect.
    pub fn set_session(&self, session: Option<Session>) {
        self.tx.send_modify(|snap| {
            let unchanged_absent = snap.session.is_none() && session.is_none();
            if !unchanged_absent {
                snap.identity += 1;
            }
            snap.session = session;
        });
        log::debug!("[SESSION] set_session -> identity={}", self.identity());
    }

    /// Log out: drop the session and notify all watchers.
    pub fn clear(&self) {
        self.set_session(None);
    }

    /// Replace token material in place after a successful refresh.
    ///
    /// Does not bump the identity generation; watchers are still notified
    /// so anything holding the raw token can pick up the new one.
    pub fn refresh_tokens(
        &self,
        token: String,
        refresh_token: Option<String>,
        token_expiry_ms: Option<u64>,
    ) -> Result<()> {
        let mut applied = false;
        self.tx.send_modify(|snap| {
            if let Some(session) = snap.session.as_mut() {
                session.token = token.clone();
                if refresh_token.is_some() {
                    session.refresh_token = refresh_token.clone();
                }
                session.token_expiry_ms = token_expiry_ms;
                applied = true;
            }
        });
        if applied {
            log::debug!("[SESSION] token refreshed (identity unchanged)");
            Ok(())
        } else {
            Err(RestoLinkError::SessionError(
                "Cannot refresh tokens without an active session".to_string(),
            ))
        }
    }

    /// Current session, if any.
    pub fn session(&self) -> Option<Session> {
        self.tx.borrow().session.clone()
    }

    /// Current snapshot (session + identity generation).
    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    /// Current identity generation.
    pub fn identity(&self) -> u64 {
        self.tx.borrow().identity
    }

    /// Subscribe to session transitions.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }
}

/// External collaborator that can mint fresh token material.
///
/// The connection manager calls this once when the push-channel handshake
/// is rejected; the API client is expected to route 401s through the same
/// external auth flow. Implementations live outside the sync core — the
/// crate ships an HTTP-backed one in [`crate::api`].
#[async_trait::async_trait]
pub trait SessionBackend: Send + Sync {
    /// Exchange the session's refresh token for new token material.
    async fn refresh(&self, refresh_token: &str) -> Result<crate::models::RefreshResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(user: &str, tenant: &str, token: &str) -> Session {
        Session {
            user_id: user.to_string(),
            tenant_id: tenant.to_string(),
            token: token.to_string(),
            refresh_token: Some("rt".to_string()),
            token_expiry_ms: None,
            restaurant_ids: vec!["r1".to_string()],
        }
    }

    #[test]
    fn test_set_session_bumps_identity() {
        let store = SessionStore::new();
        assert_eq!(store.identity(), 0);

        store.set_session(Some(session("u1", "t1", "tok")));
        assert_eq!(store.identity(), 1);

        store.clear();
        assert_eq!(store.identity(), 2);

        // Clearing an already-empty store is a no-op.
        store.clear();
        assert_eq!(store.identity(), 2);
    }

    #[test]
    fn test_token_refresh_keeps_identity() {
        let store = SessionStore::new();
        store.set_session(Some(session("u1", "t1", "tok-1")));
        let identity = store.identity();

        store.refresh_tokens("tok-2".to_string(), None, None).unwrap();
        assert_eq!(store.identity(), identity);
        assert_eq!(store.session().unwrap().token, "tok-2");
        // Absent refresh token leaves the old one in place.
        assert_eq!(store.session().unwrap().refresh_token.as_deref(), Some("rt"));
    }

    #[test]
    fn test_refresh_without_session_is_an_error() {
        let store = SessionStore::new();
        assert!(store.refresh_tokens("tok".to_string(), None, None).is_err());
    }

    #[test]
    fn test_watchers_see_token_refresh_without_identity_change() {
        let store = SessionStore::new();
        store.set_session(Some(session("u1", "t1", "tok-1")));

        let mut rx = store.watch();
        rx.mark_unchanged();
        store.refresh_tokens("tok-2".to_string(), None, None).unwrap();

        assert!(rx.has_changed().unwrap());
        let snap = rx.borrow_and_update();
        assert_eq!(snap.identity, 1);
        assert_eq!(snap.session.as_ref().unwrap().token, "tok-2");
    }

    #[test]
    fn test_expired_token_invalidates_snapshot() {
        let store = SessionStore::new();
        let mut s = session("u1", "t1", "tok");
        s.token_expiry_ms = Some(1); // long past
        store.set_session(Some(s));
        assert!(!store.snapshot().is_valid());
        assert!(store.session().unwrap().is_token_expired());
        assert!(store.session().unwrap().needs_refresh());
    }

    #[test]
    fn test_same_identity_ignores_token() {
        let a = session("u1", "t1", "tok-1");
        let b = session("u1", "t1", "tok-2");
        let c = session("u2", "t1", "tok-1");
        assert!(a.same_identity(&b));
        assert!(!a.same_identity(&c));
    }
}
