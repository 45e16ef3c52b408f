//! Reference-counted tracking of room-scoped subscriptions.
//!
//! UI consumers declare interest in a scope with [`ScopeTracker::join`] and
//! release it with [`ScopeTracker::leave`]. Only the 0→1 and 1→0 edges emit
//! join/leave instructions toward the connection task; intermediate counts
//! are bookkeeping. The tracker is the source of truth for which scopes
//! should be joined: after a reconnect the connection task re-issues joins
//! from [`ScopeTracker::snapshot`], so membership survives connection churn
//! transparently.

use crate::models::Scope;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Join/leave instructions emitted on refcount edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ScopeCmd {
    Join(Scope),
    Leave(Scope),
}

/// Reference-counted scope membership tracker.
///
/// Cloning is cheap; all clones share the same counts.
#[derive(Clone)]
pub struct ScopeTracker {
    counts: Arc<Mutex<HashMap<Scope, usize>>>,
    cmd_tx: mpsc::UnboundedSender<ScopeCmd>,
}

impl ScopeTracker {
    /// Create a tracker and the instruction stream the connection task
    /// consumes.
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<ScopeCmd>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        (Self { counts: Arc::new(Mutex::new(HashMap::new())), cmd_tx }, cmd_rx)
    }

    /// Declare interest in a scope.
    ///
    /// The first reference (0→1) instructs the connection to join the room;
    /// further references only increment the count.
    pub fn join(&self, scope: Scope) {
        let first = {
            let mut counts = self.counts.lock().expect("scope lock poisoned");
            let count = counts.entry(scope.clone()).or_insert(0);
            *count += 1;
            *count == 1
        };
        if first {
            log::debug!("[SCOPES] join {}", scope);
            // Send failure means the connection task is gone; counts remain
            // correct and a future connection re-joins from the snapshot.
            let _ = self.cmd_tx.send(ScopeCmd::Join(scope));
        }
    }

    /// Release interest in a scope.
    ///
    /// The last reference (1→0) instructs the connection to leave the room.
    /// Releasing below zero is a programming error on the caller's side:
    /// it is clamped at zero and logged, never a panic.
    pub fn leave(&self, scope: &Scope) {
        let last = {
            let mut counts = self.counts.lock().expect("scope lock poisoned");
            match counts.get_mut(scope) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    false
                }
                Some(_) => {
                    counts.remove(scope);
                    true
                }
                None => {
                    log::warn!("[SCOPES] leave({}) without matching join — ignored", scope);
                    false
                }
            }
        };
        if last {
            log::debug!("[SCOPES] leave {}", scope);
            let _ = self.cmd_tx.send(ScopeCmd::Leave(scope.clone()));
        }
    }

    /// Current reference count for a scope.
    pub fn count(&self, scope: &Scope) -> usize {
        self.counts.lock().expect("scope lock poisoned").get(scope).copied().unwrap_or(0)
    }

    /// All scopes with at least one reference, for re-issue on (re)connect.
    pub fn snapshot(&self) -> Vec<Scope> {
        self.counts.lock().expect("scope lock poisoned").keys().cloned().collect()
    }
}
