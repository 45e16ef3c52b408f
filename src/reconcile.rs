//! Push-event reconciliation against the query cache.
//!
//! Each push event maps to a fixed set of cache effects, mirroring what a
//! fetch of the affected queries would eventually produce: full snapshots
//! (orders) are written through directly, invalidation-only events mark the
//! affected scopes stale so consumers re-fetch. User-facing events
//! additionally forward an [`Alert`] for the notification surface.
//!
//! Every event is tagged with the connection generation it arrived under.
//! Events from a previous connection are discarded: after a teardown the
//! tracked scopes are re-joined and a fresh fetch re-primes the cache, so a
//! stale event could only reorder history.

use crate::cache::QueryCache;
use crate::models::{NotificationMessage, PushEvent, Severity};
use serde_json::{json, Value as JsonValue};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Monotonic connection generation, shared between the connection task
/// (which bumps it on every teardown) and the reconciler (which discards
/// events tagged with an older value).
#[derive(Clone, Default)]
pub struct Generation(Arc<AtomicU64>);

impl Generation {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Invalidate all in-flight events; returns the new generation.
    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// A user-facing alert derived from a push event, forwarded to whatever
/// notification surface the embedding application provides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub severity: Severity,
    pub title: String,
    pub message: String,
}

/// Applies push events to the query cache and forwards derived alerts.
///
/// Cloning is cheap; all clones share the cache and the alert stream.
#[derive(Clone)]
pub struct Reconciler {
    cache: QueryCache,
    generation: Generation,
    alert_tx: mpsc::UnboundedSender<Alert>,
}

impl Reconciler {
    pub fn new(cache: QueryCache, generation: Generation) -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (alert_tx, alert_rx) = mpsc::unbounded_channel();
        (Self { cache, generation, alert_tx }, alert_rx)
    }

    /// Apply an event tagged with the connection generation it arrived
    /// under. Events from an older generation are logged and dropped.
    pub fn apply_tagged(&self, event: PushEvent, generation: u64) {
        let current = self.generation.current();
        if generation != current {
            log::debug!(
                "[RECONCILE] dropping {} from stale connection (gen {} < {})",
                event.kind(),
                generation,
                current
            );
            return;
        }
        self.apply(event);
    }

    /// Apply an event's cache effects unconditionally.
    pub fn apply(&self, event: PushEvent) {
        log::debug!("[RECONCILE] {}", event.kind());
        match event {
            PushEvent::OrderUpdate { order, message } => {
                let id = order.id.clone();
                let snapshot = match serde_json::to_value(&order) {
                    Ok(v) => v,
                    Err(e) => {
                        log::warn!("[RECONCILE] order {} not serializable: {}", id, e);
                        return;
                    }
                };
                self.cache.upsert_entity("order", &id, snapshot.clone());
                replace_in_list(&self.cache, "orders", &id, &snapshot);
                replace_in_list(&self.cache, "kitchen:orders", &id, &snapshot);
                // Derived queries (stats, filtered views) re-fetch.
                self.cache.invalidate_scope("orders");
                self.cache.invalidate_scope("kitchen");
                if let Some(message) = message {
                    self.forward(Alert {
                        severity: Severity::Success,
                        title: format!("Order {}", order.order_number),
                        message,
                    });
                }
            }

            PushEvent::KitchenUpdate { .. } => {
                self.cache.invalidate_scope("kitchen");
                self.cache.invalidate_scope("orders");
            }

            PushEvent::PaymentUpdate { .. } => {
                self.cache.invalidate_scope("payments");
            }

            PushEvent::Notification(notification) => {
                self.prepend_notification(&notification);
                self.bump_unread_count();
                self.forward(Alert {
                    severity: notification.severity,
                    title: notification.title,
                    message: notification.message,
                });
            }

            PushEvent::InventoryAlert(alert) => {
                self.cache.invalidate_scope("inventory");
                let message = match alert.kind {
                    crate::models::InventoryAlertKind::LowStock => {
                        format!("{} is running low", alert.item_name())
                    }
                    crate::models::InventoryAlertKind::Expired => {
                        format!("{} has expired", alert.item_name())
                    }
                };
                self.forward(Alert {
                    severity: Severity::Error,
                    title: "Inventory alert".to_string(),
                    message,
                });
            }

            PushEvent::Unknown { raw } => {
                log::debug!("[RECONCILE] ignoring unknown event: {}", raw);
            }
        }
    }

    fn prepend_notification(&self, notification: &NotificationMessage) {
        let entry = match serde_json::to_value(notification) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("[RECONCILE] notification not serializable: {}", e);
                return;
            }
        };
        self.cache.update("notifications", |current| match current {
            Some(JsonValue::Array(items)) => {
                let mut items = items.clone();
                items.insert(0, entry);
                Some(JsonValue::Array(items))
            }
            // List not cached yet; the next fetch will include it.
            _ => None,
        });
        if self.cache.get("notifications").is_none() {
            self.cache.invalidate("notifications");
        }
    }

    fn bump_unread_count(&self) {
        self.cache.update("notifications:unread-count", |current| {
            let count = current
                .and_then(|v| v.get("count"))
                .and_then(|c| c.as_u64())
                .unwrap_or(0);
            Some(json!({ "count": count + 1 }))
        });
    }

    fn forward(&self, alert: Alert) {
        // Receiver gone means the embedding application dropped the alert
        // stream; cache effects above still applied.
        let _ = self.alert_tx.send(alert);
    }
}

/// Replace an order by id inside a cached list. Lists that are absent or do
/// not contain the order are left untouched; the accompanying scope
/// invalidation makes the next fetch surface orders the list has not seen.
fn replace_in_list(cache: &QueryCache, key: &str, id: &str, snapshot: &JsonValue) {
    cache.update(key, |current| match current {
        Some(JsonValue::Array(items)) => {
            let mut items = items.clone();
            let slot = items
                .iter_mut()
                .find(|item| item.get("id").and_then(|v| v.as_str()) == Some(id))?;
            *slot = snapshot.clone();
            Some(JsonValue::Array(items))
        }
        _ => None,
    });
}
