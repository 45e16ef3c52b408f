use serde_json::Value as JsonValue;

use super::inventory::InventoryAlert;
use super::notification::{NotificationMessage, Severity};
use super::order::Order;
use super::server_message::ServerMessage;

/// A push-channel event as consumed by the reconciler.
///
/// This is the post-handshake subset of [`ServerMessage`]: auth replies are
/// handled inside the connection task and never reach consumers. Events of
/// unrecognized kind survive parsing as [`PushEvent::Unknown`] so they can
/// be logged and dropped without disturbing the connection.
#[derive(Debug, Clone)]
pub enum PushEvent {
    /// Full order snapshot; replaces the cached entity wholesale.
    OrderUpdate {
        order: Order,
        /// Optional status message to surface as an ephemeral alert
        message: Option<String>,
    },

    /// Kitchen ticket change; invalidation-only (no snapshot carried).
    KitchenUpdate { payload: serde_json::Map<String, JsonValue> },

    /// New notification; prepended to the cached list.
    Notification(NotificationMessage),

    /// Inventory alert; invalidation-only plus a user-visible alert.
    InventoryAlert(InventoryAlert),

    /// Payment change; invalidation-only.
    PaymentUpdate { payload: serde_json::Map<String, JsonValue> },

    /// Unrecognized event kind, kept raw for logging.
    Unknown { raw: JsonValue },
}

impl PushEvent {
    /// Parse a raw text frame into a push event.
    ///
    /// Frames that are not JSON are an error; JSON objects whose `event`
    /// name is unrecognized become [`PushEvent::Unknown`]. Auth handshake
    /// replies return `None` — the connection task consumes those before
    /// routing.
    pub fn parse(text: &str) -> crate::error::Result<Option<Self>> {
        let raw: JsonValue = serde_json::from_str(text)?;
        match serde_json::from_value::<ServerMessage>(raw.clone()) {
            Ok(ServerMessage::AuthSuccess { .. }) | Ok(ServerMessage::AuthError { .. }) => Ok(None),
            Ok(ServerMessage::OrderUpdate { order, message }) => {
                Ok(Some(Self::OrderUpdate { order, message }))
            }
            Ok(ServerMessage::KitchenUpdate { payload }) => Ok(Some(Self::KitchenUpdate { payload })),
            Ok(ServerMessage::Notification { notification }) => {
                Ok(Some(Self::Notification(notification)))
            }
            Ok(ServerMessage::InventoryAlert { alert }) => Ok(Some(Self::InventoryAlert(alert))),
            Ok(ServerMessage::PaymentUpdate { payload }) => Ok(Some(Self::PaymentUpdate { payload })),
            Err(_) => Ok(Some(Self::Unknown { raw })),
        }
    }

    /// The wire name of this event kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OrderUpdate { .. } => "order:update",
            Self::KitchenUpdate { .. } => "kitchen:update",
            Self::Notification(_) => "notification",
            Self::InventoryAlert(_) => "inventory:alert",
            Self::PaymentUpdate { .. } => "payment:update",
            Self::Unknown { .. } => "unknown",
        }
    }

    /// Severity tag forwarded with any alert this event raises.
    pub fn severity(&self) -> Severity {
        match self {
            Self::Notification(n) => n.severity,
            Self::InventoryAlert(_) => Severity::Error,
            Self::OrderUpdate { .. } => Severity::Success,
            _ => Severity::Info,
        }
    }
}
