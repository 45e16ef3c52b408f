use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::inventory::InventoryAlert;
use super::notification::NotificationMessage;
use super::order::Order;

/// WebSocket message types sent from server to client.
///
/// The `event` field carries the dashboard's `domain:action` event name
/// (`order:update`, `kitchen:update`, ...); the remaining fields are the
/// event payload. Unknown event names do not deserialize into this enum;
/// the connection layer parses through
/// [`PushEvent::parse`](super::push_event::PushEvent::parse), which degrades
/// them to `PushEvent::Unknown` instead of failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ServerMessage {
    /// Authentication handshake accepted
    #[serde(rename = "auth:success")]
    AuthSuccess {
        /// Authenticated user ID
        #[serde(rename = "userId")]
        user_id: String,
    },

    /// Authentication handshake rejected
    #[serde(rename = "auth:error")]
    AuthError {
        /// Error message
        message: String,
    },

    /// Full-snapshot order replacement
    #[serde(rename = "order:update")]
    OrderUpdate {
        /// The complete current state of the order
        order: Order,
        /// Optional status message for an ephemeral alert
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Kitchen ticket state changed; carries no entity snapshot
    #[serde(rename = "kitchen:update")]
    KitchenUpdate {
        #[serde(flatten)]
        payload: serde_json::Map<String, JsonValue>,
    },

    /// New notification for the current user
    #[serde(rename = "notification")]
    Notification {
        #[serde(flatten)]
        notification: NotificationMessage,
    },

    /// Inventory threshold or expiry alert
    #[serde(rename = "inventory:alert")]
    InventoryAlert {
        #[serde(flatten)]
        alert: InventoryAlert,
    },

    /// Payment state changed; carries no entity snapshot
    #[serde(rename = "payment:update")]
    PaymentUpdate {
        #[serde(flatten)]
        payload: serde_json::Map<String, JsonValue>,
    },
}
