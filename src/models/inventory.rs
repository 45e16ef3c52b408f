use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Why an inventory alert fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryAlertKind {
    LowStock,
    Expired,
}

/// Payload of the `inventory:alert` push event. The item is kept as raw
/// JSON: the sync layer only needs its name for the alert text, and
/// inventory schemas vary per deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryAlert {
    pub item: JsonValue,
    #[serde(rename = "type")]
    pub kind: InventoryAlertKind,
}

impl InventoryAlert {
    /// Best-effort item name for alert text.
    pub fn item_name(&self) -> &str {
        self.item.get("name").and_then(|v| v.as_str()).unwrap_or("unknown item")
    }
}
