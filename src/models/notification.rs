use serde::{Deserialize, Serialize};

/// Notification severity, also reused as the severity tag of forwarded
/// alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// A notification as carried by the `notification` push event and the
/// notifications REST endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessage {
    pub id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub severity: Severity,
    #[serde(default)]
    pub read: bool,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
}

/// Payload of the unread-count endpoint and cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnreadCount {
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_notification_severity_rides_the_type_field() {
        let n: NotificationMessage = serde_json::from_value(json!({
            "id": "n1",
            "title": "Low stock",
            "message": "Paneer is running low",
            "type": "warning",
            "createdAt": "2024-01-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(n.severity, Severity::Warning);
        assert!(!n.read);
        assert_eq!(serde_json::to_value(&n).unwrap()["type"], "warning");
    }
}
