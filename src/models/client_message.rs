use serde::{Deserialize, Serialize};

use super::scope::Scope;

/// Client-to-server push-channel messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ClientMessage {
    /// Authenticate the connection.
    ///
    /// Sent immediately after the transport connects; the server replies
    /// with `auth:success` or `auth:error` and closes the connection if no
    /// handshake arrives in time.
    #[serde(rename = "authenticate")]
    Authenticate {
        token: String,
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "tenantId")]
        tenant_id: String,
    },

    /// Join a room-scoped event stream.
    #[serde(rename = "join")]
    Join { room: Scope },

    /// Leave a room-scoped event stream.
    #[serde(rename = "leave")]
    Leave { room: Scope },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticate_wire_format() {
        let msg = ClientMessage::Authenticate {
            token: "t1".into(),
            user_id: "u1".into(),
            tenant_id: "ten1".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["event"], "authenticate");
        assert_eq!(json["token"], "t1");
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["tenantId"], "ten1");
    }

    #[test]
    fn test_join_wire_format() {
        let msg = ClientMessage::Join { room: Scope::restaurant("42") };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["event"], "join");
        assert_eq!(json["room"], "restaurant:42");
    }
}
