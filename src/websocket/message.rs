use serde::{Deserialize, Serialize};

/// Messages sent from server to client over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Full online set, pushed after every registry mutation.
    #[serde(rename = "presence_update")]
    PresenceUpdate { online: Vec<String> },
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn presence_update(online: Vec<String>) -> Self {
        Self::PresenceUpdate { online }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Commands delivered to a connection's writer task.
#[derive(Debug, Clone)]
pub enum SocketCommand {
    /// Serialize and send as a text frame.
    Message(ServerMessage),
    /// Send a protocol-level ping frame (liveness probe).
    Ping,
    /// Close the socket and end the writer task. Used when a newer
    /// connection replaces this one or the record is evicted as stale.
    Close,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_update_wire_format() {
        let msg = ServerMessage::presence_update(vec!["a".to_string(), "b".to_string()]);
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"presence_update","online":["a","b"]}"#);

        let parsed: ServerMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_error_wire_format() {
        let msg = ServerMessage::error("REPLACED", "Newer connection for this identity");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains("REPLACED"));
    }
}
