use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Commands sent FROM client TO server on a conversation channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ChannelCommand {
    /// Post a new message to the conversation this channel is bound to.
    #[serde(rename = "message:new")]
    MessageNew {
        text: Option<String>,
        reply_to: Option<Uuid>,
    },
}

/// Events pushed FROM server TO every subscriber of a conversation channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ChannelEvent {
    /// A message was persisted; payload is the full enriched message so all
    /// clients converge on the server-assigned id and timestamp.
    #[serde(rename = "message:new")]
    MessageNew(Message),

    /// Sent only to the originating connection when its command failed.
    #[serde(rename = "error")]
    Error { detail: String },
}

/// WebSocket close code for identity or membership rejection (RFC 6455
/// "policy violation").
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_wire_shape() {
        let cmd: ChannelCommand = serde_json::from_str(
            r#"{"type": "message:new", "payload": {"text": "hi", "reply_to": null}}"#,
        )
        .unwrap();
        let ChannelCommand::MessageNew { text, reply_to } = cmd;
        assert_eq!(text.as_deref(), Some("hi"));
        assert!(reply_to.is_none());
    }

    #[test]
    fn unknown_command_type_is_an_error() {
        let result: Result<ChannelCommand, _> =
            serde_json::from_str(r#"{"type": "typing:start", "payload": {}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn event_tags_payload() {
        let event = ChannelEvent::Error {
            detail: "boom".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["payload"]["detail"], "boom");
    }
}
