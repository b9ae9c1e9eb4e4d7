use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AttachmentType, ConversationType, ParticipantRole};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the gateway session.
/// Canonical definition lives here to keep both sides in sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: i64,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    /// Username or email, matched exactly.
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: i64,
    pub username: String,
    pub token: String,
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateConversationRequest {
    #[serde(rename = "type")]
    pub kind: ConversationType,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub participant_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenameConversationRequest {
    pub title: Option<String>,
}

/// Conversation as listed for a user: private conversations carry the other
/// participant's username as title, and the most recent message if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: ConversationType,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_message: Option<LastMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastMessage {
    pub id: Uuid,
    pub sender_id: i64,
    pub text: Option<String>,
    pub created_at: DateTime<Utc>,
}

// -- Participants --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddParticipantRequest {
    pub user_id: i64,
    #[serde(default)]
    pub role: Option<ParticipantRole>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub conversation_id: Uuid,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub reply_to: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMessageRequest {
    pub text: String,
}

// -- Attachments --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttachFileRequest {
    pub message_id: Uuid,
    pub file_url: String,
    pub file_type: AttachmentType,
    pub file_size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_conversation_defaults() {
        let req: CreateConversationRequest =
            serde_json::from_str(r#"{"type": "group", "title": "standup"}"#).unwrap();
        assert_eq!(req.kind, ConversationType::Group);
        assert!(req.participant_ids.is_empty());
    }

    #[test]
    fn unknown_fields_rejected() {
        let result: Result<SendMessageRequest, _> = serde_json::from_str(
            r#"{"conversation_id": "00000000-0000-0000-0000-000000000001", "body": "hi"}"#,
        );
        assert!(result.is_err());
    }
}
