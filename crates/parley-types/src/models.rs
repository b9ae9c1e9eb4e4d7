use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationType {
    Private,
    Group,
}

impl ConversationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "private" => Some(Self::Private),
            "group" => Some(Self::Group),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: ConversationType,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Admin,
    Member,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "member" => Some(Self::Member),
            _ => None,
        }
    }
}

/// Membership record binding a user to a conversation.
/// `username`/`avatar` are joined in from the users table for API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: i64,
    pub conversation_id: Uuid,
    pub user_id: i64,
    pub role: ParticipantRole,
    pub joined_at: DateTime<Utc>,
    pub username: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: i64,
    pub text: Option<String>,
    pub reply_to: Option<Uuid>,
    pub is_edited: bool,
    pub created_at: DateTime<Utc>,
    pub avatar: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentType {
    Image,
    Video,
    File,
}

impl AttachmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::File => "file",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "file" => Some(Self::File),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i64,
    pub message_id: Uuid,
    pub file_url: String,
    pub file_type: AttachmentType,
    pub file_size: u64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_strings_round_trip() {
        for kind in [ConversationType::Private, ConversationType::Group] {
            assert_eq!(ConversationType::parse(kind.as_str()), Some(kind));
        }
        for role in [ParticipantRole::Admin, ParticipantRole::Member] {
            assert_eq!(ParticipantRole::parse(role.as_str()), Some(role));
        }
        for ft in [AttachmentType::Image, AttachmentType::Video, AttachmentType::File] {
            assert_eq!(AttachmentType::parse(ft.as_str()), Some(ft));
        }
        assert_eq!(ParticipantRole::parse("owner"), None);
    }

    #[test]
    fn conversation_type_serializes_lowercase() {
        let conv = Conversation {
            id: Uuid::nil(),
            kind: ConversationType::Private,
            title: None,
            created_at: DateTime::<Utc>::default(),
        };
        let json = serde_json::to_value(&conv).unwrap();
        assert_eq!(json["type"], "private");
    }
}
