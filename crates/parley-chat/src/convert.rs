//! Row-to-model mapping. SQLite hands back TEXT ids and timestamps; corrupt
//! values are logged and replaced with defaults rather than failing a whole
//! listing.

use chrono::{DateTime, Utc};
use parley_db::models::{
    AttachmentRow, ConversationRow, ConversationSummaryRow, MessageRow, ParticipantRow, UserRow,
};
use parley_types::api::{ConversationSummary, LastMessage};
use parley_types::models::{
    Attachment, AttachmentType, Conversation, ConversationType, Message, Participant,
    ParticipantRole, User,
};
use tracing::warn;
use uuid::Uuid;

pub(crate) fn parse_uuid(value: &str, what: &str) -> Uuid {
    value.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, value, e);
        Uuid::default()
    })
}

pub(crate) fn parse_timestamp(value: &str, what: &str) -> DateTime<Utc> {
    value
        .parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') format has no timezone. Parse as naive
            // UTC and convert.
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt {} '{}': {}", what, value, e);
            DateTime::default()
        })
}

pub fn user_from_row(row: UserRow) -> User {
    User {
        id: row.id,
        username: row.username,
        email: row.email,
        avatar: row.avatar,
        created_at: parse_timestamp(&row.created_at, "user created_at"),
    }
}

pub fn conversation_from_row(row: ConversationRow) -> Conversation {
    Conversation {
        id: parse_uuid(&row.id, "conversation id"),
        kind: ConversationType::parse(&row.kind).unwrap_or_else(|| {
            warn!("Corrupt conversation type '{}' on '{}'", row.kind, row.id);
            ConversationType::Group
        }),
        title: row.title,
        created_at: parse_timestamp(&row.created_at, "conversation created_at"),
    }
}

pub fn summary_from_row(row: ConversationSummaryRow) -> ConversationSummary {
    let last_message = row.last_message_id.as_deref().map(|mid| LastMessage {
        id: parse_uuid(mid, "message id"),
        sender_id: row.last_message_sender_id.unwrap_or_default(),
        text: row.last_message_text.clone(),
        created_at: parse_timestamp(
            row.last_message_created_at.as_deref().unwrap_or_default(),
            "message created_at",
        ),
    });
    ConversationSummary {
        id: parse_uuid(&row.id, "conversation id"),
        kind: ConversationType::parse(&row.kind).unwrap_or(ConversationType::Group),
        title: row.title,
        created_at: parse_timestamp(&row.created_at, "conversation created_at"),
        last_message,
    }
}

pub fn participant_from_row(row: ParticipantRow) -> Participant {
    Participant {
        id: row.id,
        conversation_id: parse_uuid(&row.conversation_id, "conversation id"),
        user_id: row.user_id,
        role: ParticipantRole::parse(&row.role).unwrap_or_else(|| {
            warn!("Corrupt participant role '{}' for user {}", row.role, row.user_id);
            ParticipantRole::Member
        }),
        joined_at: parse_timestamp(&row.joined_at, "participant joined_at"),
        username: row.username,
        avatar: row.avatar,
    }
}

pub fn message_from_row(row: MessageRow) -> Message {
    Message {
        id: parse_uuid(&row.id, "message id"),
        conversation_id: parse_uuid(&row.conversation_id, "conversation id"),
        sender_id: row.sender_id,
        text: row.text,
        reply_to: row.reply_to.as_deref().map(|r| parse_uuid(r, "reply_to")),
        is_edited: row.is_edited,
        created_at: parse_timestamp(&row.created_at, "message created_at"),
        username: row.username,
        avatar: row.avatar,
    }
}

pub fn attachment_from_row(row: AttachmentRow) -> Attachment {
    Attachment {
        id: row.id,
        message_id: parse_uuid(&row.message_id, "message id"),
        file_url: row.file_url,
        file_type: AttachmentType::parse(&row.file_type).unwrap_or_else(|| {
            warn!("Corrupt attachment type '{}' on {}", row.file_type, row.id);
            AttachmentType::File
        }),
        file_size: row.file_size,
        created_at: parse_timestamp(&row.created_at, "attachment created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3339_and_sqlite_formats_both_parse() {
        let a = parse_timestamp("2026-02-03T04:05:06+00:00", "test");
        let b = parse_timestamp("2026-02-03 04:05:06", "test");
        assert_eq!(a, b);
    }

    #[test]
    fn corrupt_values_fall_back_to_defaults() {
        assert_eq!(parse_uuid("not-a-uuid", "test"), Uuid::default());
        assert_eq!(parse_timestamp("yesterday-ish", "test"), DateTime::<Utc>::default());
    }
}
