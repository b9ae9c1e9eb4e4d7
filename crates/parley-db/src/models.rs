/// Database row types — these map directly to SQLite rows.
/// Distinct from parley-types models to keep the DB layer independent;
/// timestamps and uuids stay as TEXT here and are parsed at the service layer.

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub avatar: Option<String>,
    pub password: String,
    pub created_at: String,
}

pub struct ConversationRow {
    pub id: String,
    pub kind: String,
    pub title: Option<String>,
    pub created_at: String,
}

/// One row of the conversation listing: title already resolved for private
/// chats, last message flattened in (all None when the conversation is empty).
pub struct ConversationSummaryRow {
    pub id: String,
    pub kind: String,
    pub title: Option<String>,
    pub created_at: String,
    pub last_message_id: Option<String>,
    pub last_message_sender_id: Option<i64>,
    pub last_message_text: Option<String>,
    pub last_message_created_at: Option<String>,
}

pub struct ParticipantRow {
    pub id: i64,
    pub conversation_id: String,
    pub user_id: i64,
    pub role: String,
    pub joined_at: String,
    pub username: Option<String>,
    pub avatar: Option<String>,
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: i64,
    pub text: Option<String>,
    pub reply_to: Option<String>,
    pub is_edited: bool,
    pub created_at: String,
    pub username: Option<String>,
    pub avatar: Option<String>,
}

pub struct AttachmentRow {
    pub id: i64,
    pub message_id: String,
    pub file_url: String,
    pub file_type: String,
    pub file_size: u64,
    pub created_at: String,
}
