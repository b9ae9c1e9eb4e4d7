use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use parley_db::{Database, queries};
use parley_types::api::ConversationSummary;
use parley_types::models::{
    Attachment, AttachmentType, Conversation, ConversationType, Message, Participant,
    ParticipantRole,
};
use uuid::Uuid;

use crate::convert;
use crate::error::{ChatError, ChatResult};
use crate::guard::MembershipGuard;

pub const DEFAULT_MAX_ATTACHMENT_BYTES: u64 = 20 * 1024 * 1024;

/// Use-case layer for conversations, participants, messages and attachments.
///
/// Every operation authorizes through the [`MembershipGuard`] before touching
/// storage, and every multi-write operation runs inside one SQLite transaction.
/// Methods are synchronous; async callers wrap them in `spawn_blocking`.
pub struct ChatService {
    db: Arc<Database>,
    guard: MembershipGuard,
    max_attachment_bytes: u64,
}

impl ChatService {
    pub fn new(db: Arc<Database>, max_attachment_bytes: u64) -> Self {
        let guard = MembershipGuard::new(db.clone());
        Self {
            db,
            guard,
            max_attachment_bytes,
        }
    }

    /// Participant check for the gateway session and other boundaries.
    pub fn ensure_participant(&self, user_id: i64, conversation_id: Uuid) -> ChatResult<()> {
        self.guard.require_participant(user_id, conversation_id)
    }

    pub fn max_attachment_bytes(&self) -> u64 {
        self.max_attachment_bytes
    }

    // -- Conversations --

    /// Creates the conversation with the creator as its sole admin; the other
    /// requested participants join as members, deduplicated. One transaction.
    pub fn create_conversation(
        &self,
        creator_id: i64,
        kind: ConversationType,
        title: Option<String>,
        participant_ids: &[i64],
    ) -> ChatResult<Conversation> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let stamp = created_at.to_rfc3339();
        let members: BTreeSet<i64> = participant_ids
            .iter()
            .copied()
            .filter(|uid| *uid != creator_id)
            .collect();

        self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            queries::insert_conversation(&tx, &id.to_string(), kind.as_str(), title.as_deref(), &stamp)?;
            queries::insert_participant(
                &tx,
                &id.to_string(),
                creator_id,
                ParticipantRole::Admin.as_str(),
                &stamp,
            )?;
            for uid in &members {
                queries::insert_participant(
                    &tx,
                    &id.to_string(),
                    *uid,
                    ParticipantRole::Member.as_str(),
                    &stamp,
                )?;
            }
            tx.commit()?;
            Ok(())
        })?;

        Ok(Conversation {
            id,
            kind,
            title,
            created_at,
        })
    }

    pub fn list_conversations(&self, user_id: i64) -> ChatResult<Vec<ConversationSummary>> {
        let rows = self.db.list_conversations_for_user(user_id)?;
        Ok(rows.into_iter().map(convert::summary_from_row).collect())
    }

    pub fn get_conversation(&self, user_id: i64, conversation_id: Uuid) -> ChatResult<Conversation> {
        self.guard.require_participant(user_id, conversation_id)?;
        let row = self
            .db
            .get_conversation(&conversation_id.to_string())?
            .ok_or(ChatError::ConversationNotFound)?;
        Ok(convert::conversation_from_row(row))
    }

    /// Admin only. The title may be cleared. Fails `ConversationNotFound` if
    /// the conversation vanished between the guard check and the update.
    pub fn rename_conversation(
        &self,
        user_id: i64,
        conversation_id: Uuid,
        title: Option<String>,
    ) -> ChatResult<Conversation> {
        self.guard.require_admin(user_id, conversation_id)?;
        let changed = self
            .db
            .update_conversation_title(&conversation_id.to_string(), title.as_deref())?;
        if !changed {
            return Err(ChatError::ConversationNotFound);
        }
        let row = self
            .db
            .get_conversation(&conversation_id.to_string())?
            .ok_or(ChatError::ConversationNotFound)?;
        Ok(convert::conversation_from_row(row))
    }

    /// Admin only. Cascades to participants, messages and attachments.
    pub fn delete_conversation(&self, user_id: i64, conversation_id: Uuid) -> ChatResult<()> {
        self.guard.require_admin(user_id, conversation_id)?;
        self.db.delete_conversation(&conversation_id.to_string())?;
        Ok(())
    }

    // -- Participants --

    /// Admin only. Idempotent: if the target is already a participant the
    /// existing row is returned unchanged. A requested role is applied right
    /// after the member insert, in the same transaction.
    pub fn add_participant(
        &self,
        user_id: i64,
        conversation_id: Uuid,
        target_user_id: i64,
        role: Option<ParticipantRole>,
    ) -> ChatResult<Participant> {
        self.guard.require_admin(user_id, conversation_id)?;
        let cid = conversation_id.to_string();
        let joined_at = Utc::now().to_rfc3339();

        let row = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if let Some(existing) = queries::query_participant(&tx, &cid, target_user_id)? {
                tx.commit()?;
                return Ok(existing);
            }
            queries::insert_participant(
                &tx,
                &cid,
                target_user_id,
                ParticipantRole::Member.as_str(),
                &joined_at,
            )?;
            if let Some(role) = role {
                if role != ParticipantRole::Member {
                    queries::update_participant_role(&tx, &cid, target_user_id, role.as_str())?;
                }
            }
            let row = queries::query_participant(&tx, &cid, target_user_id)?
                .ok_or_else(|| anyhow::anyhow!("participant missing after insert"))?;
            tx.commit()?;
            Ok(row)
        })?;

        Ok(convert::participant_from_row(row))
    }

    /// Admin only. Removing an absent participant is a no-op, not an error.
    pub fn remove_participant(
        &self,
        user_id: i64,
        conversation_id: Uuid,
        target_user_id: i64,
    ) -> ChatResult<()> {
        self.guard.require_admin(user_id, conversation_id)?;
        self.db
            .remove_participant(&conversation_id.to_string(), target_user_id)?;
        Ok(())
    }

    pub fn list_participants(
        &self,
        user_id: i64,
        conversation_id: Uuid,
    ) -> ChatResult<Vec<Participant>> {
        self.guard.require_participant(user_id, conversation_id)?;
        let rows = self.db.list_participants(&conversation_id.to_string())?;
        Ok(rows.into_iter().map(convert::participant_from_row).collect())
    }

    // -- Messages --

    /// Participant only. A `reply_to` must reference a message in the same
    /// conversation. Returns the stored message enriched with the sender's
    /// username and avatar.
    pub fn send_message(
        &self,
        user_id: i64,
        conversation_id: Uuid,
        text: Option<String>,
        reply_to: Option<Uuid>,
    ) -> ChatResult<Message> {
        self.guard.require_participant(user_id, conversation_id)?;

        if let Some(reply_id) = reply_to {
            let target = self
                .db
                .get_message(&reply_id.to_string())?
                .ok_or(ChatError::MessageNotFound)?;
            if target.conversation_id != conversation_id.to_string() {
                return Err(ChatError::MessageNotFound);
            }
        }

        let id = Uuid::new_v4();
        self.db.insert_message(
            &id.to_string(),
            &conversation_id.to_string(),
            user_id,
            text.as_deref(),
            reply_to.map(|r| r.to_string()).as_deref(),
            &Utc::now().to_rfc3339(),
        )?;

        let row = self
            .db
            .get_message(&id.to_string())?
            .ok_or_else(|| ChatError::Database(anyhow::anyhow!("message missing after insert")))?;
        Ok(convert::message_from_row(row))
    }

    pub fn list_messages(
        &self,
        user_id: i64,
        conversation_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> ChatResult<Vec<Message>> {
        self.guard.require_participant(user_id, conversation_id)?;
        let rows = self
            .db
            .list_messages(&conversation_id.to_string(), limit.min(200), offset)?;
        Ok(rows.into_iter().map(convert::message_from_row).collect())
    }

    /// Sender only. Sets the new text and flips `is_edited`.
    pub fn update_message_text(
        &self,
        user_id: i64,
        message_id: Uuid,
        text: &str,
    ) -> ChatResult<Message> {
        let mid = message_id.to_string();
        let row = self.db.get_message(&mid)?.ok_or(ChatError::MessageNotFound)?;
        if row.sender_id != user_id {
            return Err(ChatError::NotMessageOwner);
        }
        self.db.update_message_text(&mid, text)?;
        let row = self
            .db
            .get_message(&mid)?
            .ok_or(ChatError::MessageNotFound)?;
        Ok(convert::message_from_row(row))
    }

    /// Sender only. Deleting an absent message is a no-op. Cascades to
    /// attachments.
    pub fn delete_message(&self, user_id: i64, message_id: Uuid) -> ChatResult<()> {
        let mid = message_id.to_string();
        let Some(row) = self.db.get_message(&mid)? else {
            return Ok(());
        };
        if row.sender_id != user_id {
            return Err(ChatError::NotMessageOwner);
        }
        self.db.delete_message(&mid)?;
        Ok(())
    }

    // -- Attachments --

    /// Caller must be a participant of the owning message's conversation.
    pub fn attach_file(
        &self,
        user_id: i64,
        message_id: Uuid,
        file_url: String,
        file_type: AttachmentType,
        file_size: u64,
    ) -> ChatResult<Attachment> {
        let mid = message_id.to_string();
        let message = self.db.get_message(&mid)?.ok_or(ChatError::MessageNotFound)?;
        let conversation_id = convert::message_from_row(message).conversation_id;
        self.guard.require_participant(user_id, conversation_id)?;

        if file_size > self.max_attachment_bytes {
            return Err(ChatError::AttachmentTooLarge {
                size: file_size,
                max: self.max_attachment_bytes,
            });
        }

        let id = self.db.insert_attachment(
            &mid,
            &file_url,
            file_type.as_str(),
            file_size,
            &Utc::now().to_rfc3339(),
        )?;
        let row = self
            .db
            .get_attachment(id)?
            .ok_or_else(|| ChatError::Database(anyhow::anyhow!("attachment missing after insert")))?;
        Ok(convert::attachment_from_row(row))
    }
}
