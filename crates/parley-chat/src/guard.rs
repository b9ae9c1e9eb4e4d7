use std::sync::Arc;

use parley_db::Database;
use parley_types::models::ParticipantRole;
use uuid::Uuid;

use crate::error::{ChatError, ChatResult};

/// The single authorization choke point: answers "is this user a participant"
/// / "is this user an admin" for a conversation.
///
/// Membership is re-read on every call — never cached — because it can change
/// between requests and a stale answer here is a security hole. The live
/// connection registry is never consulted: only the participants table is
/// authoritative.
pub struct MembershipGuard {
    db: Arc<Database>,
}

impl MembershipGuard {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn require_participant(&self, user_id: i64, conversation_id: Uuid) -> ChatResult<()> {
        let row = self.db.get_participant(&conversation_id.to_string(), user_id)?;
        if row.is_none() {
            return Err(ChatError::NotAParticipant);
        }
        Ok(())
    }

    pub fn require_admin(&self, user_id: i64, conversation_id: Uuid) -> ChatResult<()> {
        let row = self
            .db
            .get_participant(&conversation_id.to_string(), user_id)?
            .ok_or(ChatError::NotAParticipant)?;
        match ParticipantRole::parse(&row.role) {
            Some(ParticipantRole::Admin) => Ok(()),
            _ => Err(ChatError::NotAnAdmin),
        }
    }
}
