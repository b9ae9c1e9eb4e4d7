use crate::Database;
use crate::models::{
    AttachmentRow, ConversationRow, ConversationSummaryRow, MessageRow, ParticipantRow, UserRow,
};
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        username: &str,
        email: &str,
        avatar: Option<&str>,
        password_hash: &str,
        created_at: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, email, avatar, password, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![username, email, avatar, password_hash, created_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.prepare("SELECT id, username, email, avatar, password, created_at FROM users WHERE id = ?1")?
                .query_row([id], user_from_row)
                .optional()
        })
    }

    /// Exact lookup by username OR email, used by login.
    pub fn get_user_by_login(&self, login: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.prepare(
                "SELECT id, username, email, avatar, password, created_at FROM users
                 WHERE username = ?1 OR email = ?1 LIMIT 1",
            )?
            .query_row([login], user_from_row)
            .optional()
        })
    }

    /// Substring search over username and email.
    pub fn search_users(&self, needle: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let pattern = format!("%{}%", needle);
            let mut stmt = conn.prepare(
                "SELECT id, username, email, avatar, password, created_at FROM users
                 WHERE username LIKE ?1 OR email LIKE ?1
                 ORDER BY username",
            )?;
            let rows = stmt
                .query_map([&pattern], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Conversations --

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            conn.prepare("SELECT id, type, title, created_at FROM conversations WHERE id = ?1")?
                .query_row([id], |row| {
                    Ok(ConversationRow {
                        id: row.get(0)?,
                        kind: row.get(1)?,
                        title: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })
                .optional()
        })
    }

    /// All conversations the user participates in, newest first. Private
    /// conversations get the other participant's username as title; the most
    /// recent message (if any) is flattened into the row.
    pub fn list_conversations_for_user(&self, user_id: i64) -> Result<Vec<ConversationSummaryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.type,
                        CASE WHEN c.type = 'private'
                             THEN (SELECT u.username
                                   FROM conversation_participants p2
                                   JOIN users u ON u.id = p2.user_id
                                   WHERE p2.conversation_id = c.id AND p2.user_id != ?1
                                   LIMIT 1)
                             ELSE c.title
                        END AS title,
                        c.created_at,
                        m.id, m.sender_id, m.text, m.created_at
                 FROM conversations c
                 JOIN conversation_participants p ON p.conversation_id = c.id
                 LEFT JOIN messages m ON m.id =
                     (SELECT id FROM messages
                      WHERE conversation_id = c.id
                      ORDER BY created_at DESC, id DESC
                      LIMIT 1)
                 WHERE p.user_id = ?1
                 ORDER BY c.created_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ConversationSummaryRow {
                        id: row.get(0)?,
                        kind: row.get(1)?,
                        title: row.get(2)?,
                        created_at: row.get(3)?,
                        last_message_id: row.get(4)?,
                        last_message_sender_id: row.get(5)?,
                        last_message_text: row.get(6)?,
                        last_message_created_at: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns false if the conversation no longer exists.
    pub fn update_conversation_title(&self, id: &str, title: Option<&str>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE conversations SET title = ?2 WHERE id = ?1",
                rusqlite::params![id, title],
            )?;
            Ok(changed > 0)
        })
    }

    /// Cascades to participants, messages and attachments via the schema.
    pub fn delete_conversation(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM conversations WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    // -- Participants --

    pub fn get_participant(
        &self,
        conversation_id: &str,
        user_id: i64,
    ) -> Result<Option<ParticipantRow>> {
        self.with_conn(|conn| query_participant(conn, conversation_id, user_id))
    }

    pub fn list_participants(&self, conversation_id: &str) -> Result<Vec<ParticipantRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT p.id, p.conversation_id, p.user_id, p.role, p.joined_at,
                        u.username, u.avatar
                 FROM conversation_participants p
                 LEFT JOIN users u ON u.id = p.user_id
                 WHERE p.conversation_id = ?1
                 ORDER BY p.joined_at",
            )?;
            let rows = stmt
                .query_map([conversation_id], participant_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn remove_participant(&self, conversation_id: &str, user_id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM conversation_participants WHERE conversation_id = ?1 AND user_id = ?2",
                rusqlite::params![conversation_id, user_id],
            )?;
            Ok(())
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        id: &str,
        conversation_id: &str,
        sender_id: i64,
        text: Option<&str>,
        reply_to: Option<&str>,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, text, reply_to, is_edited, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                rusqlite::params![id, conversation_id, sender_id, text, reply_to, created_at],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            conn.prepare(
                "SELECT m.id, m.conversation_id, m.sender_id, m.text, m.reply_to,
                        m.is_edited, m.created_at, u.username, u.avatar
                 FROM messages m
                 LEFT JOIN users u ON u.id = m.sender_id
                 WHERE m.id = ?1",
            )?
            .query_row([id], message_from_row)
            .optional()
        })
    }

    /// Messages in creation order, paginated. The sender's username/avatar are
    /// joined in a single query (eliminates N+1).
    pub fn list_messages(
        &self,
        conversation_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.conversation_id, m.sender_id, m.text, m.reply_to,
                        m.is_edited, m.created_at, u.username, u.avatar
                 FROM messages m
                 LEFT JOIN users u ON u.id = m.sender_id
                 WHERE m.conversation_id = ?1
                 ORDER BY m.created_at ASC, m.id ASC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![conversation_id, limit, offset], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Any text update marks the message as edited.
    pub fn update_message_text(&self, id: &str, text: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET text = ?2, is_edited = 1 WHERE id = ?1",
                rusqlite::params![id, text],
            )?;
            Ok(changed > 0)
        })
    }

    /// Cascades to attachments via the schema.
    pub fn delete_message(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    // -- Attachments --

    pub fn insert_attachment(
        &self,
        message_id: &str,
        file_url: &str,
        file_type: &str,
        file_size: u64,
        created_at: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO attachments (message_id, file_url, file_type, file_size, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![message_id, file_url, file_type, file_size, created_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_attachment(&self, id: i64) -> Result<Option<AttachmentRow>> {
        self.with_conn(|conn| {
            conn.prepare(
                "SELECT id, message_id, file_url, file_type, file_size, created_at
                 FROM attachments WHERE id = ?1",
            )?
            .query_row([id], attachment_from_row)
            .optional()
        })
    }

    pub fn list_attachments_for_message(&self, message_id: &str) -> Result<Vec<AttachmentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, message_id, file_url, file_type, file_size, created_at
                 FROM attachments WHERE message_id = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map([message_id], attachment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

// Connection-level operations, public so the service layer can compose them
// inside a single transaction.

pub fn insert_conversation(
    conn: &Connection,
    id: &str,
    kind: &str,
    title: Option<&str>,
    created_at: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO conversations (id, type, title, created_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![id, kind, title, created_at],
    )?;
    Ok(())
}

pub fn insert_participant(
    conn: &Connection,
    conversation_id: &str,
    user_id: i64,
    role: &str,
    joined_at: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO conversation_participants (conversation_id, user_id, role, joined_at)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![conversation_id, user_id, role, joined_at],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_participant_role(
    conn: &Connection,
    conversation_id: &str,
    user_id: i64,
    role: &str,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE conversation_participants SET role = ?3 WHERE conversation_id = ?1 AND user_id = ?2",
        rusqlite::params![conversation_id, user_id, role],
    )?;
    Ok(changed > 0)
}

pub fn query_participant(
    conn: &Connection,
    conversation_id: &str,
    user_id: i64,
) -> Result<Option<ParticipantRow>> {
    conn.prepare(
        "SELECT p.id, p.conversation_id, p.user_id, p.role, p.joined_at, u.username, u.avatar
         FROM conversation_participants p
         LEFT JOIN users u ON u.id = p.user_id
         WHERE p.conversation_id = ?1 AND p.user_id = ?2",
    )?
    .query_row(rusqlite::params![conversation_id, user_id], participant_from_row)
    .optional()
}

// Row mappers shared by the queries above.

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        avatar: row.get(3)?,
        password: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn participant_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ParticipantRow> {
    Ok(ParticipantRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        user_id: row.get(2)?,
        role: row.get(3)?,
        joined_at: row.get(4)?,
        username: row.get(5)?,
        avatar: row.get(6)?,
    })
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        text: row.get(3)?,
        reply_to: row.get(4)?,
        is_edited: row.get(5)?,
        created_at: row.get(6)?,
        username: row.get(7)?,
        avatar: row.get(8)?,
    })
}

fn attachment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttachmentRow> {
    Ok(AttachmentRow {
        id: row.get(0)?,
        message_id: row.get(1)?,
        file_url: row.get(2)?,
        file_type: row.get(3)?,
        file_size: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: &str = "2026-01-01T00:00:00+00:00";
    const T1: &str = "2026-01-01T00:00:01+00:00";

    fn db_with_users() -> (Database, i64, i64) {
        let db = Database::open_in_memory().unwrap();
        let alice = db.create_user("alice", "alice@example.com", None, "hash", T0).unwrap();
        let bob = db.create_user("bob", "bob@example.com", None, "hash", T0).unwrap();
        (db, alice, bob)
    }

    fn seed_conversation(db: &Database, admin: i64, member: i64) -> String {
        let conv_id = "11111111-1111-1111-1111-111111111111".to_string();
        db.with_conn(|conn| {
            insert_conversation(conn, &conv_id, "group", Some("room"), T0)?;
            insert_participant(conn, &conv_id, admin, "admin", T0)?;
            insert_participant(conn, &conv_id, member, "member", T0)?;
            Ok(())
        })
        .unwrap();
        conv_id
    }

    #[test]
    fn login_lookup_matches_username_and_email() {
        let (db, alice, _) = db_with_users();
        assert_eq!(db.get_user_by_login("alice").unwrap().unwrap().id, alice);
        assert_eq!(db.get_user_by_login("alice@example.com").unwrap().unwrap().id, alice);
        assert!(db.get_user_by_login("nobody").unwrap().is_none());
    }

    #[test]
    fn user_search_is_substring() {
        let (db, ..) = db_with_users();
        let hits = db.search_users("li").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].username, "alice");
    }

    #[test]
    fn duplicate_participant_rejected() {
        let (db, alice, bob) = db_with_users();
        let conv_id = seed_conversation(&db, alice, bob);
        let err = db.with_conn(|conn| insert_participant(conn, &conv_id, bob, "member", T1));
        assert!(err.is_err());
    }

    #[test]
    fn conversation_delete_cascades() {
        let (db, alice, bob) = db_with_users();
        let conv_id = seed_conversation(&db, alice, bob);
        let msg_id = "22222222-2222-2222-2222-222222222222";
        db.insert_message(msg_id, &conv_id, alice, Some("hi"), None, T1).unwrap();
        let att_id = db.insert_attachment(msg_id, "https://cdn/x.png", "image", 10, T1).unwrap();

        db.delete_conversation(&conv_id).unwrap();

        assert!(db.get_conversation(&conv_id).unwrap().is_none());
        assert!(db.get_participant(&conv_id, alice).unwrap().is_none());
        assert!(db.get_message(msg_id).unwrap().is_none());
        assert!(db.get_attachment(att_id).unwrap().is_none());
    }

    #[test]
    fn message_delete_cascades_attachments_and_clears_replies() {
        let (db, alice, bob) = db_with_users();
        let conv_id = seed_conversation(&db, alice, bob);
        let parent = "33333333-3333-3333-3333-333333333333";
        let child = "44444444-4444-4444-4444-444444444444";
        db.insert_message(parent, &conv_id, alice, Some("root"), None, T0).unwrap();
        db.insert_message(child, &conv_id, bob, Some("re"), Some(parent), T1).unwrap();
        db.insert_attachment(parent, "https://cdn/a.bin", "file", 1, T1).unwrap();

        db.delete_message(parent).unwrap();

        assert!(db.get_message(parent).unwrap().is_none());
        assert!(db.list_attachments_for_message(parent).unwrap().is_empty());
        // reply_to is SET NULL, the reply itself survives
        let reply = db.get_message(child).unwrap().unwrap();
        assert!(reply.reply_to.is_none());
    }

    #[test]
    fn conversation_listing_resolves_private_title_and_last_message() {
        let (db, alice, bob) = db_with_users();
        let conv_id = "55555555-5555-5555-5555-555555555555";
        db.with_conn(|conn| {
            insert_conversation(conn, conv_id, "private", None, T0)?;
            insert_participant(conn, conv_id, alice, "admin", T0)?;
            insert_participant(conn, conv_id, bob, "member", T0)?;
            Ok(())
        })
        .unwrap();
        db.insert_message("66666666-6666-6666-6666-666666666666", conv_id, bob, Some("hey"), None, T1)
            .unwrap();

        let for_alice = db.list_conversations_for_user(alice).unwrap();
        assert_eq!(for_alice.len(), 1);
        assert_eq!(for_alice[0].title.as_deref(), Some("bob"));
        assert_eq!(for_alice[0].last_message_text.as_deref(), Some("hey"));
        assert_eq!(for_alice[0].last_message_sender_id, Some(bob));

        let for_bob = db.list_conversations_for_user(bob).unwrap();
        assert_eq!(for_bob[0].title.as_deref(), Some("alice"));
    }

    #[test]
    fn message_listing_orders_and_paginates() {
        let (db, alice, bob) = db_with_users();
        let conv_id = seed_conversation(&db, alice, bob);
        for i in 0..5 {
            let id = format!("77777777-7777-7777-7777-77777777777{}", i);
            let at = format!("2026-01-01T00:00:0{}+00:00", i + 2);
            db.insert_message(&id, &conv_id, alice, Some(&format!("m{}", i)), None, &at).unwrap();
        }

        let page = db.list_messages(&conv_id, 2, 1).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].text.as_deref(), Some("m1"));
        assert_eq!(page[1].text.as_deref(), Some("m2"));
        assert_eq!(page[0].username.as_deref(), Some("alice"));
    }

    #[test]
    fn text_update_flips_edited_flag() {
        let (db, alice, bob) = db_with_users();
        let conv_id = seed_conversation(&db, alice, bob);
        let msg_id = "88888888-8888-8888-8888-888888888888";
        db.insert_message(msg_id, &conv_id, alice, Some("hi"), None, T1).unwrap();

        assert!(db.update_message_text(msg_id, "hello").unwrap());

        let row = db.get_message(msg_id).unwrap().unwrap();
        assert_eq!(row.text.as_deref(), Some("hello"));
        assert!(row.is_edited);
        assert_eq!(row.created_at, T1);
    }
}
