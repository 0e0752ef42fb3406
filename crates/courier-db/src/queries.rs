use crate::Database;
use crate::models::{AttachmentRow, MessageRow, NewAttachment, UserRow};
use anyhow::Result;
use rusqlite::Connection;

const USER_COLUMNS: &str =
    "id, username, email, full_name, profile_pic_url, password, created_at, updated_at";

const MESSAGE_SELECT: &str = "SELECT m.id, m.sender_id, s.username, s.profile_pic_url,
            m.receiver_id, r.username, r.profile_pic_url,
            m.content, m.read_at, m.created_at
     FROM messages m
     LEFT JOIN users s ON m.sender_id = s.id
     LEFT JOIN users r ON m.receiver_id = r.id";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        email: &str,
        full_name: &str,
        password_hash: &str,
        now: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, full_name, password, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![id, username, email, full_name, password_hash, now],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", id))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1", username))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1", email))
    }

    /// Login lookup: the identifier may be either a username or an email.
    pub fn get_user_by_identifier(&self, identifier: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1 OR email = ?1", identifier))
    }

    /// Overwrites the profile columns only. The password column is never
    /// touched by profile writes, so the hash set at registration survives
    /// every unrelated update.
    pub fn update_user_profile(
        &self,
        id: &str,
        username: &str,
        email: &str,
        full_name: &str,
        now: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE users SET username = ?2, email = ?3, full_name = ?4, updated_at = ?5
                 WHERE id = ?1",
                rusqlite::params![id, username, email, full_name, now],
            )?;
            Ok(n > 0)
        })
    }

    pub fn set_profile_pic(&self, id: &str, url: &str, now: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE users SET profile_pic_url = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![id, url, now],
            )?;
            Ok(n > 0)
        })
    }

    /// All users except the given one, ordered by full name for directory
    /// listings.
    pub fn list_users_except(&self, id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users WHERE id != ?1 ORDER BY full_name ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    /// Inserts a message together with its attachments in one transaction;
    /// a failed attachment insert rolls back the message row.
    pub fn insert_message(
        &self,
        id: &str,
        sender_id: &str,
        receiver_id: &str,
        content: Option<&str>,
        attachments: &[NewAttachment],
        now: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, sender_id, receiver_id, content, now],
            )?;
            for a in attachments {
                tx.execute(
                    "INSERT INTO attachments (message_id, url, kind, name, size)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![id, a.url, a.kind, a.name, a.size],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("{MESSAGE_SELECT} WHERE m.id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let row = stmt.query_row([id], message_from_row).optional()?;
            Ok(row)
        })
    }

    /// Conversation history between two users, in either direction, ordered
    /// by creation time ascending. The sort key is the stored timestamp,
    /// not insertion order.
    pub fn messages_between(&self, user_a: &str, user_b: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{MESSAGE_SELECT}
                 WHERE (m.sender_id = ?1 AND m.receiver_id = ?2)
                    OR (m.sender_id = ?2 AND m.receiver_id = ?1)
                 ORDER BY m.created_at ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_a, user_b], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Re-stamps read_at unconditionally (last-call-wins) and returns
    /// whether the message existed.
    pub fn mark_read(&self, id: &str, now: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE messages SET read_at = ?2 WHERE id = ?1",
                rusqlite::params![id, now],
            )?;
            Ok(n > 0)
        })
    }

    pub fn delete_message(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    // -- Attachments --

    /// Batch-fetch attachments for a set of message IDs, in insertion order.
    pub fn attachments_for_messages(&self, message_ids: &[String]) -> Result<Vec<AttachmentRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT message_id, url, kind, name, size FROM attachments
                 WHERE message_id IN ({}) ORDER BY id ASC",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(AttachmentRow {
                        message_id: row.get(0)?,
                        url: row.get(1)?,
                        kind: row.get(2)?,
                        name: row.get(3)?,
                        size: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, predicate: &str, param: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {predicate}");
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([param], user_from_row).optional()?;
    Ok(row)
}

fn user_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<UserRow, rusqlite::Error> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        full_name: row.get(3)?,
        profile_pic_url: row.get(4)?,
        password: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn message_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<MessageRow, rusqlite::Error> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        sender_username: row
            .get::<_, Option<String>>(2)?
            .unwrap_or_else(|| "unknown".to_string()),
        sender_profile_pic_url: row.get(3)?,
        receiver_id: row.get(4)?,
        receiver_username: row
            .get::<_, Option<String>>(5)?
            .unwrap_or_else(|| "unknown".to_string()),
        receiver_profile_pic_url: row.get(6)?,
        content: row.get(7)?,
        read_at: row.get(8)?,
        created_at: row.get(9)?,
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
    use crate::is_unique_violation;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn seed_user(db: &Database, id: &str, username: &str, email: &str, full_name: &str) {
        db.create_user(id, username, email, full_name, "$argon2$fake", "2026-01-01T00:00:00+00:00")
            .unwrap();
    }

    #[test]
    fn user_lookup_by_identifier() {
        let db = test_db();
        seed_user(&db, "u1", "alice", "alice@example.com", "Alice A");

        let by_name = db.get_user_by_identifier("alice").unwrap().unwrap();
        let by_mail = db.get_user_by_identifier("alice@example.com").unwrap().unwrap();
        assert_eq!(by_name.id, "u1");
        assert_eq!(by_mail.id, "u1");
        assert!(db.get_user_by_identifier("nobody").unwrap().is_none());
    }

    #[test]
    fn duplicate_email_is_unique_violation() {
        let db = test_db();
        seed_user(&db, "u1", "alice", "alice@example.com", "Alice A");

        let err = db
            .create_user("u2", "bob", "alice@example.com", "Bob B", "h", "2026-01-01T00:00:00+00:00")
            .unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[test]
    fn profile_update_leaves_password_untouched() {
        let db = test_db();
        seed_user(&db, "u1", "alice", "alice@example.com", "Alice A");
        let before = db.get_user_by_id("u1").unwrap().unwrap();

        let updated = db
            .update_user_profile("u1", "alice2", "alice2@example.com", "Alice Updated", "2026-01-02T00:00:00+00:00")
            .unwrap();
        assert!(updated);

        let after = db.get_user_by_id("u1").unwrap().unwrap();
        assert_eq!(after.username, "alice2");
        assert_eq!(after.full_name, "Alice Updated");
        assert_eq!(after.password, before.password);
    }

    #[test]
    fn directory_excludes_self_and_orders_by_full_name() {
        let db = test_db();
        seed_user(&db, "u1", "carol", "carol@example.com", "Zed");
        seed_user(&db, "u2", "bob", "bob@example.com", "Bob");
        seed_user(&db, "u3", "alice", "alice@example.com", "Alice");

        let listed = db.list_users_except("u1").unwrap();
        let names: Vec<&str> = listed.iter().map(|u| u.full_name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);
    }

    #[test]
    fn messages_between_sorts_by_created_at_in_both_directions() {
        let db = test_db();
        seed_user(&db, "u1", "alice", "alice@example.com", "Alice");
        seed_user(&db, "u2", "bob", "bob@example.com", "Bob");

        // Inserted out of chronological order on purpose: the stored
        // timestamp, not insertion order, must drive the sort.
        db.insert_message("m2", "u2", "u1", Some("second"), &[], "2026-01-01T00:00:02+00:00")
            .unwrap();
        db.insert_message("m1", "u1", "u2", Some("first"), &[], "2026-01-01T00:00:01+00:00")
            .unwrap();
        db.insert_message("m3", "u1", "u2", Some("third"), &[], "2026-01-01T00:00:03+00:00")
            .unwrap();

        let forward = db.messages_between("u1", "u2").unwrap();
        let ids: Vec<&str> = forward.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);

        let reverse = db.messages_between("u2", "u1").unwrap();
        let rev_ids: Vec<&str> = reverse.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, rev_ids);
    }

    #[test]
    fn message_rows_carry_peer_columns() {
        let db = test_db();
        seed_user(&db, "u1", "alice", "alice@example.com", "Alice");
        seed_user(&db, "u2", "bob", "bob@example.com", "Bob");
        db.insert_message("m1", "u1", "u2", Some("hi"), &[], "2026-01-01T00:00:01+00:00")
            .unwrap();

        let row = db.get_message("m1").unwrap().unwrap();
        assert_eq!(row.sender_username, "alice");
        assert_eq!(row.receiver_username, "bob");
        assert!(row.read_at.is_none());
    }

    #[test]
    fn mark_read_restamps_on_every_call() {
        let db = test_db();
        seed_user(&db, "u1", "alice", "alice@example.com", "Alice");
        seed_user(&db, "u2", "bob", "bob@example.com", "Bob");
        db.insert_message("m1", "u1", "u2", Some("hi"), &[], "2026-01-01T00:00:01+00:00")
            .unwrap();

        assert!(db.mark_read("m1", "2026-01-01T00:01:00+00:00").unwrap());
        assert!(db.mark_read("m1", "2026-01-01T00:02:00+00:00").unwrap());

        let row = db.get_message("m1").unwrap().unwrap();
        assert_eq!(row.read_at.as_deref(), Some("2026-01-01T00:02:00+00:00"));

        assert!(!db.mark_read("missing", "2026-01-01T00:03:00+00:00").unwrap());
    }

    #[test]
    fn delete_cascades_to_attachments() {
        let db = test_db();
        seed_user(&db, "u1", "alice", "alice@example.com", "Alice");
        seed_user(&db, "u2", "bob", "bob@example.com", "Bob");

        let attachments = vec![
            NewAttachment {
                url: "https://blobs.example/1".into(),
                kind: "image".into(),
                name: "a.png".into(),
                size: 10,
            },
            NewAttachment {
                url: "https://blobs.example/2".into(),
                kind: "image".into(),
                name: "b.png".into(),
                size: 20,
            },
        ];
        db.insert_message("m1", "u1", "u2", None, &attachments, "2026-01-01T00:00:01+00:00")
            .unwrap();

        let stored = db.attachments_for_messages(&["m1".to_string()]).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].name, "a.png");
        assert_eq!(stored[1].name, "b.png");

        assert!(db.delete_message("m1").unwrap());
        assert!(db.get_message("m1").unwrap().is_none());
        assert!(db.attachments_for_messages(&["m1".to_string()]).unwrap().is_empty());
        assert!(!db.delete_message("m1").unwrap());
    }
}
