use crate::models::{ChannelRow, MessageRow, NewChannel};
use crate::{Database, OptionalExt};
use anyhow::Result;
use rusqlite::{Row, params};

const CHANNEL_COLUMNS: &str =
    "id, name, category, description, access_level, is_system_channel, hidden, created_at";

const MESSAGE_SELECT: &str = "
    SELECT m.id, m.channel_id, m.user_id, m.username, m.content, m.created_at, m.edited_at,
           u.avatar, u.role
    FROM messages m
    LEFT JOIN users u ON u.id = m.user_id";

impl Database {
    // -- Channels --

    pub fn list_channels(&self) -> Result<Vec<ChannelRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHANNEL_COLUMNS} FROM channels
                 WHERE hidden = 0
                 ORDER BY category ASC, name ASC"
            ))?;
            let rows = stmt
                .query_map([], map_channel)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_channel(&self, id: &str) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = ?1"),
                [id],
                map_channel,
            )
            .optional()
        })
    }

    /// Inserts a channel under `base_id`, appending `-2`, `-3`, ... until the
    /// id is free. Returns the id actually used.
    pub fn insert_channel(&self, base_id: &str, channel: &NewChannel<'_>) -> Result<String> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut id = base_id.to_string();
            let mut suffix = 2;
            loop {
                let taken: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM channels WHERE id = ?1)",
                    [&id],
                    |row| row.get(0),
                )?;
                if !taken {
                    break;
                }
                id = format!("{base_id}-{suffix}");
                suffix += 1;
            }

            tx.execute(
                "INSERT INTO channels (id, name, category, description, access_level)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, channel.name, channel.category, channel.description, channel.access_level],
            )?;
            tx.commit()?;
            Ok(id)
        })
    }

    /// Deletes a channel together with its messages. Returns false when the
    /// channel does not exist.
    pub fn delete_channel(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM messages WHERE channel_id = ?1", [id])?;
            let removed = tx.execute("DELETE FROM channels WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(removed > 0)
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        channel_id: &str,
        user_id: i64,
        username: &str,
        content: &str,
        created_at: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (channel_id, user_id, username, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![channel_id, user_id, username, content, created_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// The newest `limit` messages (optionally older than `before`),
    /// returned oldest first.
    pub fn list_messages(&self, channel_id: &str, limit: u32, before: Option<i64>) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT * FROM ({MESSAGE_SELECT}
                     WHERE m.channel_id = ?1 AND (?2 IS NULL OR m.id < ?2)
                     ORDER BY m.id DESC LIMIT ?3)
                 ORDER BY id ASC"
            ))?;
            let rows = stmt
                .query_map(params![channel_id, before, limit], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_message(&self, channel_id: &str, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{MESSAGE_SELECT} WHERE m.channel_id = ?1 AND m.id = ?2"),
                params![channel_id, id],
                map_message,
            )
            .optional()
        })
    }

    pub fn update_message(&self, id: i64, content: &str, edited_at: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET content = ?1, edited_at = ?2 WHERE id = ?3",
                params![content, edited_at, id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_message(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM messages WHERE id = ?1", [id])? > 0))
    }

    pub fn count_messages(&self, channel_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE channel_id = ?1",
                [channel_id],
                |row| row.get(0),
            )?)
        })
    }
}

fn map_channel(row: &Row<'_>) -> rusqlite::Result<ChannelRow> {
    Ok(ChannelRow {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        description: row.get(3)?,
        access_level: row.get(4)?,
        is_system_channel: row.get(5)?,
        hidden: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        user_id: row.get(2)?,
        username: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
        edited_at: row.get(6)?,
        author_avatar: row.get(7)?,
        author_role: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel<'a>(name: &'a str) -> NewChannel<'a> {
        NewChannel {
            name,
            category: "general",
            description: None,
            access_level: "open",
        }
    }

    #[test]
    fn taken_ids_get_numeric_suffix() {
        let db = Database::open_in_memory().unwrap();

        assert_eq!(db.insert_channel("general", &channel("general")).unwrap(), "general-2");
        assert_eq!(db.insert_channel("general", &channel("general")).unwrap(), "general-3");
        assert_eq!(db.insert_channel("options", &channel("options")).unwrap(), "options");
    }

    #[test]
    fn deleting_channel_drops_its_messages() {
        let db = Database::open_in_memory().unwrap();
        let id = db.insert_channel("scratch", &channel("scratch")).unwrap();
        db.insert_message(&id, 1, "alice", "hello", "2026-01-01T00:00:00Z").unwrap();

        assert!(db.delete_channel(&id).unwrap());
        assert!(!db.delete_channel(&id).unwrap());
        assert_eq!(db.count_messages(&id).unwrap(), 0);
    }

    #[test]
    fn messages_page_backwards_in_ascending_order() {
        let db = Database::open_in_memory().unwrap();
        let ids: Vec<i64> = (0..5)
            .map(|i| {
                db.insert_message("general", 1, "alice", &format!("m{i}"), "2026-01-01T00:00:00Z")
                    .unwrap()
            })
            .collect();

        let latest = db.list_messages("general", 2, None).unwrap();
        assert_eq!(latest.iter().map(|m| m.id).collect::<Vec<_>>(), vec![ids[3], ids[4]]);

        let older = db.list_messages("general", 2, Some(ids[3])).unwrap();
        assert_eq!(older.iter().map(|m| m.id).collect::<Vec<_>>(), vec![ids[1], ids[2]]);
    }

    #[test]
    fn edit_sets_edited_at() {
        let db = Database::open_in_memory().unwrap();
        let id = db.insert_message("general", 1, "alice", "first", "2026-01-01T00:00:00Z").unwrap();

        assert!(db.update_message(id, "second", "2026-01-01T00:01:00Z").unwrap());
        let msg = db.get_message("general", id).unwrap().unwrap();
        assert_eq!(msg.content, "second");
        assert_eq!(msg.edited_at.as_deref(), Some("2026-01-01T00:01:00Z"));
        assert!(db.get_message("forex", id).unwrap().is_none());
    }
}
