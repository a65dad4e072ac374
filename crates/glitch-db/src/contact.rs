use crate::Database;
use crate::models::ContactRow;
use anyhow::Result;
use rusqlite::params;

impl Database {
    pub fn insert_contact(&self, name: &str, email: &str, subject: &str, message: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO contact_messages (name, email, subject, message) VALUES (?1, ?2, ?3, ?4)",
                params![name, email, subject, message],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Newest first.
    pub fn list_contacts(&self) -> Result<Vec<ContactRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, email, subject, message, is_read, created_at
                 FROM contact_messages ORDER BY created_at DESC, id DESC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(ContactRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                        subject: row.get(3)?,
                        message: row.get(4)?,
                        is_read: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete_contact(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM contact_messages WHERE id = ?1", [id])? > 0)
        })
    }

    pub fn mark_contact_read(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn.execute("UPDATE contact_messages SET is_read = 1 WHERE id = ?1", [id])? > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_lifecycle() {
        let db = Database::open_in_memory().unwrap();
        let first = db.insert_contact("Ann", "ann@example.com", "", "hi").unwrap();
        let second = db.insert_contact("Ben", "ben@example.com", "Billing", "help").unwrap();

        let all = db.list_contacts().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second);

        assert!(db.mark_contact_read(first).unwrap());
        assert!(db.list_contacts().unwrap().iter().any(|c| c.id == first && c.is_read));

        assert!(db.delete_contact(first).unwrap());
        assert!(!db.delete_contact(first).unwrap());
        assert!(!db.mark_contact_read(first).unwrap());
    }
}
