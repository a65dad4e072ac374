use crate::models::{CourseRow, NewUser, UserRow};
use crate::{Database, OptionalExt};
use anyhow::Result;
use rusqlite::{Connection, Row, params};

const USER_COLUMNS: &str = "id, username, email, password, name, avatar, role, mfa_enabled,
    subscription_status, subscription_expiry, payment_failed, xp, level, last_seen, metadata, created_at";

impl Database {
    // -- Users --

    /// Inserts a user and returns its new id.
    pub fn create_user(&self, user: &NewUser<'_>) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, email, password, name, avatar, role)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![user.username, user.email, user.password_hash, user.name, user.avatar, user.role],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", &id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1", &email))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1", &username))
    }

    /// All users, newest first.
    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC"
            ))?;
            let rows = stmt
                .query_map([], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_users(&self) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
        })
    }

    /// Returns false when no such user exists.
    pub fn delete_user(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM users WHERE id = ?1", [id])? > 0))
    }

    pub fn update_role(&self, id: i64, role: &str, metadata: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET role = ?1, metadata = ?2 WHERE id = ?3",
                params![role, metadata, id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn touch_last_seen(&self, id: i64, at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE users SET last_seen = ?1 WHERE id = ?2", params![at, id])?;
            Ok(())
        })
    }

    /// Users whose `last_seen` is at or after `since`, most recent first.
    pub fn online_users(&self, since: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE last_seen IS NOT NULL AND last_seen >= ?1
                 ORDER BY last_seen DESC"
            ))?;
            let rows = stmt
                .query_map([since], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns the number of rows changed (0 when the email is unknown).
    pub fn set_password_by_email(&self, email: &str, password_hash: &str) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE users SET password = ?1 WHERE email = ?2",
                params![password_hash, email],
            )?)
        })
    }

    pub fn set_mfa_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE users SET mfa_enabled = ?1 WHERE id = ?2", params![enabled, id])?;
            Ok(())
        })
    }

    // -- Subscriptions --

    pub fn set_subscription_status(&self, id: i64, status: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET subscription_status = ?1 WHERE id = ?2",
                params![status, id],
            )?;
            Ok(())
        })
    }

    /// Billing failure or cancellation. Returns the affected user id, if any.
    pub fn mark_payment_failed(&self, email: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let id: Option<i64> = conn
                .query_row("SELECT id FROM users WHERE email = ?1", [email], |row| row.get(0))
                .optional()?;
            if let Some(id) = id {
                conn.execute(
                    "UPDATE users SET payment_failed = 1, subscription_status = 'inactive' WHERE id = ?1",
                    [id],
                )?;
            }
            Ok(id)
        })
    }

    /// Successful renewal. Returns the affected user id, if any.
    pub fn mark_payment_succeeded(&self, email: &str, expiry: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let id: Option<i64> = conn
                .query_row("SELECT id FROM users WHERE email = ?1", [email], |row| row.get(0))
                .optional()?;
            if let Some(id) = id {
                conn.execute(
                    "UPDATE users SET payment_failed = 0, subscription_status = 'active',
                         subscription_expiry = ?1
                     WHERE id = ?2",
                    params![expiry, id],
                )?;
            }
            Ok(id)
        })
    }

    pub fn activate_subscription(
        &self,
        id: i64,
        started: &str,
        expiry: &str,
        session_id: Option<&str>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET subscription_status = 'active', subscription_started = ?1,
                     subscription_expiry = ?2, stripe_session_id = ?3, payment_failed = 0
                 WHERE id = ?4",
                params![started, expiry, session_id, id],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Leaderboard & courses --

    pub fn leaderboard(&self, limit: u32) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users ORDER BY xp DESC, level DESC, id ASC LIMIT ?1"
            ))?;
            let rows = stmt
                .query_map([limit], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_courses(&self) -> Result<Vec<CourseRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, description, level, duration, price, image_url
                 FROM courses ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(CourseRow {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        description: row.get(2)?,
                        level: row.get(3)?,
                        duration: row.get(4)?,
                        price: row.get(5)?,
                        image_url: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(
    conn: &Connection,
    predicate: &str,
    value: &dyn rusqlite::ToSql,
) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE {predicate}"))?;
    stmt.query_row([value], map_user).optional()
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        name: row.get(4)?,
        avatar: row.get(5)?,
        role: row.get(6)?,
        mfa_enabled: row.get(7)?,
        subscription_status: row.get(8)?,
        subscription_expiry: row.get(9)?,
        payment_failed: row.get(10)?,
        xp: row.get(11)?,
        level: row.get(12)?,
        last_seen: row.get(13)?,
        metadata: row.get(14)?,
        created_at: row.get(15)?,
    })
}
