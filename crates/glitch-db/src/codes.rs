use crate::Database;
use anyhow::Result;
use rusqlite::params;

/// The three kinds of one-time code. Each lives in its own table so
/// outstanding codes of different kinds never interfere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeKind {
    PasswordReset,
    Mfa,
    SignupVerification,
}

impl CodeKind {
    pub fn table(self) -> &'static str {
        match self {
            CodeKind::PasswordReset => "reset_codes",
            CodeKind::Mfa => "mfa_codes",
            CodeKind::SignupVerification => "signup_verification_codes",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCheck {
    Valid,
    Expired,
    Invalid,
}

impl Database {
    /// Replaces any outstanding code of this kind for the email.
    pub fn store_code(
        &self,
        kind: CodeKind,
        email: &str,
        user_id: Option<i64>,
        code: &str,
        expires_at_ms: i64,
    ) -> Result<()> {
        let table = kind.table();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(&format!("DELETE FROM {table} WHERE email = ?1"), [email])?;
            tx.execute(
                &format!("INSERT INTO {table} (user_id, email, code, expires_at) VALUES (?1, ?2, ?3, ?4)"),
                params![user_id, email, code, expires_at_ms],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Checks a submitted code. A match is deleted on success; a match past
    /// its expiry clears every code of this kind for the email.
    pub fn consume_code(&self, kind: CodeKind, email: &str, code: &str, now_ms: i64) -> Result<CodeCheck> {
        let table = kind.table();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let found: Option<(i64, i64)> = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT id, expires_at FROM {table} WHERE email = ?1 AND code = ?2
                     ORDER BY id DESC LIMIT 1"
                ))?;
                let mut rows = stmt.query(params![email, code])?;
                match rows.next()? {
                    Some(row) => Some((row.get(0)?, row.get(1)?)),
                    None => None,
                }
            };

            let Some((id, expires_at)) = found else {
                return Ok(CodeCheck::Invalid);
            };

            let check = if expires_at < now_ms {
                tx.execute(&format!("DELETE FROM {table} WHERE email = ?1"), [email])?;
                CodeCheck::Expired
            } else {
                tx.execute(&format!("DELETE FROM {table} WHERE id = ?1"), [id])?;
                CodeCheck::Valid
            };
            tx.commit()?;
            Ok(check)
        })
    }

    /// Drops every expired code of every kind. Returns how many were removed.
    pub fn purge_expired_codes(&self, now_ms: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let mut removed = 0;
            for kind in [CodeKind::PasswordReset, CodeKind::Mfa, CodeKind::SignupVerification] {
                removed += conn.execute(
                    &format!("DELETE FROM {} WHERE expires_at < ?1", kind.table()),
                    [now_ms],
                )?;
            }
            Ok(removed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn valid_code_is_single_use() {
        let db = Database::open_in_memory().unwrap();
        db.store_code(CodeKind::Mfa, "a@b.co", Some(1), "123456", NOW + 60_000).unwrap();

        assert_eq!(db.consume_code(CodeKind::Mfa, "a@b.co", "123456", NOW).unwrap(), CodeCheck::Valid);
        assert_eq!(db.consume_code(CodeKind::Mfa, "a@b.co", "123456", NOW).unwrap(), CodeCheck::Invalid);
    }

    #[test]
    fn new_code_replaces_previous_one() {
        let db = Database::open_in_memory().unwrap();
        db.store_code(CodeKind::PasswordReset, "a@b.co", None, "111111", NOW + 60_000).unwrap();
        db.store_code(CodeKind::PasswordReset, "a@b.co", None, "222222", NOW + 60_000).unwrap();

        assert_eq!(
            db.consume_code(CodeKind::PasswordReset, "a@b.co", "111111", NOW).unwrap(),
            CodeCheck::Invalid
        );
        assert_eq!(
            db.consume_code(CodeKind::PasswordReset, "a@b.co", "222222", NOW).unwrap(),
            CodeCheck::Valid
        );
    }

    #[test]
    fn expired_code_reports_expired_and_is_removed() {
        let db = Database::open_in_memory().unwrap();
        db.store_code(CodeKind::SignupVerification, "a@b.co", None, "654321", NOW - 1).unwrap();

        assert_eq!(
            db.consume_code(CodeKind::SignupVerification, "a@b.co", "654321", NOW).unwrap(),
            CodeCheck::Expired
        );
        assert_eq!(
            db.consume_code(CodeKind::SignupVerification, "a@b.co", "654321", NOW).unwrap(),
            CodeCheck::Invalid
        );
    }

    #[test]
    fn kinds_do_not_share_codes() {
        let db = Database::open_in_memory().unwrap();
        db.store_code(CodeKind::Mfa, "a@b.co", None, "123456", NOW + 60_000).unwrap();

        assert_eq!(
            db.consume_code(CodeKind::PasswordReset, "a@b.co", "123456", NOW).unwrap(),
            CodeCheck::Invalid
        );
    }

    #[test]
    fn purge_removes_only_expired() {
        let db = Database::open_in_memory().unwrap();
        db.store_code(CodeKind::Mfa, "old@b.co", None, "000001", NOW - 10).unwrap();
        db.store_code(CodeKind::PasswordReset, "old@b.co", None, "000002", NOW - 10).unwrap();
        db.store_code(CodeKind::Mfa, "new@b.co", None, "000003", NOW + 10).unwrap();

        assert_eq!(db.purge_expired_codes(NOW).unwrap(), 2);
        assert_eq!(db.consume_code(CodeKind::Mfa, "new@b.co", "000003", NOW).unwrap(), CodeCheck::Valid);
    }
}
