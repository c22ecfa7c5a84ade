//! SQLite-backed user store.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::auth::SessionTokenValue;
use super::schema::USER_DB_VERSIONED_SCHEMAS;
use super::user_models::{DeviceInfo, LoginRecord, User, UserStatus};
use super::user_store::UserStore;
use crate::sqlite_persistence;

pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUserStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn =
            sqlite_persistence::open_versioned(db_path, USER_DB_VERSIONED_SCHEMAS, "users")?;
        Ok(SqliteUserStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = sqlite_persistence::open_in_memory(USER_DB_VERSIONED_SCHEMAS)?;
        Ok(SqliteUserStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        let status_str: String = row.get("status")?;
        Ok(User {
            id: row.get("id")?,
            name: row.get("name")?,
            email: row.get("email")?,
            whatsapp: row.get("whatsapp")?,
            status: UserStatus::from_db_str(&status_str).unwrap_or(UserStatus::Pending),
            wa_noti: row.get::<_, i64>("wa_noti")? != 0,
            plan_expiry: row.get("plan_expiry")?,
            created_at: row.get("created_at")?,
        })
    }

    fn row_to_login_record(row: &rusqlite::Row) -> rusqlite::Result<LoginRecord> {
        Ok(LoginRecord {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            fingerprint: row.get("device_fingerprint")?,
            ip: row.get("ip")?,
            user_agent: row.get("user_agent")?,
            screen_resolution: row.get("screen_resolution")?,
            timezone: row.get("timezone")?,
            logged_in_at: row.get("logged_in_at")?,
        })
    }

    fn is_constraint_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
        )
    }
}

impl UserStore for SqliteUserStore {
    fn create_user(
        &self,
        name: &str,
        email: &str,
        whatsapp: Option<&str>,
        password_hash: &str,
    ) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT INTO users (name, email, whatsapp, password_hash) VALUES (?1, ?2, ?3, ?4)",
            params![name, email, whatsapp, password_hash],
        );
        match inserted {
            Ok(_) => {
                let user = conn.query_row(
                    "SELECT * FROM users WHERE id = ?1",
                    params![conn.last_insert_rowid()],
                    Self::row_to_user,
                )?;
                Ok(Some(user))
            }
            Err(err) if Self::is_constraint_violation(&err) => Ok(None),
            Err(err) => Err(err).context("Failed to insert user"),
        }
    }

    fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM users WHERE id = ?1",
            params![user_id],
            Self::row_to_user,
        )
        .optional()
        .context("Failed to query user")
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM users WHERE email = ?1",
            params![email],
            Self::row_to_user,
        )
        .optional()
        .context("Failed to query user by email")
    }

    fn get_user_credentials(&self, email: &str) -> Result<Option<(User, String)>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM users WHERE email = ?1",
            params![email],
            |row| {
                let user = Self::row_to_user(row)?;
                let hash: String = row.get("password_hash")?;
                Ok((user, hash))
            },
        )
        .optional()
        .context("Failed to query user credentials")
    }

    fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM users ORDER BY created_at DESC, id DESC")?;
        let users = stmt
            .query_map([], Self::row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    fn set_user_status(&self, user_id: i64, status: UserStatus) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE users SET status = ?1 WHERE id = ?2",
            params![status.as_db_str(), user_id],
        )?;
        Ok(updated > 0)
    }

    fn set_plan_expiry(&self, user_id: i64, plan_expiry: Option<i64>) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE users SET plan_expiry = ?1 WHERE id = ?2",
            params![plan_expiry, user_id],
        )?;
        Ok(updated > 0)
    }

    fn set_whatsapp(&self, user_id: i64, whatsapp: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE users SET whatsapp = ?1 WHERE id = ?2",
            params![whatsapp, user_id],
        )?;
        Ok(updated > 0)
    }

    fn set_wa_noti(&self, user_id: i64, enabled: bool) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE users SET wa_noti = ?1 WHERE id = ?2",
            params![enabled as i64, user_id],
        )?;
        Ok(updated > 0)
    }

    fn delete_user(&self, user_id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;
        Ok(deleted > 0)
    }

    fn create_session(&self, user_id: i64, device: &DeviceInfo) -> Result<SessionTokenValue> {
        let token = SessionTokenValue::generate();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sessions
               (token, user_id, device_fingerprint, ip, user_agent, screen_resolution, timezone)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                token.0,
                user_id,
                device.fingerprint,
                device.ip,
                device.user_agent,
                device.screen_resolution,
                device.timezone,
            ],
        )?;
        Ok(token)
    }

    fn get_session_user(&self, token: &SessionTokenValue) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT u.* FROM sessions s JOIN users u ON s.user_id = u.id WHERE s.token = ?1",
            params![token.0],
            Self::row_to_user,
        )
        .optional()
        .context("Failed to query session")
    }

    fn touch_session(&self, token: &SessionTokenValue) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE sessions
             SET last_active = cast(strftime('%s','now') as int)
             WHERE token = ?1",
            params![token.0],
        )?;
        Ok(())
    }

    fn delete_session(&self, token: &SessionTokenValue) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM sessions WHERE token = ?1", params![token.0])?;
        Ok(deleted > 0)
    }

    fn delete_user_sessions(&self, user_id: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM sessions WHERE user_id = ?1", params![user_id])?;
        Ok(deleted)
    }

    fn prune_sessions_older_than(&self, cutoff: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM sessions WHERE last_active < ?1",
            params![cutoff],
        )?;
        Ok(deleted)
    }

    fn log_login(&self, user_id: i64, device: &DeviceInfo) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO login_history
               (user_id, device_fingerprint, ip, user_agent, screen_resolution, timezone)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user_id,
                device.fingerprint,
                device.ip,
                device.user_agent,
                device.screen_resolution,
                device.timezone,
            ],
        )?;
        Ok(())
    }

    fn login_history(&self, user_id: i64) -> Result<Vec<LoginRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM login_history WHERE user_id = ?1 ORDER BY logged_in_at DESC, id DESC",
        )?;
        let records = stmt
            .query_map(params![user_id], Self::row_to_login_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn add_user_serial(&self, user_id: i64, serial_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO user_serials (user_id, serial_id) VALUES (?1, ?2)",
            params![user_id, serial_id],
        )?;
        Ok(inserted > 0)
    }

    fn remove_user_serial(&self, user_id: i64, serial_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM user_serials WHERE user_id = ?1 AND serial_id = ?2",
            params![user_id, serial_id],
        )?;
        Ok(deleted > 0)
    }

    fn user_serials(&self, user_id: i64) -> Result<Vec<(String, i64)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT serial_id, added_at FROM user_serials
             WHERE user_id = ?1
             ORDER BY added_at DESC, id DESC",
        )?;
        let serials = stmt
            .query_map(params![user_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(serials)
    }

    fn is_user_serial(&self, user_id: i64, serial_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let found = conn
            .query_row(
                "SELECT 1 FROM user_serials WHERE user_id = ?1 AND serial_id = ?2",
                params![user_id, serial_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        Ok(found)
    }
}
