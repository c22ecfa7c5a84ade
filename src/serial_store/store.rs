//! SQLite-backed serial catalog store.

use anyhow::{Context, Result};
use rusqlite::{params, params_from_iter, types::Value, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::models::{platform_slug, slugify, Platform, Serial, SerialPatch, SerialWithPlatform};
use super::schema::SERIAL_DB_VERSIONED_SCHEMAS;
use crate::sqlite_persistence;

/// Result of a webhook upsert. `NewEpisode` means an existing serial was
/// refreshed: its download URLs were cleared and progress reset so the
/// admission flow starts over for the new episode.
#[derive(Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(String),
    NewEpisode(String),
}

impl UpsertOutcome {
    pub fn serial_id(&self) -> &str {
        match self {
            UpsertOutcome::Created(id) | UpsertOutcome::NewEpisode(id) => id,
        }
    }
}

pub trait SerialStore: Send + Sync {
    /// Create the serial (auto-creating its platform) or, if it already
    /// exists, register a new episode: update url and episode date, clear
    /// dlurl/ytdl and reset bypass progress to 0.
    fn upsert_serial(
        &self,
        name: &str,
        platform_name: &str,
        url: &str,
        episode_date: &str,
    ) -> Result<UpsertOutcome>;

    fn get_serial(&self, id: &str) -> Result<Option<Serial>>;

    fn get_platform(&self, id: i64) -> Result<Option<Platform>>;

    /// All serials joined with their platform, ordered by platform then name.
    fn list_all(&self) -> Result<Vec<SerialWithPlatform>>;

    /// Apply a partial worker update. Returns false when the serial does not
    /// exist. An empty patch is a no-op.
    fn apply_patch(&self, id: &str, patch: &SerialPatch) -> Result<bool>;
}

pub struct SqliteSerialStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSerialStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn =
            sqlite_persistence::open_versioned(db_path, SERIAL_DB_VERSIONED_SCHEMAS, "serials")?;
        Ok(SqliteSerialStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = sqlite_persistence::open_in_memory(SERIAL_DB_VERSIONED_SCHEMAS)?;
        Ok(SqliteSerialStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn get_or_create_platform(conn: &Connection, name: &str) -> Result<Platform> {
        let normalized = name.trim();
        let slug = platform_slug(normalized);

        let existing = conn
            .query_row(
                "SELECT id, name, slug FROM platforms WHERE name = ?1 OR slug = ?2",
                params![normalized, slug],
                |row| {
                    Ok(Platform {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        slug: row.get(2)?,
                    })
                },
            )
            .optional()?;

        if let Some(platform) = existing {
            return Ok(platform);
        }

        conn.execute(
            "INSERT INTO platforms (name, slug) VALUES (?1, ?2)",
            params![normalized, slug],
        )?;
        Ok(Platform {
            id: conn.last_insert_rowid(),
            name: normalized.to_string(),
            slug,
        })
    }

    fn row_to_serial(row: &rusqlite::Row) -> rusqlite::Result<Serial> {
        Ok(Serial {
            id: row.get("id")?,
            platform_id: row.get("platform_id")?,
            name: row.get("name")?,
            url: row.get("url")?,
            dlurl: row.get("dlurl")?,
            ytdl: row.get("ytdl")?,
            bypass_progress: row.get("bypass_progress")?,
            episode_date: row.get("episode_date")?,
        })
    }
}

impl SerialStore for SqliteSerialStore {
    fn upsert_serial(
        &self,
        name: &str,
        platform_name: &str,
        url: &str,
        episode_date: &str,
    ) -> Result<UpsertOutcome> {
        let conn = self.conn.lock().unwrap();
        let serial_id = slugify(name);
        anyhow::ensure!(!serial_id.is_empty(), "Serial name produces empty id");

        let platform = Self::get_or_create_platform(&conn, platform_name)?;

        let updated = conn.execute(
            "UPDATE serials
             SET url = ?1, episode_date = ?2, dlurl = NULL, ytdl = NULL, bypass_progress = 0
             WHERE id = ?3",
            params![url, episode_date, serial_id],
        )?;
        if updated > 0 {
            return Ok(UpsertOutcome::NewEpisode(serial_id));
        }

        conn.execute(
            "INSERT INTO serials (id, platform_id, name, url, episode_date)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![serial_id, platform.id, name, url, episode_date],
        )?;
        Ok(UpsertOutcome::Created(serial_id))
    }

    fn get_serial(&self, id: &str) -> Result<Option<Serial>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM serials WHERE id = ?1",
            params![id],
            Self::row_to_serial,
        )
        .optional()
        .context("Failed to query serial")
    }

    fn get_platform(&self, id: i64) -> Result<Option<Platform>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, slug FROM platforms WHERE id = ?1",
            params![id],
            |row| {
                Ok(Platform {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    slug: row.get(2)?,
                })
            },
        )
        .optional()
        .context("Failed to query platform")
    }

    fn list_all(&self) -> Result<Vec<SerialWithPlatform>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT s.*, p.name AS platform_name, p.slug AS platform_slug
             FROM serials s
             JOIN platforms p ON s.platform_id = p.id
             ORDER BY p.id, s.name",
        )?;
        let serials = stmt
            .query_map([], |row| {
                Ok(SerialWithPlatform {
                    serial: Self::row_to_serial(row)?,
                    platform_name: row.get("platform_name")?,
                    platform_slug: row.get("platform_slug")?,
                    added_at: None,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(serials)
    }

    fn apply_patch(&self, id: &str, patch: &SerialPatch) -> Result<bool> {
        if patch.is_empty() {
            let conn = self.conn.lock().unwrap();
            let exists = conn
                .query_row("SELECT 1 FROM serials WHERE id = ?1", params![id], |_| {
                    Ok(())
                })
                .optional()?
                .is_some();
            return Ok(exists);
        }

        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(dlurl) = &patch.dlurl {
            sets.push("dlurl = ?");
            values.push(dlurl.clone().map(Value::Text).unwrap_or(Value::Null));
        }
        if let Some(ytdl) = &patch.ytdl {
            sets.push("ytdl = ?");
            values.push(ytdl.clone().map(Value::Text).unwrap_or(Value::Null));
        }
        if let Some(episode_date) = &patch.episode_date {
            sets.push("episode_date = ?");
            values.push(Value::Text(episode_date.clone()));
        }
        if let Some(progress) = patch.bypass_progress {
            sets.push("bypass_progress = ?");
            values.push(Value::Integer(progress as i64));
        }
        values.push(Value::Text(id.to_string()));

        let sql = format!(
            "UPDATE serials SET {} WHERE id = ?",
            sets.join(", ")
        );
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(&sql, params_from_iter(values))?;
        Ok(updated > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial_store::models::UrlState;

    fn store() -> SqliteSerialStore {
        SqliteSerialStore::in_memory().unwrap()
    }

    #[test]
    fn upsert_creates_serial_and_platform() {
        let store = store();
        let outcome = store
            .upsert_serial("My Serial", "Har Pal Geo", "http://page", "12 Aug 2026")
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Created("my_serial".to_string()));

        let serial = store.get_serial("my_serial").unwrap().unwrap();
        assert_eq!(serial.name, "My Serial");
        assert_eq!(serial.episode_date, "12 Aug 2026");
        assert_eq!(serial.dlurl_state(), UrlState::Missing);

        let platform = store.get_platform(serial.platform_id).unwrap().unwrap();
        assert_eq!(platform.slug, "harpalgeo");
    }

    #[test]
    fn upsert_existing_clears_urls_and_progress() {
        let store = store();
        store
            .upsert_serial("My Serial", "Har Pal Geo", "http://page", "12 Aug 2026")
            .unwrap();
        store
            .apply_patch(
                "my_serial",
                &SerialPatch {
                    dlurl: Some(Some("http://cdn/ep1.mp4".into())),
                    ytdl: Some(Some("http://cdn/ep1-bypass.mp4".into())),
                    bypass_progress: Some(100),
                    ..Default::default()
                },
            )
            .unwrap();

        let outcome = store
            .upsert_serial("My Serial", "Har Pal Geo", "http://page2", "13 Aug 2026")
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::NewEpisode("my_serial".to_string()));

        let serial = store.get_serial("my_serial").unwrap().unwrap();
        assert_eq!(serial.url, "http://page2");
        assert_eq!(serial.episode_date, "13 Aug 2026");
        assert_eq!(serial.dlurl, None);
        assert_eq!(serial.ytdl, None);
        assert_eq!(serial.bypass_progress, 0);
    }

    #[test]
    fn upsert_reuses_platform_by_slug() {
        let store = store();
        store
            .upsert_serial("A", "ARY Digital", "http://a", "d1")
            .unwrap();
        store
            .upsert_serial("B", "ary digital", "http://b", "d2")
            .unwrap();

        let a = store.get_serial("a").unwrap().unwrap();
        let b = store.get_serial("b").unwrap().unwrap();
        assert_eq!(a.platform_id, b.platform_id);
    }

    #[test]
    fn patch_updates_only_named_fields() {
        let store = store();
        store
            .upsert_serial("My Serial", "Geo", "http://page", "d1")
            .unwrap();

        let found = store
            .apply_patch(
                "my_serial",
                &SerialPatch {
                    dlurl: Some(Some("http://cdn/file.mp4".into())),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(found);

        let serial = store.get_serial("my_serial").unwrap().unwrap();
        assert_eq!(serial.dlurl.as_deref(), Some("http://cdn/file.mp4"));
        assert_eq!(serial.ytdl, None);
        assert_eq!(serial.episode_date, "d1");
    }

    #[test]
    fn patch_can_clear_a_url() {
        let store = store();
        store.upsert_serial("S", "Geo", "http://page", "d1").unwrap();
        store
            .apply_patch(
                "s",
                &SerialPatch {
                    dlurl: Some(Some("http://cdn/x".into())),
                    ..Default::default()
                },
            )
            .unwrap();
        store
            .apply_patch(
                "s",
                &SerialPatch {
                    dlurl: Some(None),
                    ..Default::default()
                },
            )
            .unwrap();
        let serial = store.get_serial("s").unwrap().unwrap();
        assert_eq!(serial.dlurl, None);
    }

    #[test]
    fn patch_unknown_serial_returns_false() {
        let store = store();
        let found = store
            .apply_patch(
                "nope",
                &SerialPatch {
                    bypass_progress: Some(50),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!found);
    }

    #[test]
    fn list_all_joins_platforms() {
        let store = store();
        store.upsert_serial("B Serial", "Geo", "http://b", "d").unwrap();
        store.upsert_serial("A Serial", "Geo", "http://a", "d").unwrap();

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 2);
        // Ordered by platform then name.
        assert_eq!(all[0].serial.id, "a_serial");
        assert_eq!(all[0].platform_name, "Geo");
        assert!(all.iter().all(|s| s.added_at.is_none()));
    }

    #[test]
    fn error_sentinel_survives_patch() {
        let store = store();
        store.upsert_serial("S", "Geo", "http://page", "d1").unwrap();
        store
            .apply_patch(
                "s",
                &SerialPatch {
                    ytdl: Some(Some(super::super::models::WORKER_ERROR_URL.into())),
                    ..Default::default()
                },
            )
            .unwrap();
        let serial = store.get_serial("s").unwrap().unwrap();
        assert_eq!(serial.ytdl_state(), UrlState::Errored);
    }
}
