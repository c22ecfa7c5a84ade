//! SQLite-backed store for queue jobs and the download log.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::sqlite_persistence::{open_in_memory, open_versioned};

use super::models::{
    DownloadOverview, DownloadVariant, EnqueueOutcome, JobStatus, QueueJob, SerialDownloadCounts,
    UserDownloadCounts,
};
use super::schema::DOWNLOAD_DB_VERSIONED_SCHEMAS;

pub trait DownloadQueueStore: Send + Sync {
    /// Insert a new queued job unless the serial already has a non-terminal
    /// one. The check and the insert run in a single transaction.
    fn enqueue_if_idle(
        &self,
        serial_id: &str,
        user_id: i64,
        variant: DownloadVariant,
    ) -> Result<EnqueueOutcome>;

    /// The most recent non-terminal job for a serial, if any.
    fn active_job_for_serial(&self, serial_id: &str) -> Result<Option<QueueJob>>;

    fn get_job(&self, job_id: i64) -> Result<Option<QueueJob>>;

    /// Oldest queued jobs first, up to `limit`.
    fn pending_batch(&self, limit: u32) -> Result<Vec<QueueJob>>;

    /// Update a job's status and optionally its progress. Terminal statuses
    /// stamp `completed_at`. Returns false when the job does not exist.
    fn set_job_status(&self, job_id: i64, status: JobStatus, progress: Option<i32>)
        -> Result<bool>;

    fn delete_jobs_for_user(&self, user_id: i64) -> Result<usize>;

    /// Record a redeemed download. Returns false when the same
    /// (serial, user, episode, variant) was already logged.
    fn record_download(
        &self,
        serial_id: &str,
        user_id: i64,
        episode_date: &str,
        variant: DownloadVariant,
    ) -> Result<bool>;

    fn delete_logs_for_user(&self, user_id: i64) -> Result<usize>;

    fn overview_counts(&self, today_start: i64, week_start: i64) -> Result<DownloadOverview>;

    fn counts_by_serial(
        &self,
        today_start: i64,
        week_start: i64,
    ) -> Result<Vec<SerialDownloadCounts>>;

    fn counts_by_user(&self, today_start: i64, week_start: i64) -> Result<Vec<UserDownloadCounts>>;
}

pub struct SqliteDownloadQueueStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteDownloadQueueStore {
    pub fn new<P: AsRef<Path>>(db_file_path: P) -> Result<Self> {
        let connection = open_versioned(db_file_path, DOWNLOAD_DB_VERSIONED_SCHEMAS, "downloads")?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let connection = open_in_memory(DOWNLOAD_DB_VERSIONED_SCHEMAS)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn row_to_queue_job(row: &Row) -> rusqlite::Result<QueueJob> {
        let variant_str: String = row.get("variant")?;
        let status_str: String = row.get("status")?;
        let variant = DownloadVariant::from_str(&variant_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("unknown variant {variant_str:?}").into(),
            )
        })?;
        let status = JobStatus::from_db_str(&status_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("unknown job status {status_str:?}").into(),
            )
        })?;
        Ok(QueueJob {
            id: row.get("id")?,
            serial_id: row.get("serial_id")?,
            user_id: row.get("user_id")?,
            variant,
            status,
            progress: row.get("progress")?,
            created_at: row.get("created_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

const SELECT_JOB: &str = "SELECT id, serial_id, user_id, variant, status, progress, created_at, \
                          completed_at FROM download_queue";

impl DownloadQueueStore for SqliteDownloadQueueStore {
    fn enqueue_if_idle(
        &self,
        serial_id: &str,
        user_id: i64,
        variant: DownloadVariant,
    ) -> Result<EnqueueOutcome> {
        let mut connection = self.connection.lock().unwrap();
        let tx = connection.transaction()?;
        let active = tx
            .query_row(
                &format!(
                    "{SELECT_JOB} WHERE serial_id = ?1 AND status IN ('queued', 'processing') \
                     ORDER BY created_at DESC LIMIT 1"
                ),
                params![serial_id],
                Self::row_to_queue_job,
            )
            .optional()?;
        if let Some(job) = active {
            tx.commit()?;
            return Ok(EnqueueOutcome::AlreadyActive(job));
        }
        tx.execute(
            "INSERT INTO download_queue (serial_id, user_id, variant) VALUES (?1, ?2, ?3)",
            params![serial_id, user_id, variant.as_str()],
        )?;
        let job_id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(EnqueueOutcome::Created(job_id))
    }

    fn active_job_for_serial(&self, serial_id: &str) -> Result<Option<QueueJob>> {
        let connection = self.connection.lock().unwrap();
        let job = connection
            .query_row(
                &format!(
                    "{SELECT_JOB} WHERE serial_id = ?1 AND status IN ('queued', 'processing') \
                     ORDER BY created_at DESC LIMIT 1"
                ),
                params![serial_id],
                Self::row_to_queue_job,
            )
            .optional()?;
        Ok(job)
    }

    fn get_job(&self, job_id: i64) -> Result<Option<QueueJob>> {
        let connection = self.connection.lock().unwrap();
        let job = connection
            .query_row(
                &format!("{SELECT_JOB} WHERE id = ?1"),
                params![job_id],
                Self::row_to_queue_job,
            )
            .optional()?;
        Ok(job)
    }

    fn pending_batch(&self, limit: u32) -> Result<Vec<QueueJob>> {
        let connection = self.connection.lock().unwrap();
        let mut statement = connection.prepare(&format!(
            "{SELECT_JOB} WHERE status = 'queued' ORDER BY created_at ASC LIMIT ?1"
        ))?;
        let jobs = statement
            .query_map(params![limit], Self::row_to_queue_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    fn set_job_status(
        &self,
        job_id: i64,
        status: JobStatus,
        progress: Option<i32>,
    ) -> Result<bool> {
        let connection = self.connection.lock().unwrap();
        let changed = if status.is_terminal() {
            connection.execute(
                "UPDATE download_queue SET status = ?2, \
                 progress = coalesce(?3, progress), \
                 completed_at = cast(strftime('%s','now') as int) WHERE id = ?1",
                params![job_id, status.as_db_str(), progress],
            )?
        } else {
            connection.execute(
                "UPDATE download_queue SET status = ?2, progress = coalesce(?3, progress) \
                 WHERE id = ?1",
                params![job_id, status.as_db_str(), progress],
            )?
        };
        Ok(changed > 0)
    }

    fn delete_jobs_for_user(&self, user_id: i64) -> Result<usize> {
        let connection = self.connection.lock().unwrap();
        let deleted = connection.execute(
            "DELETE FROM download_queue WHERE user_id = ?1",
            params![user_id],
        )?;
        Ok(deleted)
    }

    fn record_download(
        &self,
        serial_id: &str,
        user_id: i64,
        episode_date: &str,
        variant: DownloadVariant,
    ) -> Result<bool> {
        let connection = self.connection.lock().unwrap();
        let inserted = connection.execute(
            "INSERT OR IGNORE INTO download_logs (serial_id, user_id, episode_date, variant) \
             VALUES (?1, ?2, ?3, ?4)",
            params![serial_id, user_id, episode_date, variant.as_str()],
        )?;
        Ok(inserted > 0)
    }

    fn delete_logs_for_user(&self, user_id: i64) -> Result<usize> {
        let connection = self.connection.lock().unwrap();
        let deleted = connection.execute(
            "DELETE FROM download_logs WHERE user_id = ?1",
            params![user_id],
        )?;
        Ok(deleted)
    }

    fn overview_counts(&self, today_start: i64, week_start: i64) -> Result<DownloadOverview> {
        let connection = self.connection.lock().unwrap();
        let overview = connection.query_row(
            "SELECT count(*), \
             coalesce(sum(downloaded_at >= ?1), 0), \
             coalesce(sum(downloaded_at >= ?2), 0) \
             FROM download_logs",
            params![today_start, week_start],
            |row| {
                Ok(DownloadOverview {
                    total_downloads: row.get(0)?,
                    downloads_today: row.get(1)?,
                    downloads_last_week: row.get(2)?,
                })
            },
        )?;
        Ok(overview)
    }

    fn counts_by_serial(
        &self,
        today_start: i64,
        week_start: i64,
    ) -> Result<Vec<SerialDownloadCounts>> {
        let connection = self.connection.lock().unwrap();
        let mut statement = connection.prepare(
            "SELECT serial_id, count(*), \
             coalesce(sum(downloaded_at >= ?1), 0), \
             coalesce(sum(downloaded_at >= ?2), 0) \
             FROM download_logs GROUP BY serial_id ORDER BY count(*) DESC",
        )?;
        let counts = statement
            .query_map(params![today_start, week_start], |row| {
                Ok(SerialDownloadCounts {
                    serial_id: row.get(0)?,
                    total_downloads: row.get(1)?,
                    downloads_today: row.get(2)?,
                    downloads_last_week: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }

    fn counts_by_user(&self, today_start: i64, week_start: i64) -> Result<Vec<UserDownloadCounts>> {
        let connection = self.connection.lock().unwrap();
        let mut statement = connection.prepare(
            "SELECT user_id, count(*), \
             coalesce(sum(downloaded_at >= ?1), 0), \
             coalesce(sum(downloaded_at >= ?2), 0) \
             FROM download_logs GROUP BY user_id ORDER BY count(*) DESC",
        )?;
        let counts = statement
            .query_map(params![today_start, week_start], |row| {
                Ok(UserDownloadCounts {
                    user_id: row.get(0)?,
                    total_downloads: row.get(1)?,
                    downloads_today: row.get(2)?,
                    downloads_last_week: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }
}
