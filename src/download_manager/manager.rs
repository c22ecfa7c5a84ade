//! Admission, polling and redemption logic on top of the serial catalog
//! and the download queue.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, FixedOffset, Utc};
use tracing::info;

use crate::serial_store::{SerialPatch, SerialStore, UpsertOutcome, UrlState, WORKER_ERROR_URL};

use super::models::{
    tracked_download_url, Decision, DownloadOverview, DownloadVariant, EnqueueOutcome, JobStatus,
    PollStatus, QueueJob, SerialDownloadCounts, UserDownloadCounts,
};
use super::queue_store::DownloadQueueStore;

/// Day boundaries for download stats follow Pakistan time.
const STATS_UTC_OFFSET_SECONDS: i32 = 5 * 3600;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Serial not found")]
    SerialNotFound,
    #[error("Download not available")]
    NotAvailable,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub struct DownloadManager {
    serial_store: Arc<dyn SerialStore>,
    queue_store: Arc<dyn DownloadQueueStore>,
}

impl DownloadManager {
    pub fn new(serial_store: Arc<dyn SerialStore>, queue_store: Arc<dyn DownloadQueueStore>) -> Self {
        DownloadManager {
            serial_store,
            queue_store,
        }
    }

    /// Decide what happens when an authenticated user asks for a serial.
    ///
    /// The checks run in order: a ready URL for the requested rendition wins,
    /// then (for bypass) a ready original means the bypass rendition is still
    /// being produced, then the queue is consulted. An errored URL does not
    /// short-circuit, the request falls through to the queue so a fresh job
    /// can be attempted once the current one is terminal.
    pub fn request_download(
        &self,
        serial_id: &str,
        user_id: i64,
        variant: DownloadVariant,
    ) -> Result<Decision, DownloadError> {
        let serial = self
            .serial_store
            .get_serial(serial_id)?
            .ok_or(DownloadError::SerialNotFound)?;

        match variant {
            DownloadVariant::Original => {
                if let UrlState::Ready(_) = serial.dlurl_state() {
                    return Ok(Decision::Ready {
                        download_url: tracked_download_url(serial_id, variant),
                    });
                }
            }
            DownloadVariant::Bypass => {
                if let UrlState::Ready(_) = serial.ytdl_state() {
                    return Ok(Decision::Ready {
                        download_url: tracked_download_url(serial_id, variant),
                    });
                }
                if let UrlState::Ready(_) = serial.dlurl_state() {
                    return Ok(Decision::Processing {
                        progress: serial.bypass_progress,
                    });
                }
            }
        }

        match self
            .queue_store
            .enqueue_if_idle(serial_id, user_id, variant)?
        {
            EnqueueOutcome::AlreadyActive(_) => Ok(Decision::AlreadyQueued),
            EnqueueOutcome::Created(job_id) => {
                info!("Queued {} job {job_id} for serial {serial_id}", variant.as_str());
                Ok(Decision::Queued { job_id })
            }
        }
    }

    /// Unauthenticated polling of a serial's availability.
    pub fn check_status(
        &self,
        serial_id: &str,
        variant: DownloadVariant,
    ) -> Result<PollStatus, DownloadError> {
        let serial = self
            .serial_store
            .get_serial(serial_id)?
            .ok_or(DownloadError::SerialNotFound)?;

        let url_state = match variant {
            DownloadVariant::Original => serial.dlurl_state(),
            DownloadVariant::Bypass => serial.ytdl_state(),
        };
        match url_state {
            UrlState::Ready(_) => {
                return Ok(PollStatus::Ready {
                    download_url: tracked_download_url(serial_id, variant),
                })
            }
            UrlState::Errored => return Ok(PollStatus::Error),
            UrlState::Missing => {}
        }

        if variant == DownloadVariant::Bypass {
            if let UrlState::Ready(_) = serial.dlurl_state() {
                return Ok(PollStatus::Processing {
                    progress: serial.bypass_progress,
                });
            }
        }
        Ok(PollStatus::Queued)
    }

    /// Redeem a tracked URL: log the download (idempotently, keyed on the
    /// current episode) and return the raw upstream URL to redirect to.
    pub fn resolve_file(
        &self,
        serial_id: &str,
        variant: DownloadVariant,
        user_id: i64,
    ) -> Result<String, DownloadError> {
        let serial = self
            .serial_store
            .get_serial(serial_id)?
            .ok_or(DownloadError::SerialNotFound)?;

        let url_state = match variant {
            DownloadVariant::Original => serial.dlurl_state(),
            DownloadVariant::Bypass => serial.ytdl_state(),
        };
        let url = match url_state {
            UrlState::Ready(url) => url.to_string(),
            UrlState::Missing | UrlState::Errored => return Err(DownloadError::NotAvailable),
        };

        let logged =
            self.queue_store
                .record_download(serial_id, user_id, &serial.episode_date, variant)?;
        if logged {
            info!(
                "User {user_id} downloaded serial {serial_id} ({}) episode {}",
                variant.as_str(),
                serial.episode_date
            );
        }
        Ok(url)
    }

    /// Apply a fetch worker result to a serial. A successful ytdl URL resets
    /// the bypass progress counter, even over a progress value carried in the
    /// same patch.
    pub fn worker_update(&self, serial_id: &str, mut patch: SerialPatch) -> Result<bool> {
        if let Some(Some(ytdl)) = &patch.ytdl {
            if ytdl != WORKER_ERROR_URL {
                patch.bypass_progress = Some(0);
            }
        }
        self.serial_store.apply_patch(serial_id, &patch)
    }

    /// Register a serial (or a new episode of it) from the notification
    /// webhook.
    pub fn ingest_serial(
        &self,
        name: &str,
        platform_name: &str,
        url: &str,
        episode_date: &str,
    ) -> Result<UpsertOutcome> {
        let outcome = self
            .serial_store
            .upsert_serial(name, platform_name, url, episode_date)?;
        match &outcome {
            UpsertOutcome::Created(id) => info!("Registered new serial {id}"),
            UpsertOutcome::NewEpisode(id) => info!("New episode for serial {id}"),
        }
        Ok(outcome)
    }

    pub fn pending_batch(&self, limit: u32) -> Result<Vec<QueueJob>> {
        self.queue_store.pending_batch(limit)
    }

    pub fn set_job_status(
        &self,
        job_id: i64,
        status: JobStatus,
        progress: Option<i32>,
    ) -> Result<bool> {
        self.queue_store.set_job_status(job_id, status, progress)
    }

    /// Remove a user's queue jobs and download logs, used when an admin
    /// deletes the account.
    pub fn purge_user(&self, user_id: i64) -> Result<()> {
        let jobs = self.queue_store.delete_jobs_for_user(user_id)?;
        let logs = self.queue_store.delete_logs_for_user(user_id)?;
        if jobs > 0 || logs > 0 {
            info!("Purged {jobs} jobs and {logs} download logs for user {user_id}");
        }
        Ok(())
    }

    pub fn download_overview(&self) -> Result<DownloadOverview> {
        let (today_start, week_start) = stats_windows();
        self.queue_store.overview_counts(today_start, week_start)
    }

    pub fn downloads_by_serial(&self) -> Result<Vec<SerialDownloadCounts>> {
        let (today_start, week_start) = stats_windows();
        self.queue_store.counts_by_serial(today_start, week_start)
    }

    pub fn downloads_by_user(&self) -> Result<Vec<UserDownloadCounts>> {
        let (today_start, week_start) = stats_windows();
        self.queue_store.counts_by_user(today_start, week_start)
    }
}

/// Unix timestamps for the start of today and the start of the 7-day window,
/// with days bounded at local midnight in the stats timezone.
fn stats_windows() -> (i64, i64) {
    let offset = FixedOffset::east_opt(STATS_UTC_OFFSET_SECONDS)
        .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
    let now = Utc::now().with_timezone(&offset);
    let today_start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_local_timezone(offset))
        .and_then(|local| local.single())
        .map(|start| start.timestamp())
        .unwrap_or_else(|| now.timestamp());
    let week_start = today_start - Duration::days(7).num_seconds();
    (today_start, week_start)
}
