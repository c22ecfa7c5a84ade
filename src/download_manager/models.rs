//! Data models for the download queue and admission flow.

use serde::{Deserialize, Serialize};

/// Which rendition of an episode is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadVariant {
    Original,
    Bypass,
}

impl DownloadVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadVariant::Original => "original",
            DownloadVariant::Bypass => "bypass",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "original" => Some(DownloadVariant::Original),
            "bypass" => Some(DownloadVariant::Bypass),
            _ => None,
        }
    }
}

/// Status of a queued fetch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed, // terminal
    Failed,    // terminal
}

impl JobStatus {
    /// Terminal jobs do not count against the one-active-job-per-serial
    /// invariant.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_db_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueJob {
    pub id: i64,
    pub serial_id: String,
    pub user_id: i64,
    #[serde(rename = "type")]
    pub variant: DownloadVariant,
    pub status: JobStatus,
    pub progress: i32,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

/// Result of the atomic check-then-insert on the queue.
#[derive(Debug)]
pub enum EnqueueOutcome {
    Created(i64),
    AlreadyActive(QueueJob),
}

/// Admission decision for an authenticated download request.
#[derive(Debug, PartialEq, Eq)]
pub enum Decision {
    /// The requested rendition is available now, redeem via the tracked URL.
    Ready { download_url: String },
    /// Bypass was requested, the original is fetched and the bypass
    /// rendition is still being produced.
    Processing { progress: i32 },
    /// Another job for this serial is already queued or running.
    AlreadyQueued,
    /// A new job was inserted.
    Queued { job_id: i64 },
}

/// Unauthenticated polling outcome.
#[derive(Debug, PartialEq, Eq)]
pub enum PollStatus {
    Ready { download_url: String },
    Error,
    Processing { progress: i32 },
    Queued,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadOverview {
    pub total_downloads: i64,
    pub downloads_today: i64,
    pub downloads_last_week: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SerialDownloadCounts {
    pub serial_id: String,
    pub total_downloads: i64,
    pub downloads_today: i64,
    pub downloads_last_week: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserDownloadCounts {
    pub user_id: i64,
    pub total_downloads: i64,
    pub downloads_today: i64,
    pub downloads_last_week: i64,
}

/// Relative redemption URL handed to clients instead of the raw upstream
/// URL, so every download passes through the logging redirect.
pub fn tracked_download_url(serial_id: &str, variant: DownloadVariant) -> String {
    format!(
        "/api/download/file?serialId={}&type={}",
        urlencoding::encode(serial_id),
        urlencoding::encode(variant.as_str())
    )
}
