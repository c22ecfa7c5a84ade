mod manager;
mod models;
mod queue_store;
mod schema;

pub use manager::{DownloadError, DownloadManager};
pub use models::{
    tracked_download_url, Decision, DownloadOverview, DownloadVariant, EnqueueOutcome, JobStatus,
    PollStatus, QueueJob, SerialDownloadCounts, UserDownloadCounts,
};
pub use queue_store::{DownloadQueueStore, SqliteDownloadQueueStore};
