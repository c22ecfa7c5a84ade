//! TubeKit Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod download_manager;
pub mod serial_store;
pub mod server;
pub mod sqlite_persistence;
pub mod user;

// Re-export commonly used types for convenience
pub use download_manager::{DownloadManager, SqliteDownloadQueueStore};
pub use serial_store::{SerialStore, SqliteSerialStore};
pub use server::{make_app, run_server, RequestsLoggingLevel, ServerConfig};
pub use user::{SqliteUserStore, UserStore};
