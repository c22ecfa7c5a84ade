use axum::extract::FromRef;

use crate::download_manager::DownloadManager;
use crate::serial_store::SerialStore;
use crate::user::UserStore;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedUserStore = Arc<dyn UserStore>;
pub type GuardedSerialStore = Arc<dyn SerialStore>;
pub type GuardedDownloadManager = Arc<DownloadManager>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub user_store: GuardedUserStore,
    pub serial_store: GuardedSerialStore,
    pub download_manager: GuardedDownloadManager,
    pub hash: String,
}

impl FromRef<ServerState> for GuardedUserStore {
    fn from_ref(input: &ServerState) -> Self {
        input.user_store.clone()
    }
}

impl FromRef<ServerState> for GuardedSerialStore {
    fn from_ref(input: &ServerState) -> Self {
        input.serial_store.clone()
    }
}

impl FromRef<ServerState> for GuardedDownloadManager {
    fn from_ref(input: &ServerState) -> Self {
        input.download_manager.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
