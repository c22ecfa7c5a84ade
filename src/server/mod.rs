mod admin_routes;
mod auth_routes;
pub mod config;
mod download_routes;
mod error;
mod http_layers;
mod serial_routes;
#[allow(clippy::module_inception)]
pub mod server;
pub mod session;
pub mod state;
mod worker_routes;

use admin_routes::admin_routes;
use auth_routes::auth_routes;
pub use config::ServerConfig;
use download_routes::download_routes;
pub use error::ApiError;
pub use http_layers::*;
use serial_routes::serial_routes;
pub use server::{make_app, run_server};
use worker_routes::worker_routes;
