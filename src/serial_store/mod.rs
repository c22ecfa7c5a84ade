mod models;
mod schema;
mod store;

pub use models::{
    slugify, Platform, Serial, SerialPatch, SerialWithPlatform, UrlState, WORKER_ERROR_URL,
};
pub use store::{SerialStore, SqliteSerialStore, UpsertOutcome};
