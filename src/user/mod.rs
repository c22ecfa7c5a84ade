pub mod auth;
pub mod plan;
mod schema;
mod sqlite_user_store;
pub mod user_models;
mod user_store;

pub use auth::SessionTokenValue;
pub use sqlite_user_store::SqliteUserStore;
pub use user_models::{DeviceInfo, LoginRecord, User, UserStatus};
pub use user_store::UserStore;
