//! User store trait.

use anyhow::Result;

use super::auth::SessionTokenValue;
use super::user_models::{DeviceInfo, LoginRecord, User, UserStatus};

pub trait UserStore: Send + Sync {
    /// Create a pending user. Returns `None` when the email is already
    /// registered (unique constraint).
    fn create_user(
        &self,
        name: &str,
        email: &str,
        whatsapp: Option<&str>,
        password_hash: &str,
    ) -> Result<Option<User>>;

    fn get_user(&self, user_id: i64) -> Result<Option<User>>;

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// The user and their stored password hash, for login verification.
    fn get_user_credentials(&self, email: &str) -> Result<Option<(User, String)>>;

    /// All users, newest first.
    fn list_users(&self) -> Result<Vec<User>>;

    fn set_user_status(&self, user_id: i64, status: UserStatus) -> Result<bool>;

    fn set_plan_expiry(&self, user_id: i64, plan_expiry: Option<i64>) -> Result<bool>;

    fn set_whatsapp(&self, user_id: i64, whatsapp: &str) -> Result<bool>;

    fn set_wa_noti(&self, user_id: i64, enabled: bool) -> Result<bool>;

    /// Delete a user. Sessions, login history and subscriptions in this
    /// database cascade.
    fn delete_user(&self, user_id: i64) -> Result<bool>;

    fn create_session(&self, user_id: i64, device: &DeviceInfo) -> Result<SessionTokenValue>;

    /// The user owning a session token, if any.
    fn get_session_user(&self, token: &SessionTokenValue) -> Result<Option<User>>;

    /// Bump the session's last-active timestamp.
    fn touch_session(&self, token: &SessionTokenValue) -> Result<()>;

    fn delete_session(&self, token: &SessionTokenValue) -> Result<bool>;

    fn delete_user_sessions(&self, user_id: i64) -> Result<usize>;

    /// Drop sessions whose last activity is older than the cutoff. Returns
    /// the number of sessions removed.
    fn prune_sessions_older_than(&self, cutoff: i64) -> Result<usize>;

    fn log_login(&self, user_id: i64, device: &DeviceInfo) -> Result<()>;

    /// Login history for a user, newest first.
    fn login_history(&self, user_id: i64) -> Result<Vec<LoginRecord>>;

    /// Subscribe the user to a serial. Returns false when already subscribed.
    fn add_user_serial(&self, user_id: i64, serial_id: &str) -> Result<bool>;

    fn remove_user_serial(&self, user_id: i64, serial_id: &str) -> Result<bool>;

    /// Subscribed serial ids with subscription timestamps, newest first.
    fn user_serials(&self, user_id: i64) -> Result<Vec<(String, i64)>>;

    fn is_user_serial(&self, user_id: i64, serial_id: &str) -> Result<bool>;
}
