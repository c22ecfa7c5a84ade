//! User account models.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Pending,
    Approved,
    Rejected,
    Admin,
}

impl UserStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            UserStatus::Pending => "pending",
            UserStatus::Approved => "approved",
            UserStatus::Rejected => "rejected",
            UserStatus::Admin => "admin",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(UserStatus::Pending),
            "approved" => Some(UserStatus::Approved),
            "rejected" => Some(UserStatus::Rejected),
            "admin" => Some(UserStatus::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub whatsapp: Option<String>,
    pub status: UserStatus,
    pub wa_noti: bool,
    pub plan_expiry: Option<i64>,
    pub created_at: i64,
}

/// Client-supplied device descriptors stored verbatim with sessions and
/// login history. The server never computes fingerprints itself.
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    pub fingerprint: Option<String>,
    pub ip: String,
    pub user_agent: String,
    pub screen_resolution: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRecord {
    pub id: i64,
    pub user_id: i64,
    pub fingerprint: Option<String>,
    pub ip: String,
    pub user_agent: String,
    pub screen_resolution: Option<String>,
    pub timezone: Option<String>,
    pub logged_in_at: i64,
}
