use super::RequestsLoggingLevel;

#[derive(Clone)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    /// Shared secret for the fetch worker and the notification webhook,
    /// checked against the X-API-Key header.
    pub worker_api_key: String,
    pub frontend_dir_path: Option<String>,
    /// Plan length granted on approval when the admin does not specify one.
    pub default_plan_days: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            port: 4000,
            worker_api_key: "worker-key".to_owned(),
            frontend_dir_path: None,
            default_plan_days: 3,
        }
    }
}
