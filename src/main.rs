use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use std::{fmt::Debug, path::PathBuf};
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tubekit_server::download_manager::SqliteDownloadQueueStore;
use tubekit_server::serial_store::SqliteSerialStore;
use tubekit_server::server::{run_server, RequestsLoggingLevel, ServerConfig};
use tubekit_server::user::{SqliteUserStore, UserStore};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite database file for user accounts and sessions.
    #[clap(value_parser = parse_path)]
    pub user_db: PathBuf,

    /// Path to the SQLite database file for the serial catalog.
    #[clap(value_parser = parse_path)]
    pub serial_db: PathBuf,

    /// Path to the SQLite database file for the download queue and logs.
    #[clap(value_parser = parse_path)]
    pub download_db: PathBuf,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 4000)]
    pub port: u16,

    /// Shared secret expected in the X-API-Key header of worker and webhook
    /// requests. Falls back to the WORKER_API_KEY env var.
    #[clap(long, env = "WORKER_API_KEY")]
    pub worker_api_key: String,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,

    /// Plan length in days granted on approval when not specified.
    #[clap(long, default_value_t = 3)]
    pub default_plan_days: i64,

    /// Number of days of inactivity after which sessions are pruned.
    /// Set to 0 to disable pruning.
    #[clap(long, default_value_t = 365)]
    pub session_retention_days: u64,

    /// Interval in hours between session pruning runs. Only used if
    /// session_retention_days > 0.
    #[clap(long, default_value_t = 24)]
    pub prune_interval_hours: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    info!("Opening user database at {:?}...", cli_args.user_db);
    let user_store = Arc::new(SqliteUserStore::new(&cli_args.user_db)?);

    info!("Opening serial database at {:?}...", cli_args.serial_db);
    let serial_store = Arc::new(SqliteSerialStore::new(&cli_args.serial_db)?);

    info!("Opening download database at {:?}...", cli_args.download_db);
    let queue_store = Arc::new(SqliteDownloadQueueStore::new(&cli_args.download_db)?);

    // Spawn background task for session pruning if enabled
    if cli_args.session_retention_days > 0 {
        let retention_days = cli_args.session_retention_days;
        let interval_hours = cli_args.prune_interval_hours;
        let pruning_user_store = user_store.clone();

        info!(
            "Session pruning enabled: retaining {} days, pruning every {} hours",
            retention_days, interval_hours
        );

        tokio::spawn(async move {
            let interval = Duration::from_secs(interval_hours * 60 * 60);
            let mut ticker = tokio::time::interval(interval);

            // Skip the first immediate tick, wait for the first interval
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
                    Ok(d) => d.as_secs() as i64,
                    Err(_) => continue,
                };
                let cutoff = now - (retention_days as i64 * 24 * 60 * 60);

                match pruning_user_store.prune_sessions_older_than(cutoff) {
                    Ok(count) => {
                        if count > 0 {
                            info!("Pruned {} stale sessions", count);
                        }
                    }
                    Err(e) => {
                        error!("Failed to prune sessions: {}", e);
                    }
                }
            }
        });
    }

    let config = ServerConfig {
        requests_logging_level: cli_args.logging_level,
        port: cli_args.port,
        worker_api_key: cli_args.worker_api_key,
        frontend_dir_path: cli_args.frontend_dir_path,
        default_plan_days: cli_args.default_plan_days,
    };

    info!("Ready to serve at port {}!", config.port);
    run_server(config, user_store, serial_store, queue_store).await
}
