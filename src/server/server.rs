use anyhow::Result;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::info;

use crate::download_manager::{DownloadManager, DownloadQueueStore};
use crate::serial_store::SerialStore;
use crate::user::UserStore;
use tower_http::services::ServeDir;

use axum::{
    extract::State, middleware, response::IntoResponse, routing::get, Json, Router,
};
use serde::Serialize;

use super::{
    admin_routes, auth_routes, download_routes, log_requests, serial_routes, session::Session,
    state::ServerState, worker_routes, ServerConfig,
};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub session_token: Option<String>,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(session: Option<Session>, State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        session_token: session.map(|s| s.token.0),
    };
    Json(stats)
}

pub fn make_app(
    config: ServerConfig,
    user_store: Arc<dyn UserStore>,
    serial_store: Arc<dyn SerialStore>,
    queue_store: Arc<dyn DownloadQueueStore>,
) -> Result<Router> {
    let download_manager = Arc::new(DownloadManager::new(serial_store.clone(), queue_store));
    let state = ServerState {
        config: config.clone(),
        start_time: Instant::now(),
        user_store,
        serial_store,
        download_manager,
        hash: env!("GIT_HASH").to_owned(),
    };

    let api_routes = auth_routes(state.clone())
        .merge(serial_routes(state.clone()))
        .merge(download_routes(state.clone()))
        .merge(worker_routes(state.clone()))
        .merge(admin_routes(state.clone()));

    let home_router: Router = match config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new()
            .route("/", get(home))
            .with_state(state.clone()),
    };

    let app = home_router
        .merge(api_routes)
        .layer(middleware::from_fn_with_state(state, log_requests));

    Ok(app)
}

pub async fn run_server(
    config: ServerConfig,
    user_store: Arc<dyn UserStore>,
    serial_store: Arc<dyn SerialStore>,
    queue_store: Arc<dyn DownloadQueueStore>,
) -> Result<()> {
    let port = config.port;
    let app = make_app(config, user_store, serial_store, queue_store)?;

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Listening on port {port}");

    Ok(axum::serve(listener, app).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download_manager::SqliteDownloadQueueStore;
    use crate::serial_store::SqliteSerialStore;
    use crate::user::SqliteUserStore;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt; // for `oneshot`

    fn test_app() -> Router {
        make_app(
            ServerConfig::default(),
            Arc::new(SqliteUserStore::in_memory().unwrap()),
            Arc::new(SqliteSerialStore::in_memory().unwrap()),
            Arc::new(SqliteDownloadQueueStore::in_memory().unwrap()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn responds_unauthorized_on_protected_routes() {
        let app = test_app();

        let protected_get_routes = vec![
            "/api/serials",
            "/api/serials/available",
            "/api/download/file?serialId=x&type=original",
            "/api/admin/users",
            "/api/admin/stats",
            "/api/admin/users/1/login-history",
        ];

        for route in protected_get_routes.into_iter() {
            let request = Request::builder().uri(route).body(Body::empty()).unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "route {route}");
        }

        let request = Request::builder()
            .method("POST")
            .uri("/api/download")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"serialId":"x","type":"original"}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn status_endpoint_reports_guest_without_session() {
        let app = test_app();
        let request = Request::builder()
            .uri("/api/auth/status")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "guest");
    }

    #[tokio::test]
    async fn status_check_is_unauthenticated() {
        let app = test_app();
        let request = Request::builder()
            .uri("/api/status/check?serialId=unknown")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        // Unknown serial, but the route itself must not demand a session.
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn worker_routes_require_api_key() {
        let app = test_app();

        let request = Request::builder()
            .method("POST")
            .uri("/api/webhook/serial")
            .header("content-type", "application/json")
            .body(Body::from(
                r#"{"serial_name":"S","platform":"P","url":"u"}"#,
            ))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .method("POST")
            .uri("/api/admin/update")
            .header("content-type", "application/json")
            .header("X-API-Key", "wrong")
            .body(Body::from(r#"{"id":"s"}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn uptime_formatting() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0d 00:00:00");
        assert_eq!(
            format_uptime(Duration::from_secs(86_400 + 3661)),
            "1d 01:01:01"
        );
    }
}
