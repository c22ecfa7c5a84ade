//! End-to-end tests over the full router with in-memory stores.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;

use tubekit_server::download_manager::SqliteDownloadQueueStore;
use tubekit_server::serial_store::SqliteSerialStore;
use tubekit_server::server::{make_app, ServerConfig};
use tubekit_server::user::{SqliteUserStore, UserStatus, UserStore};

const API_KEY: &str = "test-worker-key";

struct TestServer {
    app: Router,
    user_store: Arc<SqliteUserStore>,
}

fn test_server() -> TestServer {
    let user_store = Arc::new(SqliteUserStore::in_memory().unwrap());
    let serial_store = Arc::new(SqliteSerialStore::in_memory().unwrap());
    let queue_store = Arc::new(SqliteDownloadQueueStore::in_memory().unwrap());
    let config = ServerConfig {
        worker_api_key: API_KEY.to_owned(),
        ..ServerConfig::default()
    };
    let app = make_app(config, user_store.clone(), serial_store, queue_store).unwrap();
    TestServer { app, user_store }
}

impl TestServer {
    async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
        api_key: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("tubekit_session={token}"));
        }
        if let Some(key) = api_key {
            builder = builder.header("X-API-Key", key);
        }
        let request = match body {
            Some(value) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(value.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None, token, None).await
    }

    async fn post(&self, uri: &str, body: Value, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body), token, None)
            .await
    }

    /// Register a user and return their session token from the cookie.
    async fn register(&self, name: &str, email: &str) -> String {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/auth/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "name": name, "email": email, "password": "secret123" }).to_string(),
            ))
            .unwrap();
        let response = self.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .expect("registration should set a session cookie")
            .to_str()
            .unwrap();
        cookie
            .split(';')
            .next()
            .unwrap()
            .strip_prefix("tubekit_session=")
            .unwrap()
            .to_string()
    }

    /// Register and approve a user with an active plan.
    async fn approved_user(&self, name: &str, email: &str) -> (i64, String) {
        let token = self.register(name, email).await;
        let user = self.user_store.get_user_by_email(email).unwrap().unwrap();
        self.user_store
            .set_user_status(user.id, UserStatus::Approved)
            .unwrap();
        self.user_store
            .set_plan_expiry(user.id, Some(Utc::now().timestamp() + 3600))
            .unwrap();
        (user.id, token)
    }

    async fn admin_user(&self, name: &str, email: &str) -> String {
        let token = self.register(name, email).await;
        let user = self.user_store.get_user_by_email(email).unwrap().unwrap();
        self.user_store
            .set_user_status(user.id, UserStatus::Admin)
            .unwrap();
        token
    }

    /// Push a serial through the webhook and return its id.
    async fn ingest_serial(&self, name: &str, date: &str) -> String {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/webhook/serial",
                Some(json!({
                    "serial_name": name,
                    "platform": "Hum TV",
                    "url": "https://example.com/page",
                    "date": date,
                })),
                None,
                Some(API_KEY),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body["serial"]["id"].as_str().unwrap().to_string()
    }

    async fn worker_update(&self, body: Value) {
        let (status, _) = self
            .request(
                Method::POST,
                "/api/admin/update",
                Some(body),
                None,
                Some(API_KEY),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn pending_user_cannot_download() {
    let server = test_server();
    let token = server.register("Pending", "pending@example.com").await;

    let (status, _) = server
        .post(
            "/api/download",
            json!({ "serialId": "whatever", "type": "original" }),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_plan_is_forbidden() {
    let server = test_server();
    let token = server.register("Lapsed", "lapsed@example.com").await;
    let user = server
        .user_store
        .get_user_by_email("lapsed@example.com")
        .unwrap()
        .unwrap();
    server
        .user_store
        .set_user_status(user.id, UserStatus::Approved)
        .unwrap();
    server
        .user_store
        .set_plan_expiry(user.id, Some(Utc::now().timestamp() - 10))
        .unwrap();

    let (status, body) = server.get("/api/serials", Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Plan expired");

    let (status, body) = server.get("/api/auth/status", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "expired");
}

#[tokio::test]
async fn full_download_flow() {
    let server = test_server();
    let (_user_id, token) = server.approved_user("Viewer", "viewer@example.com").await;
    let serial_id = server.ingest_serial("Kabhi Main Kabhi Tum", "27th August 2026").await;

    // Nothing fetched yet: the request queues a job.
    let (status, body) = server
        .post(
            "/api/download",
            json!({ "serialId": serial_id, "type": "original" }),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "queued");
    let job_id = body["jobId"].as_i64().unwrap();

    // A second request does not queue a second job.
    let (status, body) = server
        .post(
            "/api/download",
            json!({ "serialId": serial_id, "type": "bypass" }),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "queued");
    assert_eq!(body["message"], "Download already in queue");
    assert!(body.get("jobId").is_none());

    // The worker sees the job and claims it.
    let (status, body) = server
        .request(Method::GET, "/api/worker/queue", None, None, Some(API_KEY))
        .await;
    assert_eq!(status, StatusCode::OK);
    let jobs = body["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["id"].as_i64().unwrap(), job_id);
    assert_eq!(jobs[0]["serial_id"], serial_id.as_str());

    let (status, _) = server
        .request(
            Method::POST,
            &format!("/api/worker/queue/{job_id}"),
            Some(json!({ "status": "processing", "progress": 50 })),
            None,
            Some(API_KEY),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Worker publishes the original URL and completes the job.
    server
        .worker_update(json!({ "id": serial_id, "dlurl": "https://cdn.example.com/ep.mp4" }))
        .await;
    let (status, _) = server
        .request(
            Method::POST,
            &format!("/api/worker/queue/{job_id}"),
            Some(json!({ "status": "completed" })),
            None,
            Some(API_KEY),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Polling needs no session and reports ready with the tracked URL.
    let (status, body) = server
        .get(
            &format!("/api/status/check?serialId={serial_id}&type=original"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    let tracked_url = body["downloadUrl"].as_str().unwrap().to_string();
    assert!(tracked_url.starts_with("/api/download/file?"));

    // Admission now resolves ready too.
    let (status, body) = server
        .post(
            "/api/download",
            json!({ "serialId": serial_id, "type": "original" }),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");

    // Redeeming the tracked URL redirects to the upstream URL.
    let request = Request::builder()
        .uri(&tracked_url)
        .header(header::COOKIE, format!("tubekit_session={token}"))
        .body(Body::empty())
        .unwrap();
    let response = server.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "https://cdn.example.com/ep.mp4"
    );

    // Redemption without a session is rejected.
    let request = Request::builder()
        .uri(&tracked_url)
        .body(Body::empty())
        .unwrap();
    let response = server.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bypass_request_reports_processing_while_original_is_ready() {
    let server = test_server();
    let (_, token) = server.approved_user("Viewer", "viewer@example.com").await;
    let serial_id = server.ingest_serial("My Serial", "Today").await;

    server
        .worker_update(
            json!({ "id": serial_id, "dlurl": "https://cdn.example.com/ep.mp4", "progress": 42 }),
        )
        .await;

    let (status, body) = server
        .post(
            "/api/download",
            json!({ "serialId": serial_id, "type": "bypass" }),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "processing");
    assert_eq!(body["progress"], 42);

    // Once the bypass rendition lands, its progress resets and it is ready.
    server
        .worker_update(json!({ "id": serial_id, "ytdl": "https://cdn.example.com/ep-bypass.mp4" }))
        .await;
    let (status, body) = server
        .post(
            "/api/download",
            json!({ "serialId": serial_id, "type": "bypass" }),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn errored_download_is_reported_and_new_episode_resets_it() {
    let server = test_server();
    let serial_id = server.ingest_serial("My Serial", "Episode 1").await;

    server
        .worker_update(json!({ "id": serial_id, "dlurl": "Error" }))
        .await;
    let (status, body) = server
        .get(&format!("/api/status/check?serialId={serial_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "error");

    // A new episode of the same serial clears the errored URL.
    let same_id = server.ingest_serial("My Serial", "Episode 2").await;
    assert_eq!(same_id, serial_id);
    let (status, body) = server
        .get(&format!("/api/status/check?serialId={serial_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "queued");
}

#[tokio::test]
async fn subscriptions_drive_the_dashboard() {
    let server = test_server();
    let (_, token) = server.approved_user("Viewer", "viewer@example.com").await;
    let serial_a = server.ingest_serial("Serial A", "Today").await;
    let _serial_b = server.ingest_serial("Serial B", "Today").await;

    // Initially nothing on the dashboard, both available.
    let (status, body) = server.get("/api/serials", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["serials"].as_array().unwrap().len(), 0);

    let (_, body) = server.get("/api/serials/available", Some(&token)).await;
    let available = body["serials"].as_array().unwrap();
    assert_eq!(available.len(), 2);
    assert!(available.iter().all(|s| s["isAdded"] == false));

    let (status, _) = server
        .post("/api/serials/add", json!({ "serialId": serial_a }), Some(&token))
        .await;
    assert_eq!(status, StatusCode::OK);

    // Duplicate subscription is rejected.
    let (status, body) = server
        .post("/api/serials/add", json!({ "serialId": serial_a }), Some(&token))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("already"));

    let (_, body) = server.get("/api/serials", Some(&token)).await;
    let mine = body["serials"].as_array().unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0]["id"], serial_a.as_str());
    assert!(mine[0]["added_at"].is_i64());

    // Unsubscribe and the dashboard empties again.
    let (status, _) = server
        .request(
            Method::DELETE,
            &format!("/api/serials/remove/{serial_a}"),
            None,
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = server.get("/api/serials", Some(&token)).await;
    assert_eq!(body["serials"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn login_replaces_the_previous_session() {
    let server = test_server();
    let (_, first_token) = server.approved_user("Viewer", "viewer@example.com").await;

    let (status, body) = server
        .post(
            "/api/auth/login",
            json!({ "email": "viewer@example.com", "password": "secret123" }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "approved");

    // The first session no longer authenticates.
    let (status, body) = server.get("/api/auth/status", Some(&first_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "guest");
}

#[tokio::test]
async fn login_rejects_bad_credentials() {
    let server = test_server();
    server.register("Viewer", "viewer@example.com").await;

    let (status, _) = server
        .post(
            "/api/auth/login",
            json!({ "email": "viewer@example.com", "password": "wrong-password" }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = server
        .post(
            "/api/auth/login",
            json!({ "email": "nobody@example.com", "password": "secret123" }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_validates_input() {
    let server = test_server();

    let (status, body) = server
        .post(
            "/api/auth/register",
            json!({ "name": "A", "email": "not-an-email", "password": "secret123" }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid email");

    let (status, body) = server
        .post(
            "/api/auth/register",
            json!({ "name": "A", "email": "a@b.co", "password": "short" }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Password must be at least 6 characters");

    server.register("A", "a@b.co").await;
    let (status, body) = server
        .post(
            "/api/auth/register",
            json!({ "name": "B", "email": "a@b.co", "password": "secret123" }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Already registered");
}

#[tokio::test]
async fn admin_surface_moderates_users() {
    let server = test_server();
    let admin_token = server.admin_user("Admin", "admin@example.com").await;
    let viewer_token = server.register("Viewer", "viewer@example.com").await;
    let viewer = server
        .user_store
        .get_user_by_email("viewer@example.com")
        .unwrap()
        .unwrap();

    // A non-admin cannot touch the admin surface.
    let (status, _) = server.get("/api/admin/users", Some(&viewer_token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Approve with an explicit plan length.
    let (status, body) = server
        .post(
            &format!("/api/admin/users/{}/approve", viewer.id),
            json!({ "days": 7 }),
            Some(&admin_token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["days"], 7);

    let (status, body) = server.get("/api/auth/status", Some(&viewer_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "approved");

    // Users listing includes both accounts with zeroed download stats.
    let (status, body) = server.get("/api/admin/users", Some(&admin_token)).await;
    assert_eq!(status, StatusCode::OK);
    let users = body["users"].as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert!(users.iter().all(|u| u["total_downloads"] == 0));

    // Login history records the registration.
    let (status, body) = server
        .get(
            &format!("/api/admin/users/{}/login-history", viewer.id),
            Some(&admin_token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["history"].as_array().unwrap().len(), 1);

    // Extending the active plan is additive.
    let before = server
        .user_store
        .get_user(viewer.id)
        .unwrap()
        .unwrap()
        .plan_expiry
        .unwrap();
    let (status, _) = server
        .post(
            &format!("/api/admin/users/{}/extend-plan", viewer.id),
            json!({ "days": 2 }),
            Some(&admin_token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let after = server
        .user_store
        .get_user(viewer.id)
        .unwrap()
        .unwrap()
        .plan_expiry
        .unwrap();
    assert_eq!(after, before + 2 * 24 * 3600);

    // Deleting the user invalidates their session.
    let (status, _) = server
        .request(
            Method::DELETE,
            &format!("/api/admin/users/{}", viewer.id),
            None,
            Some(&admin_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = server.get("/api/auth/status", Some(&viewer_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "guest");
}

#[tokio::test]
async fn admin_stats_count_redeemed_downloads() {
    let server = test_server();
    let admin_token = server.admin_user("Admin", "admin@example.com").await;
    let (user_id, token) = server.approved_user("Viewer", "viewer@example.com").await;
    let serial_id = server.ingest_serial("My Serial", "Today").await;
    let quiet_id = server.ingest_serial("Quiet Serial", "Today").await;
    server
        .worker_update(json!({ "id": serial_id, "dlurl": "https://cdn.example.com/ep.mp4" }))
        .await;

    // Redeem twice: the log is idempotent per episode.
    for _ in 0..2 {
        let request = Request::builder()
            .uri(format!(
                "/api/download/file?serialId={serial_id}&type=original"
            ))
            .header(header::COOKIE, format!("tubekit_session={token}"))
            .body(Body::empty())
            .unwrap();
        let response = server.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
    }

    let (status, body) = server.get("/api/admin/stats", Some(&admin_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["overview"]["total_downloads"], 1);
    // Every catalog serial is listed, downloaded or not, with its name and
    // platform attached.
    let serials = body["serials"].as_array().unwrap();
    assert_eq!(serials.len(), 2);
    assert_eq!(serials[0]["serial_id"], serial_id.as_str());
    assert_eq!(serials[0]["name"], "My Serial");
    assert_eq!(serials[0]["total_downloads"], 1);
    let quiet = serials
        .iter()
        .find(|s| s["serial_id"] == quiet_id.as_str())
        .unwrap();
    assert_eq!(quiet["name"], "Quiet Serial");
    assert!(quiet["platform_name"].is_string());
    assert_eq!(quiet["total_downloads"], 0);
    let users = body["users"].as_array().unwrap();
    let viewer = users
        .iter()
        .find(|u| u["id"].as_i64() == Some(user_id))
        .unwrap();
    assert_eq!(viewer["total_downloads"], 1);
}

#[tokio::test]
async fn logout_clears_the_session() {
    let server = test_server();
    let (_, token) = server.approved_user("Viewer", "viewer@example.com").await;

    let (status, _) = server
        .request(Method::POST, "/api/auth/logout", None, Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server.get("/api/auth/status", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "guest");
}
