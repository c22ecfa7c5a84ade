//! Registration, login, logout and session status.

use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::user::auth::{password, SessionTokenValue};
use crate::user::{DeviceInfo, UserStatus, UserStore};

use super::error::ApiError;
use super::session::{Session, COOKIE_SESSION_TOKEN_KEY};
use super::state::ServerState;

const SESSION_COOKIE_MAX_AGE_DAYS: i64 = 365;
const MIN_PASSWORD_LENGTH: usize = 6;

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap())
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RegisterBody {
    name: Option<String>,
    email: Option<String>,
    whatsapp: Option<String>,
    password: Option<String>,
    device_fingerprint: Option<String>,
    screen_resolution: Option<String>,
    timezone: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct LoginBody {
    email: Option<String>,
    password: Option<String>,
    device_fingerprint: Option<String>,
    screen_resolution: Option<String>,
    timezone: Option<String>,
}

fn device_info(
    headers: &HeaderMap,
    fingerprint: Option<String>,
    screen_resolution: Option<String>,
    timezone: Option<String>,
) -> DeviceInfo {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    DeviceInfo {
        fingerprint,
        ip: header_str("x-forwarded-for").unwrap_or_else(|| "unknown".to_owned()),
        user_agent: header_str("user-agent").unwrap_or_else(|| "unknown".to_owned()),
        screen_resolution,
        timezone,
    }
}

fn session_cookie(token: &SessionTokenValue) -> String {
    Cookie::build((COOKIE_SESSION_TOKEN_KEY, token.0.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(SESSION_COOKIE_MAX_AGE_DAYS))
        .build()
        .to_string()
}

fn expired_session_cookie() -> String {
    Cookie::build((COOKIE_SESSION_TOKEN_KEY, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .expires(time::OffsetDateTime::now_utc() - time::Duration::days(1))
        .build()
        .to_string()
}

fn json_with_cookie(cookie: String, body: serde_json::Value) -> Result<Response, ApiError> {
    let mut response = Json(body).into_response();
    let value = cookie
        .parse()
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Invalid cookie header: {e}")))?;
    response.headers_mut().insert(SET_COOKIE, value);
    Ok(response)
}

async fn register(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(body): Json<RegisterBody>,
) -> Result<Response, ApiError> {
    let (name, email, plain_password) = match (&body.name, &body.email, &body.password) {
        (Some(name), Some(email), Some(password))
            if !name.is_empty() && !email.is_empty() && !password.is_empty() =>
        {
            (name.clone(), email.clone(), password.clone())
        }
        _ => {
            return Err(ApiError::BadRequest(
                "Name, email and password required".to_owned(),
            ))
        }
    };
    if !email_re().is_match(&email) {
        return Err(ApiError::BadRequest("Invalid email".to_owned()));
    }
    if plain_password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::BadRequest(
            "Password must be at least 6 characters".to_owned(),
        ));
    }

    let password_hash = password::hash(&plain_password)?;
    let user = match state.user_store.create_user(
        &name,
        &email,
        body.whatsapp.as_deref().filter(|w| !w.is_empty()),
        &password_hash,
    )? {
        Some(user) => user,
        None => return Err(ApiError::BadRequest("Already registered".to_owned())),
    };
    debug!("Registered user {} ({})", user.id, user.email);

    let device = device_info(
        &headers,
        body.device_fingerprint,
        body.screen_resolution,
        body.timezone,
    );
    let token = state.user_store.create_session(user.id, &device)?;
    if let Err(e) = state.user_store.log_login(user.id, &device) {
        warn!("Failed to record login history for user {}: {e}", user.id);
    }

    json_with_cookie(session_cookie(&token), json!({ "success": true }))
}

async fn login(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(body): Json<LoginBody>,
) -> Result<Response, ApiError> {
    let (email, plain_password) = match (&body.email, &body.password) {
        (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
            (email.clone(), password.clone())
        }
        _ => return Err(ApiError::BadRequest("Email and password required".to_owned())),
    };

    let (user, stored_hash) = state
        .user_store
        .get_user_credentials(&email)?
        .ok_or(ApiError::Unauthorized)?;
    if !password::verify(&plain_password, &stored_hash)? {
        return Err(ApiError::Unauthorized);
    }

    // Single active session per user: logging in invalidates earlier ones.
    state.user_store.delete_user_sessions(user.id)?;

    let device = device_info(
        &headers,
        body.device_fingerprint,
        body.screen_resolution,
        body.timezone,
    );
    let token = state.user_store.create_session(user.id, &device)?;
    if let Err(e) = state.user_store.log_login(user.id, &device) {
        warn!("Failed to record login history for user {}: {e}", user.id);
    }

    json_with_cookie(
        session_cookie(&token),
        json!({ "success": true, "status": user.status }),
    )
}

async fn logout(
    State(state): State<ServerState>,
    session: Option<Session>,
) -> Result<Response, ApiError> {
    if let Some(session) = session {
        state.user_store.delete_session(&session.token)?;
    }
    json_with_cookie(expired_session_cookie(), json!({ "success": true }))
}

async fn status(
    State(_state): State<ServerState>,
    session: Option<Session>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = match session {
        Some(session) => session,
        None => return Ok(Json(json!({ "status": "guest" }))),
    };

    let user = &session.user;
    let user_payload = json!({
        "id": user.id,
        "name": user.name,
        "email": user.email,
        "whatsapp": user.whatsapp,
        "status": user.status,
    });
    let body = match user.status {
        UserStatus::Admin => json!({ "status": "admin", "user": user_payload }),
        UserStatus::Approved => match session.ensure_active() {
            Ok(()) => json!({ "status": "approved", "user": user_payload }),
            Err(_) => json!({ "status": "expired", "user": user_payload }),
        },
        UserStatus::Pending => json!({ "status": "pending" }),
        UserStatus::Rejected => json!({ "status": "guest" }),
    };
    Ok(Json(body))
}

pub fn auth_routes(state: ServerState) -> Router {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/status", get(status))
        .with_state(state)
}
