//! Session-authenticated admin surface: user moderation, plans and
//! download statistics.

use axum::{
    extract::{Path, State},
    routing::{delete, get, patch, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tracing::info;

use crate::serial_store::SerialStore;
use crate::user::{plan, User, UserStatus, UserStore};

use super::error::ApiError;
use super::session::Session;
use super::state::ServerState;

#[derive(Serialize)]
struct UserWithStats {
    #[serde(flatten)]
    user: User,
    total_downloads: i64,
    downloads_today: i64,
    downloads_last_week: i64,
}

#[derive(Serialize)]
struct SerialWithStats {
    serial_id: String,
    name: String,
    platform_name: String,
    total_downloads: i64,
    downloads_today: i64,
    downloads_last_week: i64,
}

#[derive(Deserialize, Debug)]
struct ApproveBody {
    days: Option<i64>,
}

#[derive(Deserialize, Debug)]
struct ExtendPlanBody {
    days: Option<i64>,
}

#[derive(Deserialize, Debug)]
struct WhatsappBody {
    whatsapp: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct WaNotiBody {
    wa_noti: Option<bool>,
}

fn users_with_stats(state: &ServerState) -> Result<Vec<UserWithStats>, ApiError> {
    let counts: HashMap<i64, (i64, i64, i64)> = state
        .download_manager
        .downloads_by_user()?
        .into_iter()
        .map(|c| {
            (
                c.user_id,
                (c.total_downloads, c.downloads_today, c.downloads_last_week),
            )
        })
        .collect();

    let users = state
        .user_store
        .list_users()?
        .into_iter()
        .map(|user| {
            let (total, today, last_week) = counts.get(&user.id).copied().unwrap_or_default();
            UserWithStats {
                user,
                total_downloads: total,
                downloads_today: today,
                downloads_last_week: last_week,
            }
        })
        .collect();
    Ok(users)
}

/// Per-serial download counts over the whole catalog, so serials nobody has
/// downloaded yet still show up with zeroes.
fn serials_with_stats(state: &ServerState) -> Result<Vec<SerialWithStats>, ApiError> {
    let counts: HashMap<String, (i64, i64, i64)> = state
        .download_manager
        .downloads_by_serial()?
        .into_iter()
        .map(|c| {
            (
                c.serial_id,
                (c.total_downloads, c.downloads_today, c.downloads_last_week),
            )
        })
        .collect();

    let mut serials: Vec<SerialWithStats> = state
        .serial_store
        .list_all()?
        .into_iter()
        .map(|entry| {
            let (total, today, last_week) = counts
                .get(&entry.serial.id)
                .copied()
                .unwrap_or_default();
            SerialWithStats {
                serial_id: entry.serial.id,
                name: entry.serial.name,
                platform_name: entry.platform_name,
                total_downloads: total,
                downloads_today: today,
                downloads_last_week: last_week,
            }
        })
        .collect();
    serials.sort_by(|a, b| {
        b.total_downloads
            .cmp(&a.total_downloads)
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(serials)
}

async fn list_users(
    session: Session,
    State(state): State<ServerState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    session.ensure_admin()?;
    Ok(Json(json!({ "users": users_with_stats(&state)? })))
}

async fn login_history(
    session: Session,
    State(state): State<ServerState>,
    Path(user_id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    session.ensure_admin()?;
    let history = state.user_store.login_history(user_id)?;
    Ok(Json(json!({ "history": history })))
}

async fn stats(
    session: Session,
    State(state): State<ServerState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    session.ensure_admin()?;
    let overview = state.download_manager.download_overview()?;
    let serials = serials_with_stats(&state)?;
    let users = users_with_stats(&state)?;
    Ok(Json(json!({
        "overview": overview,
        "serials": serials,
        "users": users,
    })))
}

/// Approval always (re)starts the plan from now, even when the user had a
/// leftover expiry from a previous approval.
async fn approve_user(
    session: Session,
    State(state): State<ServerState>,
    Path(user_id): Path<i64>,
    Json(body): Json<ApproveBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    session.ensure_admin()?;
    let days = body
        .days
        .filter(|d| *d > 0)
        .unwrap_or(state.config.default_plan_days);

    if !state.user_store.set_user_status(user_id, UserStatus::Approved)? {
        return Err(ApiError::NotFound("User not found".to_owned()));
    }
    let expiry = plan::extend(None, days, Utc::now().timestamp());
    state.user_store.set_plan_expiry(user_id, Some(expiry))?;
    info!("Approved user {user_id} with a {days}-day plan");

    Ok(Json(json!({ "success": true, "userId": user_id, "days": days })))
}

async fn reject_user(
    session: Session,
    State(state): State<ServerState>,
    Path(user_id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    session.ensure_admin()?;
    if !state.user_store.set_user_status(user_id, UserStatus::Rejected)? {
        return Err(ApiError::NotFound("User not found".to_owned()));
    }
    info!("Rejected user {user_id}");
    Ok(Json(json!({ "success": true, "userId": user_id })))
}

/// Full account removal. Sessions, login history and subscriptions cascade
/// inside the user database; queue jobs and download logs live in the
/// downloads database and are purged explicitly.
async fn delete_user(
    session: Session,
    State(state): State<ServerState>,
    Path(user_id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    session.ensure_admin()?;
    state.download_manager.purge_user(user_id)?;
    if !state.user_store.delete_user(user_id)? {
        return Err(ApiError::NotFound("User not found".to_owned()));
    }
    info!("Deleted user {user_id}");
    Ok(Json(json!({ "success": true, "userId": user_id })))
}

async fn extend_plan(
    session: Session,
    State(state): State<ServerState>,
    Path(user_id): Path<i64>,
    Json(body): Json<ExtendPlanBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    session.ensure_admin()?;
    let days = body
        .days
        .filter(|d| *d > 0)
        .ok_or_else(|| ApiError::BadRequest("Missing or invalid days field".to_owned()))?;

    let user = state
        .user_store
        .get_user(user_id)?
        .ok_or_else(|| ApiError::NotFound("User not found".to_owned()))?;
    let expiry = plan::extend(user.plan_expiry, days, Utc::now().timestamp());
    state.user_store.set_plan_expiry(user_id, Some(expiry))?;
    info!("Extended plan of user {user_id} by {days} days");

    Ok(Json(json!({ "success": true, "userId": user_id, "days": days })))
}

async fn update_whatsapp(
    session: Session,
    State(state): State<ServerState>,
    Path(user_id): Path<i64>,
    Json(body): Json<WhatsappBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    session.ensure_admin()?;
    let whatsapp = body
        .whatsapp
        .ok_or_else(|| ApiError::BadRequest("Missing whatsapp field".to_owned()))?;
    if !state.user_store.set_whatsapp(user_id, &whatsapp)? {
        return Err(ApiError::NotFound("User not found".to_owned()));
    }
    Ok(Json(json!({
        "success": true,
        "userId": user_id,
        "whatsapp": whatsapp
    })))
}

async fn update_wa_noti(
    session: Session,
    State(state): State<ServerState>,
    Path(user_id): Path<i64>,
    Json(body): Json<WaNotiBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    session.ensure_admin()?;
    let enabled = body
        .wa_noti
        .ok_or_else(|| ApiError::BadRequest("Missing waNoti field".to_owned()))?;
    if !state.user_store.set_wa_noti(user_id, enabled)? {
        return Err(ApiError::NotFound("User not found".to_owned()));
    }
    Ok(Json(json!({
        "success": true,
        "userId": user_id,
        "waNoti": enabled
    })))
}

pub fn admin_routes(state: ServerState) -> Router {
    Router::new()
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/{id}/login-history", get(login_history))
        .route("/api/admin/stats", get(stats))
        .route("/api/admin/users/{id}/approve", post(approve_user))
        .route("/api/admin/users/{id}/reject", post(reject_user))
        .route("/api/admin/users/{id}", delete(delete_user))
        .route("/api/admin/users/{id}/extend-plan", post(extend_plan))
        .route("/api/admin/users/{id}/whatsapp", patch(update_whatsapp))
        .route("/api/admin/users/{id}/wa-noti", patch(update_wa_noti))
        .with_state(state)
}
