//! Serial catalog listing and per-user subscriptions.

use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

use crate::serial_store::{SerialStore, SerialWithPlatform};
use crate::user::UserStore;

use super::error::ApiError;
use super::session::Session;
use super::state::ServerState;

#[derive(Serialize)]
struct AvailableSerial {
    #[serde(flatten)]
    serial: SerialWithPlatform,
    #[serde(rename = "isAdded")]
    is_added: bool,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct AddSerialBody {
    serial_id: Option<String>,
}

/// The serials on the user's dashboard, most recently added first.
async fn list_user_serials(
    session: Session,
    State(state): State<ServerState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    session.ensure_active()?;
    let subscriptions: HashMap<String, i64> = state
        .user_store
        .user_serials(session.user.id)?
        .into_iter()
        .collect();

    let mut serials: Vec<SerialWithPlatform> = state
        .serial_store
        .list_all()?
        .into_iter()
        .filter_map(|mut entry| {
            let added_at = subscriptions.get(&entry.serial.id)?;
            entry.added_at = Some(*added_at);
            Some(entry)
        })
        .collect();
    serials.sort_by_key(|entry| std::cmp::Reverse(entry.added_at));

    Ok(Json(json!({ "serials": serials })))
}

/// Every serial in the catalog, flagged with whether the user already
/// subscribed to it.
async fn list_available_serials(
    session: Session,
    State(state): State<ServerState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    session.ensure_active()?;
    let subscriptions: HashMap<String, i64> = state
        .user_store
        .user_serials(session.user.id)?
        .into_iter()
        .collect();

    let serials: Vec<AvailableSerial> = state
        .serial_store
        .list_all()?
        .into_iter()
        .map(|entry| {
            let is_added = subscriptions.contains_key(&entry.serial.id);
            AvailableSerial {
                serial: entry,
                is_added,
            }
        })
        .collect();

    Ok(Json(json!({ "serials": serials })))
}

async fn add_serial(
    session: Session,
    State(state): State<ServerState>,
    Json(body): Json<AddSerialBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    session.ensure_active()?;
    let serial_id = body
        .serial_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing serial ID".to_owned()))?;

    if state.serial_store.get_serial(&serial_id)?.is_none() {
        return Err(ApiError::NotFound("Serial not found".to_owned()));
    }

    if !state.user_store.add_user_serial(session.user.id, &serial_id)? {
        return Err(ApiError::BadRequest(
            "Serial already added to your dashboard".to_owned(),
        ));
    }

    Ok(Json(json!({
        "success": true,
        "message": "Serial added to your dashboard"
    })))
}

async fn remove_serial(
    session: Session,
    State(state): State<ServerState>,
    Path(serial_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    session.ensure_active()?;
    if !state
        .user_store
        .remove_user_serial(session.user.id, &serial_id)?
    {
        return Err(ApiError::NotFound(
            "Serial not found in your list".to_owned(),
        ));
    }
    Ok(Json(json!({
        "success": true,
        "message": "Serial removed from your dashboard"
    })))
}

pub fn serial_routes(state: ServerState) -> Router {
    Router::new()
        .route("/api/serials", get(list_user_serials))
        .route("/api/serials/available", get(list_available_serials))
        .route("/api/serials/add", post(add_serial))
        .route("/api/serials/remove/{serial_id}", delete(remove_serial))
        .with_state(state)
}
