//! Endpoints for the external fetch worker and the new-episode webhook,
//! authenticated with a shared X-API-Key header instead of a session.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::download_manager::JobStatus;
use crate::serial_store::SerialPatch;

use super::error::ApiError;
use super::state::ServerState;

pub const HEADER_API_KEY: &str = "X-API-Key";

const DEFAULT_PENDING_BATCH_SIZE: u32 = 10;

fn verify_api_key(headers: &HeaderMap, state: &ServerState) -> Result<(), ApiError> {
    let provided = headers
        .get(HEADER_API_KEY)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if provided.is_empty() || provided != state.config.worker_api_key {
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}

#[derive(Deserialize, Debug)]
struct WorkerUpdateBody {
    id: Option<String>,
    dlurl: Option<String>,
    ytdl: Option<String>,
    date: Option<String>,
    progress: Option<i32>,
}

#[derive(Deserialize, Debug)]
struct WebhookSerialBody {
    serial_name: Option<String>,
    platform: Option<String>,
    url: Option<String>,
    date: Option<String>,
}

#[derive(Deserialize, Debug)]
struct PendingBatchQuery {
    limit: Option<u32>,
}

#[derive(Deserialize, Debug)]
struct JobUpdateBody {
    status: JobStatus,
    progress: Option<i32>,
}

/// Partial serial update from the fetch worker. Responds success even when
/// the serial is unknown, the worker has nothing useful to do with a failure
/// here.
async fn update_serial(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(body): Json<WorkerUpdateBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    verify_api_key(&headers, &state)?;
    let serial_id = body
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing serial ID".to_owned()))?;

    let patch = SerialPatch {
        dlurl: body.dlurl.map(Some),
        ytdl: body.ytdl.map(Some),
        episode_date: body.date,
        bypass_progress: body.progress,
    };
    state.download_manager.worker_update(&serial_id, patch)?;

    Ok(Json(json!({
        "success": true,
        "message": "Serial updated successfully"
    })))
}

async fn webhook_serial(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(body): Json<WebhookSerialBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    verify_api_key(&headers, &state)?;
    let (name, platform, url) = match (body.serial_name, body.platform, body.url) {
        (Some(name), Some(platform), Some(url))
            if !name.is_empty() && !platform.is_empty() && !url.is_empty() =>
        {
            (name, platform, url)
        }
        _ => return Err(ApiError::BadRequest("Missing required fields".to_owned())),
    };
    let episode_date = body.date.filter(|d| !d.is_empty());

    let outcome = state.download_manager.ingest_serial(
        &name,
        &platform,
        &url,
        episode_date.as_deref().unwrap_or("Unknown"),
    )?;
    let serial = state
        .serial_store
        .get_serial(outcome.serial_id())?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("Upserted serial disappeared")))?;
    let platform = state
        .serial_store
        .get_platform(serial.platform_id)?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("Serial has no platform")))?;

    Ok(Json(json!({
        "success": true,
        "message": "Serial processed successfully",
        "serial": {
            "id": serial.id,
            "name": serial.name,
            "platform": platform.name,
        }
    })))
}

/// Oldest queued jobs for the worker to pick up.
async fn pending_jobs(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Query(query): Query<PendingBatchQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    verify_api_key(&headers, &state)?;
    let limit = query.limit.unwrap_or(DEFAULT_PENDING_BATCH_SIZE);
    let jobs = state.download_manager.pending_batch(limit)?;
    Ok(Json(json!({ "jobs": jobs })))
}

async fn update_job(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Path(job_id): Path<i64>,
    Json(body): Json<JobUpdateBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    verify_api_key(&headers, &state)?;
    if !state
        .download_manager
        .set_job_status(job_id, body.status, body.progress)?
    {
        return Err(ApiError::NotFound("Job not found".to_owned()));
    }
    Ok(Json(json!({ "success": true })))
}

pub fn worker_routes(state: ServerState) -> Router {
    Router::new()
        .route("/api/admin/update", post(update_serial))
        .route("/api/webhook/serial", post(webhook_serial))
        .route("/api/worker/queue", get(pending_jobs))
        .route("/api/worker/queue/{job_id}", post(update_job))
        .with_state(state)
}
