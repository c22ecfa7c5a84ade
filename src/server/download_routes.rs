//! Download admission, unauthenticated status polling and tracked-URL
//! redemption.

use axum::{
    extract::{Query, State},
    http::{header::LOCATION, HeaderValue, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::download_manager::{Decision, DownloadVariant, PollStatus};

use super::error::ApiError;
use super::session::Session;
use super::state::ServerState;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct DownloadRequestBody {
    serial_id: Option<String>,
    #[serde(rename = "type")]
    variant: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct StatusCheckQuery {
    serial_id: Option<String>,
    #[serde(rename = "type")]
    variant: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct FileQuery {
    serial_id: Option<String>,
    #[serde(rename = "type")]
    variant: Option<String>,
}

async fn request_download(
    session: Session,
    State(state): State<ServerState>,
    Json(body): Json<DownloadRequestBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    session.ensure_active()?;
    let (serial_id, variant_str) = match (body.serial_id, body.variant) {
        (Some(id), Some(variant)) if !id.is_empty() && !variant.is_empty() => (id, variant),
        _ => return Err(ApiError::BadRequest("Missing parameters".to_owned())),
    };
    let variant = DownloadVariant::from_str(&variant_str)
        .ok_or_else(|| ApiError::BadRequest("Invalid download type".to_owned()))?;

    let decision = state
        .download_manager
        .request_download(&serial_id, session.user.id, variant)?;

    let body = match decision {
        Decision::Ready { download_url } => json!({
            "status": "ready",
            "downloadUrl": download_url,
        }),
        Decision::Processing { progress } => json!({
            "status": "processing",
            "progress": progress,
            "requestedType": variant,
            "message": "Bypass version is being processed",
        }),
        Decision::AlreadyQueued => json!({
            "status": "queued",
            "requestedType": variant,
            "message": "Download already in queue",
        }),
        Decision::Queued { job_id } => json!({
            "status": "queued",
            "jobId": job_id,
            "requestedType": variant,
            "message": "Added to download queue",
        }),
    };
    Ok(Json(body))
}

/// Polled by the dashboard without a session so expired users can still see
/// availability.
async fn check_status(
    State(state): State<ServerState>,
    Query(query): Query<StatusCheckQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let serial_id = query
        .serial_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing serialId".to_owned()))?;
    let variant = match query.variant.as_deref() {
        None | Some("") => DownloadVariant::Original,
        Some(s) => DownloadVariant::from_str(s)
            .ok_or_else(|| ApiError::BadRequest("Invalid download type".to_owned()))?,
    };

    let body = match state.download_manager.check_status(&serial_id, variant)? {
        PollStatus::Ready { download_url } => json!({
            "status": "ready",
            "downloadUrl": download_url,
        }),
        PollStatus::Error => json!({
            "status": "error",
            "message": "Download failed",
        }),
        PollStatus::Processing { progress } => json!({
            "status": "processing",
            "progress": progress,
        }),
        PollStatus::Queued => json!({
            "status": "queued",
            "progress": 0,
        }),
    };
    Ok(Json(body))
}

/// Tracked-URL redemption: logs the download and hands the client a 302 to
/// the upstream URL.
async fn download_file(
    session: Session,
    State(state): State<ServerState>,
    Query(query): Query<FileQuery>,
) -> Result<Response, ApiError> {
    session.ensure_active()?;
    let serial_id = query
        .serial_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing serialId".to_owned()))?;
    // Anything that is not explicitly bypass falls back to original.
    let variant = match query.variant.as_deref() {
        Some("bypass") => DownloadVariant::Bypass,
        _ => DownloadVariant::Original,
    };

    let target_url =
        state
            .download_manager
            .resolve_file(&serial_id, variant, session.user.id)?;

    // Plain 302 so download managers follow it with the original method.
    let location = HeaderValue::from_str(&target_url)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Invalid redirect target: {e}")))?;
    let mut response = Response::new(axum::body::Body::empty());
    *response.status_mut() = StatusCode::FOUND;
    response.headers_mut().insert(LOCATION, location);
    Ok(response)
}

pub fn download_routes(state: ServerState) -> Router {
    Router::new()
        .route("/api/download", post(request_download))
        .route("/api/status/check", get(check_status))
        .route("/api/download/file", get(download_file))
        .with_state(state)
}
