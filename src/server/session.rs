use super::error::ApiError;
use super::state::ServerState;
use crate::user::auth::SessionTokenValue;
use crate::user::{plan, User, UserStatus, UserStore};

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::Utc;
use tracing::debug;

pub const COOKIE_SESSION_TOKEN_KEY: &str = "tubekit_session";
pub const HEADER_SESSION_TOKEN_KEY: &str = "Authorization";

/// An authenticated request context. Holding a `Session` only proves the
/// token maps to a user; call [`Session::ensure_active`] or
/// [`Session::ensure_admin`] before serving gated content.
#[derive(Debug)]
pub struct Session {
    pub user: User,
    pub token: SessionTokenValue,
}

impl Session {
    /// Approved users pass while their plan is active, admins always pass.
    /// Pending and rejected accounts are indistinguishable from having no
    /// account at all.
    pub fn ensure_active(&self) -> Result<(), ApiError> {
        match self.user.status {
            UserStatus::Admin => Ok(()),
            UserStatus::Approved => {
                if plan::is_expired(self.user.plan_expiry, Utc::now().timestamp()) {
                    Err(ApiError::PlanExpired)
                } else {
                    Ok(())
                }
            }
            UserStatus::Pending | UserStatus::Rejected => Err(ApiError::Unauthorized),
        }
    }

    pub fn ensure_admin(&self) -> Result<(), ApiError> {
        match self.user.status {
            UserStatus::Admin => Ok(()),
            _ => Err(ApiError::Unauthorized),
        }
    }
}

async fn extract_session_token_from_cookies(
    parts: &mut Parts,
    ctx: &ServerState,
) -> Option<String> {
    CookieJar::from_request_parts(parts, &ctx)
        .await
        .ok()?
        .get(COOKIE_SESSION_TOKEN_KEY)
        .map(Cookie::value)
        .map(|s| s.to_string())
}

fn extract_session_token_from_headers(parts: &mut Parts) -> Option<String> {
    parts
        .headers
        .get(HEADER_SESSION_TOKEN_KEY)
        .map(|v| v.as_bytes().to_owned())
        .map(|b| String::from_utf8_lossy(&b).into_owned())
}

async fn extract_session_from_request_parts(
    parts: &mut Parts,
    ctx: &ServerState,
) -> Option<Session> {
    let token = match extract_session_token_from_cookies(parts, ctx)
        .await
        .or_else(|| extract_session_token_from_headers(parts))
    {
        None => {
            debug!("No token in cookies nor headers.");
            return None;
        }
        Some(x) => SessionTokenValue(x),
    };

    let user = match ctx.user_store.get_session_user(&token) {
        Ok(Some(user)) => user,
        Ok(None) => {
            debug!("Session token not found in database");
            return None;
        }
        Err(e) => {
            debug!("Failed to look up session token: {e}");
            return None;
        }
    };

    // Best effort, stale activity timestamps are not worth failing auth over.
    if let Err(e) = ctx.user_store.touch_session(&token) {
        debug!("Failed to update session activity timestamp: {e}");
    }

    Some(Session { user, token })
}

impl FromRequestParts<ServerState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        extract_session_from_request_parts(parts, ctx)
            .await
            .ok_or(ApiError::Unauthorized)
    }
}

impl FromRequestParts<ServerState> for Option<Session> {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        Ok(extract_session_from_request_parts(parts, ctx).await)
    }
}
