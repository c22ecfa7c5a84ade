//! Data models for the serial catalog.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Sentinel written by the fetch worker into `dlurl`/`ytdl` when a download
/// permanently failed. An errored URL is terminal until the next episode
/// replaces it, it is never retried and never served as ready.
pub const WORKER_ERROR_URL: &str = "Error";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Platform {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

/// An episodic content entry. `id` is a slug derived from the name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Serial {
    pub id: String,
    pub platform_id: i64,
    pub name: String,
    pub url: String,
    pub dlurl: Option<String>,
    pub ytdl: Option<String>,
    pub bypass_progress: i32,
    #[serde(rename = "date")]
    pub episode_date: String,
}

/// Classification of a worker-managed URL field.
#[derive(Debug, PartialEq, Eq)]
pub enum UrlState<'a> {
    Missing,
    Errored,
    Ready(&'a str),
}

impl Serial {
    pub fn dlurl_state(&self) -> UrlState<'_> {
        url_state(&self.dlurl)
    }

    pub fn ytdl_state(&self) -> UrlState<'_> {
        url_state(&self.ytdl)
    }
}

fn url_state(url: &Option<String>) -> UrlState<'_> {
    match url.as_deref() {
        None => UrlState::Missing,
        Some(WORKER_ERROR_URL) => UrlState::Errored,
        Some(u) => UrlState::Ready(u),
    }
}

/// Partial update applied by the fetch worker. `None` leaves the field
/// untouched; for the URL fields `Some(None)` clears the stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SerialPatch {
    pub dlurl: Option<Option<String>>,
    pub ytdl: Option<Option<String>>,
    pub episode_date: Option<String>,
    pub bypass_progress: Option<i32>,
}

impl SerialPatch {
    pub fn is_empty(&self) -> bool {
        self.dlurl.is_none()
            && self.ytdl.is_none()
            && self.episode_date.is_none()
            && self.bypass_progress.is_none()
    }
}

/// A serial joined with its platform, plus the subscription timestamp when
/// listed from a user's dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct SerialWithPlatform {
    #[serde(flatten)]
    pub serial: Serial,
    pub platform_name: String,
    pub platform_slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_at: Option<i64>,
}

fn non_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s-]").unwrap())
}

fn separator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\s\-_]+").unwrap())
}

/// Derive a serial id slug from a display name: lowercase, special
/// characters stripped, whitespace and hyphen runs collapsed to a single
/// underscore.
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    let stripped = non_word_re().replace_all(&lowered, "");
    let joined = separator_re().replace_all(stripped.trim(), "_");
    joined.trim_matches('_').to_string()
}

/// Platform slugs are flattened harder: lowercase alphanumerics only.
pub fn platform_slug(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}
