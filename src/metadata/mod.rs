//! Video metadata via yt-dlp.
//!
//! Metadata is supplementary: a permanent failure here is recorded as a
//! provenance gap, never a reason to abort transcript acquisition.

use serde::Serialize;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::config::Config;
use crate::resolver::watch_url;
use crate::utils::with_retries;
use crate::{AcquireError, Result};

/// Title, channel, publish date and duration for a video.
///
/// Fields are `None` when the provider could not supply them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    pub title: Option<String>,
    pub channel: Option<String>,
    pub publish_date: Option<String>,
    pub duration_seconds: Option<f64>,
    pub description: Option<String>,
    pub url: String,
}

impl Metadata {
    /// Null-field metadata for a video whose details could not be fetched.
    pub fn unavailable(video_id: &str) -> Self {
        Self {
            title: None,
            channel: None,
            publish_date: None,
            duration_seconds: None,
            description: None,
            url: watch_url(video_id),
        }
    }
}

/// Fetches metadata with bounded retry on transient provider failures.
pub struct MetadataFetcher {
    yt_dlp: String,
    timeout: Duration,
    retries: u32,
    retry_base: Duration,
}

impl MetadataFetcher {
    pub fn new(config: &Config) -> Self {
        Self {
            yt_dlp: config.tools.yt_dlp.clone(),
            timeout: config.call_timeout(),
            retries: config.retries,
            retry_base: config.retry_base(),
        }
    }

    /// Fetch metadata for a video ID.
    ///
    /// Transient failures are retried with doubling backoff; permanent
    /// failures (private, removed) surface as `MetadataUnavailable`.
    pub async fn fetch(&self, video_id: &str) -> Result<Metadata> {
        tracing::debug!("Fetching metadata for {video_id}");

        let info = with_retries(self.retries, self.retry_base, || {
            self.dump_json(video_id)
        })
        .await?;

        Ok(parse_metadata(video_id, &info))
    }

    async fn dump_json(&self, video_id: &str) -> Result<Value> {
        let url = watch_url(video_id);
        let mut command = Command::new(&self.yt_dlp);
        command
            .args(["--dump-json", "--no-playlist", "--no-warnings", &url])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| AcquireError::Network(format!("metadata call timed out for {video_id}")))?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    AcquireError::MetadataUnavailable(format!("{} not found in PATH", self.yt_dlp))
                } else {
                    AcquireError::MetadataUnavailable(format!("yt-dlp execution failed: {e}"))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_provider_error(&stderr, |msg| {
                AcquireError::MetadataUnavailable(msg)
            }));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| AcquireError::MetadataUnavailable(format!("unparseable metadata: {e}")))
    }
}

/// Classify a yt-dlp stderr message as transient (network-shaped) or
/// permanent, mapping permanent errors through `permanent`.
pub(crate) fn classify_provider_error(
    stderr: &str,
    permanent: impl FnOnce(String) -> AcquireError,
) -> AcquireError {
    let lower = stderr.to_lowercase();

    if lower.contains("429") || lower.contains("rate-limit") || lower.contains("too many requests") {
        return AcquireError::RateLimited;
    }

    let transient = ["timed out", "timeout", "connection", "temporary", "network", "unable to download webpage"]
        .iter()
        .any(|needle| lower.contains(needle));
    if transient {
        return AcquireError::Network(first_line(stderr));
    }

    permanent(first_line(stderr))
}

fn first_line(s: &str) -> String {
    s.lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("unknown provider error")
        .trim()
        .to_string()
}

fn parse_metadata(video_id: &str, info: &Value) -> Metadata {
    let channel = info["channel"]
        .as_str()
        .or_else(|| info["uploader"].as_str())
        .map(str::to_string);

    Metadata {
        title: info["title"].as_str().map(str::to_string),
        channel,
        publish_date: info["upload_date"].as_str().and_then(format_upload_date),
        duration_seconds: info["duration"].as_f64(),
        description: info["description"].as_str().map(str::to_string),
        url: watch_url(video_id),
    }
}

/// yt-dlp reports upload dates as `YYYYMMDD`; reformat to `YYYY-MM-DD`.
fn format_upload_date(raw: &str) -> Option<String> {
    if raw.len() == 8 && raw.chars().all(|c| c.is_ascii_digit()) {
        Some(format!("{}-{}-{}", &raw[..4], &raw[4..6], &raw[6..]))
    } else if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}
