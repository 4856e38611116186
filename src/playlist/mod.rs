//! Playlist membership enumeration via yt-dlp flat extraction.
//!
//! yt-dlp exposes no paging cursor, so pages are simulated with
//! `--playlist-items A-B` ranges; a page returning fewer entries than
//! requested is the end marker.

use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::config::Config;
use crate::metadata::classify_provider_error;
use crate::resolver::playlist_url;
use crate::utils::with_retries;
use crate::{AcquireError, Result};

/// One member of a playlist, in enumeration order.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistEntry {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    playlist_title: Option<String>,
}

/// Enumerated playlist: provider title plus ordered member list.
#[derive(Debug, Clone)]
pub struct PlaylistListing {
    pub playlist_id: String,
    pub title: Option<String>,
    pub entries: Vec<PlaylistEntry>,
}

/// Pages through playlist membership until exhausted.
pub struct PlaylistBrowser {
    yt_dlp: String,
    page_size: usize,
    max_members: Option<usize>,
    timeout: Duration,
    retries: u32,
    retry_base: Duration,
}

impl PlaylistBrowser {
    pub fn new(config: &Config) -> Self {
        Self {
            yt_dlp: config.tools.yt_dlp.clone(),
            page_size: config.playlist.page_size,
            max_members: config.playlist.max_members,
            timeout: config.call_timeout(),
            retries: config.retries,
            retry_base: config.retry_base(),
        }
    }

    /// Enumerate all member video IDs, preserving playlist order.
    pub async fn enumerate(&self, playlist_id: &str) -> Result<PlaylistListing> {
        let mut entries: Vec<PlaylistEntry> = Vec::new();
        let mut title: Option<String> = None;
        let mut start = 1usize;

        loop {
            let page = with_retries(self.retries, self.retry_base, || {
                self.fetch_page(playlist_id, start, start + self.page_size - 1)
            })
            .await?;

            let page_len = page.len();
            for entry in page {
                if title.is_none() {
                    title = entry.playlist_title.clone();
                }
                entries.push(entry);
            }

            if let Some(cap) = self.max_members {
                if entries.len() >= cap {
                    entries.truncate(cap);
                    break;
                }
            }

            if page_len < self.page_size {
                break;
            }
            start += self.page_size;
        }

        tracing::info!("Enumerated {} member(s) of playlist {playlist_id}", entries.len());
        Ok(PlaylistListing {
            playlist_id: playlist_id.to_string(),
            title,
            entries,
        })
    }

    async fn fetch_page(
        &self,
        playlist_id: &str,
        first: usize,
        last: usize,
    ) -> Result<Vec<PlaylistEntry>> {
        let url = playlist_url(playlist_id);
        let range = format!("{first}-{last}");

        let mut command = Command::new(&self.yt_dlp);
        command
            .args([
                "--flat-playlist",
                "--dump-json",
                "--no-warnings",
                "--playlist-items",
                &range,
                &url,
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                AcquireError::Network(format!("playlist page {range} timed out for {playlist_id}"))
            })?
            .map_err(|e| {
                AcquireError::InvalidReference(format!("yt-dlp execution failed: {e}"))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // yt-dlp reports an out-of-range page as an error on some
            // playlist types; treat it as the end marker.
            if stderr.to_lowercase().contains("does not have") {
                return Ok(Vec::new());
            }
            return Err(classify_provider_error(&stderr, |msg| {
                AcquireError::InvalidReference(format!("playlist unavailable: {msg}"))
            }));
        }

        parse_flat_entries(&String::from_utf8_lossy(&output.stdout))
    }
}

/// yt-dlp emits one JSON object per line in flat-playlist mode.
fn parse_flat_entries(stdout: &str) -> Result<Vec<PlaylistEntry>> {
    let mut entries = Vec::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let entry: PlaylistEntry = serde_json::from_str(line).map_err(|e| {
            AcquireError::InvalidReference(format!("unparseable playlist entry: {e}"))
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_one_entry_per_line() {
        let stdout = concat!(
            r#"{"id": "aaaaaaaaaaa", "title": "First", "duration": 61.0, "playlist_title": "My List"}"#,
            "\n",
            r#"{"id": "bbbbbbbbbbb", "title": "Second", "duration": null}"#,
            "\n",
        );
        let entries = parse_flat_entries(stdout).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "aaaaaaaaaaa");
        assert_eq!(entries[0].playlist_title.as_deref(), Some("My List"));
        assert_eq!(entries[1].title.as_deref(), Some("Second"));
        assert_eq!(entries[1].duration, None);
    }

    #[test]
    fn empty_output_is_an_empty_page() {
        assert!(parse_flat_entries("").unwrap().is_empty());
        assert!(parse_flat_entries("\n\n").unwrap().is_empty());
    }

    #[test]
    fn garbage_lines_are_rejected() {
        assert!(matches!(
            parse_flat_entries("not json"),
            Err(AcquireError::InvalidReference(_))
        ));
    }
}
