//! Reference resolution: raw URL strings to typed video/playlist references.
//!
//! Pure pattern matching on hosts, paths, and query parameters; no network.

use serde::Serialize;
use url::Url;

use crate::{AcquireError, Result};

/// How a video reference entered the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Video,
    PlaylistMember,
}

/// A resolved, immutable video identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoReference {
    pub id: String,
    pub kind: ReferenceKind,
}

impl VideoReference {
    pub fn video(id: impl Into<String>) -> Self {
        Self { id: id.into(), kind: ReferenceKind::Video }
    }

    pub fn playlist_member(id: impl Into<String>) -> Self {
        Self { id: id.into(), kind: ReferenceKind::PlaylistMember }
    }
}

/// Outcome of resolving a raw input string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Video(VideoReference),
    Playlist { id: String },
}

/// Canonical watch URL for a video ID.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// Canonical listing URL for a playlist ID.
pub fn playlist_url(playlist_id: &str) -> String {
    format!("https://www.youtube.com/playlist?list={playlist_id}")
}

/// Resolve a raw input string into a typed reference.
///
/// Accepted forms: canonical watch URLs, `youtu.be` short URLs, `/embed/`,
/// `/shorts/`, `/v/` paths, playlist URLs carrying a `list=` parameter, and
/// a bare 11-character video ID. A watch URL that also carries `list=`
/// resolves to the single video, not the playlist.
pub fn resolve(raw: &str) -> Result<Reference> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AcquireError::InvalidReference("empty input".into()));
    }

    if is_video_id(raw) {
        return Ok(Reference::Video(VideoReference::video(raw)));
    }

    let url = Url::parse(raw)
        .map_err(|_| AcquireError::InvalidReference(format!("not a URL: {raw}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(AcquireError::InvalidReference(format!(
            "unsupported scheme: {}",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .ok_or_else(|| AcquireError::InvalidReference(format!("no host in {raw}")))?;
    if !is_youtube_host(host) {
        return Err(AcquireError::InvalidReference(format!("unrecognized host: {host}")));
    }

    if let Some(id) = video_id_from_url(&url, host) {
        return Ok(Reference::Video(VideoReference::video(id)));
    }

    if let Some(id) = playlist_id_from_url(&url) {
        return Ok(Reference::Playlist { id });
    }

    Err(AcquireError::InvalidReference(format!(
        "no video or playlist identifier in {raw}"
    )))
}

fn is_youtube_host(host: &str) -> bool {
    let h = host.to_ascii_lowercase();
    h == "youtube.com"
        || h == "youtu.be"
        || h.ends_with(".youtube.com")
}

/// Video IDs are exactly 11 characters of the base64url alphabet.
fn is_video_id(s: &str) -> bool {
    s.len() == 11 && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn is_playlist_id(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn video_id_from_url(url: &Url, host: &str) -> Option<String> {
    // youtu.be/<id>
    if host.eq_ignore_ascii_case("youtu.be") {
        let seg = url.path_segments()?.next()?.trim().to_string();
        return is_video_id(&seg).then_some(seg);
    }

    // youtube.com/watch?v=<id>
    if url.path() == "/watch" {
        let id = url
            .query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.trim().to_string())?;
        return is_video_id(&id).then_some(id);
    }

    // youtube.com/{embed,shorts,v}/<id>
    let mut segs = url.path_segments()?;
    let first = segs.next().unwrap_or("");
    let second = segs.next().unwrap_or("").trim().to_string();
    if matches!(first, "embed" | "shorts" | "v") && is_video_id(&second) {
        return Some(second);
    }

    None
}

fn playlist_id_from_url(url: &Url) -> Option<String> {
    let id = url
        .query_pairs()
        .find(|(k, _)| k == "list")
        .map(|(_, v)| v.trim().to_string())?;
    is_playlist_id(&id).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(raw: &str) -> String {
        match resolve(raw).unwrap() {
            Reference::Video(v) => v.id,
            other => panic!("expected video, got {other:?}"),
        }
    }

    fn playlist(raw: &str) -> String {
        match resolve(raw).unwrap() {
            Reference::Playlist { id } => id,
            other => panic!("expected playlist, got {other:?}"),
        }
    }

    #[test]
    fn resolves_watch_urls() {
        assert_eq!(video("https://www.youtube.com/watch?v=dQw4w9WgXcQ"), "dQw4w9WgXcQ");
        assert_eq!(video("https://m.youtube.com/watch?v=dQw4w9WgXcQ&t=42"), "dQw4w9WgXcQ");
    }

    #[test]
    fn resolves_short_and_path_forms() {
        assert_eq!(video("https://youtu.be/dQw4w9WgXcQ"), "dQw4w9WgXcQ");
        assert_eq!(video("https://www.youtube.com/embed/dQw4w9WgXcQ"), "dQw4w9WgXcQ");
        assert_eq!(video("https://www.youtube.com/shorts/dQw4w9WgXcQ"), "dQw4w9WgXcQ");
        assert_eq!(video("https://www.youtube.com/v/dQw4w9WgXcQ"), "dQw4w9WgXcQ");
    }

    #[test]
    fn resolves_bare_video_id() {
        assert_eq!(video("dQw4w9WgXcQ"), "dQw4w9WgXcQ");
    }

    #[test]
    fn resolves_playlist_urls() {
        assert_eq!(
            playlist("https://www.youtube.com/playlist?list=PLabc123_-xyz"),
            "PLabc123_-xyz"
        );
    }

    #[test]
    fn watch_url_with_list_resolves_to_the_video() {
        assert_eq!(
            video("https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=PLabc123"),
            "dQw4w9WgXcQ"
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(
            resolve("not-a-video-url"),
            Err(AcquireError::InvalidReference(_))
        ));
        assert!(resolve("").is_err());
        assert!(resolve("ftp://youtube.com/watch?v=dQw4w9WgXcQ").is_err());
        assert!(resolve("https://example.com/watch?v=dQw4w9WgXcQ").is_err());
        // wrong ID length
        assert!(resolve("https://youtu.be/short").is_err());
        assert!(resolve("https://www.youtube.com/watch?v=").is_err());
    }

    #[test]
    fn canonical_urls() {
        assert_eq!(watch_url("dQw4w9WgXcQ"), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(
            playlist_url("PLabc"),
            "https://www.youtube.com/playlist?list=PLabc"
        );
    }
}
