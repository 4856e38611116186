//! Canonical JSON document assembly.
//!
//! Field order is the struct declaration order, which serde keeps stable, so
//! repeated runs produce byte-identical layouts for identical content.

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::metadata::Metadata;
use crate::pipeline::{
    FailureRecord, PlaylistItem, PlaylistResult, SourceKind, TranscriptResult, TranscriptSegment,
};
use crate::playlist::PlaylistListing;
use crate::resolver::ReferenceKind;
use crate::ErrorKind;

/// Envelope for a single-video invocation.
#[derive(Debug, Serialize)]
pub struct VideoDocument {
    pub extracted_at: String,
    pub source_url: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub video: VideoItem,
}

/// One video's metadata, transcript and provenance.
#[derive(Debug, Serialize)]
pub struct VideoItem {
    pub video_id: String,
    pub reference_kind: ReferenceKind,
    pub metadata: Metadata,
    pub transcript: TranscriptBody,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Transcript content with provenance tags for downstream trust decisions.
#[derive(Debug, Serialize)]
pub struct TranscriptBody {
    pub source: SourceKind,
    pub language: String,
    pub language_detected: bool,
    pub full_text: String,
    pub segments: Vec<TranscriptSegment>,
}

/// Envelope for a playlist invocation.
#[derive(Debug, Serialize)]
pub struct PlaylistDocument {
    pub extracted_at: String,
    pub source_url: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub playlist_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub video_count: usize,
    pub failure_count: usize,
    pub items: Vec<PlaylistItemEntry>,
}

/// One playlist slot, tagged with its original position.
#[derive(Debug, Serialize)]
pub struct PlaylistItemEntry {
    pub position: usize,
    #[serde(flatten)]
    pub body: ItemBody,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemBody {
    Ok(VideoItem),
    Failed(FailureRecord),
    Cancelled { video_id: String },
}

/// Envelope for `--playlist-info-only`.
#[derive(Debug, Serialize)]
pub struct ListingDocument {
    pub extracted_at: String,
    pub source_url: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub playlist_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub video_count: usize,
    pub videos: Vec<ListingEntry>,
}

#[derive(Debug, Serialize)]
pub struct ListingEntry {
    pub position: usize,
    pub video_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
}

/// Concatenate segment texts into one plain-text transcript.
pub fn full_text(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn video_item(result: TranscriptResult) -> VideoItem {
    let full_text = full_text(&result.transcript.segments);
    VideoItem {
        video_id: result.reference.id,
        reference_kind: result.reference.kind,
        metadata: result.metadata,
        transcript: TranscriptBody {
            source: result.transcript.source_kind,
            language: result.transcript.language,
            language_detected: result.transcript.language_detected,
            full_text,
            segments: result.transcript.segments,
        },
        warnings: result.warnings,
    }
}

/// Assemble the single-video document.
pub fn video_document(result: TranscriptResult, source_url: &str) -> VideoDocument {
    VideoDocument {
        extracted_at: timestamp(),
        source_url: source_url.to_string(),
        kind: "video",
        video: video_item(result),
    }
}

/// Assemble the playlist document, preserving item order and positions.
pub fn playlist_document(result: PlaylistResult, source_url: &str) -> PlaylistDocument {
    let items: Vec<PlaylistItemEntry> = result
        .items
        .into_iter()
        .enumerate()
        .map(|(position, item)| PlaylistItemEntry {
            position,
            body: match item {
                PlaylistItem::Transcript(r) => ItemBody::Ok(video_item(r)),
                PlaylistItem::Failure(f) if f.error_kind == ErrorKind::Cancelled => {
                    ItemBody::Cancelled { video_id: f.video_id }
                }
                PlaylistItem::Failure(f) => ItemBody::Failed(f),
            },
        })
        .collect();

    let failure_count = items
        .iter()
        .filter(|entry| !matches!(entry.body, ItemBody::Ok(_)))
        .count();

    PlaylistDocument {
        extracted_at: timestamp(),
        source_url: source_url.to_string(),
        kind: "playlist",
        playlist_id: result.playlist_id,
        title: result.title,
        video_count: items.len(),
        failure_count,
        items,
    }
}

/// Assemble the member listing document.
pub fn listing_document(listing: PlaylistListing, source_url: &str) -> ListingDocument {
    let videos: Vec<ListingEntry> = listing
        .entries
        .into_iter()
        .enumerate()
        .map(|(position, entry)| ListingEntry {
            position,
            video_id: entry.id,
            title: entry.title,
            duration_seconds: entry.duration,
        })
        .collect();

    ListingDocument {
        extracted_at: timestamp(),
        source_url: source_url.to_string(),
        kind: "playlist",
        playlist_id: listing.playlist_id,
        title: listing.title,
        video_count: videos.len(),
        videos,
    }
}

/// Serialize a document with stable key order.
pub fn render<T: Serialize>(document: &T, pretty: bool) -> Result<String> {
    let content = if pretty {
        serde_json::to_string_pretty(document)?
    } else {
        serde_json::to_string(document)?
    };
    Ok(content)
}

/// Print the document to stdout.
pub fn print<T: Serialize>(document: &T, pretty: bool) -> Result<()> {
    println!("{}", render(document, pretty)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::AcquiredTranscript;
    use crate::resolver::VideoReference;

    fn seg(start: f64, duration: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment { start, duration, text: text.to_string() }
    }

    fn sample_result(id: &str, source_kind: SourceKind) -> TranscriptResult {
        TranscriptResult {
            reference: VideoReference::video(id),
            metadata: Metadata::unavailable(id),
            transcript: AcquiredTranscript {
                source_kind,
                language: "en".into(),
                language_detected: false,
                segments: vec![seg(0.0, 1.5, "hello"), seg(1.5, 2.0, "world")],
            },
            warnings: Vec::new(),
        }
    }

    #[test]
    fn full_text_joins_segments() {
        let segments = vec![seg(0.0, 1.0, "hello"), seg(1.0, 1.0, "world")];
        assert_eq!(full_text(&segments), "hello world");
        assert_eq!(full_text(&[]), "");
    }

    #[test]
    fn video_document_carries_provenance() {
        let doc = video_document(
            sample_result("dQw4w9WgXcQ", SourceKind::ManualCaption),
            "https://youtu.be/dQw4w9WgXcQ",
        );
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["type"], "video");
        assert_eq!(json["video"]["video_id"], "dQw4w9WgXcQ");
        assert_eq!(json["video"]["transcript"]["source"], "manual_caption");
        assert_eq!(json["video"]["transcript"]["full_text"], "hello world");
        assert_eq!(json["video"]["transcript"]["segments"][1]["start"], 1.5);
        // empty warnings are omitted entirely
        assert!(json["video"].get("warnings").is_none());
    }

    #[test]
    fn playlist_document_counts_and_positions() {
        let result = PlaylistResult {
            playlist_id: "PLabc".into(),
            title: Some("My List".into()),
            items: vec![
                PlaylistItem::Transcript(sample_result("aaaaaaaaaaa", SourceKind::AutoCaption)),
                PlaylistItem::Failure(FailureRecord {
                    video_id: "bbbbbbbbbbb".into(),
                    error_kind: ErrorKind::TranscriptionFailed,
                    message: "no audio track".into(),
                }),
                PlaylistItem::Failure(FailureRecord {
                    video_id: "ccccccccccc".into(),
                    error_kind: ErrorKind::Cancelled,
                    message: "member was not processed".into(),
                }),
            ],
        };
        let doc = playlist_document(result, "https://www.youtube.com/playlist?list=PLabc");
        assert_eq!(doc.video_count, 3);
        assert_eq!(doc.failure_count, 2);

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["items"][0]["position"], 0);
        assert_eq!(json["items"][0]["status"], "ok");
        assert_eq!(json["items"][1]["status"], "failed");
        assert_eq!(json["items"][1]["error_kind"], "transcription_failed");
        assert_eq!(json["items"][2]["status"], "cancelled");
        assert_eq!(json["items"][2]["video_id"], "ccccccccccc");
    }

    #[test]
    fn rendering_is_deterministic() {
        let result = sample_result("dQw4w9WgXcQ", SourceKind::SpeechRecognition);
        let doc = VideoDocument {
            extracted_at: "2024-01-01T00:00:00Z".into(),
            source_url: "https://youtu.be/dQw4w9WgXcQ".into(),
            kind: "video",
            video: video_item(result),
        };
        let first = render(&doc, false).unwrap();
        let second = render(&doc, false).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("{\"extracted_at\""));
    }
}
