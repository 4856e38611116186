//! Tubescript - acquire structured, timestamped transcripts from YouTube
//!
//! Given a video or playlist URL this library resolves the reference, fetches
//! metadata, and obtains a transcript by trying progressively more expensive
//! strategies: manual captions, auto-generated captions, then audio download
//! plus local speech recognition. The result is one canonical JSON document
//! with provenance tags so downstream consumers can gauge trustworthiness.

use serde::{Deserialize, Serialize};

pub mod captions;
pub mod cli;
pub mod config;
pub mod metadata;
pub mod output;
pub mod pipeline;
pub mod playlist;
pub mod resolver;
pub mod speech;
pub mod utils;

pub use cli::Cli;
pub use config::Config;
pub use pipeline::{
    AcquiredTranscript, AcquisitionStrategy, Pipeline, PlaylistItem, PlaylistResult, SourceKind,
    StrategyOutcome, TranscriptResult, TranscriptSegment,
};
pub use resolver::{Reference, ReferenceKind, VideoReference};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, AcquireError>;

/// Error types for transcript acquisition
#[derive(thiserror::Error, Debug)]
pub enum AcquireError {
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("metadata unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("no caption tracks available")]
    NoCaptionsAvailable,

    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("no transcript could be acquired and metadata is unavailable: {0}")]
    VideoUnavailable(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited by provider")]
    RateLimited,

    #[error("cancelled")]
    Cancelled,
}

impl AcquireError {
    /// Transient errors are eligible for local retry with backoff;
    /// everything else bubbles to the owning stage.
    pub fn is_transient(&self) -> bool {
        matches!(self, AcquireError::Network(_) | AcquireError::RateLimited)
    }

    /// Classification used in `FailureRecord`s and exit-code mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AcquireError::InvalidReference(_) => ErrorKind::InvalidReference,
            AcquireError::MetadataUnavailable(_) => ErrorKind::MetadataUnavailable,
            AcquireError::NoCaptionsAvailable => ErrorKind::NoCaptionsAvailable,
            AcquireError::TranscriptionFailed(_) => ErrorKind::TranscriptionFailed,
            AcquireError::VideoUnavailable(_) => ErrorKind::TranscriptionFailed,
            AcquireError::Network(_) => ErrorKind::Network,
            AcquireError::RateLimited => ErrorKind::RateLimited,
            AcquireError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<reqwest::Error> for AcquireError {
    fn from(err: reqwest::Error) -> Self {
        if err.status().map(|s| s.as_u16()) == Some(429) {
            return AcquireError::RateLimited;
        }
        AcquireError::Network(err.to_string())
    }
}

/// Serializable error classification carried by failure records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidReference,
    MetadataUnavailable,
    NoCaptionsAvailable,
    TranscriptionFailed,
    Network,
    RateLimited,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(AcquireError::Network("reset".into()).is_transient());
        assert!(AcquireError::RateLimited.is_transient());
        assert!(!AcquireError::NoCaptionsAvailable.is_transient());
        assert!(!AcquireError::InvalidReference("x".into()).is_transient());
        assert!(!AcquireError::VideoUnavailable("x".into()).is_transient());
    }

    #[test]
    fn video_unavailable_records_as_transcription_failure() {
        assert_eq!(
            AcquireError::VideoUnavailable("x".into()).kind(),
            ErrorKind::TranscriptionFailed
        );
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::TranscriptionFailed).unwrap();
        assert_eq!(json, "\"transcription_failed\"");
    }
}
