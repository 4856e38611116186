//! Acquisition orchestration.
//!
//! A single video runs a strictly sequential fallback chain: an ordered list
//! of acquisition strategies, each reporting not-applicable / failed /
//! succeeded. The orchestrator advances on not-applicable, aborts on failed,
//! and returns on succeeded. Playlists fan the chain out across members
//! through a bounded worker pool where each worker owns exactly one slot of
//! a pre-sized, order-indexed result vector.

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::future::Future;
use tokio::sync::watch;

use crate::captions::CaptionClient;
use crate::config::Config;
use crate::metadata::{Metadata, MetadataFetcher};
use crate::playlist::{PlaylistBrowser, PlaylistEntry};
use crate::resolver::{Reference, ReferenceKind, VideoReference};
use crate::speech::SpeechTranscriber;
use crate::{AcquireError, ErrorKind, Result};

/// One timed-text segment. Start times are non-decreasing across a
/// transcript; durations are strictly positive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub duration: f64,
    pub text: String,
}

/// Provenance of a transcript, recorded for downstream trust decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    ManualCaption,
    AutoCaption,
    SpeechRecognition,
}

/// A transcript as produced by one acquisition strategy.
#[derive(Debug, Clone, Serialize)]
pub struct AcquiredTranscript {
    pub source_kind: SourceKind,
    pub language: String,
    /// True when the language fell outside the preference order and was
    /// taken as detected.
    pub language_detected: bool,
    pub segments: Vec<TranscriptSegment>,
}

/// Full single-video result: reference, metadata, transcript, provenance.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptResult {
    pub reference: VideoReference,
    pub metadata: Metadata,
    pub transcript: AcquiredTranscript,
    /// Non-fatal provenance gaps, e.g. metadata that could not be fetched.
    pub warnings: Vec<String>,
}

/// Per-member error marker preserving playlist position.
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub video_id: String,
    pub error_kind: ErrorKind,
    pub message: String,
}

/// One slot of a playlist result: a transcript or an isolated failure.
#[derive(Debug, Clone)]
pub enum PlaylistItem {
    Transcript(TranscriptResult),
    Failure(FailureRecord),
}

/// Ordered playlist outcome; failed members keep their slot.
#[derive(Debug, Clone)]
pub struct PlaylistResult {
    pub playlist_id: String,
    pub title: Option<String>,
    pub items: Vec<PlaylistItem>,
}

/// What happened when a strategy was tried.
#[derive(Debug)]
pub enum StrategyOutcome {
    /// The strategy cannot serve this video (e.g. no caption tracks exist);
    /// the orchestrator advances to the next strategy.
    NotApplicable,
    Transcript(AcquiredTranscript),
}

/// A ranked, interchangeable transcript acquisition strategy.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AcquisitionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn acquire(&self, video_id: &str) -> Result<StrategyOutcome>;
}

/// Caption acquisition as a strategy: absent tracks mean "not applicable".
/// Residual transient errors keep their own kind (`network`, `rate_limited`);
/// `NoCaptionsAvailable` strictly means the provider lists no tracks.
pub struct CaptionStrategy {
    client: CaptionClient,
}

#[async_trait]
impl AcquisitionStrategy for CaptionStrategy {
    fn name(&self) -> &'static str {
        "captions"
    }

    async fn acquire(&self, video_id: &str) -> Result<StrategyOutcome> {
        match self.client.acquire(video_id).await {
            Ok(transcript) => Ok(StrategyOutcome::Transcript(transcript)),
            Err(AcquireError::NoCaptionsAvailable) => Ok(StrategyOutcome::NotApplicable),
            Err(e) => Err(e),
        }
    }
}

/// Speech recognition as the terminal strategy.
pub struct SpeechStrategy {
    transcriber: SpeechTranscriber,
}

#[async_trait]
impl AcquisitionStrategy for SpeechStrategy {
    fn name(&self) -> &'static str {
        "speech_recognition"
    }

    async fn acquire(&self, video_id: &str) -> Result<StrategyOutcome> {
        match self.transcriber.transcribe(video_id).await {
            Ok(transcript) => Ok(StrategyOutcome::Transcript(transcript)),
            // Retry budgets are spent inside the transcriber; whatever is
            // still transient here escalates to this stage's failure kind.
            Err(e) if e.is_transient() => Err(AcquireError::TranscriptionFailed(format!(
                "audio acquisition failed: {e}"
            ))),
            Err(e) => Err(e),
        }
    }
}

/// Walk the ranked strategy list for one video.
pub(crate) async fn drive_strategies(
    strategies: &[Box<dyn AcquisitionStrategy>],
    video_id: &str,
    cancel: &watch::Receiver<bool>,
) -> Result<AcquiredTranscript> {
    for strategy in strategies {
        if *cancel.borrow() {
            return Err(AcquireError::Cancelled);
        }

        tracing::debug!("Trying {} for {video_id}", strategy.name());
        match strategy.acquire(video_id).await? {
            StrategyOutcome::Transcript(transcript) => {
                tracing::info!(
                    "Acquired transcript for {video_id} via {} ({} segments)",
                    strategy.name(),
                    transcript.segments.len()
                );
                return Ok(transcript);
            }
            StrategyOutcome::NotApplicable => {
                tracing::info!("{} not applicable for {video_id}, advancing", strategy.name());
            }
        }
    }

    Err(AcquireError::TranscriptionFailed(
        "no acquisition strategy produced a transcript".into(),
    ))
}

/// Run a future, aborting promptly when the cancellation token flips.
async fn with_cancel<T>(
    cancel: &watch::Receiver<bool>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    if *cancel.borrow() {
        return Err(AcquireError::Cancelled);
    }

    let mut rx = cancel.clone();
    let cancelled = async move {
        // A dropped sender means cancellation can never arrive.
        if rx.wait_for(|c| *c).await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = fut => result,
        _ = cancelled => Err(AcquireError::Cancelled),
    }
}

/// Fan entries out over a bounded worker pool, preserving entry order in
/// the returned items regardless of completion order.
pub(crate) async fn process_members<F, Fut>(
    entries: Vec<PlaylistEntry>,
    concurrency: usize,
    op: F,
) -> Vec<PlaylistItem>
where
    F: Fn(PlaylistEntry) -> Fut,
    Fut: Future<Output = Result<TranscriptResult>>,
{
    let ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();
    let mut slots: Vec<Option<PlaylistItem>> = ids.iter().map(|_| None).collect();

    let mut outcomes = stream::iter(entries.into_iter().enumerate())
        .map(|(index, entry)| {
            let fut = op(entry);
            async move { (index, fut.await) }
        })
        .buffer_unordered(concurrency.max(1));

    while let Some((index, outcome)) = outcomes.next().await {
        slots[index] = Some(match outcome {
            Ok(result) => PlaylistItem::Transcript(result),
            Err(e) => PlaylistItem::Failure(FailureRecord {
                video_id: ids[index].clone(),
                error_kind: e.kind(),
                message: e.to_string(),
            }),
        });
    }

    slots
        .into_iter()
        .zip(ids)
        .map(|(slot, video_id)| {
            slot.unwrap_or_else(|| {
                PlaylistItem::Failure(FailureRecord {
                    video_id,
                    error_kind: ErrorKind::Cancelled,
                    message: "member was not processed".into(),
                })
            })
        })
        .collect()
}

/// The full acquisition pipeline for videos and playlists.
pub struct Pipeline {
    config: Config,
    metadata: MetadataFetcher,
    browser: PlaylistBrowser,
    strategies: Vec<Box<dyn AcquisitionStrategy>>,
    cancel: watch::Receiver<bool>,
    quiet: bool,
}

impl Pipeline {
    /// Build the pipeline with its ranked strategy list. `force_speech`
    /// drops the caption strategy so recognition runs unconditionally.
    pub fn new(
        config: Config,
        cancel: watch::Receiver<bool>,
        quiet: bool,
        force_speech: bool,
    ) -> Result<Self> {
        let mut strategies: Vec<Box<dyn AcquisitionStrategy>> = Vec::new();
        if !force_speech {
            strategies.push(Box::new(CaptionStrategy {
                client: CaptionClient::new(&config)?,
            }));
        }
        strategies.push(Box::new(SpeechStrategy {
            transcriber: SpeechTranscriber::new(&config, quiet),
        }));

        Ok(Self {
            metadata: MetadataFetcher::new(&config),
            browser: PlaylistBrowser::new(&config),
            strategies,
            cancel,
            quiet,
            config,
        })
    }

    /// Acquire a single video transcript.
    pub async fn acquire_video(&self, reference: &VideoReference) -> Result<TranscriptResult> {
        if *self.cancel.borrow() {
            return Err(AcquireError::Cancelled);
        }

        // Metadata is supplementary and fetched alongside the fallback
        // chain; its failure becomes a warning, never an abort. Both arms
        // race the cancellation token so neither outlives an interrupt.
        let (metadata_outcome, transcript) = tokio::join!(
            with_cancel(&self.cancel, self.metadata.fetch(&reference.id)),
            with_cancel(
                &self.cancel,
                drive_strategies(&self.strategies, &reference.id, &self.cancel)
            ),
        );

        let transcript = match (transcript, &metadata_outcome) {
            (Ok(transcript), _) => transcript,
            (Err(AcquireError::Cancelled), _) => return Err(AcquireError::Cancelled),
            // A video with neither transcript nor metadata is its own
            // failure class, surfaced through a distinct exit code.
            (Err(e), Err(m)) if !matches!(m, AcquireError::Cancelled) => {
                return Err(AcquireError::VideoUnavailable(format!("{e}; metadata: {m}")));
            }
            (Err(e), _) => return Err(e),
        };

        let mut warnings = Vec::new();
        let metadata = match metadata_outcome {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!("Metadata unavailable for {}: {e}", reference.id);
                warnings.push(format!("metadata unavailable: {e}"));
                Metadata::unavailable(&reference.id)
            }
        };

        Ok(TranscriptResult {
            reference: reference.clone(),
            metadata,
            transcript,
            warnings,
        })
    }

    /// Enumerate a playlist and acquire every member, isolating failures.
    pub async fn acquire_playlist(&self, playlist_id: &str) -> Result<PlaylistResult> {
        let listing = with_cancel(&self.cancel, self.browser.enumerate(playlist_id)).await?;

        let progress = if self.quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(listing.entries.len() as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} videos")
                    .unwrap(),
            );
            bar
        };

        let items = process_members(listing.entries, self.config.concurrency, |entry| {
            let progress = progress.clone();
            async move {
                let outcome = self.acquire_member(&entry).await;
                progress.inc(1);
                outcome
            }
        })
        .await;
        progress.finish_and_clear();

        Ok(PlaylistResult {
            playlist_id: listing.playlist_id,
            title: listing.title,
            items,
        })
    }

    /// Enumerate playlist members without acquiring transcripts.
    pub async fn list_playlist(&self, playlist_id: &str) -> Result<crate::playlist::PlaylistListing> {
        with_cancel(&self.cancel, self.browser.enumerate(playlist_id)).await
    }

    /// Dispatch on the resolved reference.
    pub async fn run(&self, reference: &Reference) -> Result<Outcome> {
        match reference {
            Reference::Video(video) => Ok(Outcome::Video(self.acquire_video(video).await?)),
            Reference::Playlist { id } => {
                Ok(Outcome::Playlist(self.acquire_playlist(id).await?))
            }
        }
    }

    async fn acquire_member(&self, entry: &PlaylistEntry) -> Result<TranscriptResult> {
        if *self.cancel.borrow() {
            return Err(AcquireError::Cancelled);
        }
        let reference = VideoReference {
            id: entry.id.clone(),
            kind: ReferenceKind::PlaylistMember,
        };
        self.acquire_video(&reference).await
    }
}

/// Top-level pipeline outcome, one per invocation.
#[derive(Debug)]
pub enum Outcome {
    Video(TranscriptResult),
    Playlist(PlaylistResult),
}
