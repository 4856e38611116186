//! Speech recognition fallback for videos without caption tracks.
//!
//! Downloads the audio track with yt-dlp, normalizes it to 16 kHz mono WAV,
//! splits it into bounded-length chunks with a small overlap, recognizes each
//! chunk with whisper.cpp, and reassembles one ordered segment sequence by
//! offsetting chunk-local timestamps and trimming the overlap region.

use futures_util::{stream, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;

use crate::config::{Config, ToolsConfig};
use crate::metadata::classify_provider_error;
use crate::pipeline::{AcquiredTranscript, SourceKind, TranscriptSegment};
use crate::resolver::watch_url;
use crate::utils::with_retries;
use crate::{AcquireError, Result};

/// Download and per-chunk recognition run much longer than listing-style
/// calls; their budget scales the configured per-call timeout.
const SLOW_CALL_FACTOR: u32 = 20;

/// One bounded slice of the source audio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ChunkSpan {
    pub index: usize,
    pub start: f64,
    pub length: f64,
}

#[derive(Debug)]
struct ChunkTranscript {
    language: Option<String>,
    segments: Vec<TranscriptSegment>,
}

#[derive(Deserialize)]
struct WhisperOutput {
    result: Option<WhisperResult>,
    #[serde(default)]
    transcription: Vec<WhisperSegment>,
}

#[derive(Deserialize)]
struct WhisperResult {
    language: Option<String>,
}

#[derive(Deserialize)]
struct WhisperSegment {
    offsets: WhisperOffsets,
    text: String,
}

#[derive(Deserialize)]
struct WhisperOffsets {
    from: u64,
    to: u64,
}

/// Audio-based transcriber invoked only after `NoCaptionsAvailable`.
pub struct SpeechTranscriber {
    tools: ToolsConfig,
    chunk_seconds: f64,
    overlap_seconds: f64,
    max_concurrent_chunks: usize,
    model: Option<PathBuf>,
    timeout: Duration,
    retries: u32,
    retry_base: Duration,
    quiet: bool,
}

impl SpeechTranscriber {
    pub fn new(config: &Config, quiet: bool) -> Self {
        Self {
            tools: config.tools.clone(),
            chunk_seconds: config.speech.chunk_seconds,
            overlap_seconds: config.speech.overlap_seconds,
            max_concurrent_chunks: config.speech.max_concurrent_chunks,
            model: config.speech.model.clone(),
            timeout: config.call_timeout(),
            retries: config.retries,
            retry_base: config.retry_base(),
            quiet,
        }
    }

    /// Produce a timestamped transcript from the video's audio track.
    pub async fn transcribe(&self, video_id: &str) -> Result<AcquiredTranscript> {
        let workdir = TempDir::new()
            .map_err(|e| AcquireError::TranscriptionFailed(format!("cannot create workdir: {e}")))?;

        let audio = with_retries(self.retries, self.retry_base, || {
            self.download_audio(video_id, workdir.path())
        })
        .await?;

        let total = with_retries(self.retries, self.retry_base, || self.probe_duration(&audio))
            .await?;
        let spans = plan_chunks(total, self.chunk_seconds, self.overlap_seconds);
        tracing::info!("Recognizing {:.0}s of audio in {} chunk(s)", total, spans.len());

        let chunks = self.split_audio(&audio, &spans, workdir.path()).await?;
        let parts = self.recognize_chunks(chunks).await?;

        let language = parts
            .iter()
            .find_map(|(_, c)| c.language.clone())
            .unwrap_or_else(|| "en".to_string());
        let segments = stitch(parts, self.overlap_seconds);

        if segments.is_empty() {
            return Err(AcquireError::TranscriptionFailed(
                "recognition produced no text".into(),
            ));
        }

        Ok(AcquiredTranscript {
            source_kind: SourceKind::SpeechRecognition,
            language,
            language_detected: true,
            segments,
        })
    }

    /// Download the audio track and normalize it to 16 kHz mono WAV.
    async fn download_audio(&self, video_id: &str, dir: &Path) -> Result<PathBuf> {
        let url = watch_url(video_id);
        let template = dir.join(format!("{video_id}.%(ext)s"));
        tracing::debug!("Downloading audio for {video_id}");

        let progress = self.spinner("Downloading audio...");

        let mut command = Command::new(&self.tools.yt_dlp);
        command
            .arg("--extract-audio")
            .arg("--audio-format").arg("m4a")
            .arg("--audio-quality").arg("5")
            .arg("--output").arg(&template)
            .arg("--no-playlist")
            .arg("--quiet")
            .arg("--no-warnings")
            .arg(&url)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout * SLOW_CALL_FACTOR, command.output())
            .await
            .map_err(|_| AcquireError::Network(format!("audio download timed out for {video_id}")))?
            .map_err(|e| AcquireError::TranscriptionFailed(format!("yt-dlp execution failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_provider_error(&stderr, |msg| {
                AcquireError::TranscriptionFailed(format!("audio download failed: {msg}"))
            }));
        }

        let downloaded = find_audio_file(dir, video_id)?;
        let wav = dir.join(format!("{video_id}.wav"));
        self.normalize_to_wav(&downloaded, &wav).await?;

        progress.finish_and_clear();
        Ok(wav)
    }

    /// Convert any downloaded container to the 16 kHz mono WAV the
    /// recognizer expects.
    async fn normalize_to_wav(&self, source: &Path, dest: &Path) -> Result<()> {
        let mut command = Command::new(&self.tools.ffmpeg);
        command
            .arg("-i").arg(source)
            .arg("-vn")
            .arg("-ar").arg("16000")
            .arg("-ac").arg("1")
            .arg("-c:a").arg("pcm_s16le")
            .arg("-y")
            .arg("-loglevel").arg("error")
            .arg(dest)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout * SLOW_CALL_FACTOR, command.output())
            .await
            .map_err(|_| AcquireError::Network("audio conversion timed out".into()))?
            .map_err(|e| AcquireError::TranscriptionFailed(format!("ffmpeg execution failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AcquireError::TranscriptionFailed(format!(
                "ffmpeg conversion failed: {stderr}"
            )));
        }
        Ok(())
    }

    async fn probe_duration(&self, audio: &Path) -> Result<f64> {
        let mut command = Command::new(&self.tools.ffprobe);
        command
            .arg("-v").arg("error")
            .arg("-show_entries").arg("format=duration")
            .arg("-of").arg("default=noprint_wrappers=1:nokey=1")
            .arg(audio)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| AcquireError::Network("duration probe timed out".into()))?
            .map_err(|e| AcquireError::TranscriptionFailed(format!("ffprobe execution failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AcquireError::TranscriptionFailed(format!("ffprobe failed: {stderr}")));
        }

        String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<f64>()
            .map_err(|e| AcquireError::TranscriptionFailed(format!("unparseable duration: {e}")))
    }

    /// Cut the normalized audio into per-span WAV files.
    async fn split_audio(
        &self,
        audio: &Path,
        spans: &[ChunkSpan],
        dir: &Path,
    ) -> Result<Vec<(ChunkSpan, PathBuf)>> {
        if spans.len() == 1 {
            return Ok(vec![(spans[0], audio.to_path_buf())]);
        }

        let mut chunks = Vec::with_capacity(spans.len());
        for span in spans {
            let chunk_path = dir.join(format!("chunk_{:04}.wav", span.index));
            with_retries(self.retries, self.retry_base, || {
                self.split_span(audio, span, &chunk_path)
            })
            .await?;
            chunks.push((*span, chunk_path));
        }
        Ok(chunks)
    }

    async fn split_span(&self, audio: &Path, span: &ChunkSpan, chunk_path: &Path) -> Result<()> {
        let mut command = Command::new(&self.tools.ffmpeg);
        command
            .arg("-ss").arg(format!("{:.3}", span.start))
            .arg("-t").arg(format!("{:.3}", span.length))
            .arg("-i").arg(audio)
            .arg("-c").arg("copy")
            .arg("-y")
            .arg("-loglevel").arg("error")
            .arg(chunk_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| AcquireError::Network("chunk split timed out".into()))?
            .map_err(|e| {
                AcquireError::TranscriptionFailed(format!("ffmpeg execution failed: {e}"))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AcquireError::TranscriptionFailed(format!(
                "chunk split failed: {stderr}"
            )));
        }
        Ok(())
    }

    /// Recognize chunks in parallel, failing fast on the first error.
    async fn recognize_chunks(
        &self,
        chunks: Vec<(ChunkSpan, PathBuf)>,
    ) -> Result<Vec<(ChunkSpan, ChunkTranscript)>> {
        let progress = if self.quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(chunks.len() as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks")
                    .unwrap(),
            );
            bar
        };

        let mut stream = stream::iter(chunks.into_iter())
            .map(|(span, path)| {
                let progress = progress.clone();
                async move {
                    let transcript = with_retries(self.retries, self.retry_base, || {
                        self.recognize_chunk(&path)
                    })
                    .await;
                    progress.inc(1);
                    (span, transcript)
                }
            })
            .buffer_unordered(self.max_concurrent_chunks.max(1));

        let mut parts = Vec::new();
        while let Some((span, outcome)) = stream.next().await {
            match outcome {
                Ok(chunk) => parts.push((span, chunk)),
                Err(e) => {
                    progress.abandon();
                    return Err(e);
                }
            }
        }
        progress.finish_and_clear();
        Ok(parts)
    }

    async fn recognize_chunk(&self, audio: &Path) -> Result<ChunkTranscript> {
        let out_prefix = audio.with_extension("");

        let mut command = Command::new(&self.tools.whisper);
        if let Some(model) = &self.model {
            command.arg("-m").arg(model);
        }
        let invocation = command
            .arg("-f").arg(audio)
            .arg("-l").arg("auto")
            .arg("--output-json")
            .arg("--output-file").arg(&out_prefix)
            .arg("--no-prints")
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout * SLOW_CALL_FACTOR, invocation)
            .await
            .map_err(|_| AcquireError::Network("recognition timed out".into()))?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    AcquireError::TranscriptionFailed(format!(
                        "{} not found in PATH",
                        self.tools.whisper
                    ))
                } else {
                    AcquireError::TranscriptionFailed(format!("recognizer execution failed: {e}"))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AcquireError::TranscriptionFailed(format!(
                "recognition failed: {stderr}"
            )));
        }

        let json_path = out_prefix.with_extension("json");
        let raw = fs_err::read_to_string(&json_path)
            .map_err(|e| AcquireError::TranscriptionFailed(format!("missing recognizer output: {e}")))?;
        let parsed: WhisperOutput = serde_json::from_str(&raw)
            .map_err(|e| AcquireError::TranscriptionFailed(format!("unparseable recognizer output: {e}")))?;

        Ok(ChunkTranscript {
            language: parsed.result.and_then(|r| r.language),
            segments: whisper_segments(parsed.transcription),
        })
    }

    fn spinner(&self, message: &'static str) -> ProgressBar {
        if self.quiet {
            return ProgressBar::hidden();
        }
        let progress = ProgressBar::new_spinner();
        progress.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap(),
        );
        progress.set_message(message);
        progress
    }
}

fn whisper_segments(raw: Vec<WhisperSegment>) -> Vec<TranscriptSegment> {
    raw.into_iter()
        .filter_map(|seg| {
            let text = seg.text.trim().to_string();
            if text.is_empty() {
                return None;
            }
            let start = seg.offsets.from as f64 / 1000.0;
            let duration = (seg.offsets.to.saturating_sub(seg.offsets.from)) as f64 / 1000.0;
            Some(TranscriptSegment {
                start,
                duration: duration.max(0.01),
                text,
            })
        })
        .collect()
}

/// Locates the downloaded audio file for a video ID.
fn find_audio_file(dir: &Path, video_id: &str) -> Result<PathBuf> {
    for ext in &["m4a", "mp3", "opus", "webm", "ogg"] {
        let candidate = dir.join(format!("{video_id}.{ext}"));
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    let entries = std::fs::read_dir(dir)
        .map_err(|e| AcquireError::TranscriptionFailed(format!("cannot read workdir: {e}")))?;
    for entry in entries.flatten() {
        if entry.file_name().to_string_lossy().starts_with(video_id) {
            return Ok(entry.path());
        }
    }

    Err(AcquireError::TranscriptionFailed(
        "audio file not found after download".into(),
    ))
}

/// Plan bounded-length chunks with a fixed overlap between neighbours.
pub(crate) fn plan_chunks(total: f64, chunk: f64, overlap: f64) -> Vec<ChunkSpan> {
    let stride = chunk - overlap;
    let mut spans = Vec::new();
    let mut start = 0.0;
    let mut index = 0;

    loop {
        spans.push(ChunkSpan {
            index,
            start,
            length: chunk.min((total - start).max(0.0)),
        });
        if start + chunk >= total {
            break;
        }
        start += stride;
        index += 1;
    }
    spans
}

/// Reassemble chunk transcripts into one ordered sequence.
///
/// Chunk-local timestamps are offset by the chunk start; segments of a later
/// chunk that begin inside the overlap region are discarded, since the
/// earlier chunk's result is authoritative for that span.
fn stitch(mut parts: Vec<(ChunkSpan, ChunkTranscript)>, overlap: f64) -> Vec<TranscriptSegment> {
    parts.sort_by_key(|(span, _)| span.index);

    let mut segments = Vec::new();
    for (span, chunk) in parts {
        for seg in chunk.segments {
            if span.index > 0 && seg.start < overlap {
                continue;
            }
            segments.push(TranscriptSegment {
                start: span.start + seg.start,
                duration: seg.duration,
                text: seg.text,
            });
        }
    }
    segments
}
