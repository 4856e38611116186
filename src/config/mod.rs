use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Cli;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Language preference order for caption selection
    pub languages: Vec<String>,

    /// Bounded concurrency for playlist members
    pub concurrency: usize,

    /// Per-call timeout for external calls, in seconds
    pub timeout_seconds: u64,

    /// Retry attempts for transient failures
    pub retries: u32,

    /// Base delay for exponential backoff, in milliseconds
    pub retry_base_ms: u64,

    /// External tool names/paths
    pub tools: ToolsConfig,

    /// Caption normalization settings
    pub captions: CaptionConfig,

    /// Speech recognition fallback settings
    pub speech: SpeechConfig,

    /// Playlist enumeration settings
    pub playlist: PlaylistConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub yt_dlp: String,
    pub ffmpeg: String,
    pub ffprobe: String,
    pub whisper: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    /// Never merge caption fragments across a silence gap larger than this
    pub max_merge_gap_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Chunk length fed to the recognizer, in seconds
    pub chunk_seconds: f64,

    /// Overlap between consecutive chunks, in seconds
    pub overlap_seconds: f64,

    /// Chunks recognized in parallel
    pub max_concurrent_chunks: usize,

    /// Whisper model file; the recognizer's default model is used when unset
    pub model: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaylistConfig {
    /// Members requested per enumeration page
    pub page_size: usize,

    /// Hard cap on enumerated members (None = unbounded)
    pub max_members: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            languages: vec!["en".into(), "en-US".into(), "en-GB".into()],
            concurrency: 3,
            timeout_seconds: 30,
            retries: 3,
            retry_base_ms: 500,
            tools: ToolsConfig::default(),
            captions: CaptionConfig::default(),
            speech: SpeechConfig::default(),
            playlist: PlaylistConfig::default(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp: "yt-dlp".into(),
            ffmpeg: "ffmpeg".into(),
            ffprobe: "ffprobe".into(),
            whisper: "whisper-cli".into(),
        }
    }
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self { max_merge_gap_seconds: 1.5 }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            chunk_seconds: 300.0,
            overlap_seconds: 2.0,
            max_concurrent_chunks: 2,
            model: None,
        }
    }
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self { page_size: 100, max_members: None }
    }
}

impl Config {
    /// Load configuration from file or fall back to defaults.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let config: Config = serde_yaml::from_str(&content)
                .context("Failed to parse config file")?;

            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get configuration file path
    fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("tubescript").join("config.yaml"))
    }

    /// Apply command-line overrides on top of file/default values.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if !cli.lang.is_empty() {
            self.languages = cli.lang.clone();
        }
        if let Some(concurrency) = cli.concurrency {
            self.concurrency = concurrency;
        }
        if let Some(timeout) = cli.timeout {
            self.timeout_seconds = timeout;
        }
        if let Some(retries) = cli.retries {
            self.retries = retries;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.languages.is_empty() {
            anyhow::bail!("at least one preferred language must be configured");
        }
        if self.concurrency == 0 {
            anyhow::bail!("concurrency must be at least 1");
        }
        if self.speech.overlap_seconds >= self.speech.chunk_seconds {
            anyhow::bail!("chunk overlap must be smaller than chunk length");
        }
        if self.playlist.page_size == 0 {
            anyhow::bail!("playlist page size must be at least 1");
        }
        Ok(())
    }

    /// Per-call timeout for external calls.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Base delay for exponential backoff.
    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.languages[0], "en");
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = Config::default();
        config.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.speech.overlap_seconds = config.speech.chunk_seconds;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.languages.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config: Config = serde_yaml::from_str("concurrency: 5\n").unwrap();
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.playlist.page_size, 100);
        assert_eq!(config.tools.yt_dlp, "yt-dlp");
    }
}
