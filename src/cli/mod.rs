use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "tubescript",
    about = "Acquire structured, timestamped transcripts from YouTube videos and playlists",
    version,
    long_about = "Resolves a video or playlist URL, fetches metadata, and obtains a transcript \
by falling back from manual captions to auto-generated captions to local speech recognition. \
Emits one JSON document on stdout; logs go to stderr."
)]
pub struct Cli {
    /// YouTube video or playlist URL (or a bare 11-character video ID)
    #[arg(value_name = "URL")]
    pub url: String,

    /// Language preference order for caption selection (comma-separated)
    #[arg(short, long, value_name = "LANGS", value_delimiter = ',', env = "TUBESCRIPT_LANGS")]
    pub lang: Vec<String>,

    /// Concurrent playlist members processed at once
    #[arg(short, long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Per-call timeout for external calls, in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Retry attempts for transient failures
    #[arg(long, value_name = "COUNT")]
    pub retries: Option<u32>,

    /// Pretty-print the JSON document
    #[arg(long)]
    pub pretty: bool,

    /// Skip caption lookup and transcribe the audio directly
    #[arg(long)]
    pub force_speech: bool,

    /// For playlists, list members without acquiring transcripts
    #[arg(long)]
    pub playlist_info_only: bool,

    /// Disable progress indicators
    #[arg(short, long)]
    pub quiet: bool,
}
