use clap::Parser;
use std::process::ExitCode;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tubescript::cli::Cli;
use tubescript::config::Config;
use tubescript::output;
use tubescript::pipeline::{Outcome, Pipeline};
use tubescript::resolver::{self, Reference};
use tubescript::{utils, AcquireError};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tubescript=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Reference resolution is pure; malformed input fails before any
    // external call is made.
    let reference = resolver::resolve(&cli.url)?;

    let mut config = Config::load()?;
    config.apply_cli(&cli);
    config.validate()?;

    let missing = utils::check_dependencies(&config.tools).await;
    if !missing.is_empty() && !cli.quiet {
        eprintln!("warning: some external tools are unavailable:");
        for dep in &missing {
            eprintln!("  - {dep}");
        }
        eprintln!("  (continuing; stages that need them will fail)");
    }

    // Ctrl-C flips the cancellation token watched by in-flight workers.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let cancel_flag = cancel_rx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling in-flight work");
            let _ = cancel_tx.send(true);
        }
    });

    let pipeline = Pipeline::new(config, cancel_rx, cli.quiet, cli.force_speech)?;

    if cli.playlist_info_only {
        if let Reference::Playlist { id } = &reference {
            let listing = pipeline.list_playlist(id).await?;
            output::print(&output::listing_document(listing, &cli.url), cli.pretty)?;
            return Ok(());
        }
        tracing::warn!("--playlist-info-only ignored for a single video");
    }

    match pipeline.run(&reference).await? {
        Outcome::Video(result) => {
            output::print(&output::video_document(result, &cli.url), cli.pretty)?;
        }
        Outcome::Playlist(result) => {
            output::print(&output::playlist_document(result, &cli.url), cli.pretty)?;
            // The partial document has been emitted; still report the
            // interrupt through the exit code.
            if *cancel_flag.borrow() {
                return Err(AcquireError::Cancelled.into());
            }
        }
    }

    Ok(())
}

fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<AcquireError>() {
        Some(AcquireError::InvalidReference(_)) => 2,
        Some(AcquireError::VideoUnavailable(_)) => 4,
        Some(AcquireError::Cancelled) => 130,
        Some(_) => 3,
        None => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_map_error_families() {
        assert_eq!(exit_code(&AcquireError::InvalidReference("x".into()).into()), 2);
        assert_eq!(exit_code(&AcquireError::TranscriptionFailed("x".into()).into()), 3);
        assert_eq!(exit_code(&AcquireError::VideoUnavailable("x".into()).into()), 4);
        assert_eq!(exit_code(&AcquireError::Cancelled.into()), 130);
        assert_eq!(exit_code(&anyhow::anyhow!("unexpected")), 1);
    }
}
