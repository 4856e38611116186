use std::future::Future;
use std::time::Duration;

use crate::config::ToolsConfig;
use crate::{AcquireError, Result};

/// Retry an operation on transient failures with doubling backoff.
///
/// Permanent errors return immediately; the last transient error is
/// escalated once the attempt budget is spent.
pub async fn with_retries<T, F, Fut>(attempts: u32, base: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = base;
    let mut last: Option<AcquireError> = None;

    for attempt in 1..=attempts.max(1) {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < attempts => {
                tracing::debug!(
                    "transient failure (attempt {attempt}/{attempts}), retrying in {delay:?}: {err}"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                last = Some(err);
            }
            Err(err) => return Err(err),
        }
    }

    Err(last.unwrap_or_else(|| AcquireError::Network("retry budget exhausted".into())))
}

/// Check if the current environment has required tools
pub async fn check_dependencies(tools: &ToolsConfig) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(&tools.yt_dlp).await {
        missing.push(format!("{} - required for metadata and audio extraction", tools.yt_dlp));
    }

    if !check_command_available(&tools.ffmpeg).await {
        missing.push(format!("{} - required for the speech recognition fallback", tools.ffmpeg));
    }

    if !check_command_available(&tools.ffprobe).await {
        missing.push(format!("{} - required for the speech recognition fallback", tools.ffprobe));
    }

    if !check_command_available(&tools.whisper).await {
        missing.push(format!("{} - required for the speech recognition fallback", tools.whisper));
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg("--version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = tokio_test::block_on(with_retries(3, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AcquireError::Network("flaky".into()))
                } else {
                    Ok(42u32)
                }
            }
        }));
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn permanent_errors_do_not_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> =
            tokio_test::block_on(with_retries(3, Duration::from_millis(1), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AcquireError::NoCaptionsAvailable) }
            }));
        assert!(matches!(result, Err(AcquireError::NoCaptionsAvailable)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exhausted_budget_escalates_last_transient() {
        let result: Result<u32> =
            tokio_test::block_on(with_retries(2, Duration::from_millis(1), || async {
                Err(AcquireError::RateLimited)
            }));
        assert!(matches!(result, Err(AcquireError::RateLimited)));
    }
}
