use std::time::Duration;

use rand::Rng;
use tokio::signal;
use tracing::{error, warn};

/// Jitter applied to retry delays (±20%).
const BACKOFF_JITTER_PERCENT: f64 = 0.2;

/// Retries never fire faster than this.
const MIN_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Delay before retry number `attempt` (1-based).
///
/// Doubles from `base` up to `max`, then applies ±20% jitter and a 100ms floor.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    let delay_ms = base_ms
        .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
        .min(max_ms);

    let spread = rand::rng().random::<f64>() * 2.0 - 1.0;
    let jittered = delay_ms as f64 * (1.0 + BACKOFF_JITTER_PERCENT * spread);

    Duration::from_millis(jittered as u64).max(MIN_RETRY_DELAY)
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
///
/// A handler that cannot be installed is logged and never fires; the other
/// one still does.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
