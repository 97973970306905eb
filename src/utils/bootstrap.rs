//! Bootstrap utilities for orderflow binaries.
//!
//! Shared initialization code for the order, kitchen and standalone services.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;

/// Initialize tracing from the ORDERFLOW_LOG environment variable.
///
/// Defaults to "info" level if ORDERFLOW_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Backoff for connecting to the log at startup.
///
/// - Min delay: 100ms
/// - Max delay: 5s
/// - Max attempts: 30
/// - Jitter enabled
pub fn connection_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(30)
        .with_jitter()
}

/// Connect to a dependency, retrying with `connection_backoff`.
///
/// # Arguments
/// * `service_name` - Human-readable name for logging (e.g., "event log")
/// * `address` - Where the dependency lives, for logging only
/// * `connect` - Async function that attempts to establish a connection
///
/// # Returns
/// The connected client on success, or the last error once retries run out.
pub async fn connect_with_retry<T, E, F, Fut>(
    service_name: &str,
    address: &str,
    connect: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    connect_with_backoff(service_name, address, connection_backoff(), connect).await
}

async fn connect_with_backoff<T, E, F, Fut>(
    service_name: &str,
    address: &str,
    backoff: ExponentialBuilder,
    connect: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let client = connect
        .retry(backoff)
        .notify(|err: &E, dur: Duration| {
            warn!(service = service_name, address, error = %err, delay = ?dur, "Connection failed, retrying");
        })
        .await
        .inspect_err(|err| {
            error!(service = service_name, address, error = %err, "Giving up on connection");
        })?;

    info!(service = service_name, address, "Connected");
    Ok(client)
}

/// Resolve when the process receives Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

/// Cancellation token that fires on the first shutdown signal.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });
    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_backoff(retries: usize) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_millis(40))
            .with_max_times(retries)
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_succeeds_after_retries() {
        let attempts = AtomicU32::new(0);
        let result: Result<&str, String> =
            connect_with_backoff("log", "localhost:9092", fast_backoff(5), || {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(format!("refused {}", n))
                    } else {
                        Ok("connected")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("connected"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_gives_up_with_last_error() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), String> =
            connect_with_backoff("log", "localhost:9092", fast_backoff(2), || {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err(format!("refused {}", n)) }
            })
            .await;

        // One initial attempt plus two retries.
        assert_eq!(result, Err("refused 3".to_string()));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
