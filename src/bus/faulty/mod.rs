//! Fault-injecting log wrappers for testing failure handling.
//!
//! Wraps any `EventLog` or `LogConsumer` and fails or delays a configurable
//! number of upcoming calls. The fault handle is shared, so a test can arm
//! faults after handing the wrapped consumer to a subscriber.
//!
//! # Example
//!
//! ```ignore
//! use orderflow::bus::{ChannelLog, FaultyConsumer};
//!
//! let log = ChannelLog::default();
//! let (consumer, faults) = FaultyConsumer::wrap(log.consumer("group", "orders")?);
//! faults.fail_next_commits(1);
//! ```

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{EventLog, LogConsumer, LogError, LogRecord, Position, Result};

/// Take one unit from a countdown, returning whether a fault fires.
fn take(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Faults armed on a `FaultyLog`.
#[derive(Debug, Default)]
pub struct AppendFaults {
    fail_appends: AtomicU32,
    delay_ms: AtomicU64,
}

impl AppendFaults {
    /// Fail the next `n` appends with `LogError::Append`.
    pub fn fail_next_appends(&self, n: u32) {
        self.fail_appends.store(n, Ordering::SeqCst);
    }

    /// Delay every append by `delay` before forwarding it.
    pub fn set_append_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

/// `EventLog` wrapper that fails or delays appends on demand.
pub struct FaultyLog {
    inner: Arc<dyn EventLog>,
    faults: Arc<AppendFaults>,
}

impl FaultyLog {
    /// Wrap `inner`, returning the wrapper and its fault handle.
    pub fn wrap(inner: Arc<dyn EventLog>) -> (Self, Arc<AppendFaults>) {
        let faults = Arc::new(AppendFaults::default());
        (
            Self {
                inner,
                faults: faults.clone(),
            },
            faults,
        )
    }
}

#[async_trait]
impl EventLog for FaultyLog {
    async fn append(&self, topic: &str, key: &[u8], value: &[u8]) -> Result<Position> {
        let delay = self.faults.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if take(&self.faults.fail_appends) {
            warn!(topic, "Injected append failure");
            return Err(LogError::Append("injected append failure".to_string()));
        }

        self.inner.append(topic, key, value).await
    }
}

/// Faults armed on a `FaultyConsumer`.
#[derive(Debug, Default)]
pub struct ConsumerFaults {
    fail_polls: AtomicU32,
    fail_commits: AtomicU32,
}

impl ConsumerFaults {
    /// Fail the next `n` polls with `LogError::Connection`.
    pub fn fail_next_polls(&self, n: u32) {
        self.fail_polls.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` commits with `LogError::Commit`, leaving the
    /// committed offset untouched.
    pub fn fail_next_commits(&self, n: u32) {
        self.fail_commits.store(n, Ordering::SeqCst);
    }
}

/// `LogConsumer` wrapper that fails polls or commits on demand.
pub struct FaultyConsumer {
    inner: Box<dyn LogConsumer>,
    faults: Arc<ConsumerFaults>,
}

impl FaultyConsumer {
    /// Wrap `inner`, returning the wrapper and its fault handle.
    pub fn wrap(inner: impl LogConsumer + 'static) -> (Self, Arc<ConsumerFaults>) {
        let faults = Arc::new(ConsumerFaults::default());
        (
            Self {
                inner: Box::new(inner),
                faults: faults.clone(),
            },
            faults,
        )
    }
}

#[async_trait]
impl LogConsumer for FaultyConsumer {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<LogRecord>> {
        if take(&self.faults.fail_polls) {
            warn!("Injected poll failure");
            return Err(LogError::Connection("injected broker outage".to_string()));
        }
        self.inner.poll(timeout).await
    }

    async fn commit(&mut self, record: &LogRecord) -> Result<()> {
        if take(&self.faults.fail_commits) {
            warn!(
                partition = record.partition,
                offset = record.offset,
                "Injected commit failure"
            );
            return Err(LogError::Commit("injected commit failure".to_string()));
        }
        self.inner.commit(record).await
    }

    async fn rewind(&mut self, record: &LogRecord) -> Result<()> {
        self.inner.rewind(record).await
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await
    }
}
