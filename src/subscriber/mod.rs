//! Order subscriber: the poll, process, commit loop.
//!
//! Per iteration:
//! `POLLING → DECODING → PROCESSING → COMMITTING → POLLING`
//!
//! - Undecodable records are logged and skipped without a commit. They can
//!   never decode differently, so retrying them is pointless.
//! - A failed handler withholds the commit and rewinds the consumer, so the
//!   same record comes back on the next poll.
//! - A failed commit is logged and the loop moves on; the next successful
//!   commit, or the group's last committed offset after a restart, covers it.
//! - A failed poll is logged and the loop keeps polling after a backoff.
//!   A permanent log error (see `LogError::is_transient`) stops the loop.
//!
//! Offsets are committed one record at a time and only after the handler
//! succeeded, which gives at-least-once processing.

mod handler;

pub use handler::{KitchenHandler, OrderHandler, ProcessingError};

use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::{LogConsumer, LogError, Position};
use crate::config::SubscriberConfig;
use crate::event::{codec, DecodeError};

/// What one iteration of the loop did.
#[derive(Debug)]
pub enum RecordOutcome {
    /// Nothing arrived within the poll timeout.
    Idle,
    /// Record processed and its offset committed.
    Committed(Position),
    /// Record could not be decoded; skipped without commit.
    Skipped { position: Position, error: DecodeError },
    /// Handler failed; commit withheld and record queued for redelivery.
    ProcessingFailed {
        position: Position,
        error: ProcessingError,
    },
    /// Handler succeeded but the commit did not.
    CommitFailed { position: Position, error: LogError },
    /// The log could not be polled.
    PollFailed(LogError),
}

/// Counts of loop outcomes, returned when the loop stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriberReport {
    pub committed: u64,
    pub skipped: u64,
    pub processing_failures: u64,
    pub commit_failures: u64,
    pub poll_failures: u64,
    /// Permanent log error that stopped the loop, if any.
    pub fatal: Option<LogError>,
}

impl SubscriberReport {
    fn record(&mut self, outcome: &RecordOutcome) {
        match outcome {
            RecordOutcome::Idle => {}
            RecordOutcome::Committed(_) => self.committed += 1,
            RecordOutcome::Skipped { .. } => self.skipped += 1,
            RecordOutcome::ProcessingFailed { .. } => self.processing_failures += 1,
            RecordOutcome::CommitFailed { .. } => self.commit_failures += 1,
            RecordOutcome::PollFailed(_) => self.poll_failures += 1,
        }
    }
}

/// Consumes `OrderCreated` events from one consumer-group assignment.
///
/// Owns its consumer exclusively; run one subscriber per worker.
pub struct OrderSubscriber {
    consumer: Box<dyn LogConsumer>,
    handler: Arc<dyn OrderHandler>,
    poll_timeout: Duration,
    backoff: ExponentialBuilder,
}

impl OrderSubscriber {
    pub fn new(consumer: Box<dyn LogConsumer>, handler: Arc<dyn OrderHandler>) -> Self {
        Self::from_config(consumer, handler, &SubscriberConfig::default())
    }

    pub fn from_config(
        consumer: Box<dyn LogConsumer>,
        handler: Arc<dyn OrderHandler>,
        config: &SubscriberConfig,
    ) -> Self {
        Self {
            consumer,
            handler,
            poll_timeout: config.poll_timeout(),
            backoff: backoff_builder(config.backoff_min(), config.backoff_max()),
        }
    }

    /// Set how long each poll waits for a record.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Set the pause range applied after consecutive failures.
    pub fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.backoff = backoff_builder(min, max);
        self
    }

    /// Run one iteration: poll, then decode, process and commit whatever
    /// arrived.
    pub async fn poll_once(&mut self) -> RecordOutcome {
        let record = match self.consumer.poll(self.poll_timeout).await {
            Ok(Some(record)) => record,
            Ok(None) => return RecordOutcome::Idle,
            Err(error) => {
                warn!(error = %error, "Poll failed; will retry");
                return RecordOutcome::PollFailed(error);
            }
        };
        let position = record.position();

        let event = match codec::decode(record.payload.as_deref().unwrap_or_default()) {
            Ok(event) => Arc::new(event),
            Err(error) => {
                error!(
                    partition = position.partition,
                    offset = position.offset,
                    error = %error,
                    "Skipping undecodable record"
                );
                return RecordOutcome::Skipped { position, error };
            }
        };

        debug!(
            order_id = %event.order_id,
            partition = position.partition,
            offset = position.offset,
            "Received order"
        );

        if let Err(error) = self.handler.process(Arc::clone(&event)).await {
            warn!(
                order_id = %event.order_id,
                partition = position.partition,
                offset = position.offset,
                error = %error,
                "Processing failed; record will be redelivered"
            );
            if let Err(seek_error) = self.consumer.rewind(&record).await {
                // Without the rewind the record still comes back after a
                // restart, from the last committed offset.
                error!(
                    order_id = %event.order_id,
                    error = %seek_error,
                    "Failed to rewind consumer"
                );
            }
            return RecordOutcome::ProcessingFailed { position, error };
        }

        match self.consumer.commit(&record).await {
            Ok(()) => {
                debug!(order_id = %event.order_id, offset = position.offset, "Order committed");
                RecordOutcome::Committed(position)
            }
            Err(error) => {
                error!(
                    order_id = %event.order_id,
                    partition = position.partition,
                    offset = position.offset,
                    error = %error,
                    "Commit failed; position unchanged"
                );
                RecordOutcome::CommitFailed { position, error }
            }
        }
    }

    /// Run until `shutdown` is cancelled, then leave the group.
    ///
    /// Cancellation is checked between records: a record that has been
    /// polled is always carried through processing and commit first.
    pub async fn run(mut self, shutdown: CancellationToken) -> SubscriberReport {
        let mut report = SubscriberReport::default();
        let mut backoff: Option<ExponentialBackoff> = None;

        info!("Subscriber started");

        while !shutdown.is_cancelled() {
            let outcome = self.poll_once().await;
            report.record(&outcome);

            match outcome {
                RecordOutcome::PollFailed(error) if !error.is_transient() => {
                    error!(error = %error, "Log error is permanent; stopping subscriber");
                    report.fatal = Some(error);
                    break;
                }
                RecordOutcome::PollFailed(_) | RecordOutcome::ProcessingFailed { .. } => {
                    let delay = backoff
                        .get_or_insert_with(|| self.backoff.build())
                        .next()
                        .unwrap_or(Duration::from_secs(1));
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                _ => backoff = None,
            }
        }

        if let Err(e) = self.consumer.close().await {
            warn!(error = %e, "Failed to close consumer");
        }

        info!(
            committed = report.committed,
            skipped = report.skipped,
            processing_failures = report.processing_failures,
            commit_failures = report.commit_failures,
            poll_failures = report.poll_failures,
            "Subscriber stopped"
        );

        report
    }
}

fn backoff_builder(min: Duration, max: Duration) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(min)
        .with_max_delay(max.max(min))
        .with_max_times(usize::MAX)
        .with_jitter()
}
