//! In-memory partitioned log for standalone mode.
//!
//! Keeps every appended record for the life of the process, partitioned by a
//! hash of the record key. Consumer groups track committed offsets per
//! partition, so a consumer that goes away without committing leaves its
//! records to be redelivered to the next member of the group.
//! Ideal for local development and testing without a broker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, info};

use super::{EventLog, LogConsumer, LogError, LogRecord, Position, Result};

/// Default number of partitions per topic.
pub const DEFAULT_PARTITIONS: usize = 3;

#[derive(Debug, Clone)]
struct StoredRecord {
    key: Vec<u8>,
    payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct GroupState {
    /// Next offset to read, per partition.
    committed: HashMap<i32, i64>,
    /// Member currently holding the assignment.
    member: Option<u64>,
}

#[derive(Debug, Default)]
struct LogState {
    topics: HashMap<String, Vec<Vec<StoredRecord>>>,
    groups: HashMap<(String, String), GroupState>,
    next_member_id: u64,
}

impl LogState {
    fn topic_mut(&mut self, topic: &str, partitions: usize) -> &mut Vec<Vec<StoredRecord>> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); partitions])
    }
}

fn lock(state: &Mutex<LogState>) -> MutexGuard<'_, LogState> {
    // State stays consistent across a panicking holder: every mutation is a
    // single push or insert.
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// FNV-1a, so the same key lands on the same partition in every process.
fn hash_key(key: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in key {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// In-memory log using a mutex-guarded partition table.
///
/// Appends are acknowledged once stored; there is no replication to wait
/// for and no internal retry that could duplicate a record.
pub struct ChannelLog {
    partitions: usize,
    state: Arc<Mutex<LogState>>,
    appended: Arc<Notify>,
}

impl Default for ChannelLog {
    fn default() -> Self {
        Self::new(DEFAULT_PARTITIONS)
    }
}

impl ChannelLog {
    /// Create a log whose topics have `partitions` partitions (at least one).
    pub fn new(partitions: usize) -> Self {
        let partitions = partitions.max(1);
        info!(partitions, "Channel log initialized");

        Self {
            partitions,
            state: Arc::new(Mutex::new(LogState::default())),
            appended: Arc::new(Notify::new()),
        }
    }

    /// Partition a key is routed to.
    pub fn partition_for(&self, key: &[u8]) -> i32 {
        (hash_key(key) as usize % self.partitions) as i32
    }

    /// Number of partitions per topic.
    pub fn partitions(&self) -> usize {
        self.partitions
    }

    /// Number of records stored in one partition of a topic.
    pub fn partition_len(&self, topic: &str, partition: i32) -> usize {
        let state = lock(&self.state);
        state
            .topics
            .get(topic)
            .and_then(|parts| parts.get(partition as usize))
            .map_or(0, Vec::len)
    }

    /// Next offset the group will read from a partition, if it ever committed.
    pub fn committed_offset(&self, group_id: &str, topic: &str, partition: i32) -> Option<i64> {
        let state = lock(&self.state);
        state
            .groups
            .get(&(group_id.to_string(), topic.to_string()))
            .and_then(|group| group.committed.get(&partition).copied())
    }

    /// Join `group_id` on `topic`, taking every partition.
    ///
    /// Fails while another live member of the group holds the assignment.
    pub fn consumer(&self, group_id: &str, topic: &str) -> Result<ChannelConsumer> {
        let mut state = lock(&self.state);
        state.topic_mut(topic, self.partitions);

        let id = state.next_member_id;
        state.next_member_id += 1;

        let group = state
            .groups
            .entry((group_id.to_string(), topic.to_string()))
            .or_default();
        if group.member.is_some() {
            return Err(LogError::AssignmentHeld {
                group: group_id.to_string(),
                topic: topic.to_string(),
            });
        }
        group.member = Some(id);

        // Unknown partitions start at the earliest offset.
        let positions = (0..self.partitions as i32)
            .map(|p| group.committed.get(&p).copied().unwrap_or(0))
            .collect();

        info!(group_id, topic, member = id, "Channel consumer joined group");

        Ok(ChannelConsumer {
            id,
            group_id: group_id.to_string(),
            topic: topic.to_string(),
            state: self.state.clone(),
            appended: self.appended.clone(),
            positions,
            next_partition: 0,
            closed: false,
        })
    }
}

#[async_trait]
impl EventLog for ChannelLog {
    async fn append(&self, topic: &str, key: &[u8], value: &[u8]) -> Result<Position> {
        let partition = self.partition_for(key);
        let offset = {
            let mut state = lock(&self.state);
            let records = &mut state.topic_mut(topic, self.partitions)[partition as usize];
            records.push(StoredRecord {
                key: key.to_vec(),
                payload: value.to_vec(),
            });
            (records.len() - 1) as i64
        };

        self.appended.notify_waiters();

        debug!(topic, partition, offset, "Appended record to channel log");

        Ok(Position { partition, offset })
    }
}

/// Member of a consumer group on a `ChannelLog`.
///
/// Dropping the consumer without closing it releases the assignment the way
/// a crashed process would: nothing past the last commit is remembered.
pub struct ChannelConsumer {
    id: u64,
    group_id: String,
    topic: String,
    state: Arc<Mutex<LogState>>,
    appended: Arc<Notify>,
    /// Next offset to fetch, per partition.
    positions: Vec<i64>,
    /// Round-robin cursor so one busy partition cannot starve the others.
    next_partition: usize,
    closed: bool,
}

impl ChannelConsumer {
    fn group_key(&self) -> (String, String) {
        (self.group_id.clone(), self.topic.clone())
    }

    fn try_fetch(&mut self) -> Option<LogRecord> {
        let state = lock(&self.state);
        let partitions = state.topics.get(&self.topic)?;
        let count = self.positions.len();

        for step in 0..count {
            let partition = (self.next_partition + step) % count;
            let offset = self.positions[partition];
            if let Some(stored) = partitions[partition].get(offset as usize) {
                self.positions[partition] = offset + 1;
                self.next_partition = (partition + 1) % count;
                return Some(LogRecord {
                    topic: self.topic.clone(),
                    partition: partition as i32,
                    offset,
                    key: Some(stored.key.clone()),
                    payload: Some(stored.payload.clone()),
                });
            }
        }
        None
    }

    fn release(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let mut state = lock(&self.state);
        if let Some(group) = state.groups.get_mut(&self.group_key()) {
            if group.member == Some(self.id) {
                group.member = None;
            }
        }
    }

    fn check_open(&self, record: &LogRecord) -> Result<()> {
        if self.closed {
            return Err(LogError::Closed);
        }
        if record.topic != self.topic || record.partition < 0 {
            return Err(LogError::Commit(format!(
                "record {}/{} is not assigned to this consumer",
                record.topic, record.partition
            )));
        }
        if record.partition as usize >= self.positions.len() {
            return Err(LogError::Commit(format!(
                "partition {} does not exist",
                record.partition
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LogConsumer for ChannelConsumer {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<LogRecord>> {
        if self.closed {
            return Err(LogError::Closed);
        }

        let deadline = tokio::time::Instant::now() + timeout;
        let appended = self.appended.clone();
        loop {
            // Register interest before checking, so an append that lands in
            // between still wakes us.
            let notified = appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(record) = self.try_fetch() {
                return Ok(Some(record));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn commit(&mut self, record: &LogRecord) -> Result<()> {
        self.check_open(record)?;

        let key = self.group_key();
        let mut state = lock(&self.state);
        let group = state.groups.entry(key).or_default();
        if group.member != Some(self.id) {
            return Err(LogError::Commit(
                "consumer no longer holds the partition assignment".to_string(),
            ));
        }
        group.committed.insert(record.partition, record.offset + 1);

        debug!(
            group_id = %self.group_id,
            partition = record.partition,
            offset = record.offset,
            "Committed offset"
        );
        Ok(())
    }

    async fn rewind(&mut self, record: &LogRecord) -> Result<()> {
        self.check_open(record)?;
        self.positions[record.partition as usize] = record.offset;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.release();
        info!(group_id = %self.group_id, topic = %self.topic, "Channel consumer left group");
        Ok(())
    }
}

impl Drop for ChannelConsumer {
    fn drop(&mut self) {
        self.release();
    }
}
