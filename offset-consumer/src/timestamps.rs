use std::collections::HashMap;

use crate::kafka::types::Partition;

/// Timestamp of the most recently delivered record, per partition.
///
/// Last write wins: the tracker follows delivery order, not timestamp order.
/// Entries are never removed during a session, so a partition that was revoked
/// keeps its last value until the consumer restarts.
#[derive(Debug, Default)]
pub struct PartitionTimestampTracker {
    last_seen: HashMap<Partition, i64>,
}

impl PartitionTimestampTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, partition: &Partition, timestamp_ms: i64) {
        self.last_seen.insert(partition.clone(), timestamp_ms);
    }

    pub fn lookup(&self, partition: &Partition) -> Option<i64> {
        self.last_seen.get(partition).copied()
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}
