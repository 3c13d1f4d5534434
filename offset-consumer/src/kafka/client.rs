use std::time::Duration;

use rdkafka::error::KafkaResult;

use crate::kafka::types::{CommitRequest, ConsumerEvent, Partition, PartitionTimestamp, ResolvedOffset};

/// The broker-facing half of the consumer.
///
/// Everything the offset core needs from a Kafka client sits behind this seam:
/// the production implementation wraps an rdkafka `BaseConsumer`, tests use a
/// recording fake. All calls are made from the single thread that owns the
/// consumer, so implementations need no internal synchronization.
pub trait BrokerClient {
    /// Subscribe to every topic matching `pattern` (a `^`-prefixed regex).
    fn subscribe(&self, pattern: &str) -> KafkaResult<()>;

    /// Wait up to `timeout` for the next event. `None` means nothing arrived.
    fn poll(&self, timeout: Duration) -> Option<ConsumerEvent>;

    /// Commit the positions the client has advanced to by delivering records.
    fn commit(&self) -> KafkaResult<()>;

    /// Partitions currently assigned to this group member.
    fn assignment(&self) -> KafkaResult<Vec<Partition>>;

    /// Translate per-partition timestamps into the earliest offset whose
    /// timestamp is at or after the target.
    fn offsets_for_times(
        &self,
        targets: &[PartitionTimestamp],
        timeout: Duration,
    ) -> KafkaResult<Vec<ResolvedOffset>>;

    /// Currently committed offsets for the group, sentinels included.
    fn committed(
        &self,
        partitions: &[Partition],
        timeout: Duration,
    ) -> KafkaResult<Vec<ResolvedOffset>>;

    /// Synchronously commit exactly the offsets in `offsets`.
    fn commit_offsets(&self, offsets: &CommitRequest) -> KafkaResult<()>;

    /// Leave the group and release the client.
    fn close(self) -> KafkaResult<()>
    where
        Self: Sized;
}
