use rdkafka::error::KafkaError;
use thiserror::Error;

use crate::codec::KeyDecodeError;
use crate::kafka::types::Partition;

/// Conditions after which the consumer must not keep running. The core only
/// reports them; the owner of the poll loop decides how to terminate.
#[derive(Error, Debug)]
pub enum FatalFault {
    #[error("all brokers are down: {0}")]
    AllBrokersDown(#[source] KafkaError),

    #[error("max poll interval exceeded, consumer left the group: {0}")]
    MaxPollExceeded(#[source] KafkaError),

    #[error("malformed key on {partition} at offset {offset}: {source}")]
    MalformedKey {
        partition: Partition,
        offset: i64,
        #[source]
        source: KeyDecodeError,
    },
}

#[derive(Error, Debug)]
pub enum ConsumeError {
    #[error("consumer partition error: {0}")]
    Partition(#[source] KafkaError),

    #[error(transparent)]
    Fatal(#[from] FatalFault),
}

impl ConsumeError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConsumeError::Fatal(_))
    }
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("failed to read partition assignment: {0}")]
    Assignment(#[source] KafkaError),

    #[error("back commit failed resolving offsets for times: {0}")]
    OffsetsForTimes(#[source] KafkaError),

    #[error("back commit failed retrieving committed offsets: {0}")]
    Committed(#[source] KafkaError),

    #[error("back commit failed committing offsets: {0}")]
    Commit(#[source] KafkaError),

    #[error("back commit failed: {operation} returned an error for {partition}: {source}")]
    PartitionLookup {
        operation: &'static str,
        partition: Partition,
        #[source]
        source: KafkaError,
    },
}

impl ReconcileError {
    /// Returns the error type tag for metrics
    pub fn error_type(&self) -> &'static str {
        match self {
            ReconcileError::Assignment(_) => "assignment",
            ReconcileError::OffsetsForTimes(_) => "offsets_for_times",
            ReconcileError::Committed(_) => "committed",
            ReconcileError::Commit(_) => "commit",
            ReconcileError::PartitionLookup { .. } => "partition_lookup",
        }
    }
}

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("no topics configured for subscription")]
    NoTopics,

    #[error("failed to create Kafka consumer: {0}")]
    ClientCreation(#[source] KafkaError),

    #[error("failed to subscribe to {pattern}: {source}")]
    Subscribe {
        pattern: String,
        #[source]
        source: KafkaError,
    },
}
