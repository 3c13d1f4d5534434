use std::time::{Duration, Instant};

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer};
use rdkafka::error::{KafkaError, KafkaResult, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::{Offset, TopicPartitionList};
use tracing::debug;

use crate::kafka::client::BrokerClient;
use crate::kafka::context::OffsetConsumerContext;
use crate::kafka::types::{
    CommitRequest, ConsumerEvent, Partition, PartitionTimestamp, Record, ResolvedOffset,
};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// `BrokerClient` backed by an rdkafka `BaseConsumer`.
///
/// The base consumer is polled directly from the owning thread, which matches
/// the single-threaded poll loop of the offset core.
pub struct RdKafkaClient {
    consumer: BaseConsumer<OffsetConsumerContext>,
}

impl RdKafkaClient {
    pub fn new(config: &ClientConfig) -> KafkaResult<Self> {
        debug!("rdkafka configuration: {:?}", config);
        let consumer: BaseConsumer<OffsetConsumerContext> =
            config.create_with_context(OffsetConsumerContext)?;
        Ok(Self { consumer })
    }
}

impl BrokerClient for RdKafkaClient {
    fn subscribe(&self, pattern: &str) -> KafkaResult<()> {
        self.consumer.subscribe(&[pattern])
    }

    fn poll(&self, timeout: Duration) -> Option<ConsumerEvent> {
        let event = match self.consumer.poll(timeout)? {
            Ok(message) => ConsumerEvent::Message(Ok(detach(&message))),
            Err(e) => classify_poll_error(e),
        };
        Some(event)
    }

    fn commit(&self) -> KafkaResult<()> {
        self.consumer.commit_consumer_state(CommitMode::Sync)
    }

    fn assignment(&self) -> KafkaResult<Vec<Partition>> {
        let assigned = self.consumer.assignment()?;
        Ok(assigned.elements().into_iter().map(Partition::from).collect())
    }

    fn offsets_for_times(
        &self,
        targets: &[PartitionTimestamp],
        timeout: Duration,
    ) -> KafkaResult<Vec<ResolvedOffset>> {
        let mut tpl = TopicPartitionList::with_capacity(targets.len());
        for target in targets {
            tpl.add_partition_offset(
                target.partition.topic(),
                target.partition.partition_number(),
                Offset::Offset(target.timestamp_ms),
            )?;
        }

        let resolved = self.consumer.offsets_for_times(tpl, timeout)?;
        Ok(resolved.elements().into_iter().map(ResolvedOffset::from).collect())
    }

    fn committed(
        &self,
        partitions: &[Partition],
        timeout: Duration,
    ) -> KafkaResult<Vec<ResolvedOffset>> {
        let mut tpl = TopicPartitionList::with_capacity(partitions.len());
        for partition in partitions {
            tpl.add_partition(partition.topic(), partition.partition_number());
        }

        let committed = self.consumer.committed_offsets(tpl, timeout)?;
        Ok(committed.elements().into_iter().map(ResolvedOffset::from).collect())
    }

    fn commit_offsets(&self, offsets: &CommitRequest) -> KafkaResult<()> {
        let mut tpl = TopicPartitionList::with_capacity(offsets.len());
        for entry in offsets.iter() {
            tpl.add_partition_offset(
                entry.partition.topic(),
                entry.partition.partition_number(),
                entry.offset,
            )?;
        }
        self.consumer.commit(&tpl, CommitMode::Sync)
    }

    fn close(self) -> KafkaResult<()> {
        self.consumer.unsubscribe();
        self.consumer.close_queue()?;

        // Rebalance callbacks for the final revoke are served by polling.
        let deadline = Instant::now() + CLOSE_TIMEOUT;
        while !self.consumer.closed() {
            if Instant::now() >= deadline {
                return Err(KafkaError::Global(RDKafkaErrorCode::RequestTimedOut));
            }
            if let Some(Err(e)) = self.consumer.poll(CLOSE_POLL_INTERVAL) {
                debug!(error = ?e, "Error while draining consumer on close");
            }
        }
        Ok(())
    }
}

fn detach(message: &BorrowedMessage<'_>) -> Record {
    Record {
        key: message.key().map(<[u8]>::to_vec),
        value: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        timestamp_ms: message.timestamp().to_millis(),
    }
}

/// Codes librdkafka raises about the client or cluster as a whole. rdkafka
/// reports some of them through the same channel as per-message errors.
const CLIENT_SCOPE_CODES: &[RDKafkaErrorCode] = &[
    RDKafkaErrorCode::AllBrokersDown,
    RDKafkaErrorCode::PollExceeded,
    RDKafkaErrorCode::BrokerTransportFailure,
    RDKafkaErrorCode::Resolve,
    RDKafkaErrorCode::Authentication,
    RDKafkaErrorCode::SaslAuthenticationFailed,
    RDKafkaErrorCode::SSL,
    RDKafkaErrorCode::Fatal,
];

pub(crate) fn classify_poll_error(error: KafkaError) -> ConsumerEvent {
    match error {
        KafkaError::PartitionEOF(_) => ConsumerEvent::Ignored,
        KafkaError::MessageConsumption(code) if !CLIENT_SCOPE_CODES.contains(&code) => {
            ConsumerEvent::Message(Err(error))
        }
        other => ConsumerEvent::BrokerError(other),
    }
}
