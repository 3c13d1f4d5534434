use rdkafka::consumer::{BaseConsumer, ConsumerContext, Rebalance};
use rdkafka::error::KafkaResult;
use rdkafka::{ClientContext, TopicPartitionList};
use tracing::{debug, info, warn};

use crate::kafka::types::Partition;
use crate::metrics_consts::COMMIT_PARTITION_ERRORS;

/// Observes rebalances and commit results. Partition assignment itself is left
/// to the client's default cooperative handling.
#[derive(Debug, Default)]
pub struct OffsetConsumerContext;

impl ClientContext for OffsetConsumerContext {}

impl ConsumerContext for OffsetConsumerContext {
    fn pre_rebalance(&self, _base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance) {
        match rebalance {
            Rebalance::Revoke(partitions) => {
                info!(
                    partitions = ?partition_names(partitions),
                    "Kafka consumer partitions revoked"
                );
            }
            Rebalance::Assign(partitions) => {
                debug!("Pre-rebalance assign event for {} partitions", partitions.count());
            }
            Rebalance::Error(e) => {
                warn!("Rebalance error: {}", e);
            }
        }
    }

    fn post_rebalance(&self, _base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance) {
        if let Rebalance::Assign(partitions) = rebalance {
            info!(
                partitions = ?partition_names(partitions),
                "Kafka consumer partitions assigned"
            );
        }
    }

    // Synchronous commits only report the first failure; per-partition errors of an
    // otherwise successful commit are only visible here.
    fn commit_callback(&self, result: KafkaResult<()>, offsets: &TopicPartitionList) {
        if let Err(e) = result {
            warn!("Kafka consumer commit failed: {}", e);
        }

        for elem in offsets.elements() {
            if let Err(e) = elem.error() {
                warn!(
                    topic = elem.topic(),
                    partition = elem.partition(),
                    offset = ?elem.offset(),
                    error = ?e,
                    "Partition offset commit rejected"
                );
                metrics::counter!(COMMIT_PARTITION_ERRORS, "topic" => elem.topic().to_string())
                    .increment(1);
            }
        }
    }
}

fn partition_names(partitions: &TopicPartitionList) -> Vec<String> {
    partitions
        .elements()
        .into_iter()
        .map(|elem| Partition::from(elem).to_string())
        .collect()
}
