use std::time::{Duration, Instant};

use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use tracing::{debug, error, info, warn};

use crate::codec::decode_key;
use crate::config::ConsumerSettings;
use crate::diagnostics::{Diagnostics, FailureKind};
use crate::error::{ConsumeError, FatalFault, ReconcileError, SetupError};
use crate::kafka::client::BrokerClient;
use crate::kafka::types::{CommitRequest, ConsumerEvent, Record};
use crate::metrics_consts::{
    BROKER_ERRORS, MESSAGES_DELIVERED, MESSAGE_PARTITION_ERRORS, PLAIN_COMMITS,
};
use crate::reconciler::OffsetReconciler;
use crate::scheduler::CommitScheduler;
use crate::timestamps::PartitionTimestampTracker;

/// Delivery metadata handed to the message handler alongside key and value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    pub topic: String,
    /// The record's offset within its partition.
    pub id: u64,
    pub timestamp: i64,
}

/// Application callback. Invoked synchronously, in delivery order; a record can
/// be redelivered after a restart, so implementations must be idempotent.
pub trait MessageHandler {
    fn handle(&mut self, key: u64, value: &[u8], meta: &Meta);
}

impl<F> MessageHandler for F
where
    F: FnMut(u64, &[u8], &Meta),
{
    fn handle(&mut self, key: u64, value: &[u8], meta: &Meta) {
        self(key, value, meta)
    }
}

/// Group consumer that delivers records to a handler and manages when, and at
/// which offsets, consumed positions are committed.
///
/// Single-threaded: `consume_next`, the rollbacks and `close` must all be
/// called from the thread that owns the consumer.
pub struct OffsetConsumer<C: BrokerClient, H: MessageHandler> {
    client: C,
    handler: H,
    tracker: PartitionTimestampTracker,
    // present only when auto-commit is enabled
    commit_scheduler: Option<CommitScheduler>,
    reconciler: OffsetReconciler,
    poll_timeout: Duration,
    diagnostics: Diagnostics,
}

impl<C: BrokerClient, H: MessageHandler> OffsetConsumer<C, H> {
    pub fn new(client: C, settings: &ConsumerSettings, handler: H) -> Result<Self, SetupError> {
        let pattern = settings.subscription_pattern()?;
        client
            .subscribe(&pattern)
            .map_err(|source| SetupError::Subscribe {
                pattern: pattern.clone(),
                source,
            })?;

        info!(
            group_id = %settings.group_id,
            pattern,
            auto_commit = settings.auto_commit,
            "Kafka consumer subscribed"
        );

        let commit_scheduler = settings
            .auto_commit
            .then(|| CommitScheduler::new(settings.commit_interval, Instant::now()));

        Ok(Self {
            client,
            handler,
            tracker: PartitionTimestampTracker::new(),
            commit_scheduler,
            reconciler: OffsetReconciler::new(settings.request_timeout),
            poll_timeout: settings.poll_timeout,
            diagnostics: Diagnostics::new(),
        })
    }

    /// Poll once and dispatch whatever arrived.
    ///
    /// Returns `Ok(())` on timeout, after a delivered record, and after a
    /// recoverable broker error. A partition error attached to a record is
    /// returned for that iteration only. Fatal faults must end the process.
    pub fn consume_next(&mut self) -> Result<(), ConsumeError> {
        let Some(event) = self.client.poll(self.poll_timeout) else {
            return Ok(());
        };

        let commit_due = self
            .commit_scheduler
            .as_mut()
            .is_some_and(|scheduler| scheduler.poll_due(Instant::now()));
        if commit_due {
            self.plain_commit(FailureKind::PeriodicCommit);
        }

        match event {
            ConsumerEvent::Message(Ok(record)) => self.deliver(record),
            ConsumerEvent::Message(Err(e)) => {
                metrics::counter!(MESSAGE_PARTITION_ERRORS).increment(1);
                Err(ConsumeError::Partition(e))
            }
            ConsumerEvent::BrokerError(e) => handle_broker_error(e),
            ConsumerEvent::Ignored => Ok(()),
        }
    }

    fn deliver(&mut self, record: Record) -> Result<(), ConsumeError> {
        let key = decode_key(record.key.as_deref().unwrap_or_default()).map_err(|source| {
            FatalFault::MalformedKey {
                partition: record.partition(),
                offset: record.offset,
                source,
            }
        })?;

        let meta = Meta {
            topic: record.topic.clone(),
            id: u64::try_from(record.offset).unwrap_or_default(),
            timestamp: record.timestamp_ms.unwrap_or_default(),
        };
        self.handler.handle(key, &record.value, &meta);
        metrics::counter!(MESSAGES_DELIVERED).increment(1);

        match record.timestamp_ms {
            Some(ts) => self.tracker.record(&record.partition(), ts),
            None => debug!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                "Record without timestamp, partition timestamp left unchanged"
            ),
        }

        Ok(())
    }

    /// Best-effort commit of the positions the client advanced to by
    /// delivering records. Failures are logged and recorded, never returned.
    pub fn commit(&mut self) {
        self.plain_commit(FailureKind::ManualCommit);
    }

    fn plain_commit(&mut self, kind: FailureKind) {
        match self.client.commit() {
            Ok(()) => {
                debug!(trigger = kind.as_str(), "Kafka consumer committed");
                metrics::counter!(PLAIN_COMMITS, "trigger" => kind.as_str(), "outcome" => "success")
                    .increment(1);
            }
            // nothing delivered since the last commit
            Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => {
                debug!(trigger = kind.as_str(), "No offsets stored, nothing to commit");
                metrics::counter!(PLAIN_COMMITS, "trigger" => kind.as_str(), "outcome" => "no_offset")
                    .increment(1);
            }
            Err(e) => {
                warn!(trigger = kind.as_str(), error = ?e, "Kafka consumer commit failed");
                metrics::counter!(PLAIN_COMMITS, "trigger" => kind.as_str(), "outcome" => "error")
                    .increment(1);
                self.diagnostics.record(kind, &e);
            }
        }
    }

    /// Commit every assigned partition at `gap` behind its last delivered
    /// record, never behind what is already committed.
    pub fn rollback_by_gap(&mut self, gap: Duration) -> Result<CommitRequest, ReconcileError> {
        self.reconciler
            .rollback_by_gap(&self.client, &self.tracker, gap)
    }

    /// Commit every assigned partition at `timestamp_ms`, even if that rewinds
    /// past committed offsets.
    pub fn rollback_to_timestamp(
        &mut self,
        timestamp_ms: i64,
    ) -> Result<CommitRequest, ReconcileError> {
        self.reconciler
            .rollback_to_timestamp(&self.client, timestamp_ms)
    }

    pub fn tracker(&self) -> &PartitionTimestampTracker {
        &self.tracker
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn auto_commit(&self) -> bool {
        self.commit_scheduler.is_some()
    }

    /// Flush a final commit if auto-commit is enabled, then release the client.
    /// Nothing here fails the caller; swallowed failures are returned.
    pub fn close(mut self) -> Diagnostics {
        if self.commit_scheduler.is_some() {
            self.plain_commit(FailureKind::FinalCommit);
        }

        let mut diagnostics = self.diagnostics;
        match self.client.close() {
            Ok(()) => info!("Kafka consumer closed"),
            Err(e) => {
                error!(error = ?e, "Kafka consumer close error");
                diagnostics.record(FailureKind::Close, &e);
            }
        }
        diagnostics
    }
}

/// All brokers down and max-poll-interval exceeded end the consumer; anything
/// else is logged and polling continues.
pub fn classify_broker_error(error: KafkaError) -> Result<KafkaError, FatalFault> {
    match error.rdkafka_error_code() {
        Some(RDKafkaErrorCode::AllBrokersDown) => Err(FatalFault::AllBrokersDown(error)),
        Some(RDKafkaErrorCode::PollExceeded) => Err(FatalFault::MaxPollExceeded(error)),
        _ => Ok(error),
    }
}

fn handle_broker_error(error: KafkaError) -> Result<(), ConsumeError> {
    match classify_broker_error(error) {
        Ok(e) => {
            warn!(error = ?e, "Kafka consumer error");
            metrics::counter!(BROKER_ERRORS, "level" => "warn").increment(1);
            Ok(())
        }
        Err(fault) => {
            error!(error = ?fault, "Fatal Kafka consumer error");
            metrics::counter!(BROKER_ERRORS, "level" => "fatal").increment(1);
            Err(fault.into())
        }
    }
}
