use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rdkafka::error::{KafkaError, KafkaResult, RDKafkaErrorCode};
use rdkafka::Offset;

use super::client::BrokerClient;
use super::types::{
    CommitRequest, ConsumerEvent, Partition, PartitionTimestamp, Record, ResolvedOffset,
};

/// Calls observed by [`FakeBrokerClient`], in order. Polls are not recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Subscribe(String),
    Commit,
    Assignment,
    OffsetsForTimes(Vec<(Partition, i64)>),
    Committed(Vec<Partition>),
    CommitOffsets(Vec<(Partition, Offset)>),
    Close,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<Call>,
    events: VecDeque<ConsumerEvent>,
    assignment: Vec<Partition>,
    resolved: HashMap<Partition, Offset>,
    committed: HashMap<Partition, Offset>,
    lookup_errors: HashMap<Partition, RDKafkaErrorCode>,
    committed_errors: HashMap<Partition, RDKafkaErrorCode>,
    fail_subscribe: Option<RDKafkaErrorCode>,
    fail_commit: Option<RDKafkaErrorCode>,
    fail_assignment: Option<RDKafkaErrorCode>,
    fail_offsets_for_times: Option<RDKafkaErrorCode>,
    fail_committed: Option<RDKafkaErrorCode>,
    fail_commit_offsets: Option<RDKafkaErrorCode>,
    fail_close: Option<RDKafkaErrorCode>,
}

/// In-memory `BrokerClient` for tests.
///
/// Clones share state, so a test keeps one handle to script events and
/// inspect calls while the consumer owns another.
#[derive(Clone, Default)]
pub struct FakeBrokerClient {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBrokerClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn push_event(&self, event: ConsumerEvent) {
        self.state().events.push_back(event);
    }

    pub fn push_record(&self, record: Record) {
        self.push_event(ConsumerEvent::Message(Ok(record)));
    }

    pub fn set_assignment(&self, partitions: Vec<Partition>) {
        self.state().assignment = partitions;
    }

    /// Offset returned by offsets-for-times for `partition`, whatever the
    /// requested timestamp. Unconfigured partitions resolve to `Offset::End`.
    pub fn resolve(&self, partition: &Partition, offset: Offset) {
        self.state().resolved.insert(partition.clone(), offset);
    }

    /// Committed offset for `partition`. Unconfigured partitions report `Offset::Invalid`.
    pub fn set_committed(&self, partition: &Partition, offset: Offset) {
        self.state().committed.insert(partition.clone(), offset);
    }

    /// Per-partition error inside an otherwise successful offsets-for-times response.
    pub fn fail_partition_lookup(&self, partition: &Partition, code: RDKafkaErrorCode) {
        self.state().lookup_errors.insert(partition.clone(), code);
    }

    /// Per-partition error inside an otherwise successful committed response.
    pub fn fail_committed_lookup(&self, partition: &Partition, code: RDKafkaErrorCode) {
        self.state().committed_errors.insert(partition.clone(), code);
    }

    pub fn fail_subscribe(&self, code: RDKafkaErrorCode) {
        self.state().fail_subscribe = Some(code);
    }

    pub fn fail_commit(&self, code: RDKafkaErrorCode) {
        self.state().fail_commit = Some(code);
    }

    pub fn fail_assignment(&self, code: RDKafkaErrorCode) {
        self.state().fail_assignment = Some(code);
    }

    pub fn fail_offsets_for_times(&self, code: RDKafkaErrorCode) {
        self.state().fail_offsets_for_times = Some(code);
    }

    pub fn fail_committed(&self, code: RDKafkaErrorCode) {
        self.state().fail_committed = Some(code);
    }

    pub fn fail_commit_offsets(&self, code: RDKafkaErrorCode) {
        self.state().fail_commit_offsets = Some(code);
    }

    pub fn fail_close(&self, code: RDKafkaErrorCode) {
        self.state().fail_close = Some(code);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn plain_commit_count(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| matches!(call, Call::Commit))
            .count()
    }

    pub fn commits(&self) -> Vec<Vec<(Partition, Offset)>> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::CommitOffsets(offsets) => Some(offsets.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn offsets_for_times_requests(&self) -> Vec<Vec<(Partition, i64)>> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::OffsetsForTimes(targets) => Some(targets.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn pending_events(&self) -> usize {
        self.state().events.len()
    }
}

impl BrokerClient for FakeBrokerClient {
    fn subscribe(&self, pattern: &str) -> KafkaResult<()> {
        let mut state = self.state();
        state.calls.push(Call::Subscribe(pattern.to_string()));
        match state.fail_subscribe {
            Some(code) => Err(KafkaError::Subscription(format!("{code:?}"))),
            None => Ok(()),
        }
    }

    fn poll(&self, _timeout: Duration) -> Option<ConsumerEvent> {
        self.state().events.pop_front()
    }

    fn commit(&self) -> KafkaResult<()> {
        let mut state = self.state();
        state.calls.push(Call::Commit);
        match state.fail_commit {
            Some(code) => Err(KafkaError::ConsumerCommit(code)),
            None => Ok(()),
        }
    }

    fn assignment(&self) -> KafkaResult<Vec<Partition>> {
        let mut state = self.state();
        state.calls.push(Call::Assignment);
        match state.fail_assignment {
            Some(code) => Err(KafkaError::MetadataFetch(code)),
            None => Ok(state.assignment.clone()),
        }
    }

    fn offsets_for_times(
        &self,
        targets: &[PartitionTimestamp],
        _timeout: Duration,
    ) -> KafkaResult<Vec<ResolvedOffset>> {
        let mut state = self.state();
        state.calls.push(Call::OffsetsForTimes(
            targets
                .iter()
                .map(|t| (t.partition.clone(), t.timestamp_ms))
                .collect(),
        ));
        if let Some(code) = state.fail_offsets_for_times {
            return Err(KafkaError::OffsetFetch(code));
        }

        Ok(targets
            .iter()
            .map(|t| ResolvedOffset {
                partition: t.partition.clone(),
                offset: match state.lookup_errors.get(&t.partition) {
                    Some(code) => Err(KafkaError::OffsetFetch(*code)),
                    None => Ok(state
                        .resolved
                        .get(&t.partition)
                        .copied()
                        .unwrap_or(Offset::End)),
                },
            })
            .collect())
    }

    fn committed(
        &self,
        partitions: &[Partition],
        _timeout: Duration,
    ) -> KafkaResult<Vec<ResolvedOffset>> {
        let mut state = self.state();
        state.calls.push(Call::Committed(partitions.to_vec()));
        if let Some(code) = state.fail_committed {
            return Err(KafkaError::OffsetFetch(code));
        }

        Ok(partitions
            .iter()
            .map(|partition| ResolvedOffset {
                partition: partition.clone(),
                offset: match state.committed_errors.get(partition) {
                    Some(code) => Err(KafkaError::OffsetFetch(*code)),
                    None => Ok(state
                        .committed
                        .get(partition)
                        .copied()
                        .unwrap_or(Offset::Invalid)),
                },
            })
            .collect())
    }

    fn commit_offsets(&self, offsets: &CommitRequest) -> KafkaResult<()> {
        let mut state = self.state();
        if let Some(code) = state.fail_commit_offsets {
            return Err(KafkaError::ConsumerCommit(code));
        }
        state.calls.push(Call::CommitOffsets(
            offsets
                .iter()
                .map(|entry| (entry.partition.clone(), entry.offset))
                .collect(),
        ));
        for entry in offsets.iter() {
            state.committed.insert(entry.partition.clone(), entry.offset);
        }
        Ok(())
    }

    fn close(self) -> KafkaResult<()> {
        let mut state = self.state();
        state.calls.push(Call::Close);
        match state.fail_close {
            Some(code) => Err(KafkaError::Global(code)),
            None => Ok(()),
        }
    }
}

/// Record on `topic`/`partition` keyed by `key` (little-endian, as producers write it).
pub fn test_record(topic: &str, partition: i32, offset: i64, timestamp_ms: i64, key: u64) -> Record {
    Record {
        key: Some(key.to_le_bytes().to_vec()),
        value: format!("payload-{offset}").into_bytes(),
        topic: topic.to_string(),
        partition,
        offset,
        timestamp_ms: Some(timestamp_ms),
    }
}
