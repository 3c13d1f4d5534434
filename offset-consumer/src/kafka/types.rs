use std::collections::BTreeMap;
use std::fmt;

use rdkafka::error::{KafkaError, KafkaResult};
use rdkafka::topic_partition_list::TopicPartitionListElem;
use rdkafka::Offset;

/// Identity of a partition for commit and fetch operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Partition {
    topic: String,
    partition_number: i32,
}

impl Partition {
    pub fn new(topic: impl Into<String>, partition_number: i32) -> Self {
        Self {
            topic: topic.into(),
            partition_number,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition_number(&self) -> i32 {
        self.partition_number
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.topic, self.partition_number)
    }
}

impl From<TopicPartitionListElem<'_>> for Partition {
    fn from(elem: TopicPartitionListElem<'_>) -> Self {
        Self::new(elem.topic(), elem.partition())
    }
}

/// Returns the position carried by `offset` if it is a real offset rather than
/// one of the stored/invalid/beginning/end/tail sentinels.
pub fn concrete_offset(offset: Offset) -> Option<i64> {
    match offset {
        Offset::Offset(value) => Some(value),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionOffset<'a> {
    pub partition: &'a Partition,
    pub offset: Offset,
}

/// Target timestamp for a single partition, in milliseconds since the epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionTimestamp {
    pub partition: Partition,
    pub timestamp_ms: i64,
}

impl PartitionTimestamp {
    pub fn new(partition: Partition, timestamp_ms: i64) -> Self {
        Self {
            partition,
            timestamp_ms,
        }
    }
}

/// One element of a batched broker response (offsets-for-times or committed
/// lookup). The batch itself can succeed while single elements carry errors.
#[derive(Debug)]
pub struct ResolvedOffset {
    pub partition: Partition,
    pub offset: KafkaResult<Offset>,
}

impl From<TopicPartitionListElem<'_>> for ResolvedOffset {
    fn from(elem: TopicPartitionListElem<'_>) -> Self {
        let offset = elem.error().map(|_| elem.offset());
        Self {
            partition: Partition::from(elem),
            offset,
        }
    }
}

/// Offsets to commit, ordered and keyed by partition identity.
///
/// Built fresh for every reconciliation. After construction the only allowed
/// mutation is [`CommitRequest::raise_to`], which never lowers an offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitRequest {
    offsets: BTreeMap<Partition, Offset>,
}

impl CommitRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, partition: Partition, offset: Offset) {
        self.offsets.insert(partition, offset);
    }

    /// Raise the target for `partition` to `floor` when the current target is
    /// lower or is a sentinel. Returns true if the target changed. Partitions
    /// that are not part of the request are left out.
    pub fn raise_to(&mut self, partition: &Partition, floor: i64) -> bool {
        match self.offsets.get_mut(partition) {
            Some(target) if concrete_offset(*target).map_or(true, |t| t < floor) => {
                *target = Offset::Offset(floor);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, partition: &Partition) -> bool {
        self.offsets.contains_key(partition)
    }

    pub fn get(&self, partition: &Partition) -> Option<Offset> {
        self.offsets.get(partition).copied()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = PartitionOffset<'_>> {
        self.offsets
            .iter()
            .map(|(partition, offset)| PartitionOffset {
                partition,
                offset: *offset,
            })
    }
}

impl FromIterator<(Partition, Offset)> for CommitRequest {
    fn from_iter<I: IntoIterator<Item = (Partition, Offset)>>(iter: I) -> Self {
        Self {
            offsets: iter.into_iter().collect(),
        }
    }
}

/// A record delivered by the broker client, detached from the client's buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// Milliseconds since the epoch, when the broker supplied one.
    pub timestamp_ms: Option<i64>,
}

impl Record {
    pub fn partition(&self) -> Partition {
        Partition::new(self.topic.as_str(), self.partition)
    }
}

/// Everything a single poll of the broker client can yield.
#[derive(Debug)]
pub enum ConsumerEvent {
    /// A record, or the partition-level error that took its place.
    Message(KafkaResult<Record>),
    /// An error about the client or its connection to the cluster.
    BrokerError(KafkaError),
    /// Notifications this consumer does not act on (EOF markers and the like).
    Ignored,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn p(n: i32) -> Partition {
        Partition::new("events", n)
    }

    #[test_case(Offset::Offset(0) => Some(0))]
    #[test_case(Offset::Offset(42) => Some(42))]
    #[test_case(Offset::Beginning => None)]
    #[test_case(Offset::End => None)]
    #[test_case(Offset::Stored => None)]
    #[test_case(Offset::Invalid => None)]
    #[test_case(Offset::OffsetTail(3) => None)]
    fn test_concrete_offset(offset: Offset) -> Option<i64> {
        concrete_offset(offset)
    }

    #[test]
    fn test_raise_to_only_moves_forward() {
        let mut request = CommitRequest::new();
        request.insert(p(0), Offset::Offset(10));
        request.insert(p(1), Offset::Offset(50));

        assert!(request.raise_to(&p(0), 20));
        assert!(!request.raise_to(&p(1), 20));

        assert_eq!(request.get(&p(0)), Some(Offset::Offset(20)));
        assert_eq!(request.get(&p(1)), Some(Offset::Offset(50)));
    }

    #[test]
    fn test_raise_to_replaces_sentinel_target() {
        let mut request = CommitRequest::new();
        request.insert(p(0), Offset::End);

        assert!(request.raise_to(&p(0), 7));
        assert_eq!(request.get(&p(0)), Some(Offset::Offset(7)));
    }

    #[test]
    fn test_raise_to_ignores_partitions_outside_request() {
        let mut request = CommitRequest::new();
        request.insert(p(0), Offset::Offset(1));

        assert!(!request.raise_to(&p(3), 100));
        assert_eq!(request.len(), 1);
        assert_eq!(request.get(&p(3)), None);
    }

    #[test]
    fn test_commit_request_is_ordered_by_partition() {
        let request: CommitRequest = vec![
            (Partition::new("b", 0), Offset::Offset(1)),
            (Partition::new("a", 2), Offset::Offset(2)),
            (Partition::new("a", 1), Offset::Offset(3)),
        ]
        .into_iter()
        .collect();

        let order: Vec<String> = request.iter().map(|po| po.partition.to_string()).collect();
        assert_eq!(order, vec!["a/1", "a/2", "b/0"]);
    }
}
