//! Offset reconciliation - rewinding committed positions by time.
//!
//! Two entry points share one protocol:
//!
//! - [`OffsetReconciler::rollback_by_gap`] moves each partition back to a point
//!   `gap` before the last record delivered on it in this session. It is the
//!   "stay slightly behind live" tool and must never move a partition behind
//!   what is already durably committed, so the resolved offsets are floored at
//!   the group's committed offsets.
//! - [`OffsetReconciler::rollback_to_timestamp`] moves every assigned partition
//!   to an absolute point in time. It is the operator's replay tool and is
//!   allowed to rewind past committed offsets.
//!
//! Both resolve timestamps with one batched offsets-for-times RPC and finish
//! with one batched commit. Any failure aborts before the commit is issued.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::ReconcileError;
use crate::kafka::client::BrokerClient;
use crate::kafka::types::{
    concrete_offset, CommitRequest, Partition, PartitionTimestamp, ResolvedOffset,
};
use crate::metrics_consts::{ROLLBACKS, ROLLBACK_FLOOR_RAISES, ROLLBACK_PARTITIONS_SKIPPED};
use crate::timestamps::PartitionTimestampTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommittedFloor {
    Apply,
    Ignore,
}

#[derive(Debug, Clone)]
pub struct OffsetReconciler {
    request_timeout: Duration,
}

impl OffsetReconciler {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }

    /// Commit every assigned partition at `gap` before its last delivered
    /// record, never behind its committed offset. Partitions with no delivered
    /// record this session are left out entirely.
    pub fn rollback_by_gap<C: BrokerClient>(
        &self,
        client: &C,
        tracker: &PartitionTimestampTracker,
        gap: Duration,
    ) -> Result<CommitRequest, ReconcileError> {
        let result = self.try_rollback_by_gap(client, tracker, gap);
        record_outcome("gap", &result);
        result
    }

    /// Commit every assigned partition at the first offset at or after
    /// `timestamp_ms`, regardless of what is currently committed.
    pub fn rollback_to_timestamp<C: BrokerClient>(
        &self,
        client: &C,
        timestamp_ms: i64,
    ) -> Result<CommitRequest, ReconcileError> {
        let result = self.try_rollback_to_timestamp(client, timestamp_ms);
        record_outcome("timestamp", &result);
        result
    }

    fn try_rollback_by_gap<C: BrokerClient>(
        &self,
        client: &C,
        tracker: &PartitionTimestampTracker,
        gap: Duration,
    ) -> Result<CommitRequest, ReconcileError> {
        let assigned = assigned_partitions(client)?;
        let targets = gap_targets(&assigned, tracker, gap);
        let skipped = assigned.len() - targets.len();
        if skipped > 0 {
            debug!(skipped, "Skipping partitions without a delivered record");
            metrics::counter!(ROLLBACK_PARTITIONS_SKIPPED).increment(skipped as u64);
        }

        self.commit_at_timestamps(client, &assigned, targets, CommittedFloor::Apply)
    }

    fn try_rollback_to_timestamp<C: BrokerClient>(
        &self,
        client: &C,
        timestamp_ms: i64,
    ) -> Result<CommitRequest, ReconcileError> {
        let assigned = assigned_partitions(client)?;
        let targets = timestamp_targets(&assigned, timestamp_ms);

        self.commit_at_timestamps(client, &assigned, targets, CommittedFloor::Ignore)
    }

    fn commit_at_timestamps<C: BrokerClient>(
        &self,
        client: &C,
        assigned: &[Partition],
        targets: Vec<PartitionTimestamp>,
        floor: CommittedFloor,
    ) -> Result<CommitRequest, ReconcileError> {
        if targets.is_empty() {
            info!("No partitions eligible for back commit");
            return Ok(CommitRequest::new());
        }

        let resolved = client
            .offsets_for_times(&targets, self.request_timeout)
            .map_err(ReconcileError::OffsetsForTimes)?;
        let mut request = validated_request(resolved, "offsets_for_times")?;

        if floor == CommittedFloor::Apply {
            let committed = client
                .committed(assigned, self.request_timeout)
                .map_err(ReconcileError::Committed)?;
            // partitions outside the request have nothing to floor
            let committed = committed
                .into_iter()
                .filter(|entry| request.contains(&entry.partition))
                .collect();
            let committed = validated_request(committed, "committed")?;
            info!(
                partitions = ?describe(&committed),
                "Kafka consumer actually committed"
            );

            let raised = apply_committed_floor(&mut request, &committed);
            if raised > 0 {
                metrics::counter!(ROLLBACK_FLOOR_RAISES).increment(raised as u64);
            }
        }

        client
            .commit_offsets(&request)
            .map_err(ReconcileError::Commit)?;

        info!(
            partitions = ?describe(&request),
            "Kafka consumer back commit applied"
        );
        Ok(request)
    }
}

fn assigned_partitions<C: BrokerClient>(client: &C) -> Result<Vec<Partition>, ReconcileError> {
    let assigned = client.assignment().map_err(ReconcileError::Assignment)?;
    info!(
        partitions = ?assigned.iter().map(Partition::to_string).collect::<Vec<_>>(),
        "Kafka consumer actually assigned"
    );
    Ok(assigned)
}

/// Per-partition targets for rollback-by-gap. Partitions the tracker has not
/// seen are omitted. Targets are clamped at zero because negative timestamps
/// are sentinel values to the broker client.
pub fn gap_targets(
    assigned: &[Partition],
    tracker: &PartitionTimestampTracker,
    gap: Duration,
) -> Vec<PartitionTimestamp> {
    let gap_ms = i64::try_from(gap.as_millis()).unwrap_or(i64::MAX);
    assigned
        .iter()
        .filter_map(|partition| {
            let last_seen = tracker.lookup(partition)?;
            let target = last_seen.saturating_sub(gap_ms).max(0);
            Some(PartitionTimestamp::new(partition.clone(), target))
        })
        .collect()
}

/// Per-partition targets for rollback-to-timestamp: every assigned partition.
pub fn timestamp_targets(assigned: &[Partition], timestamp_ms: i64) -> Vec<PartitionTimestamp> {
    assigned
        .iter()
        .map(|partition| PartitionTimestamp::new(partition.clone(), timestamp_ms.max(0)))
        .collect()
}

/// Raise each target to the committed offset when the committed offset is
/// concrete and ahead of it. Sentinel committed values impose no floor.
/// Returns the number of raised partitions.
pub fn apply_committed_floor(request: &mut CommitRequest, committed: &CommitRequest) -> usize {
    committed
        .iter()
        .filter_map(|entry| concrete_offset(entry.offset).map(|floor| (entry.partition, floor)))
        .filter(|(partition, floor)| request.raise_to(partition, *floor))
        .count()
}

fn validated_request(
    resolved: Vec<ResolvedOffset>,
    operation: &'static str,
) -> Result<CommitRequest, ReconcileError> {
    resolved
        .into_iter()
        .map(|entry| match entry.offset {
            Ok(offset) => Ok((entry.partition, offset)),
            Err(source) => {
                warn!(
                    topic = entry.partition.topic(),
                    partition = entry.partition.partition_number(),
                    operation,
                    error = ?source,
                    "Per-partition error in batched response"
                );
                Err(ReconcileError::PartitionLookup {
                    operation,
                    partition: entry.partition,
                    source,
                })
            }
        })
        .collect()
}

fn describe(request: &CommitRequest) -> Vec<String> {
    request
        .iter()
        .map(|entry| format!("{}@{:?}", entry.partition, entry.offset))
        .collect()
}

fn record_outcome(kind: &'static str, result: &Result<CommitRequest, ReconcileError>) {
    let outcome = match result {
        Ok(_) => "success",
        Err(e) => {
            warn!(kind, error = ?e, "Kafka consumer back commit failed");
            e.error_type()
        }
    };
    metrics::counter!(ROLLBACKS, "kind" => kind, "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kafka::test_utils::{Call, FakeBrokerClient};
    use rdkafka::error::RDKafkaErrorCode;
    use rdkafka::Offset;

    fn p(n: i32) -> Partition {
        Partition::new("events", n)
    }

    fn reconciler() -> OffsetReconciler {
        OffsetReconciler::new(Duration::from_millis(2000))
    }

    #[test]
    fn test_gap_targets_skip_unseen_partitions() {
        let mut tracker = PartitionTimestampTracker::new();
        tracker.record(&p(0), 10_000);
        tracker.record(&p(2), 20_000);

        let targets = gap_targets(&[p(0), p(1), p(2)], &tracker, Duration::from_millis(500));

        assert_eq!(
            targets,
            vec![
                PartitionTimestamp::new(p(0), 9_500),
                PartitionTimestamp::new(p(2), 19_500),
            ]
        );
    }

    #[test]
    fn test_gap_targets_clamp_at_zero() {
        let mut tracker = PartitionTimestampTracker::new();
        tracker.record(&p(0), 100);

        let targets = gap_targets(&[p(0)], &tracker, Duration::from_secs(60));
        assert_eq!(targets, vec![PartitionTimestamp::new(p(0), 0)]);
    }

    #[test]
    fn test_committed_floor_takes_max_of_committed_and_target() {
        let mut request: CommitRequest = vec![
            (p(0), Offset::Offset(10)),
            (p(1), Offset::Offset(50)),
            (p(2), Offset::Offset(30)),
        ]
        .into_iter()
        .collect();
        let committed: CommitRequest = vec![
            (p(0), Offset::Offset(25)),
            (p(1), Offset::Offset(40)),
            (p(2), Offset::Offset(30)),
        ]
        .into_iter()
        .collect();

        let raised = apply_committed_floor(&mut request, &committed);

        assert_eq!(raised, 1);
        assert_eq!(request.get(&p(0)), Some(Offset::Offset(25)));
        assert_eq!(request.get(&p(1)), Some(Offset::Offset(50)));
        assert_eq!(request.get(&p(2)), Some(Offset::Offset(30)));
    }

    #[test]
    fn test_committed_sentinels_impose_no_floor() {
        let mut request: CommitRequest = vec![
            (p(0), Offset::Offset(10)),
            (p(1), Offset::Offset(10)),
            (p(2), Offset::Offset(10)),
            (p(3), Offset::Offset(10)),
        ]
        .into_iter()
        .collect();
        let committed: CommitRequest = vec![
            (p(0), Offset::Stored),
            (p(1), Offset::Invalid),
            (p(2), Offset::Beginning),
            (p(3), Offset::End),
        ]
        .into_iter()
        .collect();

        assert_eq!(apply_committed_floor(&mut request, &committed), 0);
        for n in 0..4 {
            assert_eq!(request.get(&p(n)), Some(Offset::Offset(10)));
        }
    }

    #[test]
    fn test_committed_floor_ignores_partitions_not_requested() {
        let mut request: CommitRequest = vec![(p(0), Offset::Offset(10))].into_iter().collect();
        let committed: CommitRequest = vec![(p(0), Offset::Offset(5)), (p(1), Offset::Offset(99))]
            .into_iter()
            .collect();

        apply_committed_floor(&mut request, &committed);

        assert_eq!(request.len(), 1);
        assert_eq!(request.get(&p(1)), None);
    }

    #[test]
    fn test_rollback_by_gap_raises_to_committed() {
        let client = FakeBrokerClient::new();
        client.set_assignment(vec![p(0), p(1)]);
        client.resolve(&p(0), Offset::Offset(100));
        client.resolve(&p(1), Offset::Offset(500));
        client.set_committed(&p(0), Offset::Offset(250));
        client.set_committed(&p(1), Offset::Offset(300));

        let mut tracker = PartitionTimestampTracker::new();
        tracker.record(&p(0), 5_000);
        tracker.record(&p(1), 7_000);

        let committed = reconciler()
            .rollback_by_gap(&client, &tracker, Duration::from_millis(1_000))
            .unwrap();

        assert_eq!(committed.get(&p(0)), Some(Offset::Offset(250)));
        assert_eq!(committed.get(&p(1)), Some(Offset::Offset(500)));
        assert_eq!(
            client.commits(),
            vec![vec![(p(0), Offset::Offset(250)), (p(1), Offset::Offset(500))]]
        );
    }

    #[test]
    fn test_rollback_by_gap_omits_unseen_partitions() {
        let client = FakeBrokerClient::new();
        client.set_assignment(vec![p(0), p(1), p(2)]);
        client.resolve(&p(1), Offset::Offset(42));

        let mut tracker = PartitionTimestampTracker::new();
        tracker.record(&p(1), 2_000);

        reconciler()
            .rollback_by_gap(&client, &tracker, Duration::from_millis(500))
            .unwrap();

        assert_eq!(client.offsets_for_times_requests(), vec![vec![(p(1), 1_500)]]);
        assert_eq!(client.commits(), vec![vec![(p(1), Offset::Offset(42))]]);
    }

    #[test]
    fn test_rollback_by_gap_with_nothing_seen_makes_no_calls() {
        let client = FakeBrokerClient::new();
        client.set_assignment(vec![p(0), p(1)]);

        let request = reconciler()
            .rollback_by_gap(&client, &PartitionTimestampTracker::new(), Duration::from_secs(1))
            .unwrap();

        assert!(request.is_empty());
        assert_eq!(client.calls(), vec![Call::Assignment]);
    }

    #[test]
    fn test_rollback_by_gap_sentinel_committed_keeps_target() {
        let client = FakeBrokerClient::new();
        client.set_assignment(vec![p(0)]);
        client.resolve(&p(0), Offset::Offset(80));
        client.set_committed(&p(0), Offset::Invalid);

        let mut tracker = PartitionTimestampTracker::new();
        tracker.record(&p(0), 9_000);

        let committed = reconciler()
            .rollback_by_gap(&client, &tracker, Duration::from_millis(1))
            .unwrap();

        assert_eq!(committed.get(&p(0)), Some(Offset::Offset(80)));
    }

    #[test]
    fn test_rollback_to_timestamp_allows_regression() {
        let client = FakeBrokerClient::new();
        client.set_assignment(vec![p(0), p(1)]);
        client.resolve(&p(0), Offset::Offset(10));
        client.resolve(&p(1), Offset::Offset(20));
        client.set_committed(&p(0), Offset::Offset(1_000));
        client.set_committed(&p(1), Offset::Offset(2_000));

        let committed = reconciler()
            .rollback_to_timestamp(&client, 1_700_000_000_000)
            .unwrap();

        assert_eq!(committed.get(&p(0)), Some(Offset::Offset(10)));
        assert_eq!(committed.get(&p(1)), Some(Offset::Offset(20)));
        assert_eq!(
            client.offsets_for_times_requests(),
            vec![vec![(p(0), 1_700_000_000_000), (p(1), 1_700_000_000_000)]]
        );
        assert!(!client
            .calls()
            .iter()
            .any(|call| matches!(call, Call::Committed(_))));
    }

    #[test]
    fn test_offsets_for_times_failure_aborts_without_commit() {
        let client = FakeBrokerClient::new();
        client.set_assignment(vec![p(0)]);
        client.fail_offsets_for_times(RDKafkaErrorCode::RequestTimedOut);

        let result = reconciler().rollback_to_timestamp(&client, 1_000);

        assert!(matches!(result, Err(ReconcileError::OffsetsForTimes(_))));
        assert!(client.commits().is_empty());
    }

    #[test]
    fn test_committed_lookup_failure_aborts_without_commit() {
        let client = FakeBrokerClient::new();
        client.set_assignment(vec![p(0)]);
        client.resolve(&p(0), Offset::Offset(5));
        client.fail_committed(RDKafkaErrorCode::RequestTimedOut);

        let mut tracker = PartitionTimestampTracker::new();
        tracker.record(&p(0), 1_000);

        let result = reconciler().rollback_by_gap(&client, &tracker, Duration::from_millis(10));

        assert!(matches!(result, Err(ReconcileError::Committed(_))));
        assert!(client.commits().is_empty());
    }

    #[test]
    fn test_per_partition_lookup_error_aborts_whole_request() {
        let client = FakeBrokerClient::new();
        client.set_assignment(vec![p(0), p(1)]);
        client.resolve(&p(0), Offset::Offset(5));
        client.fail_partition_lookup(&p(1), RDKafkaErrorCode::UnknownTopicOrPartition);

        let result = reconciler().rollback_to_timestamp(&client, 1_000);

        match result {
            Err(ReconcileError::PartitionLookup {
                operation,
                partition,
                ..
            }) => {
                assert_eq!(operation, "offsets_for_times");
                assert_eq!(partition, p(1));
            }
            other => panic!("expected partition lookup error, got {other:?}"),
        }
        assert!(client.commits().is_empty());
    }

    #[test]
    fn test_committed_lookup_error_on_requested_partition_aborts() {
        let client = FakeBrokerClient::new();
        client.set_assignment(vec![p(0), p(1)]);
        client.resolve(&p(0), Offset::Offset(5));
        client.fail_committed_lookup(&p(0), RDKafkaErrorCode::UnknownTopicOrPartition);

        let mut tracker = PartitionTimestampTracker::new();
        tracker.record(&p(0), 1_000);

        let result = reconciler().rollback_by_gap(&client, &tracker, Duration::from_millis(10));

        match result {
            Err(ReconcileError::PartitionLookup {
                operation,
                partition,
                ..
            }) => {
                assert_eq!(operation, "committed");
                assert_eq!(partition, p(0));
            }
            other => panic!("expected partition lookup error, got {other:?}"),
        }
        assert!(client.commits().is_empty());
    }

    #[test]
    fn test_committed_lookup_error_on_skipped_partition_is_ignored() {
        let client = FakeBrokerClient::new();
        client.set_assignment(vec![p(0), p(1)]);
        client.resolve(&p(0), Offset::Offset(5));
        client.set_committed(&p(0), Offset::Offset(3));
        client.fail_committed_lookup(&p(1), RDKafkaErrorCode::UnknownTopicOrPartition);

        // p(1) has delivered nothing, so it is not part of the commit
        let mut tracker = PartitionTimestampTracker::new();
        tracker.record(&p(0), 1_000);

        let committed = reconciler()
            .rollback_by_gap(&client, &tracker, Duration::from_millis(10))
            .unwrap();

        assert_eq!(committed.get(&p(1)), None);
        assert_eq!(client.commits(), vec![vec![(p(0), Offset::Offset(5))]]);
    }

    #[test]
    fn test_commit_failure_is_reported() {
        let client = FakeBrokerClient::new();
        client.set_assignment(vec![p(0)]);
        client.resolve(&p(0), Offset::Offset(5));
        client.fail_commit_offsets(RDKafkaErrorCode::RebalanceInProgress);

        let result = reconciler().rollback_to_timestamp(&client, 1_000);

        let err = result.unwrap_err();
        assert!(matches!(err, ReconcileError::Commit(_)));
        assert!(err.to_string().starts_with("back commit failed"));
    }

    #[test]
    fn test_assignment_failure_aborts() {
        let client = FakeBrokerClient::new();
        client.fail_assignment(RDKafkaErrorCode::State);

        let result = reconciler().rollback_to_timestamp(&client, 1_000);

        assert!(matches!(result, Err(ReconcileError::Assignment(_))));
        assert_eq!(client.calls(), vec![Call::Assignment]);
    }
}
