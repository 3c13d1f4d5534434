// ==== Poll loop metrics ====
/// Counter for records handed to the message handler
pub const MESSAGES_DELIVERED: &str = "offset_consumer_messages_delivered_total";

/// Counter for records replaced by a partition-level error
pub const MESSAGE_PARTITION_ERRORS: &str = "offset_consumer_message_partition_errors_total";

/// Counter for broker-level errors seen by the poll loop, labelled by level
pub const BROKER_ERRORS: &str = "offset_consumer_broker_errors_total";

// ==== Commit metrics ====
/// Counter for plain commits, labelled by trigger and outcome
pub const PLAIN_COMMITS: &str = "offset_consumer_plain_commits_total";

/// Counter for partitions rejected inside an otherwise successful commit
pub const COMMIT_PARTITION_ERRORS: &str = "offset_consumer_commit_partition_errors_total";

// ==== Reconciliation metrics ====
/// Counter for rollback operations, labelled by kind and outcome
pub const ROLLBACKS: &str = "offset_consumer_rollbacks_total";

/// Counter for partitions whose rollback target was raised to the committed offset
pub const ROLLBACK_FLOOR_RAISES: &str = "offset_consumer_rollback_floor_raises_total";

/// Counter for partitions skipped by rollback-by-gap because nothing was seen yet
pub const ROLLBACK_PARTITIONS_SKIPPED: &str = "offset_consumer_rollback_partitions_skipped_total";
