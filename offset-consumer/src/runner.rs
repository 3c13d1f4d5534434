use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::consumer::{MessageHandler, OffsetConsumer};
use crate::error::{ConsumeError, FatalFault};
use crate::kafka::client::BrokerClient;
use crate::scheduler::CommitScheduler;

/// Periodic rollback-by-gap driven from the poll loop.
#[derive(Debug, Clone)]
pub struct CommitBack {
    scheduler: CommitScheduler,
    gap: Duration,
}

impl CommitBack {
    pub fn new(interval: Duration, gap: Duration, now: Instant) -> Self {
        Self {
            scheduler: CommitScheduler::new(interval, now),
            gap,
        }
    }
}

/// Drive `consumer` until `cancel` fires or a fatal fault occurs.
///
/// Recoverable errors are logged and polling continues. The consumer is not
/// closed here; the caller closes it after a clean return.
pub fn run_until_cancelled<C: BrokerClient, H: MessageHandler>(
    consumer: &mut OffsetConsumer<C, H>,
    cancel: &CancellationToken,
    mut commit_back: Option<CommitBack>,
) -> Result<(), FatalFault> {
    while !cancel.is_cancelled() {
        match consumer.consume_next() {
            Ok(()) => {}
            Err(ConsumeError::Fatal(fault)) => return Err(fault),
            Err(e) => warn!(error = ?e, "Consumer error"),
        }

        if let Some(back) = commit_back.as_mut() {
            if back.scheduler.poll_due(Instant::now()) {
                // failures are logged and counted by the reconciler; the next tick retries
                if let Ok(committed) = consumer.rollback_by_gap(back.gap) {
                    info!(partitions = committed.len(), "Committed back by gap");
                }
            }
        }
    }

    info!("Consumer loop cancelled");
    Ok(())
}
