use std::time::{Duration, Instant};

/// Fixed-interval trigger checked without blocking.
///
/// At most one tick is pending at a time: if the loop falls behind by several
/// intervals the next check fires once and the schedule restarts from there.
#[derive(Debug, Clone)]
pub struct CommitScheduler {
    interval: Duration,
    next_due: Option<Instant>,
}

impl CommitScheduler {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next_due: now.checked_add(interval),
        }
    }

    /// Returns true, and re-arms, if a tick is due at `now`.
    pub fn poll_due(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(due) if now >= due => {
                self.next_due = now.checked_add(self.interval);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_due_before_interval() {
        let start = Instant::now();
        let mut scheduler = CommitScheduler::new(Duration::from_secs(120), start);

        assert!(!scheduler.poll_due(start));
        assert!(!scheduler.poll_due(start + Duration::from_secs(119)));
        assert!(scheduler.poll_due(start + Duration::from_secs(120)));
    }

    #[test]
    fn test_fires_at_most_once_per_interval() {
        let start = Instant::now();
        let mut scheduler = CommitScheduler::new(Duration::from_secs(120), start);

        // Many checks in a burst after a long stall: only the first fires.
        let late = start + Duration::from_secs(600);
        let fired = (0..50).filter(|_| scheduler.poll_due(late)).count();
        assert_eq!(fired, 1);

        assert!(!scheduler.poll_due(late + Duration::from_secs(60)));
        assert!(scheduler.poll_due(late + Duration::from_secs(120)));
    }

    #[test]
    fn test_zero_interval_is_always_due() {
        let start = Instant::now();
        let mut scheduler = CommitScheduler::new(Duration::ZERO, start);

        assert!(scheduler.poll_due(start));
        assert!(scheduler.poll_due(start));
    }

    #[test]
    fn test_unrepresentable_deadline_never_fires() {
        let start = Instant::now();
        let mut scheduler = CommitScheduler::new(Duration::MAX, start);

        assert!(!scheduler.poll_due(start + Duration::from_secs(3600)));
    }
}
