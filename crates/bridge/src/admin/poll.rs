//! Bounded exponential polling of an admin result queue

use super::event::{ResultEvent, ResultKind};
use crate::engine::ResultQueue;
use std::time::Duration;
use tracing::debug;

/// Budgets up to this many milliseconds are polled in a single attempt.
pub const SINGLE_ATTEMPT_LIMIT_MS: u64 = 2_000;

/// Largest budget honoured, the engine's `i32` millisecond timeout limit.
pub const MAX_BUDGET_MS: u64 = i32::MAX as u64;

/// Number of attempts and the first wait for a polling budget.
///
/// Above [`SINGLE_ATTEMPT_LIMIT_MS`] the budget `T` is split into
/// `floor(log2(T / 1000)) + 1` attempts, each twice as long as the previous
/// one, starting at `T / (2^attempts - 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    attempts: u32,
    initial: Duration,
}

impl PollSchedule {
    /// Budgets above [`MAX_BUDGET_MS`] are clamped to it.
    pub fn for_timeout(timeout_ms: u64) -> Self {
        let timeout_ms = timeout_ms.min(MAX_BUDGET_MS);
        if timeout_ms <= SINGLE_ATTEMPT_LIMIT_MS {
            return Self {
                attempts: 1,
                initial: Duration::from_millis(timeout_ms),
            };
        }

        let attempts = (timeout_ms / 1000).ilog2() + 1;
        let initial = timeout_ms / ((1u64 << attempts) - 1);
        Self {
            attempts,
            initial: Duration::from_millis(initial),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    /// Successive waits, doubling each attempt.
    pub fn waits(&self) -> impl Iterator<Item = Duration> {
        let initial = self.initial;
        (0..self.attempts).map(move |i| {
            initial.saturating_mul(1u32.checked_shl(i).unwrap_or(u32::MAX))
        })
    }

    pub fn total(&self) -> Duration {
        self.waits().sum()
    }
}

#[derive(Debug)]
pub enum PollOutcome {
    Matched(ResultEvent),
    /// No matching event; `last_seen` is the kind of the last event that
    /// arrived but did not match.
    TimedOut { last_seen: Option<ResultKind> },
}

/// Poll `queue` until an event of `kind` arrives or the schedule is spent.
///
/// Non-matching events are dropped.
pub fn poll_for_event<Q: ResultQueue>(queue: &Q, kind: ResultKind, timeout_ms: u64) -> PollOutcome {
    let schedule = PollSchedule::for_timeout(timeout_ms);
    let mut last_seen = None;

    for (attempt, wait) in schedule.waits().enumerate() {
        match queue.poll(wait) {
            Some(event) if event.kind == kind => return PollOutcome::Matched(event),
            Some(event) => {
                debug!(
                    expected = %kind,
                    received = %event.kind,
                    attempt,
                    "Discarding result event of unexpected kind"
                );
                last_seen = Some(event.kind);
            }
            None => {
                debug!(expected = %kind, attempt, wait_ms = wait.as_millis() as u64, "No result event yet");
            }
        }
    }

    PollOutcome::TimedOut { last_seen }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::event::EventPayload;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    struct ScriptedQueue {
        events: Mutex<VecDeque<Option<ResultEvent>>>,
        waits: Mutex<Vec<Duration>>,
    }

    impl ScriptedQueue {
        fn new(events: Vec<Option<ResultEvent>>) -> Self {
            Self {
                events: Mutex::new(events.into()),
                waits: Mutex::new(Vec::new()),
            }
        }
    }

    impl ResultQueue for ScriptedQueue {
        fn poll(&self, timeout: Duration) -> Option<ResultEvent> {
            self.waits.lock().push(timeout);
            self.events.lock().pop_front().flatten()
        }
    }

    fn event(kind: ResultKind) -> Option<ResultEvent> {
        Some(ResultEvent::new(kind, EventPayload::None))
    }

    #[test]
    fn test_short_budget_is_single_attempt() {
        let schedule = PollSchedule::for_timeout(1500);
        assert_eq!(schedule.attempts(), 1);
        assert_eq!(schedule.initial(), Duration::from_millis(1500));

        let schedule = PollSchedule::for_timeout(2000);
        assert_eq!(schedule.attempts(), 1);
    }

    #[test]
    fn test_long_budget_doubles() {
        let schedule = PollSchedule::for_timeout(8000);
        assert_eq!(schedule.attempts(), 4);
        assert_eq!(schedule.initial(), Duration::from_millis(533));

        let waits: Vec<u128> = schedule.waits().map(|w| w.as_millis()).collect();
        assert_eq!(waits, vec![533, 1066, 2132, 4264]);
        assert!((7990..=8000).contains(&schedule.total().as_millis()));
    }

    #[test]
    fn test_oversized_budget_is_clamped() {
        let schedule = PollSchedule::for_timeout(u64::MAX);
        assert_eq!(schedule, PollSchedule::for_timeout(MAX_BUDGET_MS));
        assert_eq!(schedule.attempts(), 22);

        let waits: Vec<Duration> = schedule.waits().collect();
        assert_eq!(waits.len(), 22);
        assert!(schedule.total() <= Duration::from_millis(MAX_BUDGET_MS));
    }

    #[test]
    fn test_default_budget_schedule() {
        // 5000ms: log2(5) = 2, three attempts of 714, 1428, 2856
        let schedule = PollSchedule::for_timeout(5000);
        assert_eq!(schedule.attempts(), 3);
        assert_eq!(schedule.initial(), Duration::from_millis(714));
    }

    #[test]
    fn test_matching_event_stops_polling() {
        let queue = ScriptedQueue::new(vec![None, event(ResultKind::CreateTopics)]);

        match poll_for_event(&queue, ResultKind::CreateTopics, 8000) {
            PollOutcome::Matched(event) => assert_eq!(event.kind, ResultKind::CreateTopics),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(
            *queue.waits.lock(),
            vec![Duration::from_millis(533), Duration::from_millis(1066)]
        );
    }

    #[test]
    fn test_mismatched_events_are_reported() {
        let queue = ScriptedQueue::new(vec![
            event(ResultKind::DeleteTopics),
            event(ResultKind::DeleteGroups),
        ]);

        match poll_for_event(&queue, ResultKind::CreateTopics, 3000) {
            PollOutcome::TimedOut { last_seen } => {
                assert_eq!(last_seen, Some(ResultKind::DeleteGroups))
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(queue.waits.lock().len(), 2);
    }

    #[test]
    fn test_silence_times_out() {
        let queue = ScriptedQueue::new(vec![]);
        match poll_for_event(&queue, ResultKind::ListConsumerGroups, 100) {
            PollOutcome::TimedOut { last_seen } => assert!(last_seen.is_none()),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(*queue.waits.lock(), vec![Duration::from_millis(100)]);
    }
}
