//! Search coordinator
//!
//! The coordinator owns the keyspace cursor, the worker registration and
//! assignment tables, the reclaim queue, and the single-shot found state.
//! Every operation runs under one mutex; nothing performs network I/O while
//! the lock is held. Outbound messages only ever enqueue onto per-session
//! channels, and the session writer tasks do the actual socket work.

pub mod server;

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Notify;

use crate::fingerprint::Fingerprint;
use crate::keyspace::{BlockRange, SearchSpace};
use crate::protocol::Message;

/// Identifier assigned to a worker connection by the accept loop
pub type WorkerId = u64;

/// Outcome of a work request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkGrant {
    /// A block to search
    Block(BlockRange),
    /// Keyspace exhausted, no match yet
    NoWork,
    /// A match was already reported; cease searching
    Stop,
}

/// A registered worker connection
struct WorkerEntry {
    parallelism: u32,
    outbound: UnboundedSender<Message>,
}

/// A block handed to a worker and not yet resolved
struct Assignment {
    range: BlockRange,
    issued_at: Instant,
}

/// Mutable coordinator state, guarded by a single lock
struct CoordinatorState {
    /// Next unassigned candidate; monotonically non-decreasing, bounded by
    /// `upper_bound + 1`
    cursor: u64,
    /// Ranges abandoned by disconnected workers, ordered by start.
    /// Drawn from before the cursor advances so no keyspace is ever lost.
    reclaimed: VecDeque<BlockRange>,
    workers: BTreeMap<WorkerId, WorkerEntry>,
    assignments: BTreeMap<WorkerId, Assignment>,
    /// Set exactly once by the first successful report; never reversed
    outcome: Option<u64>,
}

/// Coordinates the search across all connected workers
pub struct SearchCoordinator {
    space: SearchSpace,
    target: Fingerprint,
    state: Mutex<CoordinatorState>,
    /// Signalled once the outcome settles
    found: Notify,
}

impl SearchCoordinator {
    pub fn new(space: SearchSpace, target: Fingerprint) -> Self {
        Self {
            space,
            target,
            state: Mutex::new(CoordinatorState {
                cursor: space.lower_bound,
                reclaimed: VecDeque::new(),
                workers: BTreeMap::new(),
                assignments: BTreeMap::new(),
                outcome: None,
            }),
            found: Notify::new(),
        }
    }

    /// The target digest workers test candidates against
    pub fn target(&self) -> &Fingerprint {
        &self.target
    }

    /// The settled outcome, if any
    pub fn outcome(&self) -> Option<u64> {
        self.state.lock().unwrap().outcome
    }

    /// Wait until a match has been reported
    pub async fn wait_found(&self) -> u64 {
        loop {
            let notified = self.found.notified();
            if let Some(candidate) = self.outcome() {
                return candidate;
            }
            notified.await;
        }
    }

    /// Register a worker connection
    ///
    /// Safe to call once per connection; registering again updates the
    /// declared parallelism. A zero declaration is clamped to 1.
    pub fn register(&self, worker_id: WorkerId, parallelism: u32, outbound: UnboundedSender<Message>) {
        let mut state = self.state.lock().unwrap();
        state.workers.insert(
            worker_id,
            WorkerEntry {
                parallelism: parallelism.max(1),
                outbound,
            },
        );
    }

    pub fn is_registered(&self, worker_id: WorkerId) -> bool {
        self.state.lock().unwrap().workers.contains_key(&worker_id)
    }

    /// Hand out the next block for this worker
    ///
    /// Reclaimed ranges are drawn before the cursor advances, lowest start
    /// first, so abandoned keyspace is reissued ahead of fresh keyspace.
    /// The grant replaces any prior assignment: a worker holds at most one
    /// outstanding block, and requesting the next one is the signal that
    /// the previous block was exhausted without a match.
    pub fn request_block(&self, worker_id: WorkerId) -> WorkGrant {
        let mut state = self.state.lock().unwrap();
        state.assignments.remove(&worker_id);

        if state.outcome.is_some() {
            return WorkGrant::Stop;
        }

        let parallelism = state
            .workers
            .get(&worker_id)
            .map(|w| w.parallelism)
            .unwrap_or(1);
        let block_size = self.space.block_size_for(parallelism);

        let range = if let Some(front) = state.reclaimed.pop_front() {
            let (head, rest) = front.take_front(block_size);
            if let Some(rest) = rest {
                state.reclaimed.push_front(rest);
            }
            head
        } else {
            if state.cursor > self.space.upper_bound {
                return WorkGrant::NoWork;
            }
            let start = state.cursor;
            let end = start
                .saturating_add(block_size - 1)
                .min(self.space.upper_bound);
            state.cursor = end + 1;
            BlockRange::new(start, end)
        };

        state.assignments.insert(
            worker_id,
            Assignment {
                range,
                issued_at: Instant::now(),
            },
        );
        WorkGrant::Block(range)
    }

    /// Record a reported match
    ///
    /// The first report settles the outcome and queues a stop to every
    /// registered worker, the reporter included (harmlessly). Later reports
    /// are accepted but ignored. Returns true when this call settled the
    /// outcome, i.e. exactly once per search.
    pub fn report_found(&self, worker_id: WorkerId, candidate: u64) -> bool {
        let recipients: Vec<UnboundedSender<Message>> = {
            let mut state = self.state.lock().unwrap();
            state.assignments.remove(&worker_id);

            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(candidate);
            state.workers.values().map(|w| w.outbound.clone()).collect()
        };

        // Fan out after the lock is released. These sends only enqueue; a
        // slow or dead peer is bounded by its session writer's timeout.
        for tx in recipients {
            let _ = tx.send(Message::Stop);
        }
        self.found.notify_waiters();
        true
    }

    /// Remove a worker and return its in-flight block to the reclaim queue
    ///
    /// Returns the requeued range and how long it was held, for logging.
    pub fn on_disconnect(&self, worker_id: WorkerId) -> Option<(BlockRange, Duration)> {
        let mut state = self.state.lock().unwrap();
        state.workers.remove(&worker_id);

        let assignment = state.assignments.remove(&worker_id)?;
        let pos = state
            .reclaimed
            .iter()
            .position(|r| r.start > assignment.range.start)
            .unwrap_or(state.reclaimed.len());
        state.reclaimed.insert(pos, assignment.range);

        Some((assignment.range, assignment.issued_at.elapsed()))
    }

    /// Number of currently registered workers
    pub fn registered_workers(&self) -> usize {
        self.state.lock().unwrap().workers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    fn coordinator(lower: u64, upper: u64, block_size_per_unit: u64) -> SearchCoordinator {
        let space = SearchSpace {
            lower_bound: lower,
            upper_bound: upper,
            block_size_per_unit,
        };
        // MD5("0000000042")
        let target = Fingerprint::parse("2FB362FBF84BEDB41530AF52286EA596").unwrap();
        SearchCoordinator::new(space, target)
    }

    fn attach(coord: &SearchCoordinator, id: WorkerId, parallelism: u32) -> UnboundedReceiver<Message> {
        let (tx, rx) = unbounded_channel();
        coord.register(id, parallelism, tx);
        rx
    }

    fn expect_block(grant: WorkGrant) -> BlockRange {
        match grant {
            WorkGrant::Block(range) => range,
            other => panic!("Expected a block, got {:?}", other),
        }
    }

    fn drain_stops(rx: &mut UnboundedReceiver<Message>) -> usize {
        let mut stops = 0;
        while let Ok(msg) = rx.try_recv() {
            if matches!(msg, Message::Stop) {
                stops += 1;
            }
        }
        stops
    }

    #[test]
    fn test_blocks_tile_the_keyspace_exactly() {
        let coord = coordinator(0, 999, 100);
        let _rx = attach(&coord, 1, 1);

        let mut expected_start = 0;
        loop {
            match coord.request_block(1) {
                WorkGrant::Block(range) => {
                    // Strictly increasing, gapless, non-overlapping
                    assert_eq!(range.start, expected_start);
                    assert_eq!(range.count(), 100);
                    expected_start = range.end + 1;
                }
                WorkGrant::NoWork => break,
                WorkGrant::Stop => panic!("Unexpected stop"),
            }
        }
        assert_eq!(expected_start, 1000);
    }

    #[test]
    fn test_block_size_scales_with_declared_parallelism() {
        let coord = coordinator(0, 9_999_999, 1000);
        let _rx1 = attach(&coord, 1, 4);
        let _rx2 = attach(&coord, 2, 1);

        let first = expect_block(coord.request_block(1));
        assert_eq!(first, BlockRange::new(0, 3999));

        let second = expect_block(coord.request_block(2));
        assert_eq!(second, BlockRange::new(4000, 4999));
    }

    #[test]
    fn test_final_block_is_truncated_at_upper_bound() {
        let coord = coordinator(0, 149, 100);
        let _rx = attach(&coord, 1, 1);

        assert_eq!(expect_block(coord.request_block(1)), BlockRange::new(0, 99));
        assert_eq!(expect_block(coord.request_block(1)), BlockRange::new(100, 149));
        assert_eq!(coord.request_block(1), WorkGrant::NoWork);
    }

    #[test]
    fn test_no_work_when_exhausted_and_outcome_unset() {
        let coord = coordinator(0, 99, 100);
        let _rx = attach(&coord, 1, 1);

        expect_block(coord.request_block(1));
        assert_eq!(coord.request_block(1), WorkGrant::NoWork);
        assert_eq!(coord.outcome(), None);
    }

    #[test]
    fn test_stop_after_found_regardless_of_remaining_space() {
        let coord = coordinator(0, 9_999_999_999, 200_000);
        let _rx = attach(&coord, 1, 1);

        expect_block(coord.request_block(1));
        assert!(coord.report_found(1, 42));

        assert_eq!(coord.request_block(1), WorkGrant::Stop);
        assert_eq!(coord.request_block(1), WorkGrant::Stop);
    }

    #[test]
    fn test_first_report_wins_and_outcome_never_changes() {
        let coord = coordinator(0, 999, 100);
        let _rx1 = attach(&coord, 1, 1);
        let _rx2 = attach(&coord, 2, 1);

        assert!(coord.report_found(1, 42));
        assert_eq!(coord.outcome(), Some(42));

        // A later report with a different value is accepted but ignored
        assert!(!coord.report_found(2, 43));
        assert_eq!(coord.outcome(), Some(42));
    }

    #[test]
    fn test_found_broadcasts_stop_exactly_once_to_everyone() {
        let coord = coordinator(0, 999_999, 100);
        let mut rx1 = attach(&coord, 1, 1);
        let mut rx2 = attach(&coord, 2, 1);
        let mut rx3 = attach(&coord, 3, 1);

        assert!(coord.report_found(2, 42));
        assert!(!coord.report_found(3, 42));

        // Exactly one fan-out: one stop per registered worker, reporter
        // included, and the duplicate report added none.
        assert_eq!(drain_stops(&mut rx1), 1);
        assert_eq!(drain_stops(&mut rx2), 1);
        assert_eq!(drain_stops(&mut rx3), 1);
    }

    #[test]
    fn test_disconnect_requeues_the_abandoned_block() {
        let coord = coordinator(0, 9999, 1000);
        let _rx1 = attach(&coord, 1, 1);
        let _rx2 = attach(&coord, 2, 1);

        assert_eq!(expect_block(coord.request_block(1)), BlockRange::new(0, 999));
        assert_eq!(expect_block(coord.request_block(2)), BlockRange::new(1000, 1999));

        // Worker 2 dies holding [1000, 1999]
        let (requeued, _held) = coord.on_disconnect(2).unwrap();
        assert_eq!(requeued, BlockRange::new(1000, 1999));

        // The abandoned range is issued again before fresh keyspace
        let _rx3 = attach(&coord, 3, 1);
        assert_eq!(expect_block(coord.request_block(3)), BlockRange::new(1000, 1999));
        assert_eq!(expect_block(coord.request_block(3)), BlockRange::new(2000, 2999));
    }

    #[test]
    fn test_reclaimed_range_is_split_to_the_requesters_block_size() {
        let coord = coordinator(0, 99_999, 1000);
        let _rx1 = attach(&coord, 1, 4);

        assert_eq!(expect_block(coord.request_block(1)), BlockRange::new(0, 3999));
        coord.on_disconnect(1);

        // A single-unit worker draws from the reclaimed range in its own
        // block size; the remainder stays queued at the front.
        let _rx2 = attach(&coord, 2, 1);
        assert_eq!(expect_block(coord.request_block(2)), BlockRange::new(0, 999));
        assert_eq!(expect_block(coord.request_block(2)), BlockRange::new(1000, 1999));
        assert_eq!(expect_block(coord.request_block(2)), BlockRange::new(2000, 2999));
        assert_eq!(expect_block(coord.request_block(2)), BlockRange::new(3000, 3999));
        // Reclaim queue drained; the cursor takes over where it left off
        assert_eq!(expect_block(coord.request_block(2)), BlockRange::new(4000, 4999));
    }

    #[test]
    fn test_requesting_again_replaces_rather_than_requeues() {
        let coord = coordinator(0, 9999, 1000);
        let _rx = attach(&coord, 1, 1);

        expect_block(coord.request_block(1));
        expect_block(coord.request_block(1));

        // Only the live (second) block is abandoned on disconnect; the
        // first was completed without a match and must not come back.
        let (requeued, _) = coord.on_disconnect(1).unwrap();
        assert_eq!(requeued, BlockRange::new(1000, 1999));

        let _rx2 = attach(&coord, 2, 1);
        assert_eq!(expect_block(coord.request_block(2)), BlockRange::new(1000, 1999));
        assert_eq!(expect_block(coord.request_block(2)), BlockRange::new(2000, 2999));
    }

    #[test]
    fn test_disconnect_without_assignment_is_a_no_op() {
        let coord = coordinator(0, 999, 100);
        let _rx = attach(&coord, 1, 1);

        assert!(coord.on_disconnect(1).is_none());
        assert_eq!(coord.registered_workers(), 0);
    }

    #[test]
    fn test_report_clears_the_reporters_assignment() {
        let coord = coordinator(0, 9999, 1000);
        let _rx = attach(&coord, 1, 1);

        expect_block(coord.request_block(1));
        assert!(coord.report_found(1, 42));

        // Nothing left to requeue
        assert!(coord.on_disconnect(1).is_none());
    }

    #[tokio::test]
    async fn test_wait_found_resolves_after_report() {
        let coord = std::sync::Arc::new(coordinator(0, 999, 100));
        let _rx = attach(&coord, 1, 1);

        let waiter = {
            let coord = coord.clone();
            tokio::spawn(async move { coord.wait_found().await })
        };

        coord.report_found(1, 42);
        assert_eq!(waiter.await.unwrap(), 42);
    }
}
