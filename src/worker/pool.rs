//! Local search pool
//!
//! Fans one assigned block out across the worker's parallel execution
//! units and races them to the first match. Each unit is an OS thread
//! scanning a disjoint sub-range in increasing order; a shared
//! cancellation flag stops the siblings once any unit reports a hit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::channel;

use crate::fingerprint::Fingerprint;
use crate::keyspace::BlockRange;
use crate::Result;

/// Races the worker's execution units over disjoint sub-ranges of a block
#[derive(Debug, Clone, Copy)]
pub struct SearchPool {
    parallelism: usize,
}

impl SearchPool {
    pub fn new(parallelism: usize) -> Self {
        Self {
            parallelism: parallelism.max(1),
        }
    }

    /// Search a block for a candidate matching the target
    ///
    /// Splits the block into contiguous sub-ranges, one per unit, and
    /// scans them concurrently. The first positive result cancels the
    /// remaining units. Every thread is joined before this returns, so
    /// `None` means all units finished their sub-ranges with no match and
    /// no search work outlives the call.
    pub fn search(&self, block: BlockRange, target: &Fingerprint) -> Result<Option<u64>> {
        let cancel = Arc::new(AtomicBool::new(false));
        let (result_tx, result_rx) = channel::unbounded();

        let mut handles = Vec::new();
        for sub in block.split(self.parallelism) {
            let cancel = cancel.clone();
            let target = target.clone();
            let result_tx = result_tx.clone();
            handles.push(std::thread::spawn(move || {
                let _ = result_tx.send(scan_range(sub, &target, &cancel));
            }));
        }
        drop(result_tx);

        // Blocking wait on unit results; the channel closes once every
        // unit has reported, so a no-match block ends this loop without
        // polling.
        let mut winner = None;
        for result in result_rx.iter() {
            if let Some(candidate) = result {
                winner = Some(candidate);
                cancel.store(true, Ordering::Relaxed);
                break;
            }
        }

        for handle in handles {
            handle
                .join()
                .map_err(|_| anyhow::anyhow!("Search thread panicked"))?;
        }
        Ok(winner)
    }
}

/// Scan one sub-range in increasing order
///
/// Checks the cancellation flag between candidates; candidate testing is
/// pure, so stopping mid-range has no side effects to unwind.
fn scan_range(range: BlockRange, target: &Fingerprint, cancel: &AtomicBool) -> Option<u64> {
    for candidate in range.start..=range.end {
        if cancel.load(Ordering::Relaxed) {
            return None;
        }
        if target.matches(candidate) {
            cancel.store(true, Ordering::Relaxed);
            return Some(candidate);
        }
    }
    None
}
