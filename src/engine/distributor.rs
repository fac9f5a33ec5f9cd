//! Size-balanced assignment of work items to workers.
//!
//! Uses the longest-processing-time heuristic: items are taken largest
//! first and each goes to the worker with the smallest running byte total.
//! This is an approximation, not an optimal partition. It guarantees that
//! the largest and smallest worker totals differ by at most the size of
//! the largest single item.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::scanner::WorkItem;

/// The result of distributing work items.
#[derive(Debug, Clone, Default)]
pub struct Assignment {
    /// One batch per worker, each in descending size order
    pub batches: Vec<Vec<WorkItem>>,
    /// Total bytes assigned to each worker
    pub totals: Vec<u64>,
}

impl Assignment {
    /// Number of workers.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.batches.len()
    }

    /// Difference between the largest and smallest worker totals.
    #[must_use]
    pub fn spread(&self) -> u64 {
        let max = self.totals.iter().copied().max().unwrap_or(0);
        let min = self.totals.iter().copied().min().unwrap_or(0);
        max - min
    }
}

/// Split `items` into `workers` batches balanced by total size.
///
/// A `workers` value of zero is treated as one. Equal sizes keep their
/// discovery order, and ties between workers go to the lowest index, so
/// the result is deterministic.
#[must_use]
pub fn distribute(mut items: Vec<WorkItem>, workers: usize) -> Assignment {
    let workers = workers.max(1);
    items.sort_by(|a, b| b.size.cmp(&a.size));

    let mut batches: Vec<Vec<WorkItem>> = (0..workers).map(|_| Vec::new()).collect();
    let mut totals = vec![0u64; workers];
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> =
        (0..workers).map(|index| Reverse((0, index))).collect();

    for item in items {
        let Some(Reverse((total, index))) = heap.pop() else {
            break;
        };
        let total = total + item.size;
        totals[index] = total;
        batches[index].push(item);
        heap.push(Reverse((total, index)));
    }

    log::debug!(
        "Distributed work across {} workers (bytes per worker: {:?})",
        workers,
        totals
    );

    Assignment { batches, totals }
}
