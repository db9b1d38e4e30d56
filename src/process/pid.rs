// Process id allocation
use core::sync::atomic::{AtomicU64, Ordering};
use crossbeam_queue::SegQueue;

use crate::config::ProcessConfig;
use crate::process::pcb::ProcessId;

/// Monotonic counter over the configured range.
///
/// Once the counter passes `pid_max` it never wraps; further ids come from a
/// free list that only ever holds ids of records already removed from the
/// process table, so a live id is never handed out twice.
pub(crate) struct PidAllocator {
    next: AtomicU64,
    max: ProcessId,
    recycled: SegQueue<ProcessId>,
}

impl PidAllocator {
    /// `config` must already be validated
    pub(crate) fn new(config: &ProcessConfig) -> Self {
        Self {
            next: AtomicU64::new(config.pid_min),
            max: config.pid_max,
            recycled: SegQueue::new(),
        }
    }

    /// Hand out an unused id, or `None` when every id is held by a live record
    pub(crate) fn alloc(&self) -> Option<ProcessId> {
        let fresh = self
            .next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| {
                if next <= self.max {
                    next.checked_add(1)
                } else {
                    None
                }
            });
        match fresh {
            Ok(pid) => Some(pid),
            Err(_) => self.recycled.pop(),
        }
    }

    /// Return the id of a record that has left the process table
    pub(crate) fn release(&self, pid: ProcessId) {
        self.recycled.push(pid);
    }

    /// Whether the counter has run through the whole range
    #[cfg(test)]
    fn is_saturated(&self) -> bool {
        self.next.load(Ordering::SeqCst) > self.max
    }

    #[cfg(test)]
    fn recycled_len(&self) -> usize {
        self.recycled.len()
    }
}
