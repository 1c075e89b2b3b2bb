// src/crawl/frontier.rs
// =============================================================================
// The work queue plus the visited ledger.
//
// How it works:
// 1. try_enqueue checks the ledger and, if the address is new, records it
//    and pushes it onto the queue. Both happen under one lock, so two tasks
//    discovering the same peer at the same moment can never both win.
// 2. claim pops the next address and counts it as in flight.
// 3. The returned Claim releases the in-flight slot when it is dropped,
//    whether the task finished, failed, panicked or was cancelled.
//
// Every change wakes anyone waiting on `changed()` (idle workers and the
// pool supervisor).
//
// The lock is a std Mutex: critical sections are a few HashSet/VecDeque
// operations and never span an .await.
// =============================================================================

use super::address::Address;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    queue: VecDeque<Address>,
    visited: HashSet<Address>,
    in_flight: usize,
}

#[derive(Debug, Default)]
pub struct Frontier {
    inner: Mutex<Inner>,
    changed: Notify,
}

// A point-in-time view of the frontier, used for scaling decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Load {
    pub pending: usize,
    pub in_flight: usize,
}

impl Load {
    /// Nothing queued and nothing running: the crawl has run out of work.
    pub fn is_drained(&self) -> bool {
        self.pending == 0 && self.in_flight == 0
    }
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave Inner half-updated
        // (every mutation is a single collection call), so keep going
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // Adds `addr` unless it has ever been enqueued before
    //
    // Returns: true if the address was new and is now queued
    pub fn try_enqueue(&self, addr: Address) -> bool {
        let inserted = {
            let mut inner = self.lock();
            if inner.visited.contains(&addr) {
                false
            } else {
                inner.visited.insert(addr.clone());
                inner.queue.push_back(addr);
                true
            }
        };

        if inserted {
            self.changed.notify_waiters();
        }
        inserted
    }

    // Pops the next address and marks it in flight in the same critical
    // section, so `load()` never sees an empty queue with the work "missing"
    pub fn claim(self: &Arc<Self>) -> Option<Claim> {
        let address = {
            let mut inner = self.lock();
            let address = inner.queue.pop_front()?;
            inner.in_flight += 1;
            address
        };

        Some(Claim {
            frontier: Arc::clone(self),
            address,
        })
    }

    pub fn load(&self) -> Load {
        let inner = self.lock();
        Load {
            pending: inner.queue.len(),
            in_flight: inner.in_flight,
        }
    }

    /// Number of addresses ever admitted.
    pub fn visited(&self) -> usize {
        self.lock().visited.len()
    }

    // Future that resolves on the next enqueue or release
    //
    // Call `enable()` on it (pinned) before re-checking state, otherwise a
    // notification between the check and the await is lost.
    pub fn changed(&self) -> Notified<'_> {
        self.changed.notified()
    }

    fn release(&self) {
        {
            let mut inner = self.lock();
            inner.in_flight = inner.in_flight.saturating_sub(1);
        }
        self.changed.notify_waiters();
    }
}

// An address being worked on. Dropping it frees the in-flight slot.
#[derive(Debug)]
pub struct Claim {
    frontier: Arc<Frontier>,
    address: Address,
}

impl Claim {
    pub fn address(&self) -> &Address {
        &self.address
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.frontier.release();
    }
}
