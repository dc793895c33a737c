/// A bounded, single-slot, latest-wins channel: the cross-thread datum
/// between the dispatcher and one output worker (§5: "the mailbox is the
/// only cross-thread datum per output").
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Single-slot mailbox. `submit` never blocks: a payload already sitting
/// in the slot is discarded and counted as a drop.
pub struct Mailbox {
    slot: Mutex<Option<Vec<u8>>>,
    ready: Condvar,
    drops: AtomicU64,
}

impl Mailbox {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
            drops: AtomicU64::new(0),
        }
    }

    /// Non-blocking enqueue. Displaces and drops any payload already
    /// waiting, per the latest-wins invariant in §3.
    pub fn submit(&self, payload: Vec<u8>) {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            self.drops.fetch_add(1, Ordering::Relaxed);
        }
        *slot = Some(payload);
        self.ready.notify_one();
    }

    /// Wait up to `timeout` for a payload. Returns `None` on timeout so
    /// the worker loop can observe the shutdown flag (§5).
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Vec<u8>> {
        let mut slot = self.slot.lock();
        if slot.is_none() {
            let result = self.ready.wait_for(&mut slot, timeout);
            if result.timed_out() && slot.is_none() {
                return None;
            }
        }
        slot.take()
    }

    /// Drops counted so far; used by the stats loop, which resets its
    /// own delta by remembering the last value it read (§4.8).
    pub fn drops(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}
