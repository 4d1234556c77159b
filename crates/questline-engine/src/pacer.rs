//! Minimum spacing between data source calls.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Hands out call slots at least `interval` apart.
///
/// Each [`wait`](Pacer::wait) reserves the next free slot and sleeps until
/// it, so concurrent callers queue up instead of bursting.
pub struct Pacer {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for the next call slot. The first call never waits.
    pub async fn wait(&self) {
        let slot = {
            let mut next = self.next_slot.lock();
            let now = Instant::now();
            let slot = next.map_or(now, |n| n.max(now));
            *next = Some(slot + self.interval);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }
}
