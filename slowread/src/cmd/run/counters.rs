use std::sync::Arc;

use parking_lot::Mutex;

/// Batch progress shared between the client tasks and the heartbeat.
///
/// Each transition touches several fields and is applied under one lock,
/// so a [`snapshot`](SharedCounters::snapshot) never sees a half applied update.
#[derive(Debug, Clone, Default)]
pub struct SharedCounters {
    inner: Arc<Mutex<CounterSnapshot>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub active: usize,
    pub started: usize,
    pub done: usize,
    /// Highest `active` value ever observed.
    pub peak_active: usize,
}

impl SharedCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client got admitted: `active += 1`, `started += 1`.
    pub fn start(&self) {
        let mut c = self.inner.lock();
        c.active += 1;
        c.started += 1;
        c.peak_active = c.peak_active.max(c.active);
    }

    /// A client left, whatever its outcome: `active -= 1`, `done += 1`.
    pub fn finish(&self) {
        let mut c = self.inner.lock();
        debug_assert!(c.active > 0, "finish without start");
        c.active = c.active.saturating_sub(1);
        c.done += 1;
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        *self.inner.lock()
    }
}
