use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::counters::{CounterSnapshot, SharedCounters};

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Periodic, consistent view on batch progress.
#[derive(Debug)]
pub struct Heartbeat {
    counters: SharedCounters,
    total: usize,
    start: Instant,
    interval: Interval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Beat {
    pub elapsed: Duration,
    pub total: usize,
    pub counters: CounterSnapshot,
}

impl Beat {
    pub fn is_final(&self) -> bool {
        self.counters.done >= self.total
    }
}

impl Heartbeat {
    /// Ticks every `period`, the first tick one `period` after `start`.
    pub fn new(counters: SharedCounters, total: usize, start: Instant, period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(start + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            counters,
            total,
            start,
            interval,
        }
    }

    /// Wait for the next tick and snapshot the counters.
    pub async fn tick(&mut self) -> Beat {
        self.interval.tick().await;
        self.beat()
    }

    /// Snapshot the counters right now.
    pub fn beat(&self) -> Beat {
        Beat {
            elapsed: self.start.elapsed(),
            total: self.total,
            counters: self.counters.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time;

    #[tokio::test(flavor = "current_thread")]
    async fn ticks_once_per_period_from_start() {
        time::pause();

        let counters = SharedCounters::new();
        let mut hb = Heartbeat::new(counters.clone(), 2, Instant::now(), HEARTBEAT_INTERVAL);

        counters.start();
        let beat = hb.tick().await;
        assert_eq!(beat.elapsed, Duration::from_secs(1));
        assert_eq!(beat.counters.active, 1);
        assert!(!beat.is_final());

        counters.start();
        counters.finish();
        counters.finish();
        let beat = hb.tick().await;
        assert_eq!(beat.elapsed, Duration::from_secs(2));
        assert_eq!(beat.counters.done, 2);
        assert!(beat.is_final());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn beat_does_not_wait_for_a_tick() {
        time::pause();

        let hb = Heartbeat::new(SharedCounters::new(), 0, Instant::now(), HEARTBEAT_INTERVAL);
        let beat = hb.beat();
        assert_eq!(beat.elapsed, Duration::ZERO);
        assert!(beat.is_final());
    }
}
