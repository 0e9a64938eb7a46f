//! Tick counting and scheduling.

use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Work due in one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickPlan {
    /// Number of this tick, starting at 1.
    pub tick: u64,
    pub refresh_announce: bool,
}

/// Monotonic tick counter that knows when periodic work is due.
///
/// The counter advances before periodic checks, so with an interval of 20
/// the announce refresh runs on ticks 20, 40, 60 and so on.
#[derive(Debug, Clone)]
pub struct TickSchedule {
    tick: u64,
    announce_interval: u64,
}

impl TickSchedule {
    pub fn new(announce_interval: u64) -> Self {
        Self {
            tick: 0,
            announce_interval: announce_interval.max(1),
        }
    }

    /// Ticks completed so far.
    pub fn current(&self) -> u64 {
        self.tick
    }

    pub fn advance(&mut self) -> TickPlan {
        self.tick += 1;
        TickPlan {
            tick: self.tick,
            refresh_announce: self.tick % self.announce_interval == 0,
        }
    }
}

/// Fixed-rate interval that skips missed ticks instead of bursting.
pub fn tick_interval(period: Duration) -> Interval {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_every_interval() {
        let mut schedule = TickSchedule::new(20);
        for _ in 0..19 {
            assert!(!schedule.advance().refresh_announce);
        }
        let plan = schedule.advance();
        assert_eq!(plan.tick, 20);
        assert!(plan.refresh_announce);
        assert!(!schedule.advance().refresh_announce);
        assert_eq!(schedule.current(), 21);
    }

    #[test]
    fn test_zero_interval_refreshes_every_tick() {
        let mut schedule = TickSchedule::new(0);
        assert!(schedule.advance().refresh_announce);
        assert!(schedule.advance().refresh_announce);
    }

    #[test]
    fn test_tick_interval_fires() {
        tokio_test::block_on(async {
            let mut timer = tick_interval(Duration::from_millis(5));
            timer.tick().await;
            let start = std::time::Instant::now();
            timer.tick().await;
            assert!(start.elapsed() >= Duration::from_millis(1));
        });
    }
}
