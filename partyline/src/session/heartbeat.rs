//! Keepalive scheduling.
//!
//! While the session is fully joined, a keepalive ping goes out on a fixed
//! cadence so intermediaries do not reap the idle connection. The
//! scheduler is armed on join and disarmed on close or teardown; while
//! disarmed, [`HeartbeatScheduler::tick`] pends forever so it can sit in a
//! select loop without firing.

use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior, interval_at};

/// Fixed-cadence keepalive timer with explicit arm/disarm.
pub struct HeartbeatScheduler {
    period: Duration,
    interval: Option<Interval>,
}

impl HeartbeatScheduler {
    /// Creates a disarmed scheduler with the given cadence.
    #[must_use]
    pub const fn new(period: Duration) -> Self {
        Self {
            period,
            interval: None,
        }
    }

    /// Arms the scheduler; the first tick fires one full period from now.
    pub fn arm(&mut self) {
        let mut interval = interval_at(tokio::time::Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
    }

    /// Disarms the scheduler; pending ticks are cancelled.
    pub fn disarm(&mut self) {
        self.interval = None;
    }

    /// Whether the scheduler is currently armed.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.interval.is_some()
    }

    /// Waits for the next keepalive tick; pends forever while disarmed.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending().await,
        }
    }
}
