//! Reconnect delay: starts at a floor, doubles per consecutive failure,
//! never exceeds the ceiling, and returns to the floor after a success.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    current: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        let floor = floor.max(Duration::from_millis(1));
        let ceiling = ceiling.max(floor);
        Self {
            floor,
            ceiling,
            current: floor,
            failures: 0,
        }
    }

    pub fn from_millis(floor_ms: u64, ceiling_ms: u64) -> Self {
        Self::new(
            Duration::from_millis(floor_ms),
            Duration::from_millis(ceiling_ms),
        )
    }

    /// Records a failure and returns how long to wait before reconnecting.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.failures = self.failures.saturating_add(1);
        self.current = self
            .current
            .checked_mul(2)
            .unwrap_or(self.ceiling)
            .min(self.ceiling);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.floor;
        self.failures = 0;
    }

    /// Delay the next failure will produce.
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}
