use std::time::{Duration, Instant};

/// Decides when the dashboard should pull again. Checked on every tick; no
/// background thread is involved.
#[derive(Debug, Clone)]
pub struct SyncSchedule {
    interval: Duration,
    last: Option<Instant>,
}

impl SyncSchedule {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Due at startup and whenever the interval has elapsed. A zero interval
    /// disables periodic pulls after the first one.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last {
            None => true,
            Some(_) if self.interval.is_zero() => false,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }

    pub fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }
}
