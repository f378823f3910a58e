use std::cell::Cell;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Source of "now" for round timestamps and timers.
pub trait Clock {
    fn now(&self) -> Instant;
    /// Wall-clock milliseconds since the Unix epoch, for persisted records.
    fn unix_millis(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

/// Wall-clock reading of a fresh [`ManualClock`].
pub const MANUAL_CLOCK_EPOCH_MS: u64 = 1_700_000_000_000;

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Cell<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Cell::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset.set(self.offset.get().saturating_add(by));
    }

    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.offset.get()
    }

    fn unix_millis(&self) -> u64 {
        let offset_ms = u64::try_from(self.offset.get().as_millis()).unwrap_or(u64::MAX);
        MANUAL_CLOCK_EPOCH_MS.saturating_add(offset_ms)
    }
}
