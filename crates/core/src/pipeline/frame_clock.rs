use std::time::{Duration, Instant};

use crate::shared::constants::DEFAULT_REFRESH_HZ;

/// Paces the live view at the display refresh rate.
pub trait FrameClock: Send {
    /// Blocks until the next refresh is due.
    fn wait_next(&mut self);

    fn interval(&self) -> Duration;
}

/// Sleeps out the remainder of a fixed interval.
///
/// When a tick overruns, the schedule restarts from now instead of firing a
/// burst of catch-up ticks.
pub struct IntervalFrameClock {
    interval: Duration,
    last_tick: Instant,
}

impl IntervalFrameClock {
    /// Rates with no representable interval (non-positive, non-finite or
    /// vanishingly small) fall back to the default refresh.
    pub fn new(hz: f64) -> Self {
        Self {
            interval: interval_for(hz),
            last_tick: Instant::now(),
        }
    }
}

impl Default for IntervalFrameClock {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_HZ)
    }
}

impl FrameClock for IntervalFrameClock {
    fn wait_next(&mut self) {
        if let Some(remaining) = self.interval.checked_sub(self.last_tick.elapsed()) {
            std::thread::sleep(remaining);
        }
        self.last_tick = Instant::now();
    }

    fn interval(&self) -> Duration {
        self.interval
    }
}

fn interval_for(hz: f64) -> Duration {
    let fallback = Duration::from_secs_f64(1.0 / DEFAULT_REFRESH_HZ);
    if !(hz.is_finite() && hz > 0.0) {
        return fallback;
    }
    Duration::try_from_secs_f64(1.0 / hz).unwrap_or(fallback)
}
