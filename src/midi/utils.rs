use std::time::{Duration, Instant};

/// Monotonic clock in 100 ns units, counted from when it was started.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    start: Instant,
}

impl Clock {
    pub fn start() -> Self {
        Clock { start: Instant::now() }
    }

    /// Get the time in 100ns units
    pub fn now_100ns(&self) -> i64 {
        duration_to_100ns(self.start.elapsed())
    }
}

pub fn duration_to_100ns(duration: Duration) -> i64 {
    let seconds = duration.as_secs() as i64;
    let nanos = i64::from(duration.subsec_nanos());

    (seconds * 10_000_000) + (nanos / 100)
}

/// Negative spans clamp to zero.
pub fn duration_from_100ns(units: i64) -> Duration {
    if units <= 0 {
        return Duration::ZERO;
    }

    let secs = units / 10_000_000;
    let nanos = (units % 10_000_000) * 100;

    Duration::new(secs as u64, nanos as u32)
}
