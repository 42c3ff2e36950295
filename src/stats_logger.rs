use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Events played per second, over a sliding window of one second's worth
/// of refresh frames. Shared between the scheduler, which counts, and the
/// front-end, which advances frames and reads the rate.
pub struct StatsLogger {
    frames: Vec<AtomicU32>,
    current: AtomicUsize,
    total: AtomicU64,
}

impl StatsLogger {
    pub fn new(frames_per_second: usize) -> Self {
        let frames = frames_per_second.max(1);
        Self {
            frames: (0..frames).map(|_| AtomicU32::new(0)).collect(),
            current: AtomicUsize::new(0),
            total: AtomicU64::new(0),
        }
    }

    pub fn increment(&self, by: u32) {
        let idx = self.current.load(Ordering::Relaxed);
        self.frames[idx].fetch_add(by, Ordering::Relaxed);
        self.total.fetch_add(u64::from(by), Ordering::Relaxed);
    }

    /// Start a new frame, dropping the oldest one from the window.
    pub fn next_frame(&self) {
        let next = (self.current.load(Ordering::Relaxed) + 1) % self.frames.len();
        self.current.store(next, Ordering::Relaxed);
        self.frames[next].store(0, Ordering::Relaxed);
    }

    pub fn events_per_second(&self) -> u32 {
        self.frames.iter().map(|x| x.load(Ordering::Relaxed)).sum()
    }

    pub fn total_events(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

impl Default for StatsLogger {
    fn default() -> Self {
        StatsLogger::new(crate::config::DEFAULT_REFRESH_RATE as usize)
    }
}
