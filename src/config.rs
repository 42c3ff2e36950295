use std::time::Duration;

/// How the host paces `Scheduler::step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pacing {
    /// Follow the wall clock at the configured refresh rate.
    #[default]
    RealTime,
    /// Render as fast as possible, no sleeping.
    Batch,
}

/// Process-level controls, independent of how they were collected.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    /// Host loop frequency in Hz.
    pub refresh_rate: u32,
    /// Linear gain applied to the engine output.
    pub output_gain: f32,
    pub mono: bool,
    /// Tracks allowed to start notes. Empty lets every track through.
    pub active_tracks: Vec<usize>,
    /// Preset name/file filter handed to the bank resolver.
    pub selection: Vec<String>,
    pub pacing: Pacing,
}

pub const DEFAULT_REFRESH_RATE: u32 = 100;

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig {
            refresh_rate: DEFAULT_REFRESH_RATE,
            output_gain: 1.0,
            mono: false,
            active_tracks: Vec::new(),
            selection: Vec::new(),
            pacing: Pacing::RealTime,
        }
    }
}

impl PlayerConfig {
    /// Clamp out-of-range values to something playable.
    pub fn validated(mut self) -> Self {
        self.refresh_rate = self.refresh_rate.clamp(1, 10_000);
        if !self.output_gain.is_finite() || self.output_gain < 0.0 {
            self.output_gain = 1.0;
        }
        self.active_tracks.sort_unstable();
        self.active_tracks.dedup();
        self
    }

    /// Time between host loop iterations.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.refresh_rate.max(1)))
    }

    pub fn track_enabled(&self, track: usize) -> bool {
        self.active_tracks.is_empty() || self.active_tracks.binary_search(&track).is_ok()
    }
}
