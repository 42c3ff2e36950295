use std::time::Duration;

/// 120 BPM, the tempo in effect until the first tempo event.
pub const DEFAULT_TEMPO: u32 = 500_000;

/// SMPTE frame rates selected by the (negated) high byte of the division.
const SMPTE_FRAME_RATES: [(i8, f32); 4] = [(-24, 24.0), (-25, 25.0), (-29, 29.97), (-30, 30.0)];

/// Time division from the file header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Division {
    /// Ticks per quarter note.
    Ppqn(u16),
    /// Frames per second and ticks per frame.
    Smpte { fps: f32, subframes: u8 },
}

impl Division {
    /// Decode the header's division word. `None` for an SMPTE frame rate
    /// outside the four standard ones.
    pub fn from_header(word: u16) -> Option<Self> {
        if word & 0x8000 == 0 {
            return Some(Division::Ppqn(word));
        }
        let [frames, subframes] = word.to_be_bytes();
        let code = frames as i8;
        SMPTE_FRAME_RATES
            .iter()
            .find(|(c, _)| *c == code)
            .map(|&(_, fps)| Division::Smpte { fps, subframes })
    }

    /// Ticks per quarter note. SMPTE timing is converted at the default
    /// tempo, where one quarter note lasts half a second.
    pub fn ppqn(&self) -> u16 {
        match *self {
            Division::Ppqn(ppqn) => ppqn.max(1),
            Division::Smpte { fps, subframes } => ((fps * f32::from(subframes)) / 2.0).round().max(1.0) as u16,
        }
    }

    pub fn is_smpte(&self) -> bool {
        matches!(self, Division::Smpte { .. })
    }
}

/// Tick to wall-clock conversion at the current tempo.
///
/// Like the rest of the player, time is counted in 100 ns units; the
/// multiplier is the number of such units per tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Timing {
    ppqn: u16,
    tempo: u32,
    multiplier: f64,
    /// SMPTE files run at a fixed rate and ignore tempo events.
    locked: bool,
}

impl Timing {
    pub fn new(division: Division) -> Self {
        let mut timing = Timing { ppqn: division.ppqn(), tempo: DEFAULT_TEMPO, multiplier: 1.0, locked: false };
        timing.set_tempo(DEFAULT_TEMPO);
        timing.locked = division.is_smpte();
        timing
    }

    pub fn ppqn(&self) -> u16 {
        self.ppqn
    }

    /// Microseconds per quarter note.
    pub fn tempo(&self) -> u32 {
        self.tempo
    }

    pub fn bpm(&self) -> f64 {
        60_000_000.0 / f64::from(self.tempo.max(1))
    }

    /// 100 ns units per tick.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Apply a tempo meta event. Returns false when the tempo is locked.
    pub fn set_tempo(&mut self, tempo: u32) -> bool {
        if self.locked {
            return false;
        }
        self.tempo = tempo.max(1);
        // 1 microsecond = 10 * 100ns, so (t * 10) / ppqn = 100ns units per tick
        self.multiplier = (f64::from(self.tempo) * 10.0 / f64::from(self.ppqn)).max(1.0);
        true
    }

    pub fn ticks_to_100ns(&self, ticks: u64) -> i64 {
        (ticks as f64 * self.multiplier).round() as i64
    }

    pub fn ticks_to_duration(&self, ticks: u64) -> Duration {
        Duration::from_nanos((ticks as f64 * self.multiplier * 100.0).round() as u64)
    }

    /// Whole ticks covering `seconds` at the current tempo.
    pub fn seconds_to_ticks(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * 10_000_000.0 / self.multiplier).round() as u64
    }
}

/// Offset encoded by the SMPTE-offset meta event (`hr mn se fr ff`), in
/// seconds. The frame-rate bits in the hour byte select the rate.
pub fn smpte_offset_seconds(data: [u8; 5]) -> f64 {
    let fps = match (data[0] >> 5) & 0x03 {
        0 => 24.0,
        1 => 25.0,
        2 => 29.97,
        _ => 30.0,
    };
    let hours = f64::from(data[0] & 0x1F);
    let frames = f64::from(data[3]) + f64::from(data[4]) / 100.0;
    hours * 3600.0 + f64::from(data[1]) * 60.0 + f64::from(data[2]) + frames / fps
}
