//! Merges the track streams and paces them against a song clock.
//!
//! The host calls [`Scheduler::step`] with the wall-clock time that passed
//! since the last call. The scheduler plays everything that became due and
//! returns how long until the next event, so the host can sleep.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::channel::ChannelManager;
use crate::error::{MidiError, Result};
use crate::midi::display::Display;
use crate::midi::loader::MidiFile;
use crate::midi::timing::{DEFAULT_TEMPO, Timing};
use crate::midi::track::TrackStream;
use crate::midi::utils::{duration_from_100ns, duration_to_100ns};
use crate::stats_logger::StatsLogger;
use crate::synth::SynthEngine;

/// Everything a track event can act on.
pub struct PlaybackContext<E: SynthEngine> {
    pub channels: ChannelManager<E>,
    pub timing: Timing,
    pub display: Display,
    pub stats: Arc<StatsLogger>,
    /// SMPTE offset waiting to be turned into a start delay, in seconds.
    start_delay: Option<f64>,
    offset_seen: bool,
    started: bool,
}

impl<E: SynthEngine> PlaybackContext<E> {
    pub fn new(channels: ChannelManager<E>, timing: Timing) -> Self {
        PlaybackContext {
            channels,
            timing,
            display: Display::new(),
            stats: Arc::new(StatsLogger::default()),
            start_delay: None,
            offset_seen: false,
            started: false,
        }
    }

    /// Whether a channel event has been played yet.
    pub fn has_started(&self) -> bool {
        self.started
    }

    pub(crate) fn note_channel_event(&mut self) {
        self.started = true;
    }

    /// Honour an SMPTE offset once, and only before the first channel event.
    pub(crate) fn request_start_delay(&mut self, seconds: f64) {
        if self.started || self.offset_seen {
            debug!("SMPTE offset of {seconds:.3}s ignored");
            return;
        }
        self.offset_seen = true;
        self.start_delay = Some(seconds);
    }

    pub(crate) fn has_pending_delay(&self) -> bool {
        self.start_delay.is_some()
    }

    /// Pending start delay in ticks at the current tempo.
    fn take_start_delay(&mut self) -> Option<u64> {
        let seconds = self.start_delay.take()?;
        Some(self.timing.seconds_to_ticks(seconds))
    }
}

pub struct Scheduler<'a, E: SynthEngine> {
    streams: Vec<TrackStream<'a>>,
    context: PlaybackContext<E>,
    /// Format 2: one stream at a time, each starting where the last ended.
    sequential: bool,
    current: usize,
    current_placed: bool,
    /// Tick of the last processed event and its song time in 100 ns.
    tick: u64,
    tick_time: i64,
    /// Song clock in 100 ns.
    now: i64,
    finished: bool,
}

impl<'a, E: SynthEngine> Scheduler<'a, E> {
    pub fn new(file: &'a MidiFile, channels: ChannelManager<E>) -> Self {
        let streams = file.tracks.iter().enumerate().map(|(i, data)| TrackStream::new(i, data)).collect();
        Scheduler {
            streams,
            context: PlaybackContext::new(channels, Timing::new(file.division)),
            sequential: file.is_sequential(),
            current: 0,
            current_placed: false,
            tick: 0,
            tick_time: 0,
            now: 0,
            finished: false,
        }
    }

    pub fn with_stats(mut self, stats: Arc<StatsLogger>) -> Self {
        self.context.stats = stats;
        self
    }

    pub fn context(&self) -> &PlaybackContext<E> {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut PlaybackContext<E> {
        &mut self.context
    }

    pub fn into_context(self) -> PlaybackContext<E> {
        self.context
    }

    pub fn channels(&self) -> &ChannelManager<E> {
        &self.context.channels
    }

    /// Song position in ticks.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Song clock.
    pub fn position(&self) -> Duration {
        duration_from_100ns(self.now)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Advance the song clock by `elapsed` and play what became due.
    ///
    /// Returns the time until the next event, or `None` once every track
    /// is exhausted. Track-local decoding errors only end that track; a
    /// preset that cannot be loaded stops playback.
    pub fn step(&mut self, elapsed: Duration) -> Result<Option<Duration>> {
        if self.finished {
            return Ok(None);
        }
        self.now += duration_to_100ns(elapsed);

        loop {
            let Some((index, next_tick)) = self.next_due() else {
                self.finish();
                return Ok(None);
            };
            let due = self.tick_time + self.context.timing.ticks_to_100ns(next_tick.saturating_sub(self.tick));
            if due > self.now {
                return Ok(Some(duration_from_100ns(due - self.now)));
            }
            self.tick = next_tick;
            self.tick_time = due;
            self.process_stream(index)?;

            if let Some(delay) = self.context.take_start_delay() {
                debug!("delaying start by {delay} ticks");
                if self.sequential {
                    self.streams[self.current].shift(delay);
                } else {
                    self.streams.iter_mut().for_each(|s| s.shift(delay));
                }
            }
        }
    }

    /// Play the rest of the file without waiting. Returns the song length.
    pub fn run_to_end(&mut self) -> Result<Duration> {
        let mut budget = Duration::ZERO;
        while let Some(wait) = self.step(budget)? {
            budget = wait;
        }
        Ok(self.position())
    }

    /// Release every channel; notes finish their release.
    pub fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.context.channels.finish_all();
            info!(
                "playback finished at tick {} ({:.2}s, {} events)",
                self.tick,
                self.position().as_secs_f64(),
                self.context.stats.total_events()
            );
        }
    }

    fn process_stream(&mut self, index: usize) -> Result<()> {
        match self.streams[index].process(self.tick, &mut self.context) {
            Ok(()) => Ok(()),
            Err(e @ (MidiError::MalformedEvent { .. } | MidiError::PrematureEof { .. })) => {
                warn!("track {index} aborted: {e}");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Stream holding the earliest event; ties go to the lower track.
    fn next_due(&mut self) -> Option<(usize, u64)> {
        if !self.sequential {
            return self
                .streams
                .iter()
                .enumerate()
                .filter_map(|(i, s)| s.next_tick().map(|t| (i, t)))
                .min_by_key(|&(i, t)| (t, i));
        }

        while let Some(stream) = self.streams.get_mut(self.current) {
            if !self.current_placed {
                if self.current > 0 {
                    self.context.timing.set_tempo(DEFAULT_TEMPO);
                    debug!("sequence {} starts at tick {}", self.current, self.tick);
                }
                stream.shift(self.tick);
                self.current_placed = true;
            }
            if let Some(tick) = stream.next_tick() {
                return Some((self.current, tick));
            }
            self.current += 1;
            self.current_placed = false;
        }
        None
    }
}
