//! Per-track event decoding.
//!
//! [`EventReader`] turns track bytes into [`Event`]s and nothing else; the
//! file summary uses it on its own. [`TrackStream`] wraps a reader with the
//! playback position and the per-stream controller state (bank select,
//! RPN/NRPN selection, omni/mono mode) and applies each event to a
//! [`PlaybackContext`].

use log::{debug, trace, warn};

use crate::channel::state::{ChannelMessage, ModeFlags, PartParam, ReceiveFlags};
use crate::error::{MidiError, Result};
use crate::midi::cursor::ByteCursor;
use crate::midi::display::{KeySignature, TimeSignature, decode_text};
use crate::midi::player::PlaybackContext;
use crate::midi::timing::smpte_offset_seconds;
use crate::synth::SynthEngine;
use crate::sysex::{self, SysExContext};

pub const META_TEXT: u8 = 0x01;
pub const META_COPYRIGHT: u8 = 0x02;
pub const META_TRACK_NAME: u8 = 0x03;
pub const META_INSTRUMENT_NAME: u8 = 0x04;
pub const META_LYRIC: u8 = 0x05;
pub const META_MARKER: u8 = 0x06;
pub const META_CUE: u8 = 0x07;
pub const META_END_OF_TRACK: u8 = 0x2F;
pub const META_TEMPO: u8 = 0x51;
pub const META_SMPTE_OFFSET: u8 = 0x54;
pub const META_TIME_SIGNATURE: u8 = 0x58;
pub const META_KEY_SIGNATURE: u8 = 0x59;

const CC_BANK_MSB: u8 = 0;
const CC_DATA_ENTRY_MSB: u8 = 6;
const CC_BANK_LSB: u8 = 32;
const CC_DATA_ENTRY_LSB: u8 = 38;
const CC_NRPN_LSB: u8 = 98;
const CC_NRPN_MSB: u8 = 99;
const CC_RPN_LSB: u8 = 100;
const CC_RPN_MSB: u8 = 101;
const CC_OMNI_OFF: u8 = 124;
const CC_OMNI_ON: u8 = 125;
const CC_MONO_ON: u8 = 126;
const CC_POLY_ON: u8 = 127;

const NULL_PARAMETER: (u8, u8) = (0x7F, 0x7F);

/// One decoded track event. Byte payloads borrow from the track data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event<'a> {
    Channel { channel: u8, message: ChannelMessage },
    Meta { kind: u8, data: &'a [u8] },
    /// Payload after `F0`, including the closing `F7` if present.
    SysEx(&'a [u8]),
    /// `F7` escape: raw bytes to be sent as-is.
    Escape(&'a [u8]),
}

impl Event<'_> {
    pub fn is_note_on(&self) -> bool {
        matches!(self, Event::Channel { message: ChannelMessage::NoteOn { velocity: 1.., .. }, .. })
    }
}

/// Stateless apart from running status: reads deltas and events in turn.
#[derive(Debug, Clone)]
pub struct EventReader<'a> {
    cursor: ByteCursor<'a>,
    running_status: Option<u8>,
    used_running_status: bool,
}

impl<'a> EventReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        EventReader { cursor: ByteCursor::new(data), running_status: None, used_running_status: false }
    }

    pub fn position(&self) -> usize {
        self.cursor.position()
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor.is_exhausted()
    }

    /// Whether the last event was read under running status.
    pub fn used_running_status(&self) -> bool {
        self.used_running_status
    }

    /// Next delta-time, or `None` at the end of the data.
    pub fn read_delta(&mut self) -> Result<Option<u32>> {
        if self.cursor.is_exhausted() {
            return Ok(None);
        }
        self.cursor.read_vlq().map(Some)
    }

    pub fn read_event(&mut self) -> Result<Event<'a>> {
        let offset = self.cursor.position();
        let first = self.cursor.peek_u8()?;
        self.used_running_status = first & 0x80 == 0;
        let status = if self.used_running_status {
            // Data byte: reuse the previous status, leaving the byte for the
            // message body.
            self.running_status
                .ok_or(MidiError::MalformedEvent { offset, reason: "data byte without running status" })?
        } else {
            self.cursor.read_u8()?
        };

        match status {
            0x80..=0xEF => {
                self.running_status = Some(status);
                let channel = status & 0x0F;
                let message = self.channel_message(status & 0xF0)?;
                Ok(Event::Channel { channel, message })
            }
            0xFF => {
                let kind = self.cursor.read_u8()?;
                let len = self.cursor.read_vlq()? as usize;
                let data = self.cursor.read_bytes(len)?;
                Ok(Event::Meta { kind, data })
            }
            0xF0 | 0xF7 => {
                self.running_status = None;
                let len = self.cursor.read_vlq()? as usize;
                let data = self.cursor.read_bytes(len)?;
                Ok(if status == 0xF0 { Event::SysEx(data) } else { Event::Escape(data) })
            }
            _ => Err(MidiError::MalformedEvent { offset, reason: "system common or real-time status in a file" }),
        }
    }

    fn data_byte(&mut self) -> Result<u8> {
        let offset = self.cursor.position();
        let b = self.cursor.read_u8()?;
        if b & 0x80 != 0 {
            return Err(MidiError::MalformedEvent { offset, reason: "status byte inside a channel message" });
        }
        Ok(b)
    }

    fn channel_message(&mut self, kind: u8) -> Result<ChannelMessage> {
        Ok(match kind {
            0x80 => ChannelMessage::NoteOff { key: self.data_byte()?, velocity: self.data_byte()? },
            0x90 => ChannelMessage::NoteOn { key: self.data_byte()?, velocity: self.data_byte()? },
            0xA0 => ChannelMessage::PolyPressure { key: self.data_byte()?, value: self.data_byte()? },
            0xB0 => ChannelMessage::ControlChange { controller: self.data_byte()?, value: self.data_byte()? },
            0xC0 => ChannelMessage::ProgramChange { program: self.data_byte()? },
            0xD0 => ChannelMessage::ChannelPressure { value: self.data_byte()? },
            _ => {
                let lsb = self.data_byte()?;
                let msb = self.data_byte()?;
                ChannelMessage::PitchBend { value: u16::from(lsb) | (u16::from(msb) << 7) }
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    AwaitingEvent,
    InRunningStatus,
    Exhausted,
}

/// Bank select bytes seen since the last program change.
#[derive(Debug, Clone, Copy, Default)]
struct BankAccumulator {
    msb: Option<u8>,
    lsb: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Selected {
    #[default]
    None,
    Rpn,
    Nrpn,
}

/// Registered / non-registered parameter selection for one channel.
#[derive(Debug, Clone, Copy)]
struct ParameterSelect {
    rpn: (u8, u8),
    nrpn: (u8, u8),
    selected: Selected,
    entry: (u8, u8),
}

impl Default for ParameterSelect {
    fn default() -> Self {
        ParameterSelect { rpn: NULL_PARAMETER, nrpn: NULL_PARAMETER, selected: Selected::None, entry: (0, 0) }
    }
}

fn registered_parameter(number: (u8, u8), (msb, lsb): (u8, u8)) -> Option<PartParam> {
    match number {
        (0, 0) => Some(PartParam::BendRange { semitones: msb, cents: lsb }),
        (0, 1) => {
            let value = (u16::from(msb) << 7) | u16::from(lsb);
            Some(PartParam::FineTune { cents: (f32::from(value) - 8192.0) / 8192.0 * 100.0 })
        }
        (0, 2) => Some(PartParam::CoarseTune(msb as i8 - 64)),
        (0, 5) => Some(PartParam::ModulationRange { cents: f32::from(msb) * 100.0 + f32::from(lsb) * 100.0 / 128.0 }),
        _ => None,
    }
}

fn non_registered_parameter(number: (u8, u8), (msb, _): (u8, u8)) -> Option<PartParam> {
    match number {
        (0x01, 0x08) => Some(PartParam::VibratoRate(msb)),
        (0x01, 0x09) => Some(PartParam::VibratoDepth(msb)),
        (0x01, 0x0A) => Some(PartParam::VibratoDelay(msb)),
        (0x01, 0x20) => Some(PartParam::FilterCutoff(msb)),
        (0x01, 0x21) => Some(PartParam::FilterResonance(msb)),
        (0x01, 0x63) => Some(PartParam::Attack(msb)),
        (0x01, 0x64) => Some(PartParam::Decay(msb)),
        (0x01, 0x66) => Some(PartParam::Release(msb)),
        _ => None,
    }
}

/// One track being played.
pub struct TrackStream<'a> {
    index: usize,
    reader: EventReader<'a>,
    /// Absolute tick of the next event.
    tick: u64,
    state: StreamState,
    banks: [BankAccumulator; 16],
    parameters: [ParameterSelect; 16],
    mode: ModeFlags,
}

impl<'a> TrackStream<'a> {
    pub fn new(index: usize, data: &'a [u8]) -> Self {
        let mut stream = TrackStream {
            index,
            reader: EventReader::new(data),
            tick: 0,
            state: StreamState::AwaitingEvent,
            banks: [BankAccumulator::default(); 16],
            parameters: [ParameterSelect::default(); 16],
            mode: ModeFlags::default(),
        };
        if let Err(e) = stream.advance() {
            warn!("track {index} aborted: {e}");
        }
        stream
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == StreamState::Exhausted
    }

    /// Absolute tick of the next event, `None` once exhausted.
    pub fn next_tick(&self) -> Option<u64> {
        (!self.is_exhausted()).then_some(self.tick)
    }

    /// Ticks left until the next event at song position `now`.
    pub fn pending_wait(&self, now: u64) -> Option<u64> {
        self.next_tick().map(|tick| tick.saturating_sub(now))
    }

    /// Move the whole stream later by `ticks`. Used to start format 2
    /// sequences where the previous one ended.
    pub fn shift(&mut self, ticks: u64) {
        self.tick += ticks;
    }

    pub fn mode(&self) -> ModeFlags {
        self.mode
    }

    /// Read the next delta-time and add it to the position.
    fn advance(&mut self) -> Result<()> {
        match self.reader.read_delta() {
            Ok(Some(delta)) => {
                self.tick += u64::from(delta);
                Ok(())
            }
            Ok(None) => {
                debug!("track {} ended without an end-of-track event", self.index);
                self.state = StreamState::Exhausted;
                Ok(())
            }
            Err(e) => {
                self.state = StreamState::Exhausted;
                Err(e)
            }
        }
    }

    /// Play every event due at or before `horizon`.
    ///
    /// A decoding error exhausts this stream and is returned; so is a preset
    /// that fails to load. Everything else is logged and skipped.
    pub fn process<E: SynthEngine>(&mut self, horizon: u64, ctx: &mut PlaybackContext<E>) -> Result<()> {
        while !self.is_exhausted() && self.tick <= horizon {
            let event = match self.reader.read_event() {
                Ok(event) => event,
                Err(e) => {
                    self.state = StreamState::Exhausted;
                    return Err(e);
                }
            };
            self.state =
                if self.reader.used_running_status() { StreamState::InRunningStatus } else { StreamState::AwaitingEvent };
            ctx.stats.increment(1);
            self.apply(event, ctx)?;
            if !self.is_exhausted() {
                self.advance()?;
            }
            if ctx.has_pending_delay() {
                // The scheduler shifts every stream before anything else plays.
                break;
            }
        }
        Ok(())
    }

    fn apply<E: SynthEngine>(&mut self, event: Event<'a>, ctx: &mut PlaybackContext<E>) -> Result<()> {
        match event {
            Event::Channel { channel, message } => {
                ctx.note_channel_event();
                self.channel_message(channel, message, ctx)
            }
            Event::Meta { kind, data } => {
                self.meta(kind, data, ctx);
                Ok(())
            }
            Event::SysEx(payload) => {
                let mut sysex_ctx = SysExContext { channels: &mut ctx.channels, display: &mut ctx.display };
                match sysex::decode(payload, &mut sysex_ctx) {
                    Ok(text) => debug!("track {}: {}", self.index, text),
                    Err(e @ MidiError::ChecksumMismatch { .. }) => warn!("track {}: {e}, message ignored", self.index),
                    Err(e) => debug!("track {}: {e}", self.index),
                }
                Ok(())
            }
            Event::Escape(data) => {
                trace!("track {}: discarding {} byte escape", self.index, data.len());
                Ok(())
            }
        }
    }

    fn channel_message<E: SynthEngine>(
        &mut self,
        channel: u8,
        message: ChannelMessage,
        ctx: &mut PlaybackContext<E>,
    ) -> Result<()> {
        let slot = usize::from(channel);
        let receives = |ctx: &PlaybackContext<E>, flag| ctx.channels.receives(channel, flag);
        match message {
            ChannelMessage::ProgramChange { program } => {
                if receives(ctx, ReceiveFlags::PROGRAM_CHANGE) {
                    let (msb, lsb) = ctx.channels.channel(channel).requested_bank;
                    let bank = std::mem::take(&mut self.banks[slot]);
                    ctx.channels.program_change(channel, bank.msb.unwrap_or(msb), bank.lsb.unwrap_or(lsb), program);
                }
                Ok(())
            }
            ChannelMessage::ControlChange { controller, value } => {
                let cc_ok = receives(ctx, ReceiveFlags::CONTROL_CHANGE);
                match controller {
                    CC_BANK_MSB if cc_ok && receives(ctx, ReceiveFlags::BANK_SELECT_MSB) => {
                        self.banks[slot].msb = Some(value);
                    }
                    CC_BANK_LSB if cc_ok && receives(ctx, ReceiveFlags::BANK_SELECT_LSB) => {
                        self.banks[slot].lsb = Some(value);
                    }
                    CC_BANK_MSB | CC_BANK_LSB => trace!("channel {}: bank select not received", channel + 1),
                    CC_RPN_MSB | CC_RPN_LSB | CC_NRPN_MSB | CC_NRPN_LSB => {
                        if cc_ok {
                            self.select_parameter(slot, controller, value);
                        }
                    }
                    CC_DATA_ENTRY_MSB | CC_DATA_ENTRY_LSB => {
                        if cc_ok {
                            self.data_entry(channel, controller, value, ctx);
                        }
                    }
                    CC_OMNI_OFF..=CC_POLY_ON => {
                        if cc_ok {
                            match controller {
                                CC_OMNI_OFF => self.mode.omni = false,
                                CC_OMNI_ON => self.mode.omni = true,
                                CC_MONO_ON => self.mode.mono = true,
                                _ => self.mode.mono = false,
                            }
                            debug!("track {}: mode {:?}", self.index, self.mode);
                        }
                        ctx.channels.process(self.index, channel, message, self.mode)?;
                    }
                    _ => ctx.channels.process(self.index, channel, message, self.mode)?,
                }
                Ok(())
            }
            _ => ctx.channels.process(self.index, channel, message, self.mode),
        }
    }

    fn select_parameter(&mut self, slot: usize, controller: u8, value: u8) {
        let p = &mut self.parameters[slot];
        let (number, kind) = match controller {
            CC_RPN_MSB | CC_RPN_LSB => (&mut p.rpn, Selected::Rpn),
            _ => (&mut p.nrpn, Selected::Nrpn),
        };
        if controller == CC_RPN_MSB || controller == CC_NRPN_MSB {
            number.0 = value;
        } else {
            number.1 = value;
        }
        p.selected = if *number == NULL_PARAMETER { Selected::None } else { kind };
    }

    fn data_entry<E: SynthEngine>(&mut self, channel: u8, controller: u8, value: u8, ctx: &mut PlaybackContext<E>) {
        let p = &mut self.parameters[usize::from(channel)];
        if controller == CC_DATA_ENTRY_MSB {
            p.entry = (value, 0);
        } else {
            p.entry.1 = value;
        }
        let (param, flag) = match p.selected {
            Selected::None => return,
            Selected::Rpn => (registered_parameter(p.rpn, p.entry), ReceiveFlags::RPN),
            Selected::Nrpn => (non_registered_parameter(p.nrpn, p.entry), ReceiveFlags::NRPN),
        };
        if !ctx.channels.receives(channel, flag) {
            return;
        }
        match param {
            Some(param) => ctx.channels.set_part_param(channel, param),
            None => debug!(
                "channel {}: {:?} {:02X?} not supported",
                channel + 1,
                p.selected,
                if p.selected == Selected::Rpn { p.rpn } else { p.nrpn }
            ),
        }
    }

    fn meta<E: SynthEngine>(&mut self, kind: u8, data: &[u8], ctx: &mut PlaybackContext<E>) {
        match kind {
            META_TEXT => ctx.display.add_text(decode_text(data)),
            META_COPYRIGHT => ctx.display.copyright.push(decode_text(data)),
            META_TRACK_NAME => ctx.display.set_track_name(self.index, decode_text(data)),
            META_INSTRUMENT_NAME => debug!("track {}: instrument \"{}\"", self.index, decode_text(data)),
            META_LYRIC => ctx.display.add_lyric(&decode_text(data)),
            META_MARKER => ctx.display.markers.push(decode_text(data)),
            META_CUE => ctx.display.cues.push(decode_text(data)),
            META_END_OF_TRACK => {
                trace!("track {}: end of track at tick {}", self.index, self.tick);
                self.state = StreamState::Exhausted;
            }
            META_TEMPO if data.len() >= 3 => {
                let tempo = u32::from_be_bytes([0, data[0], data[1], data[2]]);
                if ctx.timing.set_tempo(tempo) {
                    debug!("track {}: tempo {:.2} BPM at tick {}", self.index, ctx.timing.bpm(), self.tick);
                }
            }
            META_SMPTE_OFFSET if data.len() >= 5 => {
                let seconds = smpte_offset_seconds([data[0], data[1], data[2], data[3], data[4]]);
                ctx.request_start_delay(seconds);
            }
            META_TIME_SIGNATURE if data.len() >= 4 => {
                ctx.display.time_signature = Some(TimeSignature::from_meta([data[0], data[1], data[2], data[3]]));
            }
            META_KEY_SIGNATURE if data.len() >= 2 => {
                ctx.display.key_signature = Some(KeySignature::from_meta([data[0], data[1]]));
            }
            _ => trace!("track {}: meta {kind:#04x} ({} bytes) ignored", self.index, data.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::{BankResolver, BankSet, PresetRef};
    use crate::channel::ChannelManager;
    use crate::midi::timing::{Division, Timing};
    use crate::synth::RecordingEngine;

    fn context() -> PlaybackContext<RecordingEngine> {
        let mut set = BankSet::new();
        set.insert_instrument(0, 0, PresetRef::new("Piano", "piano.sfz"));
        let channels = ChannelManager::new(RecordingEngine::new(), BankResolver::new(set));
        PlaybackContext::new(channels, Timing::new(Division::Ppqn(96)))
    }

    fn events(data: &[u8]) -> Vec<Event<'_>> {
        let mut reader = EventReader::new(data);
        let mut out = Vec::new();
        while reader.read_delta().unwrap().is_some() {
            out.push(reader.read_event().unwrap());
        }
        out
    }

    #[test]
    fn running_status_matches_full_status() {
        let full = [0x00, 0x90, 0x3C, 0x64, 0x10, 0x90, 0x40, 0x50, 0x10, 0x80, 0x3C, 0x40];
        let running = [0x00, 0x90, 0x3C, 0x64, 0x10, 0x40, 0x50, 0x10, 0x80, 0x3C, 0x40];
        assert_eq!(events(&full), events(&running));
    }

    #[test]
    fn data_byte_without_status_is_malformed() {
        let mut reader = EventReader::new(&[0x3C, 0x64]);
        assert!(matches!(reader.read_event(), Err(MidiError::MalformedEvent { offset: 0, .. })));
    }

    #[test]
    fn sysex_clears_running_status() {
        let mut reader = EventReader::new(&[0x90, 0x3C, 0x64, 0xF0, 0x01, 0xF7, 0x3C, 0x00]);
        reader.read_event().unwrap();
        assert_eq!(reader.read_event().unwrap(), Event::SysEx(&[0xF7]));
        assert!(reader.read_event().is_err());
    }

    #[test]
    fn pitch_bend_is_lsb_first() {
        let mut reader = EventReader::new(&[0xE1, 0x00, 0x40]);
        assert_eq!(
            reader.read_event().unwrap(),
            Event::Channel { channel: 1, message: ChannelMessage::PitchBend { value: 0x2000 } }
        );
    }

    #[test]
    fn process_stops_at_horizon() {
        let data = [0x00, 0x90, 0x3C, 0x64, 0x60, 0x80, 0x3C, 0x40, 0x00, 0xFF, 0x2F, 0x00];
        let mut ctx = context();
        let mut stream = TrackStream::new(0, &data);
        stream.process(95, &mut ctx).unwrap();
        assert_eq!(ctx.channels.engine().played().len(), 1);
        assert_eq!(stream.pending_wait(0), Some(96));
        stream.process(96, &mut ctx).unwrap();
        assert_eq!(ctx.channels.engine().stopped().len(), 1);
        assert!(stream.is_exhausted());
    }

    #[test]
    fn malformed_delta_exhausts_only_this_stream() {
        let data = [0x00, 0x90, 0x3C, 0x64, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F, 0x80, 0x3C, 0x40];
        let mut ctx = context();
        let mut stream = TrackStream::new(0, &data);
        let err = stream.process(u64::MAX, &mut ctx).unwrap_err();
        assert!(matches!(err, MidiError::MalformedEvent { .. }));
        assert!(stream.is_exhausted());
        assert_eq!(ctx.channels.engine().played().len(), 1);
    }

    #[test]
    fn bank_select_is_applied_at_program_change() {
        let data = [0x00, 0xB0, 0x00, 0x08, 0x00, 0xB0, 0x20, 0x01, 0x00, 0xC0, 0x05];
        let mut ctx = context();
        TrackStream::new(0, &data).process(0, &mut ctx).unwrap();
        assert_eq!(ctx.channels.channel(0).requested_bank, (8, 1));
        assert_eq!(ctx.channels.channel(0).program, 5);
    }

    #[test]
    fn rpn_sets_bend_range_and_null_deselects() {
        let data = [
            0x00, 0xB0, 0x65, 0x00, 0x00, 0x64, 0x00, 0x00, 0x06, 0x0C, // RPN 0 = 12 semitones
            0x00, 0x65, 0x7F, 0x00, 0x64, 0x7F, 0x00, 0x06, 0x02, // null, then ignored
        ];
        let mut ctx = context();
        TrackStream::new(0, &data).process(0, &mut ctx).unwrap();
        assert_eq!(ctx.channels.channel(0).bend_range, 12.0);
    }

    #[test]
    fn nrpn_sets_filter_cutoff() {
        let data = [0x00, 0xB0, 0x63, 0x01, 0x00, 0x62, 0x20, 0x00, 0x06, 0x70];
        let mut ctx = context();
        TrackStream::new(0, &data).process(0, &mut ctx).unwrap();
        assert_eq!(ctx.channels.channel(0).cutoff, 0x70);
    }

    #[test]
    fn omni_on_ignores_all_notes_off() {
        let data = [0x00, 0x90, 0x3C, 0x64, 0x00, 0xB0, 0x7D, 0x00, 0x00, 0x7B, 0x00];
        let mut ctx = context();
        let mut stream = TrackStream::new(0, &data);
        stream.process(0, &mut ctx).unwrap();
        assert!(stream.mode().omni);
        // Omni-on itself is an all-notes-off.
        assert_eq!(ctx.channels.engine().stopped().len(), 1);
    }

    #[test]
    fn meta_events_fill_the_display() {
        let data = [
            0x00, 0xFF, 0x03, 0x04, b'S', b'o', b'n', b'g', //
            0x00, 0xFF, 0x05, 0x03, b'\\', b'L', b'a', //
            0x00, 0xFF, 0x58, 0x04, 0x03, 0x02, 0x18, 0x08, //
            0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, //
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let mut ctx = context();
        let mut stream = TrackStream::new(0, &data);
        stream.process(0, &mut ctx).unwrap();
        assert_eq!(ctx.display.title(), Some("Song"));
        assert_eq!(ctx.display.current_lyric(), Some("La"));
        assert_eq!(ctx.display.time_signature.unwrap().to_string(), "3/4");
        assert_eq!(ctx.timing.tempo(), 500_000);
        assert!(stream.is_exhausted());
    }

    #[test]
    fn bad_gs_checksum_does_not_stop_the_track() {
        let data = [
            0x00, 0xF0, 0x0A, 0x41, 0x10, 0x42, 0x12, 0x40, 0x00, 0x7F, 0x00, 0x42, 0xF7, //
            0x00, 0x90, 0x3C, 0x64,
        ];
        let mut ctx = context();
        TrackStream::new(0, &data).process(0, &mut ctx).unwrap();
        assert_eq!(ctx.channels.dialect(), crate::dialect::Dialect::Unset);
        assert_eq!(ctx.channels.engine().played().len(), 1);
    }
}
