//! KDMAPI (OmniMIDI) output.
//!
//! The library is bound at runtime with missing functions tolerated.
//! [`KdmapiEngine`] turns the player's voice-level calls back into short
//! MIDI messages for a synth that does its own sample handling.

use std::collections::HashMap;
use std::ffi::c_char;
use std::sync::atomic::{AtomicBool, Ordering};

use lazy_static::lazy_static;
use libloading::{Error, Library, Symbol};
use log::trace;

use crate::bank::PresetRef;
use crate::bank::fallback::split_bank;
use crate::channel::effects::{BusKind, BusParam, EffectPreset};
use crate::error::Result;
use crate::synth::{MasterParam, SynthEngine, VoiceId, VoiceParam};

/// The dynamic bindings for KDMAPI
pub struct KDMAPIBinds {
    is_kdmapi_available: Option<Symbol<'static, unsafe extern "C" fn() -> bool>>,
    initialize_kdmapi_stream: Option<Symbol<'static, unsafe extern "C" fn() -> i32>>,
    terminate_kdmapi_stream: Option<Symbol<'static, unsafe extern "C" fn() -> i32>>,
    send_direct_data: Option<Symbol<'static, unsafe extern "C" fn(u32) -> u32>>,
    send_direct_long_data: Option<Symbol<'static, unsafe extern "C" fn(*mut c_char, u32) -> u32>>,

    is_stream_open: AtomicBool,
}

impl KDMAPIBinds {
    /// Calls `IsKDMAPIAvailable`
    pub fn is_kdmapi_available(&self) -> bool {
        unsafe { self.is_kdmapi_available.as_ref().is_some_and(|f| f()) }
    }

    /// Calls `InitializeKDMAPIStream`. The stream is terminated on drop.
    ///
    /// Errors if a stream is already open.
    pub fn open_stream(&'static self) -> std::result::Result<KDMAPIStream, String> {
        if self.is_stream_open.swap(true, Ordering::Relaxed) {
            return Err("KDMAPI stream is already open".into());
        }
        let result = unsafe { self.initialize_kdmapi_stream.as_ref().map_or(0, |f| f()) };
        if result == 0 {
            self.is_stream_open.store(false, Ordering::Relaxed);
            Err("failed to initialize KDMAPI stream or function not found".into())
        } else {
            Ok(KDMAPIStream { binds: self })
        }
    }
}

#[cfg(target_os = "windows")]
fn load_kdmapi_lib() -> std::result::Result<Library, Error> {
    unsafe { Library::new("OmniMIDI\\OmniMIDI").or_else(|_| Library::new("OmniMIDI")) }
}

#[cfg(target_os = "macos")]
fn load_kdmapi_lib() -> std::result::Result<Library, Error> {
    unsafe { Library::new("libOmniMIDI.dylib") }
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn load_kdmapi_lib() -> std::result::Result<Library, Error> {
    unsafe { Library::new("libOmniMIDI.so") }
}

fn load_kdmapi_binds(
    lib: &'static std::result::Result<Library, Error>,
) -> std::result::Result<KDMAPIBinds, &'static Error> {
    let lib = lib.as_ref()?;
    unsafe {
        Ok(KDMAPIBinds {
            is_kdmapi_available: lib.get(b"IsKDMAPIAvailable").ok(),
            initialize_kdmapi_stream: lib.get(b"InitializeKDMAPIStream").ok(),
            terminate_kdmapi_stream: lib.get(b"TerminateKDMAPIStream").ok(),
            send_direct_data: lib.get(b"SendDirectData").ok(),
            send_direct_long_data: lib.get(b"SendDirectLongData").ok(),
            is_stream_open: AtomicBool::new(false),
        })
    }
}

/// An open KDMAPI stream.
pub struct KDMAPIStream {
    binds: &'static KDMAPIBinds,
}

impl Drop for KDMAPIStream {
    fn drop(&mut self) {
        unsafe {
            if let Some(f) = self.binds.terminate_kdmapi_stream.as_ref() {
                f();
            }
        }
        self.binds.is_stream_open.store(false, Ordering::Relaxed);
    }
}

lazy_static! {
    static ref KDMAPI_LIB: std::result::Result<Library, Error> = load_kdmapi_lib();

    /// The dynamic library for KDMAPI. Is loaded when this field is accessed.
    pub static ref KDMAPI: std::result::Result<KDMAPIBinds, &'static Error> = load_kdmapi_binds(&KDMAPI_LIB);
}

/// Where the engine's MIDI bytes go.
pub trait MidiOut {
    /// A packed short message: status | data1 << 8 | data2 << 16.
    fn send_short(&mut self, message: u32);
    fn send_long(&mut self, data: &[u8]);
}

impl MidiOut for KDMAPIStream {
    fn send_short(&mut self, message: u32) {
        unsafe {
            if let Some(f) = self.binds.send_direct_data.as_ref() {
                f(message);
            }
        }
    }

    fn send_long(&mut self, data: &[u8]) {
        unsafe {
            if let Some(f) = self.binds.send_direct_long_data.as_ref() {
                f(data.as_ptr() as *mut c_char, data.len() as u32);
            }
        }
    }
}

pub fn short_message(status: u8, data1: u8, data2: u8) -> u32 {
    u32::from(status) | (u32::from(data1 & 0x7F) << 8) | (u32::from(data2 & 0x7F) << 16)
}

fn unit_to_7bit(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 127.0).round() as u8
}

/// -1.0..=1.0 around a centre of 64.
fn offset_to_7bit(value: f32) -> u8 {
    (64.0 + value.clamp(-1.0, 1.0) * 63.0).round() as u8
}

#[derive(Debug, Clone, Copy)]
struct VoiceSlot {
    channel: u8,
    /// Bank and program last sent on `channel`.
    program: Option<(u16, u8)>,
}

/// [`SynthEngine`] over a MIDI output. Voices map onto their MIDI channel;
/// a preset is selected by sending its bank and program before a note.
pub struct KdmapiEngine<O: MidiOut = KDMAPIStream> {
    out: O,
    voices: HashMap<VoiceId, VoiceSlot>,
    next_voice: u32,
}

impl KdmapiEngine<KDMAPIStream> {
    /// Open the system's KDMAPI stream.
    pub fn open() -> std::result::Result<Self, String> {
        let binds = KDMAPI.as_ref().map_err(|e| format!("cannot load OmniMIDI: {e}"))?;
        if !binds.is_kdmapi_available() {
            return Err("KDMAPI is not available".into());
        }
        Ok(KdmapiEngine::new(binds.open_stream()?))
    }
}

impl<O: MidiOut> KdmapiEngine<O> {
    pub fn new(out: O) -> Self {
        KdmapiEngine { out, voices: HashMap::new(), next_voice: 0 }
    }

    pub fn output(&self) -> &O {
        &self.out
    }

    fn short(&mut self, voice: VoiceId, kind: u8, data1: u8, data2: u8) {
        if let Some(slot) = self.voices.get(&voice) {
            self.out.send_short(short_message(kind | slot.channel, data1, data2));
        }
    }

    fn control(&mut self, voice: VoiceId, controller: u8, value: u8) {
        self.short(voice, 0xB0, controller, value);
    }

    fn select_program(&mut self, voice: VoiceId, preset: (u16, u8)) {
        let Some(slot) = self.voices.get_mut(&voice) else {
            return;
        };
        if slot.program == Some(preset) {
            return;
        }
        slot.program = Some(preset);
        let (bank, program) = preset;
        let (msb, lsb) = split_bank(bank);
        self.control(voice, 0, msb);
        self.control(voice, 32, lsb);
        self.short(voice, 0xC0, program, 0);
    }
}

impl<O: MidiOut> SynthEngine for KdmapiEngine<O> {
    /// Bank and program to select on the output.
    type Preset = (u16, u8);

    fn load_preset(&mut self, preset: &PresetRef) -> Result<(u16, u8)> {
        Ok((preset.bank, preset.program))
    }

    fn open_voice(&mut self, channel: u8, _drums: bool) -> VoiceId {
        self.next_voice += 1;
        let voice = VoiceId(self.next_voice);
        // The drum alias plays on the GM rhythm channel.
        let channel = if channel > 15 { 9 } else { channel };
        self.voices.insert(voice, VoiceSlot { channel, program: None });
        voice
    }

    fn finish_voice(&mut self, voice: VoiceId) {
        self.control(voice, 123, 0);
        self.voices.remove(&voice);
    }

    fn stop_voice(&mut self, voice: VoiceId) {
        self.control(voice, 120, 0);
        self.voices.remove(&voice);
    }

    fn play(&mut self, voice: VoiceId, key: u8, velocity: u8, preset: &(u16, u8), pitch: f32) {
        self.select_program(voice, *preset);
        if (pitch - 1.0).abs() > 1e-4 {
            trace!("{voice:?}: pitch ratio {pitch} not representable");
        }
        self.short(voice, 0x90, key, velocity.max(1));
    }

    fn stop(&mut self, voice: VoiceId, key: u8, velocity: u8) {
        self.short(voice, 0x80, key, velocity);
    }

    fn play_one_shot(&mut self, voice: VoiceId, _preset: &(u16, u8), _velocity: u8) {
        trace!("{voice:?}: one-shot samples are not sent");
    }

    fn key_pressure(&mut self, voice: VoiceId, key: u8, value: f32) {
        self.short(voice, 0xA0, key, unit_to_7bit(value));
    }

    fn set_param(&mut self, voice: VoiceId, param: VoiceParam, value: f32) {
        match param {
            VoiceParam::Gain => self.control(voice, 7, unit_to_7bit(value.exp())),
            VoiceParam::Pan => self.control(voice, 10, offset_to_7bit(value)),
            VoiceParam::PitchBend => {
                let bend = (8192.0 + value.clamp(-1.0, 1.0) * 8191.0).round() as u16;
                self.short(voice, 0xE0, (bend & 0x7F) as u8, (bend >> 7) as u8);
            }
            VoiceParam::PitchBendDepth => {
                let semitones = value.trunc().clamp(0.0, 24.0);
                let cents = ((value - semitones) * 100.0).round().clamp(0.0, 99.0);
                self.control(voice, 101, 0);
                self.control(voice, 100, 0);
                self.control(voice, 6, semitones as u8);
                self.control(voice, 38, cents as u8);
            }
            VoiceParam::Pressure => self.short(voice, 0xD0, unit_to_7bit(value), 0),
            VoiceParam::FilterCutoff => self.control(voice, 74, offset_to_7bit(value)),
            VoiceParam::FilterResonance => self.control(voice, 71, offset_to_7bit(value)),
            VoiceParam::Attack => self.control(voice, 73, offset_to_7bit(value)),
            VoiceParam::Decay => self.control(voice, 75, offset_to_7bit(value)),
            VoiceParam::Release => self.control(voice, 72, offset_to_7bit(value)),
            VoiceParam::VibratoRate => self.control(voice, 76, offset_to_7bit(value)),
            VoiceParam::VibratoDelay => self.control(voice, 78, offset_to_7bit(value)),
            VoiceParam::Soft => self.control(voice, 67, if value > 0.0 { 127 } else { 0 }),
            VoiceParam::Send(BusKind::Reverb) => self.control(voice, 91, unit_to_7bit(value)),
            VoiceParam::Send(BusKind::Chorus) => self.control(voice, 93, unit_to_7bit(value)),
            VoiceParam::Send(BusKind::Delay) => self.control(voice, 94, unit_to_7bit(value)),
            VoiceParam::VibratoDepth | VoiceParam::Tuning => trace!("{voice:?}: {param:?} = {value} not sent"),
        }
    }

    fn bus_add(&mut self, _bus: BusKind, _voice: VoiceId) {}
    fn bus_remove(&mut self, _bus: BusKind, _voice: VoiceId) {}

    fn set_bus_preset(&mut self, bus: BusKind, preset: &EffectPreset) {
        trace!("{bus} preset {} left to the synth", preset.name);
    }

    fn set_bus_param(&mut self, bus: BusKind, param: BusParam, value: f32) {
        trace!("{bus} {param:?} = {value} left to the synth");
    }

    fn set_master(&mut self, param: MasterParam, value: f32) {
        match param {
            MasterParam::Volume => {
                let level = (value.clamp(0.0, 1.0) * 16383.0).round() as u16;
                self.out.send_long(&[0xF0, 0x7F, 0x7F, 0x04, 0x01, (level & 0x7F) as u8, (level >> 7) as u8, 0xF7]);
            }
            _ => trace!("master {param:?} = {value} not sent"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Capture {
        short: Vec<u32>,
        long: Vec<Vec<u8>>,
    }

    impl MidiOut for Capture {
        fn send_short(&mut self, message: u32) {
            self.short.push(message);
        }

        fn send_long(&mut self, data: &[u8]) {
            self.long.push(data.to_vec());
        }
    }

    #[test]
    fn program_is_selected_once_before_notes() {
        let mut engine = KdmapiEngine::new(Capture::default());
        let voice = engine.open_voice(2, false);
        engine.play(voice, 60, 100, &((8 << 7) | 1, 5), 1.0);
        engine.play(voice, 64, 100, &((8 << 7) | 1, 5), 1.0);
        assert_eq!(
            engine.output().short,
            vec![
                short_message(0xB2, 0, 8),
                short_message(0xB2, 32, 1),
                short_message(0xC2, 5, 0),
                short_message(0x92, 60, 100),
                short_message(0x92, 64, 100),
            ]
        );
    }

    #[test]
    fn drum_alias_plays_on_channel_ten() {
        let mut engine = KdmapiEngine::new(Capture::default());
        let voice = engine.open_voice(16, true);
        engine.stop(voice, 36, 64);
        assert_eq!(engine.output().short, vec![short_message(0x89, 36, 64)]);
    }

    #[test]
    fn retired_voices_are_silent() {
        let mut engine = KdmapiEngine::new(Capture::default());
        let voice = engine.open_voice(0, false);
        engine.stop_voice(voice);
        engine.stop(voice, 60, 0);
        assert_eq!(engine.output().short, vec![short_message(0xB0, 120, 0)]);
    }

    #[test]
    fn centred_pitch_bend() {
        let mut engine = KdmapiEngine::new(Capture::default());
        let voice = engine.open_voice(0, false);
        engine.set_param(voice, VoiceParam::PitchBend, 0.0);
        assert_eq!(engine.output().short, vec![short_message(0xE0, 0x00, 0x40)]);
    }

    #[test]
    fn master_volume_is_universal_sysex() {
        let mut engine = KdmapiEngine::new(Capture::default());
        engine.set_master(MasterParam::Volume, 1.0);
        assert_eq!(engine.output().long, vec![vec![0xF0, 0x7F, 0x7F, 0x04, 0x01, 0x7F, 0x7F, 0xF7]]);
    }
}
