//! The boundary to the synthesis engine that renders audio.
//!
//! The player never touches samples. It opens voices (one per channel
//! identity), plays and stops keys on them, and routes them into the shared
//! effect buses.

use std::collections::HashSet;

use crate::bank::{KitEffects, PresetRef};
use crate::channel::effects::{BusKind, BusParam, EffectPreset, Equalizer, InsertionEffect};
use crate::error::{MidiError, Result};

/// Engine-side identity of one channel instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u32);

/// Per-voice parameters. Offsets are relative, -1.0..=1.0, unless noted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceParam {
    /// Natural-log amplitude.
    Gain,
    /// -1.0 (left) ..= 1.0 (right).
    Pan,
    FilterCutoff,
    FilterResonance,
    VibratoRate,
    /// Vibrato depth in cents.
    VibratoDepth,
    VibratoDelay,
    /// Pitch-bend range in semitones.
    PitchBendDepth,
    /// Current bend, -1.0..=1.0 of the range.
    PitchBend,
    /// Channel tuning in semitones.
    Tuning,
    Attack,
    Decay,
    Release,
    /// Channel pressure, 0.0..=1.0.
    Pressure,
    /// Soft pedal, 0.0 or 1.0.
    Soft,
    /// Send level into a bus, 0.0..=1.0.
    Send(BusKind),
}

/// Whole-engine parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MasterParam {
    /// 0.0..=1.0.
    Volume,
    /// -1.0..=1.0.
    Balance,
    /// Cents.
    Tuning,
    /// Semitones.
    KeyShift,
    /// Linear output gain from the host.
    OutputGain,
    /// 1.0 to fold the output down to mono.
    Mono,
}

pub trait SynthEngine {
    /// A loaded, ready-to-play preset.
    type Preset;

    /// Load the backing data of `preset`. Called once per file reference.
    fn load_preset(&mut self, preset: &PresetRef) -> Result<Self::Preset>;

    fn open_voice(&mut self, channel: u8, drums: bool) -> VoiceId;
    /// Retire `voice`, letting sounding notes finish their release.
    fn finish_voice(&mut self, voice: VoiceId);
    /// Retire `voice` and cut everything on it now.
    fn stop_voice(&mut self, voice: VoiceId);

    fn play(&mut self, voice: VoiceId, key: u8, velocity: u8, preset: &Self::Preset, pitch: f32);
    fn stop(&mut self, voice: VoiceId, key: u8, velocity: u8);
    /// Fire-and-forget sample (key-on / key-off noises).
    fn play_one_shot(&mut self, voice: VoiceId, preset: &Self::Preset, velocity: u8);
    fn key_pressure(&mut self, _voice: VoiceId, _key: u8, _value: f32) {}

    fn set_param(&mut self, voice: VoiceId, param: VoiceParam, value: f32);
    fn param(&self, _voice: VoiceId, _param: VoiceParam) -> Option<f32> {
        None
    }

    fn bus_add(&mut self, bus: BusKind, voice: VoiceId);
    fn bus_remove(&mut self, bus: BusKind, voice: VoiceId);
    fn set_bus_preset(&mut self, bus: BusKind, preset: &EffectPreset);
    fn set_bus_param(&mut self, bus: BusKind, param: BusParam, value: f32);

    fn set_master(&mut self, _param: MasterParam, _value: f32) {}
    fn set_kit_effects(&mut self, _voice: VoiceId, _effects: &KitEffects) {}
    fn set_insertion(&mut self, _effect: &InsertionEffect) {}
    fn set_equalizer(&mut self, _eq: &Equalizer) {}
}

/// Engine that accepts everything and renders nothing. Used for dry runs.
#[derive(Debug, Default)]
pub struct NullEngine {
    next_voice: u32,
}

impl SynthEngine for NullEngine {
    type Preset = ();

    fn load_preset(&mut self, _preset: &PresetRef) -> Result<()> {
        Ok(())
    }

    fn open_voice(&mut self, _channel: u8, _drums: bool) -> VoiceId {
        self.next_voice += 1;
        VoiceId(self.next_voice)
    }

    fn finish_voice(&mut self, _voice: VoiceId) {}
    fn stop_voice(&mut self, _voice: VoiceId) {}
    fn play(&mut self, _voice: VoiceId, _key: u8, _velocity: u8, _preset: &(), _pitch: f32) {}
    fn stop(&mut self, _voice: VoiceId, _key: u8, _velocity: u8) {}
    fn play_one_shot(&mut self, _voice: VoiceId, _preset: &(), _velocity: u8) {}
    fn set_param(&mut self, _voice: VoiceId, _param: VoiceParam, _value: f32) {}
    fn bus_add(&mut self, _bus: BusKind, _voice: VoiceId) {}
    fn bus_remove(&mut self, _bus: BusKind, _voice: VoiceId) {}
    fn set_bus_preset(&mut self, _bus: BusKind, _preset: &EffectPreset) {}
    fn set_bus_param(&mut self, _bus: BusKind, _param: BusParam, _value: f32) {}
}

/// One call made against a [`RecordingEngine`].
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Load { file: String },
    OpenVoice { voice: VoiceId, channel: u8, drums: bool },
    FinishVoice { voice: VoiceId },
    StopVoice { voice: VoiceId },
    Play { voice: VoiceId, key: u8, velocity: u8, file: String, pitch: f32 },
    Stop { voice: VoiceId, key: u8, velocity: u8 },
    OneShot { voice: VoiceId, file: String, velocity: u8 },
    KeyPressure { voice: VoiceId, key: u8, value: f32 },
    Param { voice: VoiceId, param: VoiceParam, value: f32 },
    BusAdd { bus: BusKind, voice: VoiceId },
    BusRemove { bus: BusKind, voice: VoiceId },
    BusPreset { bus: BusKind, name: String },
    BusParam { bus: BusKind, param: BusParam, value: f32 },
    Master { param: MasterParam, value: f32 },
    KitEffects { voice: VoiceId, file: String },
    Insertion { kind: u16 },
    Equalizer(Equalizer),
}

/// Engine that records every call, for tests and `--dry-run` tracing.
#[derive(Debug, Default)]
pub struct RecordingEngine {
    pub calls: Vec<EngineCall>,
    next_voice: u32,
    failing: HashSet<String>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make loading `file` fail from now on.
    pub fn fail_loading(&mut self, file: impl Into<String>) {
        self.failing.insert(file.into());
    }

    pub fn take_calls(&mut self) -> Vec<EngineCall> {
        std::mem::take(&mut self.calls)
    }

    /// (voice, key, velocity, file) of every `play` call so far.
    pub fn played(&self) -> Vec<(VoiceId, u8, u8, String)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                EngineCall::Play { voice, key, velocity, file, .. } => Some((*voice, *key, *velocity, file.clone())),
                _ => None,
            })
            .collect()
    }

    /// (voice, key) of every `stop` call so far.
    pub fn stopped(&self) -> Vec<(VoiceId, u8)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                EngineCall::Stop { voice, key, .. } => Some((*voice, *key)),
                _ => None,
            })
            .collect()
    }

    /// Most recent value set for `param` on `voice`.
    pub fn last_param(&self, voice: VoiceId, param: VoiceParam) -> Option<f32> {
        self.calls.iter().rev().find_map(|c| match c {
            EngineCall::Param { voice: v, param: p, value } if *v == voice && *p == param => Some(*value),
            _ => None,
        })
    }

    pub fn last_bus_param(&self, bus: BusKind, param: BusParam) -> Option<f32> {
        self.calls.iter().rev().find_map(|c| match c {
            EngineCall::BusParam { bus: b, param: p, value } if *b == bus && *p == param => Some(*value),
            _ => None,
        })
    }
}

impl SynthEngine for RecordingEngine {
    type Preset = String;

    fn load_preset(&mut self, preset: &PresetRef) -> Result<String> {
        if self.failing.contains(&preset.file) {
            return Err(MidiError::PresetLoadFailure {
                reference: preset.file.clone(),
                reason: "file not found".into(),
            });
        }
        self.calls.push(EngineCall::Load { file: preset.file.clone() });
        Ok(preset.file.clone())
    }

    fn open_voice(&mut self, channel: u8, drums: bool) -> VoiceId {
        self.next_voice += 1;
        let voice = VoiceId(self.next_voice);
        self.calls.push(EngineCall::OpenVoice { voice, channel, drums });
        voice
    }

    fn finish_voice(&mut self, voice: VoiceId) {
        self.calls.push(EngineCall::FinishVoice { voice });
    }

    fn stop_voice(&mut self, voice: VoiceId) {
        self.calls.push(EngineCall::StopVoice { voice });
    }

    fn play(&mut self, voice: VoiceId, key: u8, velocity: u8, preset: &String, pitch: f32) {
        self.calls.push(EngineCall::Play { voice, key, velocity, file: preset.clone(), pitch });
    }

    fn stop(&mut self, voice: VoiceId, key: u8, velocity: u8) {
        self.calls.push(EngineCall::Stop { voice, key, velocity });
    }

    fn play_one_shot(&mut self, voice: VoiceId, preset: &String, velocity: u8) {
        self.calls.push(EngineCall::OneShot { voice, file: preset.clone(), velocity });
    }

    fn key_pressure(&mut self, voice: VoiceId, key: u8, value: f32) {
        self.calls.push(EngineCall::KeyPressure { voice, key, value });
    }

    fn set_param(&mut self, voice: VoiceId, param: VoiceParam, value: f32) {
        self.calls.push(EngineCall::Param { voice, param, value });
    }

    fn param(&self, voice: VoiceId, param: VoiceParam) -> Option<f32> {
        self.last_param(voice, param)
    }

    fn bus_add(&mut self, bus: BusKind, voice: VoiceId) {
        self.calls.push(EngineCall::BusAdd { bus, voice });
    }

    fn bus_remove(&mut self, bus: BusKind, voice: VoiceId) {
        self.calls.push(EngineCall::BusRemove { bus, voice });
    }

    fn set_bus_preset(&mut self, bus: BusKind, preset: &EffectPreset) {
        self.calls.push(EngineCall::BusPreset { bus, name: preset.name.clone() });
    }

    fn set_bus_param(&mut self, bus: BusKind, param: BusParam, value: f32) {
        self.calls.push(EngineCall::BusParam { bus, param, value });
    }

    fn set_master(&mut self, param: MasterParam, value: f32) {
        self.calls.push(EngineCall::Master { param, value });
    }

    fn set_kit_effects(&mut self, voice: VoiceId, effects: &KitEffects) {
        self.calls.push(EngineCall::KitEffects { voice, file: effects.file.clone() });
    }

    fn set_insertion(&mut self, effect: &InsertionEffect) {
        self.calls.push(EngineCall::Insertion { kind: effect.kind });
    }

    fn set_equalizer(&mut self, eq: &Equalizer) {
        self.calls.push(EngineCall::Equalizer(*eq));
    }
}
