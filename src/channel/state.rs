use std::sync::Arc;

use bitflags::bitflags;

use super::effects::BusKind;
use crate::bank::PresetRef;
use crate::synth::VoiceId;

bitflags! {
    /// Message classes a channel currently accepts. GS and XG SysEx can
    /// switch each of these off per part.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ReceiveFlags: u32 {
        const NOTE_ON = 1 << 0;
        const NOTE_OFF = 1 << 1;
        const PITCH_BEND = 1 << 2;
        const CHANNEL_PRESSURE = 1 << 3;
        const PROGRAM_CHANGE = 1 << 4;
        const CONTROL_CHANGE = 1 << 5;
        const POLY_PRESSURE = 1 << 6;
        const RPN = 1 << 7;
        const NRPN = 1 << 8;
        const MODULATION = 1 << 9;
        const VOLUME = 1 << 10;
        const PAN = 1 << 11;
        const EXPRESSION = 1 << 12;
        const HOLD1 = 1 << 13;
        const PORTAMENTO = 1 << 14;
        const SOSTENUTO = 1 << 15;
        const SOFT = 1 << 16;
        const BANK_SELECT_MSB = 1 << 17;
        const BANK_SELECT_LSB = 1 << 18;
        const EFFECT_SENDS = 1 << 19;

        const NOTE = Self::NOTE_ON.bits() | Self::NOTE_OFF.bits();
        const BANK_SELECT = Self::BANK_SELECT_MSB.bits() | Self::BANK_SELECT_LSB.bits();
    }
}

impl Default for ReceiveFlags {
    fn default() -> Self {
        ReceiveFlags::all()
    }
}

/// A decoded channel voice message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMessage {
    NoteOff { key: u8, velocity: u8 },
    NoteOn { key: u8, velocity: u8 },
    PolyPressure { key: u8, value: u8 },
    ControlChange { controller: u8, value: u8 },
    ProgramChange { program: u8 },
    ChannelPressure { value: u8 },
    /// 14-bit, 0x2000 is centre.
    PitchBend { value: u16 },
}

impl ChannelMessage {
    /// Turn Note-On with velocity 0 into the Note-Off it means.
    pub fn normalized(self) -> Self {
        match self {
            ChannelMessage::NoteOn { key, velocity: 0 } => ChannelMessage::NoteOff { key, velocity: 64 },
            other => other,
        }
    }
}

/// Stream-level channel mode (set by CC 124-127).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModeFlags {
    pub omni: bool,
    pub mono: bool,
}

/// Per-part knobs reachable from CC, NRPN, GS and XG SysEx alike.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PartParam {
    Volume(u8),
    Expression(u8),
    Pan(u8),
    Modulation(u8),
    /// Offsets below are centred on 64.
    VibratoRate(u8),
    VibratoDepth(u8),
    VibratoDelay(u8),
    FilterCutoff(u8),
    FilterResonance(u8),
    Attack(u8),
    Decay(u8),
    Release(u8),
    BendRange { semitones: u8, cents: u8 },
    ModulationRange { cents: f32 },
    CoarseTune(i8),
    FineTune { cents: f32 },
    KeyShift(i8),
    KeyRangeLow(u8),
    KeyRangeHigh(u8),
    VelocitySenseDepth(u8),
    VelocitySenseOffset(u8),
    Mono(bool),
    /// Scale tuning for one pitch class, in cents.
    ScaleTuning { pitch_class: u8, cents: i8 },
    Receive(ReceiveFlags, bool),
}

/// Per-key overrides from a GS drum map or XG drum setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrumKeySetup {
    /// Semitones, centred on 64.
    pub pitch_coarse: u8,
    pub level: u8,
    /// 0 leaves the key in its kit's default exclusive group.
    pub assign_group: u8,
    pub receive_note_off: bool,
    pub receive_note_on: bool,
}

impl Default for DrumKeySetup {
    fn default() -> Self {
        DrumKeySetup { pitch_coarse: 64, level: 127, assign_group: 0, receive_note_off: true, receive_note_on: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrumParam {
    PitchCoarse(u8),
    Level(u8),
    AssignGroup(u8),
    ReceiveNoteOff(bool),
    ReceiveNoteOn(bool),
}

impl DrumKeySetup {
    pub fn apply(&mut self, param: DrumParam) {
        match param {
            DrumParam::PitchCoarse(v) => self.pitch_coarse = v,
            DrumParam::Level(v) => self.level = v,
            DrumParam::AssignGroup(v) => self.assign_group = v,
            DrumParam::ReceiveNoteOff(on) => self.receive_note_off = on,
            DrumParam::ReceiveNoteOn(on) => self.receive_note_on = on,
        }
    }

    pub fn pitch_semitones(&self) -> f32 {
        f32::from(self.pitch_coarse) - 64.0
    }
}

/// A key currently held on a channel and where it is sounding.
#[derive(Debug, Clone)]
pub struct HeldNote {
    pub voice: VoiceId,
    /// Key actually sent to the engine after key shift.
    pub played_key: u8,
    pub preset: Arc<PresetRef>,
}

/// Everything the player knows about one MIDI channel.
#[derive(Debug, Clone)]
pub struct ChannelState {
    pub number: u8,
    pub bank: u16,
    /// Raw (MSB, LSB) of the last bank select, before dialect rules.
    pub requested_bank: (u8, u8),
    pub program: u8,
    pub drums: bool,
    /// Whether this part is a rhythm part when no bank says otherwise.
    pub rhythm_part: bool,
    pub receive: ReceiveFlags,
    /// `None` while idle.
    pub voice: Option<VoiceId>,
    /// Melodic preset resolved for the current bank/program.
    pub preset: Option<Arc<PresetRef>>,
    pub volume: u8,
    pub expression: u8,
    pub pan: f32,
    pub pitch_bend: u16,
    pub bend_range: f32,
    pub modulation: u8,
    pub modulation_range: f32,
    pub vibrato_rate: u8,
    pub vibrato_depth: u8,
    pub vibrato_delay: u8,
    pub cutoff: u8,
    pub resonance: u8,
    pub attack: u8,
    pub decay: u8,
    pub release: u8,
    sends: [u8; 3],
    pub coarse_tune: i8,
    pub fine_tune: f32,
    pub key_shift: i8,
    pub scale_tuning: [i8; 12],
    pub key_low: u8,
    pub key_high: u8,
    pub velocity_depth: u8,
    pub velocity_offset: u8,
    pub pressure: u8,
    pub sustain: bool,
    pub sostenuto: bool,
    pub soft: bool,
    pub mono: bool,
    /// Drum setup (GS map / XG setup) this rhythm part reads, 0 or 1.
    pub drum_setup: u8,
    pub held: Vec<Option<HeldNote>>,
    /// Keys whose Note-Off arrived while a pedal was down.
    pub deferred: Vec<u8>,
    /// Keys captured by the sostenuto pedal.
    pub sostenuto_keys: Vec<u8>,
}

pub const DEFAULT_VOLUME: u8 = 100;
pub const DEFAULT_REVERB_SEND: u8 = 40;

impl ChannelState {
    pub fn new(number: u8) -> Self {
        ChannelState {
            number,
            bank: 0,
            requested_bank: (0, 0),
            program: 0,
            drums: number == 9,
            rhythm_part: number == 9,
            receive: ReceiveFlags::default(),
            voice: None,
            preset: None,
            volume: DEFAULT_VOLUME,
            expression: 127,
            pan: 0.0,
            pitch_bend: 0x2000,
            bend_range: 2.0,
            modulation: 0,
            modulation_range: 50.0,
            vibrato_rate: 64,
            vibrato_depth: 64,
            vibrato_delay: 64,
            cutoff: 64,
            resonance: 64,
            attack: 64,
            decay: 64,
            release: 64,
            sends: [0, 0, DEFAULT_REVERB_SEND],
            coarse_tune: 0,
            fine_tune: 0.0,
            key_shift: 0,
            scale_tuning: [0; 12],
            key_low: 0,
            key_high: 127,
            velocity_depth: 64,
            velocity_offset: 64,
            pressure: 0,
            sustain: false,
            sostenuto: false,
            soft: false,
            mono: false,
            drum_setup: 0,
            held: vec![None; 128],
            deferred: Vec::new(),
            sostenuto_keys: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.voice.is_some()
    }

    /// Whether any held key still sounds on `voice`.
    pub fn holds_voice(&self, voice: VoiceId) -> bool {
        self.held.iter().flatten().any(|note| note.voice == voice)
    }

    /// Natural-log amplitude from volume and expression.
    pub fn gain(&self) -> f32 {
        (f32::from(self.volume) / 127.0).ln() + (f32::from(self.expression) / 127.0).ln()
    }

    pub fn send(&self, bus: BusKind) -> u8 {
        self.sends[bus.index()]
    }

    /// Only the channel manager may change sends, to keep bus membership in step.
    pub(crate) fn set_send_raw(&mut self, bus: BusKind, value: u8) {
        self.sends[bus.index()] = value;
    }

    /// Channel tuning in semitones (coarse + fine), without master tuning.
    pub fn tuning(&self) -> f32 {
        f32::from(self.coarse_tune) + self.fine_tune / 100.0
    }

    /// Bend as a fraction of the bend range, -1.0..=1.0.
    pub fn bend_fraction(&self) -> f32 {
        (f32::from(self.pitch_bend) - 8192.0) / 8192.0
    }

    /// Vibrato depth from the modulation wheel, scaled by the part's
    /// vibrato-depth offset.
    pub fn vibrato_cents(&self) -> f32 {
        f32::from(self.modulation) / 127.0 * self.modulation_range * f32::from(self.vibrato_depth) / 64.0
    }

    pub fn accepts_key(&self, key: u8) -> bool {
        (self.key_low..=self.key_high).contains(&key)
    }

    /// Controllers CC 121 puts back.
    pub fn reset_controllers(&mut self) {
        self.modulation = 0;
        self.expression = 127;
        self.pitch_bend = 0x2000;
        self.pressure = 0;
        self.sustain = false;
        self.sostenuto = false;
        self.soft = false;
        self.sostenuto_keys.clear();
    }

    /// State after a GM/GS/XG system reset, keeping the channel number and
    /// whether it is the default rhythm part.
    pub fn reset(&mut self, rhythm_part: bool) {
        let held = std::mem::take(&mut self.held);
        let voice = self.voice;
        let sends = self.sends;
        *self = ChannelState::new(self.number);
        self.rhythm_part = rhythm_part;
        self.drums = rhythm_part;
        self.held = held;
        self.voice = voice;
        // Sends are restored by the manager so bus membership follows.
        self.sends = sends;
    }
}
