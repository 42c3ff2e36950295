//! Channel and effects-bus management.
//!
//! [`ChannelManager`] is the single owner of every [`ChannelState`], the
//! three shared [`EffectsBus`]es and the synthesis engine. Track streams and
//! SysEx decoders borrow it mutably for the duration of one message.
//!
//! A channel is idle until its first note or program change opens an engine
//! voice for it. A program change on a melodic channel finishes the old voice
//! (its notes ring out) and opens a fresh one; drum voices are left alone so
//! that several kits can be sounding at once.

pub mod effects;
pub mod state;

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use log::{debug, info, trace};

use crate::bank::fallback::classify;
use crate::bank::{BankResolver, PresetRef, drum_groups};
use crate::config::PlayerConfig;
use crate::dialect::Dialect;
use crate::error::Result;
use crate::synth::{MasterParam, SynthEngine, VoiceId, VoiceParam};
use effects::{BusKind, BusParam, EffectPreset, EffectsBus, Equalizer, InsertionEffect};
use state::{
    ChannelMessage, ChannelState, DrumKeySetup, DrumParam, HeldNote, ModeFlags, PartParam, ReceiveFlags,
};

pub const CHANNEL_COUNT: usize = 16;
/// Channel number that always addresses the current rhythm channel.
pub const DRUM_ALIAS: u8 = 16;
const DEFAULT_RHYTHM_CHANNEL: u8 = 9;

/// Default send levels after any reset.
const DEFAULT_SENDS: [(BusKind, u8); 3] = [
    (BusKind::Reverb, state::DEFAULT_REVERB_SEND),
    (BusKind::Chorus, 0),
    (BusKind::Delay, 0),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MasterState {
    /// 0.0..=1.0.
    pub volume: f32,
    pub balance: f32,
    pub tuning_cents: f32,
    pub key_shift: i8,
}

impl Default for MasterState {
    fn default() -> Self {
        MasterState { volume: 1.0, balance: 0.0, tuning_cents: 0.0, key_shift: 0 }
    }
}

/// Centred 0..=127 controller to -1.0..=1.0.
fn offset(value: u8) -> f32 {
    ((f32::from(value) - 64.0) / 64.0).clamp(-1.0, 1.0)
}

fn pan_position(value: u8) -> f32 {
    ((f32::from(value) - 64.0) / 63.0).clamp(-1.0, 1.0)
}

fn sensed_velocity(velocity: u8, depth: u8, offset: u8) -> u8 {
    let v = f32::from(velocity) * f32::from(depth) / 64.0 + f32::from(offset) - 64.0;
    v.round().clamp(1.0, 127.0) as u8
}

pub struct ChannelManager<E: SynthEngine> {
    engine: E,
    resolver: BankResolver,
    dialect: Dialect,
    channels: Vec<ChannelState>,
    rhythm_channel: u8,
    buses: [EffectsBus; 3],
    presets: HashMap<String, E::Preset>,
    active_tracks: Vec<usize>,
    master: MasterState,
    drum_setups: HashMap<(u8, u8), DrumKeySetup>,
    /// Drum voices replaced by a kit change, still ringing.
    retired_drums: Vec<(usize, VoiceId)>,
    insertion: InsertionEffect,
    equalizer: Equalizer,
}

impl<E: SynthEngine> ChannelManager<E> {
    pub fn new(engine: E, resolver: BankResolver) -> Self {
        let channels: Vec<ChannelState> = (0..CHANNEL_COUNT as u8).map(ChannelState::new).collect();
        let buses = BusKind::ALL.map(|kind| {
            let mut bus = EffectsBus::new(kind);
            for ch in channels.iter().filter(|ch| ch.send(kind) > 0) {
                bus.insert(ch.number);
            }
            bus
        });
        ChannelManager {
            engine,
            resolver,
            dialect: Dialect::Unset,
            channels,
            rhythm_channel: DEFAULT_RHYTHM_CHANNEL,
            buses,
            presets: HashMap::new(),
            active_tracks: Vec::new(),
            master: MasterState::default(),
            drum_setups: HashMap::new(),
            retired_drums: Vec::new(),
            insertion: InsertionEffect::default(),
            equalizer: Equalizer::default(),
        }
    }

    /// Apply the host controls: track filter, preset selection, output gain
    /// and mono downmix.
    pub fn configure(&mut self, config: &PlayerConfig) {
        self.active_tracks = config.active_tracks.clone();
        self.resolver.set_selection(config.selection.clone());
        self.engine.set_master(MasterParam::OutputGain, config.output_gain);
        self.engine.set_master(MasterParam::Mono, if config.mono { 1.0 } else { 0.0 });
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn into_engine(self) -> E {
        self.engine
    }

    pub fn resolver(&self) -> &BankResolver {
        &self.resolver
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn channel(&self, channel: u8) -> &ChannelState {
        &self.channels[self.slot(channel)]
    }

    pub fn rhythm_channel(&self) -> u8 {
        self.rhythm_channel
    }

    pub fn bus(&self, kind: BusKind) -> &EffectsBus {
        &self.buses[kind.index()]
    }

    pub fn master(&self) -> MasterState {
        self.master
    }

    pub fn insertion(&self) -> &InsertionEffect {
        &self.insertion
    }

    pub fn equalizer(&self) -> Equalizer {
        self.equalizer
    }

    pub fn drum_setup(&self, setup: u8, key: u8) -> DrumKeySetup {
        self.drum_setups.get(&(setup, key)).copied().unwrap_or_default()
    }

    /// Whether `channel` currently accepts messages of class `flag`.
    pub fn receives(&self, channel: u8, flag: ReceiveFlags) -> bool {
        self.channel(channel).receive.contains(flag)
    }

    fn slot(&self, channel: u8) -> usize {
        if channel == DRUM_ALIAS {
            usize::from(self.rhythm_channel)
        } else {
            usize::from(channel & 0x0F)
        }
    }

    fn track_passes(&self, track: usize) -> bool {
        self.active_tracks.is_empty() || self.active_tracks.contains(&track)
    }

    /// Switch to `requested` if it is at least as specific as the current
    /// dialect. Returns the dialect now in effect.
    pub fn request_dialect(&mut self, requested: Dialect) -> Dialect {
        let before = self.dialect;
        self.dialect = before.upgrade(requested);
        if self.dialect != before {
            info!("controller dialect {before} -> {}", self.dialect);
        } else if requested != before {
            debug!("{requested} reset ignored, staying in {before}");
        }
        self.dialect
    }

    /// System reset from a GM/GM2/GS/XG reset message.
    ///
    /// Every channel goes back to its power-on controllers and default sends,
    /// whatever the dialect ends up being. Active channels get a fresh voice.
    pub fn reset(&mut self, requested: Dialect) -> Dialect {
        self.request_dialect(requested);
        self.rhythm_channel = DEFAULT_RHYTHM_CHANNEL;
        self.drum_setups.clear();
        for param in [MasterParam::Volume, MasterParam::Balance, MasterParam::Tuning, MasterParam::KeyShift] {
            self.set_master(param, if param == MasterParam::Volume { 1.0 } else { 0.0 });
        }
        self.insertion = InsertionEffect::default();
        self.equalizer = Equalizer::default();
        self.engine.set_equalizer(&self.equalizer);

        for slot in 0..CHANNEL_COUNT {
            let rhythm = slot == usize::from(DEFAULT_RHYTHM_CHANNEL);
            let was_active = self.channels[slot].is_active();
            self.channels[slot].reset(rhythm);
            for (bus, level) in DEFAULT_SENDS {
                self.set_send(slot as u8, bus, level);
            }
            if was_active {
                self.replace_channel(slot, rhythm, 0, 0);
            }
        }
        self.dialect
    }

    /// Tear down whatever occupies `channel` and start a fresh voice for
    /// `bank`/`program`, keeping the channel's drum flag.
    pub fn new_channel(&mut self, channel: u8, bank: u16, program: u8) {
        let slot = self.slot(channel);
        let drums = self.channels[slot].drums;
        self.replace_channel(slot, drums, bank, program);
    }

    /// Bank select + program change, classified by the active dialect.
    pub fn program_change(&mut self, channel: u8, msb: u8, lsb: u8, program: u8) {
        let slot = self.slot(channel);
        let ch = &self.channels[slot];
        let selection = classify(self.dialect, msb, lsb, ch.rhythm_part);
        let unchanged = ch.is_active()
            && ch.drums == selection.is_rhythm()
            && ch.bank == selection.bank()
            && ch.program == program;
        self.channels[slot].requested_bank = (msb, lsb);
        if unchanged {
            return;
        }
        debug!(
            "channel {}: {} bank {} program {}",
            slot + 1,
            if selection.is_rhythm() { "drum kit" } else { "instrument" },
            selection.bank(),
            program
        );
        self.replace_channel(slot, selection.is_rhythm(), selection.bank(), program);
    }

    /// Make `channel` a rhythm part reading drum setup `setup`, or a melodic
    /// part with `None`.
    pub fn set_rhythm_part(&mut self, channel: u8, setup: Option<u8>) {
        let slot = self.slot(channel);
        let ch = &mut self.channels[slot];
        ch.rhythm_part = setup.is_some();
        ch.drum_setup = setup.unwrap_or(0);
        if setup.is_some() {
            self.rhythm_channel = slot as u8;
        }
        let (msb, lsb) = ch.requested_bank;
        let program = ch.program;
        let selection = classify(self.dialect, msb, lsb, setup.is_some());
        if ch.is_active() {
            self.replace_channel(slot, selection.is_rhythm(), selection.bank(), program);
        } else {
            ch.drums = selection.is_rhythm();
            ch.bank = selection.bank();
            ch.preset = None;
        }
    }

    fn replace_channel(&mut self, slot: usize, drums: bool, bank: u16, program: u8) {
        let ch = &mut self.channels[slot];
        if let Some(old) = ch.voice.take() {
            if ch.drums && ch.holds_voice(old) {
                self.retired_drums.push((slot, old));
            } else {
                self.engine.finish_voice(old);
            }
        }
        ch.drums = drums;
        ch.bank = bank;
        ch.program = program;
        ch.preset = if drums { None } else { self.resolver.resolve_instrument(self.dialect, bank, program) };
        self.open_voice(slot);
    }

    fn open_voice(&mut self, slot: usize) -> VoiceId {
        let (number, drums, bank, program) = {
            let ch = &self.channels[slot];
            (ch.number, ch.drums, ch.bank, ch.program)
        };
        let voice = self.engine.open_voice(number, drums);
        self.channels[slot].voice = Some(voice);
        trace!("channel {} opened voice {:?}", slot + 1, voice);

        for bus in BusKind::ALL {
            if self.buses[bus.index()].contains(number) {
                self.engine.bus_add(bus, voice);
            }
        }
        self.push_params(slot);
        if drums {
            if let Some(fx) = self.resolver.kit_effects(self.dialect, bank, program) {
                self.engine.set_kit_effects(voice, fx);
            }
        }
        voice
    }

    fn ensure_voice(&mut self, slot: usize) -> VoiceId {
        match self.channels[slot].voice {
            Some(voice) => voice,
            None => {
                let ch = &mut self.channels[slot];
                if !ch.drums && ch.preset.is_none() {
                    ch.preset = self.resolver.resolve_instrument(self.dialect, ch.bank, ch.program);
                }
                self.open_voice(slot)
            }
        }
    }

    fn push_params(&mut self, slot: usize) {
        let ch = &self.channels[slot];
        let Some(voice) = ch.voice else {
            return;
        };
        let params = [
            (VoiceParam::Gain, ch.gain()),
            (VoiceParam::Pan, ch.pan),
            (VoiceParam::FilterCutoff, offset(ch.cutoff)),
            (VoiceParam::FilterResonance, offset(ch.resonance)),
            (VoiceParam::VibratoRate, offset(ch.vibrato_rate)),
            (VoiceParam::VibratoDepth, ch.vibrato_cents()),
            (VoiceParam::VibratoDelay, offset(ch.vibrato_delay)),
            (VoiceParam::PitchBendDepth, ch.bend_range),
            (VoiceParam::PitchBend, ch.bend_fraction()),
            (VoiceParam::Tuning, ch.tuning()),
            (VoiceParam::Attack, offset(ch.attack)),
            (VoiceParam::Decay, offset(ch.decay)),
            (VoiceParam::Release, offset(ch.release)),
            (VoiceParam::Pressure, f32::from(ch.pressure) / 127.0),
            (VoiceParam::Soft, if ch.soft { 1.0 } else { 0.0 }),
            (VoiceParam::Send(BusKind::Chorus), f32::from(ch.send(BusKind::Chorus)) / 127.0),
            (VoiceParam::Send(BusKind::Delay), f32::from(ch.send(BusKind::Delay)) / 127.0),
            (VoiceParam::Send(BusKind::Reverb), f32::from(ch.send(BusKind::Reverb)) / 127.0),
        ];
        for (param, value) in params {
            self.engine.set_param(voice, param, value);
        }
    }

    fn set_voice_param(&mut self, slot: usize, param: VoiceParam, value: f32) {
        if let Some(voice) = self.channels[slot].voice {
            self.engine.set_param(voice, param, value);
        }
    }

    /// Dispatch one channel voice message from track `track`.
    ///
    /// Only a preset whose backing data cannot be loaded is an error.
    pub fn process(&mut self, track: usize, channel: u8, message: ChannelMessage, mode: ModeFlags) -> Result<()> {
        let slot = self.slot(channel);
        let receive = self.channels[slot].receive;
        match message.normalized() {
            ChannelMessage::NoteOn { key, velocity } => self.note_on(track, slot, key, velocity, mode),
            ChannelMessage::NoteOff { key, velocity } => self.note_off(slot, key, velocity),
            ChannelMessage::ControlChange { controller, value } => {
                self.control_change(slot, controller, value, mode)
            }
            ChannelMessage::ProgramChange { program } if receive.contains(ReceiveFlags::PROGRAM_CHANGE) => {
                let (msb, lsb) = self.channels[slot].requested_bank;
                self.program_change(slot as u8, msb, lsb, program);
                Ok(())
            }
            ChannelMessage::PolyPressure { key, value } if receive.contains(ReceiveFlags::POLY_PRESSURE) => {
                if let Some(note) = &self.channels[slot].held[usize::from(key & 0x7F)] {
                    self.engine.key_pressure(note.voice, note.played_key, f32::from(value) / 127.0);
                }
                Ok(())
            }
            ChannelMessage::ChannelPressure { value } if receive.contains(ReceiveFlags::CHANNEL_PRESSURE) => {
                self.channels[slot].pressure = value;
                self.set_voice_param(slot, VoiceParam::Pressure, f32::from(value) / 127.0);
                Ok(())
            }
            ChannelMessage::PitchBend { value } if receive.contains(ReceiveFlags::PITCH_BEND) => {
                self.channels[slot].pitch_bend = value & 0x3FFF;
                let bend = self.channels[slot].bend_fraction();
                self.set_voice_param(slot, VoiceParam::PitchBend, bend);
                Ok(())
            }
            other => {
                trace!("channel {} does not receive {:?}", slot + 1, other);
                Ok(())
            }
        }
    }

    fn note_on(&mut self, track: usize, slot: usize, key: u8, velocity: u8, mode: ModeFlags) -> Result<()> {
        if !self.track_passes(track) {
            return Ok(());
        }
        let key = key & 0x7F;
        let ch = &self.channels[slot];
        if !ch.receive.contains(ReceiveFlags::NOTE_ON) || !ch.accepts_key(key) {
            return Ok(());
        }
        let mono = mode.mono || ch.mono;
        let velocity = sensed_velocity(velocity, ch.velocity_depth, ch.velocity_offset);
        let voice = self.ensure_voice(slot);

        let ch = &self.channels[slot];
        let (preset, played_key, semitones, velocity) = if ch.drums {
            let setup = self.drum_setup(ch.drum_setup, key);
            if !setup.receive_note_on {
                return Ok(());
            }
            let (bank, program, drum_setup) = (ch.bank, ch.program, ch.drum_setup);
            let Some(preset) = self.resolver.resolve_drum(self.dialect, bank, program, key) else {
                return Ok(());
            };
            self.cut_exclusive(slot, program, drum_setup, key);
            let velocity = (u16::from(velocity) * u16::from(setup.level) / 127).max(1) as u8;
            (preset, key, setup.pitch_semitones(), velocity)
        } else {
            let shifted = i16::from(key) + i16::from(ch.key_shift) + i16::from(self.master.key_shift);
            let Ok(played_key) = u8::try_from(shifted) else {
                return Ok(());
            };
            if played_key > 127 {
                return Ok(());
            }
            let semitones = f32::from(ch.scale_tuning[usize::from(key % 12)]) / 100.0;
            let preset = match ch.preset.clone() {
                Some(p) => p,
                None => {
                    let (bank, program) = (ch.bank, ch.program);
                    let resolved = self.resolver.resolve_instrument(self.dialect, bank, program);
                    self.channels[slot].preset = resolved.clone();
                    match resolved {
                        Some(p) => p,
                        None => return Ok(()),
                    }
                }
            };
            (preset, played_key, semitones, velocity)
        };

        if mono {
            self.cut_all(slot);
        } else if let Some(previous) = self.channels[slot].held[usize::from(key)].take() {
            self.engine.stop(previous.voice, previous.played_key, 64);
        }

        let velocity = preset.scale_velocity(velocity);
        if preset.covers(played_key) {
            self.sound(voice, played_key, velocity, &preset, semitones)?;
        }
        for layer in preset.layers.iter().filter(|l| l.covers(played_key)) {
            let velocity = layer.scale_velocity(velocity);
            self.sound(voice, played_key, velocity, layer, semitones)?;
        }
        if let Some(file) = &preset.key_on {
            self.one_shot(voice, file, velocity)?;
        }

        let ch = &mut self.channels[slot];
        ch.deferred.retain(|&k| k != key);
        ch.held[usize::from(key)] = Some(HeldNote { voice, played_key, preset });
        self.reap_retired(slot);
        Ok(())
    }

    fn resident<'a>(engine: &mut E, presets: &'a mut HashMap<String, E::Preset>, preset: &PresetRef) -> Result<&'a E::Preset> {
        match presets.entry(preset.file.clone()) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => {
                debug!("loading {} ({})", preset.name, preset.file);
                let loaded = engine.load_preset(preset)?;
                Ok(e.insert(loaded))
            }
        }
    }

    fn sound(&mut self, voice: VoiceId, key: u8, velocity: u8, preset: &PresetRef, semitones: f32) -> Result<()> {
        let handle = Self::resident(&mut self.engine, &mut self.presets, preset)?;
        let pitch = preset.pitch * (semitones / 12.0).exp2();
        self.engine.play(voice, key, velocity, handle, pitch);
        Ok(())
    }

    fn one_shot(&mut self, voice: VoiceId, file: &str, velocity: u8) -> Result<()> {
        let preset = PresetRef::new(file, file);
        let handle = Self::resident(&mut self.engine, &mut self.presets, &preset)?;
        self.engine.play_one_shot(voice, handle, velocity);
        Ok(())
    }

    /// Silence the other members of `key`'s exclusive group. A drum-setup
    /// assign group replaces the kit's built-in groups.
    fn cut_exclusive(&mut self, slot: usize, program: u8, setup: u8, key: u8) {
        let assigned = self.drum_setup(setup, key).assign_group;
        let cut: Vec<u8> = if assigned != 0 {
            self.drum_setups
                .iter()
                .filter(|&(&(s, k), d)| s == setup && k != key && d.assign_group == assigned)
                .map(|(&(_, k), _)| k)
                .collect()
        } else {
            drum_groups::keys_to_cut(program, key).collect()
        };
        let ch = &mut self.channels[slot];
        for k in cut {
            if let Some(note) = ch.held[usize::from(k)].take() {
                trace!("channel {}: key {key} cuts key {k}", slot + 1);
                self.engine.stop(note.voice, note.played_key, 64);
                ch.deferred.retain(|&d| d != k);
            }
        }
    }

    fn cut_all(&mut self, slot: usize) {
        let ch = &mut self.channels[slot];
        for note in ch.held.iter_mut().filter_map(Option::take) {
            self.engine.stop(note.voice, note.played_key, 64);
        }
        ch.deferred.clear();
    }

    fn note_off(&mut self, slot: usize, key: u8, velocity: u8) -> Result<()> {
        let key = key & 0x7F;
        let ch = &mut self.channels[slot];
        if ch.held[usize::from(key)].is_none() {
            return Ok(());
        }
        if ch.drums && !self.drum_setups.get(&(ch.drum_setup, key)).is_none_or(|s| s.receive_note_off) {
            ch.held[usize::from(key)] = None;
            self.reap_retired(slot);
            return Ok(());
        }
        if ch.sustain || (ch.sostenuto && ch.sostenuto_keys.contains(&key)) {
            if !ch.deferred.contains(&key) {
                ch.deferred.push(key);
            }
            return Ok(());
        }
        self.release(slot, key, velocity)
    }

    fn release(&mut self, slot: usize, key: u8, velocity: u8) -> Result<()> {
        let Some(note) = self.channels[slot].held[usize::from(key)].take() else {
            return Ok(());
        };
        self.engine.stop(note.voice, note.played_key, velocity);
        if let Some(file) = &note.preset.key_off {
            self.one_shot(note.voice, file, velocity)?;
        }
        self.reap_retired(slot);
        Ok(())
    }

    /// Finish retired drum voices of `slot` once none of their keys is held.
    fn reap_retired(&mut self, slot: usize) {
        let ch = &self.channels[slot];
        let engine = &mut self.engine;
        self.retired_drums.retain(|&(s, voice)| {
            if s != slot || ch.holds_voice(voice) {
                return true;
            }
            trace!("channel {}: retired drum voice {:?} finished", slot + 1, voice);
            engine.finish_voice(voice);
            false
        });
    }

    /// Release deferred notes no pedal is holding any more.
    fn flush_deferred(&mut self, slot: usize) -> Result<()> {
        let ch = &mut self.channels[slot];
        let (keep, release): (Vec<u8>, Vec<u8>) = ch
            .deferred
            .iter()
            .copied()
            .partition(|&k| ch.sustain || (ch.sostenuto && ch.sostenuto_keys.contains(&k)));
        ch.deferred = keep;
        for key in release {
            self.release(slot, key, 64)?;
        }
        Ok(())
    }

    fn control_change(&mut self, slot: usize, controller: u8, value: u8, mode: ModeFlags) -> Result<()> {
        let receive = self.channels[slot].receive;
        if !receive.contains(ReceiveFlags::CONTROL_CHANGE) {
            return Ok(());
        }
        let gate = |flag| receive.contains(flag);
        let channel = slot as u8;
        match controller {
            1 if gate(ReceiveFlags::MODULATION) => self.set_part_param(channel, PartParam::Modulation(value)),
            7 if gate(ReceiveFlags::VOLUME) => self.set_part_param(channel, PartParam::Volume(value)),
            10 if gate(ReceiveFlags::PAN) => self.set_part_param(channel, PartParam::Pan(value)),
            11 if gate(ReceiveFlags::EXPRESSION) => self.set_part_param(channel, PartParam::Expression(value)),
            64 if gate(ReceiveFlags::HOLD1) => {
                self.channels[slot].sustain = value >= 64;
                self.flush_deferred(slot)?;
            }
            66 if gate(ReceiveFlags::SOSTENUTO) => {
                let ch = &mut self.channels[slot];
                let on = value >= 64;
                if on && !ch.sostenuto {
                    ch.sostenuto_keys = (0..128u8).filter(|&k| ch.held[usize::from(k)].is_some()).collect();
                } else if !on {
                    ch.sostenuto_keys.clear();
                }
                ch.sostenuto = on;
                self.flush_deferred(slot)?;
            }
            67 if gate(ReceiveFlags::SOFT) => {
                let on = value >= 64;
                self.channels[slot].soft = on;
                self.set_voice_param(slot, VoiceParam::Soft, if on { 1.0 } else { 0.0 });
            }
            5 | 65 | 84 => trace!("channel {}: portamento control {controller} ignored", slot + 1),
            71 => self.set_part_param(channel, PartParam::FilterResonance(value)),
            72 => self.set_part_param(channel, PartParam::Release(value)),
            73 => self.set_part_param(channel, PartParam::Attack(value)),
            74 => self.set_part_param(channel, PartParam::FilterCutoff(value)),
            75 => self.set_part_param(channel, PartParam::Decay(value)),
            76 => self.set_part_param(channel, PartParam::VibratoRate(value)),
            77 => self.set_part_param(channel, PartParam::VibratoDepth(value)),
            78 => self.set_part_param(channel, PartParam::VibratoDelay(value)),
            91 if gate(ReceiveFlags::EFFECT_SENDS) => self.set_reverb_level(channel, value),
            93 if gate(ReceiveFlags::EFFECT_SENDS) => self.set_chorus_level(channel, value),
            94 if gate(ReceiveFlags::EFFECT_SENDS) => self.set_delay_level(channel, value),
            120 => self.all_sound_off(channel),
            121 => {
                self.channels[slot].reset_controllers();
                self.flush_deferred(slot)?;
                self.push_params(slot);
            }
            123 if mode.omni => debug!("channel {}: all notes off ignored in omni mode", slot + 1),
            123..=127 => self.all_notes_off(channel)?,
            _ => trace!("channel {}: controller {controller} = {value} not handled", slot + 1),
        }
        Ok(())
    }

    /// Note-off every held key, respecting the pedals.
    pub fn all_notes_off(&mut self, channel: u8) -> Result<()> {
        let slot = self.slot(channel);
        let held: Vec<u8> = (0..128u8).filter(|&k| self.channels[slot].held[usize::from(k)].is_some()).collect();
        for key in held {
            self.note_off(slot, key, 64)?;
        }
        Ok(())
    }

    /// Cut the channel dead and return it to idle.
    pub fn all_sound_off(&mut self, channel: u8) {
        let slot = self.slot(channel);
        let ch = &mut self.channels[slot];
        if let Some(voice) = ch.voice.take() {
            self.engine.stop_voice(voice);
        }
        ch.held.iter_mut().for_each(|n| *n = None);
        ch.deferred.clear();
        ch.sostenuto_keys.clear();
        ch.preset = None;
        let engine = &mut self.engine;
        self.retired_drums.retain(|&(s, voice)| {
            if s == slot {
                engine.stop_voice(voice);
                false
            } else {
                true
            }
        });
    }

    /// Let every voice ring out; used when playback ends.
    pub fn finish_all(&mut self) {
        for ch in &mut self.channels {
            if let Some(voice) = ch.voice.take() {
                self.engine.finish_voice(voice);
            }
            ch.held.iter_mut().for_each(|n| *n = None);
            ch.deferred.clear();
        }
        for (_, voice) in self.retired_drums.drain(..) {
            self.engine.finish_voice(voice);
        }
    }

    /// Set the send level of `channel` into `bus`, entering or leaving the
    /// bus so that membership always matches a positive level.
    pub fn set_send(&mut self, channel: u8, bus: BusKind, level: u8) {
        let slot = self.slot(channel);
        let level = level.min(127);
        let ch = &mut self.channels[slot];
        ch.set_send_raw(bus, level);
        let number = ch.number;
        let voice = ch.voice;
        let target = &mut self.buses[bus.index()];
        if level > 0 {
            if target.insert(number) {
                if let Some(voice) = voice {
                    self.engine.bus_add(bus, voice);
                }
            }
        } else if target.remove(number) {
            if let Some(voice) = voice {
                self.engine.bus_remove(bus, voice);
            }
        }
        self.set_voice_param(slot, VoiceParam::Send(bus), f32::from(level) / 127.0);
    }

    pub fn set_chorus_level(&mut self, channel: u8, level: u8) {
        self.set_send(channel, BusKind::Chorus, level);
    }

    pub fn set_delay_level(&mut self, channel: u8, level: u8) {
        self.set_send(channel, BusKind::Delay, level);
    }

    pub fn set_reverb_level(&mut self, channel: u8, level: u8) {
        self.set_send(channel, BusKind::Reverb, level);
    }

    /// Change one part parameter and forward it to the channel's voice.
    pub fn set_part_param(&mut self, channel: u8, param: PartParam) {
        let slot = self.slot(channel);
        let ch = &mut self.channels[slot];
        let update = match param {
            PartParam::Volume(v) => {
                ch.volume = v;
                Some((VoiceParam::Gain, ch.gain()))
            }
            PartParam::Expression(v) => {
                ch.expression = v;
                Some((VoiceParam::Gain, ch.gain()))
            }
            PartParam::Pan(v) => {
                ch.pan = pan_position(v);
                Some((VoiceParam::Pan, ch.pan))
            }
            PartParam::Modulation(v) => {
                ch.modulation = v;
                Some((VoiceParam::VibratoDepth, ch.vibrato_cents()))
            }
            PartParam::VibratoRate(v) => {
                ch.vibrato_rate = v;
                Some((VoiceParam::VibratoRate, offset(v)))
            }
            PartParam::VibratoDepth(v) => {
                ch.vibrato_depth = v;
                Some((VoiceParam::VibratoDepth, ch.vibrato_cents()))
            }
            PartParam::VibratoDelay(v) => {
                ch.vibrato_delay = v;
                Some((VoiceParam::VibratoDelay, offset(v)))
            }
            PartParam::FilterCutoff(v) => {
                ch.cutoff = v;
                Some((VoiceParam::FilterCutoff, offset(v)))
            }
            PartParam::FilterResonance(v) => {
                ch.resonance = v;
                Some((VoiceParam::FilterResonance, offset(v)))
            }
            PartParam::Attack(v) => {
                ch.attack = v;
                Some((VoiceParam::Attack, offset(v)))
            }
            PartParam::Decay(v) => {
                ch.decay = v;
                Some((VoiceParam::Decay, offset(v)))
            }
            PartParam::Release(v) => {
                ch.release = v;
                Some((VoiceParam::Release, offset(v)))
            }
            PartParam::BendRange { semitones, cents } => {
                ch.bend_range = f32::from(semitones.min(24)) + f32::from(cents.min(99)) / 100.0;
                Some((VoiceParam::PitchBendDepth, ch.bend_range))
            }
            PartParam::ModulationRange { cents } => {
                ch.modulation_range = cents;
                Some((VoiceParam::VibratoDepth, ch.vibrato_cents()))
            }
            PartParam::CoarseTune(semitones) => {
                ch.coarse_tune = semitones;
                Some((VoiceParam::Tuning, ch.tuning()))
            }
            PartParam::FineTune { cents } => {
                ch.fine_tune = cents;
                Some((VoiceParam::Tuning, ch.tuning()))
            }
            PartParam::KeyShift(semitones) => {
                ch.key_shift = semitones;
                None
            }
            PartParam::KeyRangeLow(key) => {
                ch.key_low = key;
                None
            }
            PartParam::KeyRangeHigh(key) => {
                ch.key_high = key;
                None
            }
            PartParam::VelocitySenseDepth(v) => {
                ch.velocity_depth = v;
                None
            }
            PartParam::VelocitySenseOffset(v) => {
                ch.velocity_offset = v;
                None
            }
            PartParam::Mono(on) => {
                ch.mono = on;
                None
            }
            PartParam::ScaleTuning { pitch_class, cents } => {
                ch.scale_tuning[usize::from(pitch_class % 12)] = cents;
                None
            }
            PartParam::Receive(flags, on) => {
                ch.receive.set(flags, on);
                None
            }
        };
        trace!("channel {}: {:?}", slot + 1, param);
        if let Some((param, value)) = update {
            self.set_voice_param(slot, param, value);
        }
    }

    pub fn set_drum_param(&mut self, setup: u8, key: u8, param: DrumParam) {
        self.drum_setups.entry((setup, key & 0x7F)).or_default().apply(param);
    }

    /// Return every key of drum setup `setup` to its defaults.
    pub fn reset_drum_setup(&mut self, setup: u8) {
        self.drum_setups.retain(|&(s, _), _| s != setup);
    }

    pub fn set_master(&mut self, param: MasterParam, value: f32) {
        match param {
            MasterParam::Volume => self.master.volume = value,
            MasterParam::Balance => self.master.balance = value,
            MasterParam::Tuning => self.master.tuning_cents = value,
            MasterParam::KeyShift => self.master.key_shift = value.round().clamp(-24.0, 24.0) as i8,
            MasterParam::OutputGain | MasterParam::Mono => {}
        }
        self.engine.set_master(param, value);
    }

    pub fn set_bus_preset(&mut self, preset: EffectPreset) {
        debug!("{} bus preset {}", preset.bus, preset.name);
        self.engine.set_bus_preset(preset.bus, &preset);
        self.buses[preset.bus.index()].set_preset(preset);
    }

    pub fn set_bus_param(&mut self, bus: BusKind, param: BusParam, value: f32) {
        self.buses[bus.index()].set_param(param, value);
        self.engine.set_bus_param(bus, param, value);
    }

    pub fn update_insertion(&mut self, update: impl FnOnce(&mut InsertionEffect)) {
        update(&mut self.insertion);
        self.engine.set_insertion(&self.insertion);
    }

    pub fn update_equalizer(&mut self, update: impl FnOnce(&mut Equalizer)) {
        update(&mut self.equalizer);
        self.engine.set_equalizer(&self.equalizer);
    }

    /// Presets loaded so far.
    pub fn resident_presets(&self) -> usize {
        self.presets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::fallback::{GM2_RHYTHM_BANK, bank_number};
    use crate::bank::{BankSet, KitEffects};
    use crate::error::MidiError;
    use crate::synth::{EngineCall, RecordingEngine};

    fn banks() -> BankSet {
        let mut set = BankSet::new();
        set.insert_instrument(0, 0, PresetRef::new("Piano", "piano.sfz"));
        let mut strings = PresetRef::new("Strings", "strings.sfz");
        strings.layers.push(PresetRef::new("Strings Pad", "strings_pad.sfz"));
        strings.key_off = Some("release_noise.wav".into());
        set.insert_instrument(0, 48, strings);
        set.insert_instrument(bank_number(8, 0), 0, PresetRef::new("Wide Piano", "wide.sfz"));
        for key in [36, 42, 44, 46] {
            set.insert_drum(0, 0, key, PresetRef::new(format!("Drum {key}"), format!("drum{key}.wav")));
        }
        set.insert_drum(GM2_RHYTHM_BANK, 0, 36, PresetRef::new("GM2 Kick", "gm2_kick.wav"));
        set.kit_mut(0, 0).effects = Some(KitEffects { name: "Std".into(), file: "std.fx".into() });
        set
    }

    fn manager() -> ChannelManager<RecordingEngine> {
        let mut m = ChannelManager::new(RecordingEngine::new(), BankResolver::new(banks()));
        m.configure(&PlayerConfig::default());
        m
    }

    fn note_on(key: u8, velocity: u8) -> ChannelMessage {
        ChannelMessage::NoteOn { key, velocity }
    }

    fn cc(controller: u8, value: u8) -> ChannelMessage {
        ChannelMessage::ControlChange { controller, value }
    }

    const POLY: ModeFlags = ModeFlags { omni: false, mono: false };

    #[test]
    fn first_note_opens_a_voice_and_plays() {
        let mut m = manager();
        assert!(!m.channel(0).is_active());
        m.process(0, 0, note_on(60, 100), POLY).unwrap();
        assert!(m.channel(0).is_active());
        let played = m.engine().played();
        assert_eq!(played.len(), 1);
        assert_eq!(played[0].1, 60);
        assert_eq!(played[0].3, "piano.sfz");
    }

    #[test]
    fn note_on_velocity_zero_stops() {
        let mut m = manager();
        m.process(0, 0, note_on(60, 100), POLY).unwrap();
        m.process(0, 0, note_on(60, 0), POLY).unwrap();
        assert_eq!(m.engine().stopped().len(), 1);
        assert!(m.channel(0).held[60].is_none());
    }

    #[test]
    fn track_filter_blocks_note_on_but_not_note_off() {
        let mut m = manager();
        m.configure(&PlayerConfig { active_tracks: vec![1], ..Default::default() });
        m.process(0, 0, note_on(60, 100), POLY).unwrap();
        assert!(m.engine().played().is_empty());

        m.process(1, 0, note_on(62, 100), POLY).unwrap();
        m.process(0, 0, ChannelMessage::NoteOff { key: 62, velocity: 0 }, POLY).unwrap();
        assert_eq!(m.engine().stopped().len(), 1);
    }

    #[test]
    fn preset_loaded_once() {
        let mut m = manager();
        for key in [60, 62, 64] {
            m.process(0, 0, note_on(key, 90), POLY).unwrap();
        }
        let loads = m.engine().calls.iter().filter(|c| matches!(c, EngineCall::Load { .. })).count();
        assert_eq!(loads, 1);
        assert_eq!(m.resident_presets(), 1);
    }

    #[test]
    fn load_failure_is_an_error() {
        let mut m = manager();
        m.engine_mut().fail_loading("piano.sfz");
        let err = m.process(0, 0, note_on(60, 90), POLY).unwrap_err();
        assert!(matches!(err, MidiError::PresetLoadFailure { .. }));
    }

    #[test]
    fn missing_preset_drops_the_note() {
        let mut m = manager();
        m.process(0, 0, ChannelMessage::ProgramChange { program: 100 }, POLY).unwrap();
        m.process(0, 0, note_on(60, 90), POLY).unwrap();
        assert!(m.engine().played().is_empty());
    }

    #[test]
    fn program_change_finishes_melodic_voice_but_note_off_reaches_it() {
        let mut m = manager();
        m.process(0, 0, note_on(60, 100), POLY).unwrap();
        let first = m.channel(0).voice.unwrap();
        m.process(0, 0, ChannelMessage::ProgramChange { program: 48 }, POLY).unwrap();
        let second = m.channel(0).voice.unwrap();
        assert_ne!(first, second);
        assert!(m.engine().calls.contains(&EngineCall::FinishVoice { voice: first }));

        m.process(0, 0, ChannelMessage::NoteOff { key: 60, velocity: 64 }, POLY).unwrap();
        assert_eq!(m.engine().stopped(), vec![(first, 60)]);
    }

    #[test]
    fn drum_voice_survives_kit_change() {
        let mut m = manager();
        m.process(0, 9, note_on(36, 100), POLY).unwrap();
        let first = m.channel(9).voice.unwrap();
        m.process(0, 9, ChannelMessage::ProgramChange { program: 25 }, POLY).unwrap();
        assert!(!m.engine().calls.contains(&EngineCall::FinishVoice { voice: first }));
        assert!(m.engine().calls.contains(&EngineCall::KitEffects { voice: first, file: "std.fx".into() }));
        m.finish_all();
        assert!(m.engine().calls.contains(&EngineCall::FinishVoice { voice: first }));
    }

    #[test]
    fn idle_drum_voice_is_finished_at_kit_change() {
        let mut m = manager();
        m.process(0, 9, note_on(36, 100), POLY).unwrap();
        m.process(0, 9, ChannelMessage::NoteOff { key: 36, velocity: 64 }, POLY).unwrap();
        let first = m.channel(9).voice.unwrap();
        m.process(0, 9, ChannelMessage::ProgramChange { program: 25 }, POLY).unwrap();
        assert!(m.engine().calls.contains(&EngineCall::FinishVoice { voice: first }));
        assert!(m.retired_drums.is_empty());
    }

    #[test]
    fn retired_drum_voice_is_finished_when_its_key_is_released() {
        let mut m = manager();
        m.process(0, 9, note_on(36, 100), POLY).unwrap();
        let first = m.channel(9).voice.unwrap();
        m.process(0, 9, ChannelMessage::ProgramChange { program: 25 }, POLY).unwrap();
        assert_eq!(m.retired_drums.len(), 1);

        m.process(0, 9, ChannelMessage::NoteOff { key: 36, velocity: 64 }, POLY).unwrap();
        assert_eq!(m.engine().stopped(), vec![(first, 36)]);
        assert!(m.engine().calls.contains(&EngineCall::FinishVoice { voice: first }));
        assert!(m.retired_drums.is_empty());
    }

    #[test]
    fn repeated_kit_changes_keep_retired_voices_bounded() {
        let mut m = manager();
        m.process(0, 9, note_on(36, 100), POLY).unwrap();
        for i in 0..1000u32 {
            m.program_change(9, 0, 0, (i % 2) as u8);
        }
        // The first change is a no-op; of the 999 real ones only the voice
        // still holding key 36 rings on.
        assert_eq!(m.retired_drums.len(), 1);
        let finished = m.engine().calls.iter().filter(|c| matches!(c, EngineCall::FinishVoice { .. })).count();
        assert_eq!(finished, 998);
    }

    #[test]
    fn open_hihat_is_cut_by_closed() {
        let mut m = manager();
        m.process(0, 9, note_on(46, 100), POLY).unwrap();
        m.process(0, 9, note_on(42, 100), POLY).unwrap();
        assert_eq!(m.engine().stopped().iter().map(|s| s.1).collect::<Vec<_>>(), vec![46]);
        // The kick is not in a group.
        m.process(0, 9, note_on(36, 100), POLY).unwrap();
        assert_eq!(m.engine().stopped().len(), 1);
    }

    #[test]
    fn assign_group_overrides_kit_groups() {
        let mut m = manager();
        m.set_drum_param(0, 36, DrumParam::AssignGroup(3));
        m.set_drum_param(0, 42, DrumParam::AssignGroup(3));
        m.process(0, 9, note_on(36, 100), POLY).unwrap();
        m.process(0, 9, note_on(46, 100), POLY).unwrap();
        m.process(0, 9, note_on(42, 100), POLY).unwrap();
        assert_eq!(m.engine().stopped().iter().map(|s| s.1).collect::<Vec<_>>(), vec![36]);
    }

    #[test]
    fn sustain_defers_note_off() {
        let mut m = manager();
        m.process(0, 0, note_on(60, 100), POLY).unwrap();
        m.process(0, 0, cc(64, 127), POLY).unwrap();
        m.process(0, 0, ChannelMessage::NoteOff { key: 60, velocity: 64 }, POLY).unwrap();
        assert!(m.engine().stopped().is_empty());
        m.process(0, 0, cc(64, 0), POLY).unwrap();
        assert_eq!(m.engine().stopped().len(), 1);
    }

    #[test]
    fn sostenuto_holds_only_captured_keys() {
        let mut m = manager();
        m.process(0, 0, note_on(60, 100), POLY).unwrap();
        m.process(0, 0, cc(66, 127), POLY).unwrap();
        m.process(0, 0, note_on(64, 100), POLY).unwrap();
        m.process(0, 0, ChannelMessage::NoteOff { key: 60, velocity: 64 }, POLY).unwrap();
        m.process(0, 0, ChannelMessage::NoteOff { key: 64, velocity: 64 }, POLY).unwrap();
        assert_eq!(m.engine().stopped().iter().map(|s| s.1).collect::<Vec<_>>(), vec![64]);
        m.process(0, 0, cc(66, 0), POLY).unwrap();
        assert_eq!(m.engine().stopped().len(), 2);
    }

    #[test]
    fn mono_mode_stops_previous_note() {
        let mut m = manager();
        let mono = ModeFlags { omni: false, mono: true };
        m.process(0, 0, note_on(60, 100), mono).unwrap();
        m.process(0, 0, note_on(64, 100), mono).unwrap();
        assert_eq!(m.engine().stopped().iter().map(|s| s.1).collect::<Vec<_>>(), vec![60]);
    }

    #[test]
    fn all_notes_off_is_ignored_in_omni() {
        let mut m = manager();
        m.process(0, 0, note_on(60, 100), POLY).unwrap();
        m.process(0, 0, cc(123, 0), ModeFlags { omni: true, mono: false }).unwrap();
        assert!(m.engine().stopped().is_empty());
        m.process(0, 0, cc(123, 0), POLY).unwrap();
        assert_eq!(m.engine().stopped().len(), 1);
    }

    #[test]
    fn all_sound_off_returns_channel_to_idle() {
        let mut m = manager();
        m.process(0, 0, note_on(60, 100), POLY).unwrap();
        let voice = m.channel(0).voice.unwrap();
        m.process(0, 0, cc(120, 0), POLY).unwrap();
        assert!(!m.channel(0).is_active());
        assert!(m.engine().calls.contains(&EngineCall::StopVoice { voice }));
    }

    #[test]
    fn layers_and_release_one_shot() {
        let mut m = manager();
        m.process(0, 0, ChannelMessage::ProgramChange { program: 48 }, POLY).unwrap();
        m.process(0, 0, note_on(60, 100), POLY).unwrap();
        let files: Vec<String> = m.engine().played().into_iter().map(|p| p.3).collect();
        assert_eq!(files, vec!["strings.sfz", "strings_pad.sfz"]);
        m.process(0, 0, note_on(60, 0), POLY).unwrap();
        assert!(m.engine().calls.iter().any(|c| matches!(c, EngineCall::OneShot { file, .. } if file == "release_noise.wav")));
    }

    #[test]
    fn volume_and_expression_drive_gain() {
        let mut m = manager();
        m.process(0, 0, note_on(60, 100), POLY).unwrap();
        let voice = m.channel(0).voice.unwrap();
        m.process(0, 0, cc(7, 127), POLY).unwrap();
        m.process(0, 0, cc(11, 64), POLY).unwrap();
        let gain = m.engine().last_param(voice, VoiceParam::Gain).unwrap();
        assert!((gain - (64f32 / 127.0).ln()).abs() < 1e-6);
    }

    #[test]
    fn receive_flags_gate_messages() {
        let mut m = manager();
        m.set_part_param(0, PartParam::Receive(ReceiveFlags::PITCH_BEND, false));
        m.process(0, 0, ChannelMessage::PitchBend { value: 0 }, POLY).unwrap();
        assert_eq!(m.channel(0).pitch_bend, 0x2000);
        m.set_part_param(0, PartParam::Receive(ReceiveFlags::NOTE_ON, false));
        m.process(0, 0, note_on(60, 100), POLY).unwrap();
        assert!(m.engine().played().is_empty());
    }

    #[test]
    fn key_shift_moves_played_key() {
        let mut m = manager();
        m.set_part_param(0, PartParam::KeyShift(-12));
        m.process(0, 0, note_on(60, 100), POLY).unwrap();
        m.process(0, 0, note_on(5, 100), POLY).unwrap();
        assert_eq!(m.engine().played().iter().map(|p| p.1).collect::<Vec<_>>(), vec![48]);
        m.process(0, 0, ChannelMessage::NoteOff { key: 60, velocity: 64 }, POLY).unwrap();
        assert_eq!(m.engine().stopped()[0].1, 48);
    }

    #[test]
    fn gm2_lsb_127_selects_shared_rhythm_bank() {
        let mut m = manager();
        m.reset(Dialect::Gm2);
        m.program_change(3, 0, 127, 0);
        assert!(m.channel(3).drums);
        assert_eq!(m.channel(3).bank, GM2_RHYTHM_BANK);
        m.process(0, 3, note_on(36, 100), POLY).unwrap();
        assert_eq!(m.engine().played()[0].3, "gm2_kick.wav");
    }

    #[test]
    fn reset_restores_defaults_and_upgrades_only() {
        let mut m = manager();
        m.process(0, 0, cc(7, 20), POLY).unwrap();
        m.process(0, 0, cc(10, 0), POLY).unwrap();
        m.set_chorus_level(0, 90);
        assert_eq!(m.reset(Dialect::Gs), Dialect::Gs);
        assert_eq!(m.channel(0).gain(), (100f32 / 127.0).ln());
        assert_eq!(m.channel(0).pan, 0.0);
        assert!(!m.bus(BusKind::Chorus).contains(0));
        assert!(m.bus(BusKind::Reverb).contains(0));
        assert_eq!(m.reset(Dialect::Gm1), Dialect::Gs);
        assert_eq!(m.reset(Dialect::Xg), Dialect::Xg);
    }

    #[test]
    fn drum_alias_follows_rhythm_part() {
        let mut m = manager();
        assert_eq!(m.channel(DRUM_ALIAS).number, 9);
        m.set_rhythm_part(4, Some(1));
        assert_eq!(m.channel(DRUM_ALIAS).number, 4);
        assert!(m.channel(4).drums);
        assert_eq!(m.channel(4).drum_setup, 1);
    }

    #[test]
    fn bus_membership_matches_send_levels() {
        let mut m = manager();
        let mut seed: u32 = 0x1234_5678;
        let mut next = || {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (seed >> 16) as u8
        };
        for step in 0..2000 {
            let channel = next() % 17;
            let bus = BusKind::ALL[usize::from(next() % 3)];
            let level = if next() % 3 == 0 { 0 } else { next() & 0x7F };
            if step % 50 == 0 {
                m.process(0, channel, note_on(60, 100), POLY).unwrap();
            }
            m.set_send(channel, bus, level);
            for number in 0..CHANNEL_COUNT as u8 {
                for kind in BusKind::ALL {
                    assert_eq!(m.channel(number).send(kind) > 0, m.bus(kind).contains(number));
                }
            }
        }
    }

    #[test]
    fn bus_add_reaches_the_engine_for_active_voices() {
        let mut m = manager();
        m.process(0, 2, note_on(60, 100), POLY).unwrap();
        let voice = m.channel(2).voice.unwrap();
        m.engine_mut().take_calls();
        m.set_delay_level(2, 40);
        m.set_delay_level(2, 80);
        m.set_delay_level(2, 0);
        let bus_calls: Vec<EngineCall> = m
            .engine()
            .calls
            .iter()
            .filter(|c| matches!(c, EngineCall::BusAdd { .. } | EngineCall::BusRemove { .. }))
            .cloned()
            .collect();
        assert_eq!(
            bus_calls,
            vec![
                EngineCall::BusAdd { bus: BusKind::Delay, voice },
                EngineCall::BusRemove { bus: BusKind::Delay, voice }
            ]
        );
    }
}
