//! The three shared effect buses and the vendor master effects.

use std::collections::BTreeSet;
use std::fmt;

/// One of the shared send-effect buses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BusKind {
    Chorus,
    Delay,
    Reverb,
}

impl BusKind {
    pub const ALL: [BusKind; 3] = [BusKind::Chorus, BusKind::Delay, BusKind::Reverb];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            BusKind::Chorus => "chorus",
            BusKind::Delay => "delay",
            BusKind::Reverb => "reverb",
        }
    }
}

impl fmt::Display for BusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Engine-level knobs of a bus. Units are given per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusParam {
    /// Return level, 0.0..=1.0.
    Level,
    /// Modulation depth, 0.0..=1.0 (chorus) or ms (GM2 chorus).
    Depth,
    /// LFO rate in Hz.
    Rate,
    /// Feedback, -1.0..=1.0.
    Feedback,
    /// Low-pass cutoff in Hz.
    Cutoff,
    /// High-pass cutoff in Hz.
    HighPass,
    /// Delay time / offset in ms.
    DelayTime,
    /// Reverb decay time in seconds.
    DecayTime,
    /// Reverb diffusion / density, 0.0..=1.0.
    DecayDepth,
    /// Pre-delay in ms.
    PreDelay,
    /// Room dimension in metres.
    RoomSize,
    /// Return pan, -1.0..=1.0.
    Pan,
    /// Amount sent on into the reverb bus, 0.0..=1.0.
    SendToReverb,
    /// Amount sent on into the chorus bus, 0.0..=1.0.
    SendToChorus,
    /// Dry/wet balance, 0.0..=1.0.
    Mix,
}

impl BusParam {
    pub const COUNT: usize = 15;

    fn index(self) -> usize {
        self as usize
    }
}

/// A named effect algorithm for one bus.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectPreset {
    pub bus: BusKind,
    pub name: String,
    /// Key of the generated effect-preset file, e.g. `xg/reverb/hall1`.
    pub reference: String,
}

impl EffectPreset {
    pub fn new(bus: BusKind, vendor: &str, name: &str) -> Self {
        let slug: String = name
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        EffectPreset { bus, name: name.to_string(), reference: format!("{vendor}/{bus}/{slug}") }
    }
}

/// A shared send effect plus the channels routed into it.
///
/// Membership is only changed by the channel manager so that a channel is
/// a member exactly while its send level to this bus is positive.
#[derive(Debug, Clone)]
pub struct EffectsBus {
    kind: BusKind,
    preset: Option<EffectPreset>,
    params: [Option<f32>; BusParam::COUNT],
    members: BTreeSet<u8>,
}

impl EffectsBus {
    pub fn new(kind: BusKind) -> Self {
        EffectsBus { kind, preset: None, params: [None; BusParam::COUNT], members: BTreeSet::new() }
    }

    pub fn kind(&self) -> BusKind {
        self.kind
    }

    pub fn preset(&self) -> Option<&EffectPreset> {
        self.preset.as_ref()
    }

    pub fn param(&self, param: BusParam) -> Option<f32> {
        self.params[param.index()]
    }

    pub fn contains(&self, channel: u8) -> bool {
        self.members.contains(&channel)
    }

    pub fn members(&self) -> impl Iterator<Item = u8> + '_ {
        self.members.iter().copied()
    }

    pub(crate) fn set_preset(&mut self, preset: EffectPreset) {
        self.preset = Some(preset);
    }

    pub(crate) fn set_param(&mut self, param: BusParam, value: f32) {
        self.params[param.index()] = Some(value);
    }

    pub(crate) fn insert(&mut self, channel: u8) -> bool {
        self.members.insert(channel)
    }

    pub(crate) fn remove(&mut self, channel: u8) -> bool {
        self.members.remove(&channel)
    }
}

/// Two-band master equaliser (GS), or bands 1 and 5 of the XG multi EQ.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Equalizer {
    pub low_freq_hz: f32,
    pub low_gain_db: f32,
    pub high_freq_hz: f32,
    pub high_gain_db: f32,
}

impl Default for Equalizer {
    fn default() -> Self {
        Equalizer { low_freq_hz: 200.0, low_gain_db: 0.0, high_freq_hz: 6000.0, high_gain_db: 0.0 }
    }
}

/// The single insertion effect (GS EFX / XG insertion).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InsertionEffect {
    /// Vendor type code, MSB << 8 | LSB.
    pub kind: u16,
    pub params: [u8; 20],
    pub send_reverb: u8,
    pub send_chorus: u8,
    pub send_delay: u8,
    /// Channels routed through the insertion.
    pub parts: BTreeSet<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_reference_is_slugged() {
        let p = EffectPreset::new(BusKind::Reverb, "xg", "Hall 1");
        assert_eq!(p.reference, "xg/reverb/hall1");
        let p = EffectPreset::new(BusKind::Chorus, "gs", "Short Delay (FB)");
        assert_eq!(p.reference, "gs/chorus/shortdelay(fb)");
    }

    #[test]
    fn params_start_unset() {
        let mut bus = EffectsBus::new(BusKind::Delay);
        assert_eq!(bus.param(BusParam::Level), None);
        bus.set_param(BusParam::Level, 0.5);
        assert_eq!(bus.param(BusParam::Level), Some(0.5));
        assert_eq!(bus.param(BusParam::Mix), None);
    }

    #[test]
    fn membership_set_semantics() {
        let mut bus = EffectsBus::new(BusKind::Chorus);
        assert!(bus.insert(3));
        assert!(!bus.insert(3));
        assert!(bus.contains(3));
        assert!(bus.remove(3));
        assert!(!bus.remove(3));
        assert_eq!(bus.members().count(), 0);
    }
}
