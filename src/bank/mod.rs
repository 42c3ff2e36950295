//! Instrument and drum-kit lookup.
//!
//! A [`BankSet`] holds what the bank-definition documents describe; the
//! [`BankResolver`] walks the dialect's fallback chain over it.

pub mod definition;
pub mod drum_groups;
pub mod fallback;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use log::{debug, warn};

use crate::dialect::Dialect;
use crate::error::MidiError;
use fallback::fallback_banks;

/// A concrete instrument or drum sample definition.
#[derive(Debug, Clone, PartialEq)]
pub struct PresetRef {
    pub name: String,
    /// Backing data; also the residency key for loaded presets.
    pub file: String,
    pub bank: u16,
    pub program: u8,
    /// Gain in dB.
    pub gain: f32,
    pub pitch: f32,
    /// How much note velocity matters: 1.0 passes it through, 0.0 plays
    /// everything at full velocity.
    pub velocity_fraction: f32,
    pub width: f32,
    pub min_key: u8,
    pub max_key: u8,
    pub layers: Vec<PresetRef>,
    pub key_on: Option<String>,
    pub key_off: Option<String>,
}

impl PresetRef {
    pub fn new(name: impl Into<String>, file: impl Into<String>) -> Self {
        PresetRef {
            name: name.into(),
            file: file.into(),
            bank: 0,
            program: 0,
            gain: 0.0,
            pitch: 1.0,
            velocity_fraction: 1.0,
            width: 1.0,
            min_key: 0,
            max_key: 127,
            layers: Vec::new(),
            key_on: None,
            key_off: None,
        }
    }

    pub fn covers(&self, key: u8) -> bool {
        (self.min_key..=self.max_key).contains(&key)
    }

    /// Velocity the engine should see for a played `velocity`.
    pub fn scale_velocity(&self, velocity: u8) -> u8 {
        let fraction = self.velocity_fraction.clamp(0.0, 1.0);
        let v = 127.0 - (127.0 - f32::from(velocity.min(127))) * fraction;
        v.round().clamp(1.0, 127.0) as u8
    }

    fn matches_selection(&self, selection: &[String]) -> bool {
        if selection.is_empty() {
            return true;
        }
        let name = self.name.to_lowercase();
        let file = self.file.to_lowercase();
        selection.iter().any(|s| {
            let s = s.to_lowercase();
            name.contains(&s) || file.contains(&s)
        })
    }
}

/// Per-kit routing shared by every key of a drum kit.
#[derive(Debug, Clone, PartialEq)]
pub struct KitEffects {
    pub name: String,
    pub file: String,
}

#[derive(Debug, Clone, Default)]
pub struct DrumKit {
    pub name: String,
    pub effects: Option<KitEffects>,
    pub keys: BTreeMap<u8, Arc<PresetRef>>,
}

/// The in-memory maps built from bank definitions.
#[derive(Debug, Clone, Default)]
pub struct BankSet {
    instruments: BTreeMap<u16, BTreeMap<u8, Arc<PresetRef>>>,
    drums: BTreeMap<u16, BTreeMap<u8, DrumKit>>,
    default_drum_kit: Option<u8>,
}

impl BankSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_instrument(&mut self, bank: u16, program: u8, mut preset: PresetRef) {
        preset.bank = bank;
        preset.program = program;
        self.instruments.entry(bank).or_default().insert(program, Arc::new(preset));
    }

    pub fn insert_drum(&mut self, bank: u16, program: u8, key: u8, mut preset: PresetRef) {
        preset.bank = bank;
        preset.program = program;
        self.kit_mut(bank, program).keys.insert(key, Arc::new(preset));
    }

    pub fn kit_mut(&mut self, bank: u16, program: u8) -> &mut DrumKit {
        self.drums.entry(bank).or_default().entry(program).or_default()
    }

    pub fn set_default_drum_kit(&mut self, program: Option<u8>) {
        self.default_drum_kit = program;
    }

    pub fn default_drum_kit(&self) -> Option<u8> {
        self.default_drum_kit
    }

    pub fn instrument_count(&self) -> usize {
        self.instruments.values().map(BTreeMap::len).sum()
    }

    pub fn drum_kit_count(&self) -> usize {
        self.drums.values().map(BTreeMap::len).sum()
    }

    /// Lay `overlay` over this set. Overlay entries replace matching ones;
    /// overlay kits replace individual keys, not whole kits.
    pub fn merge(&mut self, overlay: BankSet) {
        for (bank, programs) in overlay.instruments {
            self.instruments.entry(bank).or_default().extend(programs);
        }
        for (bank, kits) in overlay.drums {
            for (program, kit) in kits {
                let target = self.kit_mut(bank, program);
                if !kit.name.is_empty() {
                    target.name = kit.name;
                }
                if kit.effects.is_some() {
                    target.effects = kit.effects;
                }
                target.keys.extend(kit.keys);
            }
        }
        if overlay.default_drum_kit.is_some() {
            self.default_drum_kit = overlay.default_drum_kit;
        }
    }

    fn instrument(&self, bank: u16, program: u8) -> Option<&Arc<PresetRef>> {
        self.instruments.get(&bank)?.get(&program)
    }

    fn kit(&self, bank: u16, program: u8) -> Option<&DrumKit> {
        self.drums.get(&bank)?.get(&program)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LookupKey {
    Instrument { bank: u16, program: u8 },
    Drum { bank: u16, program: u8, key: u8 },
}

/// Resolves (bank, program[, key]) to a preset using the dialect's
/// bank-fallback chain.
#[derive(Debug, Default)]
pub struct BankResolver {
    banks: BankSet,
    selection: Vec<String>,
    /// Resolutions (misses included) under `memo_dialect` only.
    memo: HashMap<LookupKey, Option<Arc<PresetRef>>>,
    memo_dialect: Dialect,
    reported: HashSet<(bool, u16, u8)>,
    last_attempts: usize,
}

impl BankResolver {
    pub fn new(banks: BankSet) -> Self {
        BankResolver { banks, ..Default::default() }
    }

    pub fn banks(&self) -> &BankSet {
        &self.banks
    }

    /// Only accept presets whose name or file contains one of `selection`
    /// (case-insensitive). An empty list accepts everything.
    pub fn set_selection(&mut self, selection: Vec<String>) {
        self.selection = selection;
        self.memo.clear();
    }

    /// A dialect change invalidates the whole memo.
    fn memoised(&mut self, dialect: Dialect, lookup: LookupKey) -> Option<&Option<Arc<PresetRef>>> {
        if dialect != self.memo_dialect {
            self.memo.clear();
            self.memo_dialect = dialect;
        }
        self.memo.get(&lookup)
    }

    /// Table lookups the most recent uncached resolution needed.
    pub fn last_attempts(&self) -> usize {
        self.last_attempts
    }

    pub fn resolve_instrument(&mut self, dialect: Dialect, bank: u16, program: u8) -> Option<Arc<PresetRef>> {
        let lookup = LookupKey::Instrument { bank, program };
        if let Some(hit) = self.memoised(dialect, lookup) {
            return hit.clone();
        }

        self.last_attempts = 0;
        let mut found = None;
        for candidate in fallback_banks(dialect, bank) {
            self.last_attempts += 1;
            let Some(preset) = self.banks.instrument(candidate, program) else {
                continue;
            };
            if !preset.matches_selection(&self.selection) {
                continue;
            }
            if candidate != bank {
                debug!("program {program}: bank {bank} falls back to bank {candidate}");
            }
            found = Some(preset.clone());
            break;
        }

        if found.is_none() {
            self.report_missing(false, bank, program, None);
        }
        self.memo.insert(lookup, found.clone());
        found
    }

    pub fn resolve_drum(&mut self, dialect: Dialect, bank: u16, program: u8, key: u8) -> Option<Arc<PresetRef>> {
        let lookup = LookupKey::Drum { bank, program, key };
        if let Some(hit) = self.memoised(dialect, lookup) {
            return hit.clone();
        }

        self.last_attempts = 0;
        let mut found = self.search_kit_key(dialect, bank, program, key);
        if found.is_none() {
            if let Some(default_kit) = self.banks.default_drum_kit.filter(|&d| d != program) {
                found = self.search_kit_key(dialect, bank, default_kit, key);
            }
        }

        if found.is_none() {
            self.report_missing(true, bank, program, Some(key));
        }
        self.memo.insert(lookup, found.clone());
        found
    }

    /// Routing for the kit `program` in `bank`, following the same chain.
    pub fn kit_effects(&self, dialect: Dialect, bank: u16, program: u8) -> Option<&KitEffects> {
        fallback_banks(dialect, bank)
            .into_iter()
            .filter_map(|b| self.banks.kit(b, program))
            .find_map(|kit| kit.effects.as_ref())
    }

    pub fn kit_name(&self, dialect: Dialect, bank: u16, program: u8) -> Option<&str> {
        fallback_banks(dialect, bank)
            .into_iter()
            .filter_map(|b| self.banks.kit(b, program))
            .map(|kit| kit.name.as_str())
            .find(|name| !name.is_empty())
    }

    fn search_kit_key(&mut self, dialect: Dialect, bank: u16, program: u8, key: u8) -> Option<Arc<PresetRef>> {
        for candidate in fallback_banks(dialect, bank) {
            self.last_attempts += 1;
            let Some(preset) = self.banks.kit(candidate, program).and_then(|kit| kit.keys.get(&key)) else {
                continue;
            };
            if preset.matches_selection(&self.selection) {
                return Some(preset.clone());
            }
        }
        None
    }

    fn report_missing(&mut self, drum: bool, bank: u16, program: u8, key: Option<u8>) {
        if self.reported.insert((drum, bank, program)) {
            warn!("{}; notes will be dropped", MidiError::PresetNotFound { bank, program, key });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::fallback::{GM2_RHYTHM_BANK, bank_number};

    fn sample_banks() -> BankSet {
        let mut set = BankSet::new();
        set.insert_instrument(0, 0, PresetRef::new("Grand Piano", "piano/grand.sfz"));
        set.insert_instrument(0, 1, PresetRef::new("Bright Piano", "piano/bright.sfz"));
        set.insert_instrument(bank_number(8, 0), 0, PresetRef::new("Wide Piano", "piano/wide.sfz"));
        set.insert_drum(0, 0, 36, PresetRef::new("Kick", "drums/std/kick.wav"));
        set.insert_drum(0, 0, 38, PresetRef::new("Snare", "drums/std/snare.wav"));
        set.insert_drum(0, 25, 36, PresetRef::new("808 Kick", "drums/808/kick.wav"));
        set.kit_mut(0, 0).name = "Standard".into();
        set.kit_mut(0, 0).effects = Some(KitEffects { name: "Standard".into(), file: "fx/std.fx".into() });
        set
    }

    #[test]
    fn exact_bank_wins() {
        let mut r = BankResolver::new(sample_banks());
        let p = r.resolve_instrument(Dialect::Gs, bank_number(8, 0), 0).unwrap();
        assert_eq!(p.name, "Wide Piano");
        assert_eq!(r.last_attempts(), 1);
    }

    #[test]
    fn gs_variation_falls_back_to_sub_capital() {
        let mut r = BankResolver::new(sample_banks());
        let p = r.resolve_instrument(Dialect::Gs, bank_number(9, 2), 0).unwrap();
        assert_eq!(p.name, "Wide Piano");
        assert_eq!(r.last_attempts(), 3);
    }

    #[test]
    fn missing_program_exhausts_chain() {
        let mut r = BankResolver::new(sample_banks());
        assert!(r.resolve_instrument(Dialect::Gm2, bank_number(121, 5), 90).is_none());
        assert_eq!(r.last_attempts(), 4);
        assert!(r.resolve_instrument(Dialect::Gm1, 0, 90).is_none());
        assert_eq!(r.last_attempts(), 1);
    }

    #[test]
    fn dialect_change_drops_the_memo() {
        let mut r = BankResolver::new(sample_banks());
        for program in 90..100 {
            assert!(r.resolve_instrument(Dialect::Xg, 5, program).is_none());
        }
        assert_eq!(r.memo.len(), 10);
        assert!(r.resolve_instrument(Dialect::Gs, bank_number(8, 0), 0).is_some());
        assert_eq!(r.memo.len(), 1);
        assert!(r.resolve_instrument(Dialect::Xg, 5, 90).is_none());
        assert_eq!(r.last_attempts(), 2);
    }

    #[test]
    fn repeated_misses_are_memoised() {
        let mut r = BankResolver::new(sample_banks());
        assert!(r.resolve_instrument(Dialect::Xg, 5, 90).is_none());
        assert_eq!(r.last_attempts(), 2);
        r.last_attempts = 0;
        assert!(r.resolve_instrument(Dialect::Xg, 5, 90).is_none());
        assert_eq!(r.last_attempts(), 0);
    }

    #[test]
    fn selection_filter_continues_fallback() {
        let mut r = BankResolver::new(sample_banks());
        r.set_selection(vec!["GRAND".into()]);
        let p = r.resolve_instrument(Dialect::Gs, bank_number(8, 0), 0).unwrap();
        assert_eq!(p.name, "Grand Piano");
        assert!(r.resolve_instrument(Dialect::Gs, 0, 1).is_none());

        r.set_selection(vec!["wide.sfz".into()]);
        assert_eq!(r.resolve_instrument(Dialect::Gs, bank_number(8, 0), 0).unwrap().name, "Wide Piano");
    }

    #[test]
    fn drums_resolve_by_key_and_fallback() {
        let mut r = BankResolver::new(sample_banks());
        let kick = r.resolve_drum(Dialect::Gm2, GM2_RHYTHM_BANK, 0, 36).unwrap();
        assert_eq!(kick.name, "Kick");
        assert!(r.resolve_drum(Dialect::Gm2, GM2_RHYTHM_BANK, 0, 99).is_none());
        assert_eq!(r.resolve_drum(Dialect::Gs, 0, 25, 36).unwrap().name, "808 Kick");
        assert!(r.resolve_drum(Dialect::Gs, 0, 25, 38).is_none());
    }

    #[test]
    fn default_kit_covers_unknown_programs() {
        let mut banks = sample_banks();
        banks.set_default_drum_kit(Some(0));
        let mut r = BankResolver::new(banks);
        assert_eq!(r.resolve_drum(Dialect::Gs, 0, 25, 38).unwrap().name, "Snare");
        assert_eq!(r.resolve_drum(Dialect::Gs, 0, 40, 36).unwrap().name, "Kick");
    }

    #[test]
    fn kit_effects_follow_the_chain() {
        let r = BankResolver::new(sample_banks());
        let fx = r.kit_effects(Dialect::Xg, fallback::XG_DRUM_BANK, 0).unwrap();
        assert_eq!(fx.file, "fx/std.fx");
        assert_eq!(r.kit_name(Dialect::Xg, fallback::XG_DRUM_BANK, 0), Some("Standard"));
        assert!(r.kit_effects(Dialect::Xg, 0, 25).is_none());
    }

    #[test]
    fn merge_replaces_entries_and_keeps_others() {
        let mut base = sample_banks();
        let mut overlay = BankSet::new();
        overlay.insert_instrument(0, 0, PresetRef::new("Vendor Piano", "vendor/piano.sfz"));
        overlay.insert_drum(0, 0, 38, PresetRef::new("Vendor Snare", "vendor/snare.wav"));
        base.merge(overlay);

        let mut r = BankResolver::new(base);
        assert_eq!(r.resolve_instrument(Dialect::Gm1, 0, 0).unwrap().name, "Vendor Piano");
        assert_eq!(r.resolve_instrument(Dialect::Gm1, 0, 1).unwrap().name, "Bright Piano");
        assert_eq!(r.resolve_drum(Dialect::Gm1, 0, 0, 38).unwrap().name, "Vendor Snare");
        assert_eq!(r.resolve_drum(Dialect::Gm1, 0, 0, 36).unwrap().name, "Kick");
        assert_eq!(r.kit_name(Dialect::Gm1, 0, 0), Some("Standard"));
    }

    #[test]
    fn velocity_fraction_scaling() {
        let mut p = PresetRef::new("x", "x");
        assert_eq!(p.scale_velocity(64), 64);
        p.velocity_fraction = 0.0;
        assert_eq!(p.scale_velocity(10), 127);
        p.velocity_fraction = 0.5;
        assert_eq!(p.scale_velocity(27), 77);
    }
}
