//! Bank-definition documents (TOML).
//!
//! ```toml
//! default_drum_kit = 0
//!
//! [[instrument]]
//! msb = 0
//! program = 0
//! name = "Acoustic Grand Piano"
//! file = "piano/grand.sfz"
//! gain = -3.0
//!
//! [[kit]]
//! program = 0
//! name = "Standard"
//! effects = { name = "Standard", file = "kits/standard.fx" }
//!
//! [[kit.key]]
//! key = 36
//! name = "Kick"
//! file = "kits/standard/kick.wav"
//! ```

use std::fs;
use std::io;
use std::path::Path;

use log::{debug, info};
use serde::Deserialize;

use super::fallback::bank_number;
use super::{BankSet, KitEffects, PresetRef};
use crate::error::{MidiError, Result};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BankDocument {
    default_drum_kit: Option<u8>,
    #[serde(rename = "instrument")]
    instruments: Vec<InstrumentEntry>,
    #[serde(rename = "kit")]
    kits: Vec<KitEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct BankAddress {
    bank: Option<u16>,
    msb: Option<u8>,
    lsb: Option<u8>,
}

impl BankAddress {
    fn resolve(&self) -> u16 {
        self.bank.unwrap_or_else(|| bank_number(self.msb.unwrap_or(0), self.lsb.unwrap_or(0)))
    }
}

#[derive(Debug, Deserialize)]
struct PresetFields {
    name: String,
    file: String,
    #[serde(default)]
    gain: f32,
    #[serde(default = "unity")]
    pitch: f32,
    #[serde(default = "unity")]
    velocity_fraction: f32,
    #[serde(default = "unity")]
    width: f32,
    #[serde(default)]
    min_key: u8,
    #[serde(default = "top_key")]
    max_key: u8,
    #[serde(default)]
    key_on: Option<String>,
    #[serde(default)]
    key_off: Option<String>,
    #[serde(default)]
    layers: Vec<PresetFields>,
}

fn unity() -> f32 {
    1.0
}

fn top_key() -> u8 {
    127
}

impl PresetFields {
    fn into_preset(self) -> PresetRef {
        let mut preset = PresetRef::new(self.name, self.file);
        preset.gain = self.gain;
        preset.pitch = self.pitch;
        preset.velocity_fraction = self.velocity_fraction;
        preset.width = self.width;
        preset.min_key = self.min_key;
        preset.max_key = self.max_key;
        preset.key_on = self.key_on;
        preset.key_off = self.key_off;
        preset.layers = self.layers.into_iter().map(PresetFields::into_preset).collect();
        preset
    }
}

#[derive(Debug, Deserialize)]
struct InstrumentEntry {
    #[serde(flatten)]
    address: BankAddress,
    program: u8,
    last_program: Option<u8>,
    #[serde(flatten)]
    preset: PresetFields,
}

#[derive(Debug, Deserialize)]
struct KitEntry {
    #[serde(flatten)]
    address: BankAddress,
    program: u8,
    #[serde(default)]
    name: String,
    effects: Option<KitEffectsEntry>,
    #[serde(default, rename = "key")]
    keys: Vec<KeyEntry>,
}

#[derive(Debug, Deserialize)]
struct KitEffectsEntry {
    name: String,
    file: String,
}

#[derive(Debug, Deserialize)]
struct KeyEntry {
    key: u8,
    last_key: Option<u8>,
    #[serde(flatten)]
    preset: PresetFields,
}

fn invalid(source_name: &str, reason: impl Into<String>) -> MidiError {
    MidiError::BankDefinition { source_name: source_name.to_string(), reason: reason.into() }
}

fn seven_bit_range(source_name: &str, what: &str, first: u8, last: Option<u8>) -> Result<std::ops::RangeInclusive<u8>> {
    let last = last.unwrap_or(first);
    if first > 127 || last > 127 || last < first {
        return Err(invalid(source_name, format!("{what} range {first}..={last} is not within 0..=127")));
    }
    Ok(first..=last)
}

/// Parse one bank-definition document.
pub fn parse_bank_document(text: &str, source_name: &str) -> Result<BankSet> {
    let doc: BankDocument = toml::from_str(text).map_err(|e| invalid(source_name, e.to_string()))?;
    let mut set = BankSet::new();

    if let Some(kit) = doc.default_drum_kit {
        if kit > 127 {
            return Err(invalid(source_name, format!("default drum kit {kit} out of range")));
        }
    }
    set.set_default_drum_kit(doc.default_drum_kit);

    for entry in doc.instruments {
        let bank = entry.address.resolve();
        if bank > 0x3FFF {
            return Err(invalid(source_name, format!("bank {bank} out of range")));
        }
        let preset = entry.preset.into_preset();
        for program in seven_bit_range(source_name, "program", entry.program, entry.last_program)? {
            set.insert_instrument(bank, program, preset.clone());
        }
    }

    for entry in doc.kits {
        let bank = entry.address.resolve();
        if bank > 0x3FFF {
            return Err(invalid(source_name, format!("bank {bank} out of range")));
        }
        seven_bit_range(source_name, "kit program", entry.program, None)?;
        {
            let kit = set.kit_mut(bank, entry.program);
            kit.name = entry.name;
            kit.effects = entry.effects.map(|fx| KitEffects { name: fx.name, file: fx.file });
        }
        for key_entry in entry.keys {
            let preset = key_entry.preset.into_preset();
            for key in seven_bit_range(source_name, "key", key_entry.key, key_entry.last_key)? {
                set.insert_drum(bank, entry.program, key, preset.clone());
            }
        }
    }

    debug!(
        "{source_name}: {} instruments, {} drum kits",
        set.instrument_count(),
        set.drum_kit_count()
    );
    Ok(set)
}

pub fn load_bank_file(path: &Path) -> Result<BankSet> {
    let text = fs::read_to_string(path)?;
    parse_bank_document(&text, &path.display().to_string())
}

/// Load the default table and lay the optional vendor overlay over it.
/// An overlay that does not exist is skipped without complaint.
pub fn load_banks(default: &Path, overlay: Option<&Path>) -> Result<BankSet> {
    let mut set = load_bank_file(default)?;
    if let Some(path) = overlay {
        match load_bank_file(path) {
            Ok(extra) => {
                info!("applying bank overlay {}", path.display());
                set.merge(extra);
            }
            Err(MidiError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no bank overlay at {}", path.display());
            }
            Err(e) => return Err(e),
        }
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::BankResolver;
    use crate::dialect::Dialect;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const GM_TABLE: &str = r#"
default_drum_kit = 0

[[instrument]]
program = 0
last_program = 2
name = "Piano"
file = "piano.sfz"
gain = -6.0
velocity_fraction = 0.5

[[instrument]]
msb = 8
program = 4
name = "Detuned EP"
file = "ep_detuned.sfz"
pitch = 1.01
layers = [{ name = "EP Body", file = "ep_body.sfz" }]

[[kit]]
program = 0
name = "Standard"
effects = { name = "Standard", file = "kits/standard.fx" }

[[kit.key]]
key = 35
last_key = 36
name = "Kick"
file = "kick.wav"
key_off = "kick_damp.wav"
"#;

    fn write_temp(text: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(text.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn parses_ranges_and_attributes() {
        let set = parse_bank_document(GM_TABLE, "gm.toml").unwrap();
        assert_eq!(set.instrument_count(), 4);
        assert_eq!(set.drum_kit_count(), 1);
        assert_eq!(set.default_drum_kit(), Some(0));

        let mut r = BankResolver::new(set);
        let piano = r.resolve_instrument(Dialect::Gm1, 0, 2).unwrap();
        assert_eq!(piano.gain, -6.0);
        assert_eq!(piano.velocity_fraction, 0.5);
        assert_eq!(piano.program, 2);

        let ep = r.resolve_instrument(Dialect::Gs, 8 << 7, 4).unwrap();
        assert_eq!(ep.layers.len(), 1);
        assert_eq!(ep.layers[0].pitch, 1.0);

        let kick = r.resolve_drum(Dialect::Gm1, 0, 0, 35).unwrap();
        assert_eq!(kick.key_off.as_deref(), Some("kick_damp.wav"));
        assert!(r.resolve_drum(Dialect::Gm1, 0, 0, 36).is_some());
    }

    #[test]
    fn rejects_bad_ranges() {
        let doc = "[[instrument]]\nprogram = 5\nlast_program = 3\nname = \"x\"\nfile = \"x\"\n";
        let err = parse_bank_document(doc, "bad.toml").unwrap_err();
        assert!(matches!(err, MidiError::BankDefinition { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            parse_bank_document("[[instrument]\n", "broken.toml"),
            Err(MidiError::BankDefinition { .. })
        ));
    }

    #[test]
    fn missing_overlay_is_ignored() {
        let base = write_temp(GM_TABLE);
        let set = load_banks(base.path(), Some(Path::new("/nonexistent/overlay.toml"))).unwrap();
        assert_eq!(set.instrument_count(), 4);
    }

    #[test]
    fn overlay_is_merged() {
        let base = write_temp(GM_TABLE);
        let overlay = write_temp("[[instrument]]\nprogram = 1\nname = \"SC Piano 2\"\nfile = \"sc/piano2.sfz\"\n");
        let set = load_banks(base.path(), Some(overlay.path())).unwrap();
        let mut r = BankResolver::new(set);
        assert_eq!(r.resolve_instrument(Dialect::Gs, 0, 1).unwrap().name, "SC Piano 2");
        assert_eq!(r.resolve_instrument(Dialect::Gs, 0, 0).unwrap().name, "Piano");
    }

    #[test]
    fn broken_overlay_is_an_error() {
        let base = write_temp(GM_TABLE);
        let overlay = write_temp("this is not toml = = =");
        assert!(load_banks(base.path(), Some(overlay.path())).is_err());
    }

    #[test]
    fn missing_default_table_is_an_error() {
        assert!(matches!(load_banks(Path::new("/nonexistent/gm.toml"), None), Err(MidiError::Io(_))));
    }
}
