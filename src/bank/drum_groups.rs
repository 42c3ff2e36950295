//! Mutually exclusive drum notes: striking one key of a group cuts the others.

/// Groups shared by the standard family of kits.
const STANDARD_GROUPS: &[&[u8]] = &[
    &[42, 44, 46], // closed / pedal / open hi-hat
    &[29, 30],     // scratch push / pull
    &[71, 72],     // short / long whistle
    &[73, 74],     // short / long guiro
    &[78, 79],     // mute / open cuica
    &[80, 81],     // mute / open triangle
    &[86, 87],     // mute / open surdo
];

/// The orchestra kit moves its hi-hats down to 27-29 and has no scratches.
const ORCHESTRA_GROUPS: &[&[u8]] = &[
    &[27, 28, 29],
    &[71, 72],
    &[73, 74],
    &[78, 79],
    &[80, 81],
    &[86, 87],
];

/// Sound-effect kits play every key independently.
const SFX_GROUPS: &[&[u8]] = &[];

/// Exclusive groups for a drum-kit program number.
pub fn groups_for_kit(program: u8) -> &'static [&'static [u8]] {
    match program {
        48 => ORCHESTRA_GROUPS,
        56 => SFX_GROUPS,
        _ => STANDARD_GROUPS,
    }
}

/// Keys that must be silenced when `key` is struck on kit `program`.
pub fn keys_to_cut(program: u8, key: u8) -> impl Iterator<Item = u8> {
    groups_for_kit(program)
        .iter()
        .find(|g| g.contains(&key))
        .into_iter()
        .flat_map(|g| g.iter().copied())
        .filter(move |&k| k != key)
}

/// Group number (1-based) `key` belongs to on kit `program`, if any.
pub fn group_of(program: u8, key: u8) -> Option<u8> {
    groups_for_kit(program)
        .iter()
        .position(|g| g.contains(&key))
        .map(|i| i as u8 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_hihat_cuts_closed_and_pedal() {
        let cut: Vec<u8> = keys_to_cut(0, 46).collect();
        assert_eq!(cut, vec![42, 44]);
    }

    #[test]
    fn orchestra_kit_has_its_own_hihats() {
        assert_eq!(keys_to_cut(48, 46).count(), 0);
        let cut: Vec<u8> = keys_to_cut(48, 27).collect();
        assert_eq!(cut, vec![28, 29]);
        assert_eq!(group_of(48, 29), Some(1));
    }

    #[test]
    fn sfx_kit_never_cuts() {
        assert_eq!(keys_to_cut(56, 42).count(), 0);
        assert_eq!(group_of(56, 42), None);
    }

    #[test]
    fn ungrouped_key_cuts_nothing() {
        assert_eq!(keys_to_cut(0, 36).count(), 0);
    }
}
