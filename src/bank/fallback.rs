//! Dialect rules for turning bank-select values into lookup banks.

use crate::dialect::Dialect;

/// Bank GM2 reserves for rhythm kits (MSB 120).
pub const GM2_RHYTHM_BANK: u16 = 120 << 7;
/// Bank GM2 reserves for melodic voices (MSB 121).
pub const GM2_MELODY_BANK: u16 = 121 << 7;
/// XG drum kit bank (MSB 127).
pub const XG_DRUM_BANK: u16 = 127 << 7;
/// XG SFX kit bank (MSB 126).
pub const XG_SFX_KIT_BANK: u16 = 126 << 7;

/// Longest chain any dialect produces.
pub const MAX_FALLBACK_STEPS: usize = 4;

pub fn bank_number(msb: u8, lsb: u8) -> u16 {
    (u16::from(msb & 0x7F) << 7) | u16::from(lsb & 0x7F)
}

pub fn split_bank(bank: u16) -> (u8, u8) {
    (((bank >> 7) & 0x7F) as u8, (bank & 0x7F) as u8)
}

/// Banks to try, in order, when looking up `bank` under `dialect`.
///
/// The chain always ends with bank 0 and never repeats a bank, so a lookup
/// takes at most [`MAX_FALLBACK_STEPS`] attempts.
pub fn fallback_banks(dialect: Dialect, bank: u16) -> Vec<u16> {
    let bank = bank & 0x3FFF;
    let (msb, lsb) = split_bank(bank);
    let msb_only = bank_number(msb, 0);
    let candidates: [Option<u16>; MAX_FALLBACK_STEPS] = match dialect {
        Dialect::Xg => [Some(bank), Some(msb_only), Some(0), None],
        Dialect::Gs => {
            // SC-88Pro variation banks fall back to the sub-capital tone of
            // their group of eight before the capital tone.
            let sub_capital = (msb % 8 != 0).then(|| bank_number(msb & !7, 0));
            [Some(bank), Some(msb_only), sub_capital, Some(0)]
        }
        Dialect::Unset | Dialect::Gm1 | Dialect::Gm2 => {
            [Some(bank), Some(u16::from(lsb)), Some(msb_only), Some(0)]
        }
    };

    let mut chain = Vec::with_capacity(MAX_FALLBACK_STEPS);
    for b in candidates.into_iter().flatten() {
        if !chain.contains(&b) {
            chain.push(b);
        }
    }
    chain
}

/// What a bank-select + program change on a channel asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankSelection {
    Melodic(u16),
    Rhythm(u16),
}

impl BankSelection {
    pub fn bank(self) -> u16 {
        match self {
            BankSelection::Melodic(b) | BankSelection::Rhythm(b) => b,
        }
    }

    pub fn is_rhythm(self) -> bool {
        matches!(self, BankSelection::Rhythm(_))
    }
}

#[derive(Debug, Clone, Copy)]
enum Gm2Rule {
    Rhythm,
    SharedRhythm,
    Melody,
}

/// GM2 bank-select table: (MSB, LSB) pattern, `None` matching anything.
const GM2_RULES: &[(Option<u8>, Option<u8>, Gm2Rule)] = &[
    (Some(120), None, Gm2Rule::Rhythm),
    (Some(121), None, Gm2Rule::Melody),
    (Some(127), None, Gm2Rule::SharedRhythm),
    (None, Some(127), Gm2Rule::SharedRhythm),
];

/// Classify a bank select for `dialect`. `rhythm_part` says whether the
/// channel is a drum part by default (channel 10, or a GS/XG part set up
/// as rhythm).
pub fn classify(dialect: Dialect, msb: u8, lsb: u8, rhythm_part: bool) -> BankSelection {
    let bank = bank_number(msb, lsb);
    match dialect {
        Dialect::Unset | Dialect::Gm1 => {
            if rhythm_part {
                BankSelection::Rhythm(bank)
            } else {
                BankSelection::Melodic(bank)
            }
        }
        Dialect::Gm2 => {
            let rule = GM2_RULES.iter().find(|(m, l, _)| {
                m.is_none_or(|m| m == msb) && l.is_none_or(|l| l == lsb)
            });
            match rule.map(|r| r.2) {
                Some(Gm2Rule::Rhythm) => BankSelection::Rhythm(bank),
                Some(Gm2Rule::SharedRhythm) => BankSelection::Rhythm(GM2_RHYTHM_BANK),
                Some(Gm2Rule::Melody) => BankSelection::Melodic(bank),
                None if rhythm_part => BankSelection::Rhythm(GM2_RHYTHM_BANK | u16::from(lsb)),
                None => BankSelection::Melodic(bank),
            }
        }
        Dialect::Gs => {
            if rhythm_part {
                BankSelection::Rhythm(bank)
            } else {
                BankSelection::Melodic(bank)
            }
        }
        Dialect::Xg => match msb {
            126 | 127 => BankSelection::Rhythm(bank),
            0 if rhythm_part => BankSelection::Rhythm(XG_DRUM_BANK | u16::from(lsb)),
            _ => BankSelection::Melodic(bank),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIALECTS: [Dialect; 5] = [Dialect::Unset, Dialect::Gm1, Dialect::Gm2, Dialect::Gs, Dialect::Xg];

    #[test]
    fn gm_chain_tries_lsb_then_msb() {
        let bank = bank_number(121, 3);
        assert_eq!(fallback_banks(Dialect::Gm2, bank), vec![bank, 3, 121 << 7, 0]);
    }

    #[test]
    fn xg_chain_strips_lsb_then_msb() {
        let bank = bank_number(64, 2);
        assert_eq!(fallback_banks(Dialect::Xg, bank), vec![bank, 64 << 7, 0]);
    }

    #[test]
    fn gs_chain_uses_sub_capital() {
        let bank = bank_number(9, 3);
        assert_eq!(fallback_banks(Dialect::Gs, bank), vec![bank, 9 << 7, 8 << 7, 0]);
        assert_eq!(fallback_banks(Dialect::Gs, bank_number(8, 0)), vec![8 << 7, 0]);
    }

    #[test]
    fn every_chain_terminates_at_zero() {
        for dialect in DIALECTS {
            for bank in (0..=0x3FFFu16).step_by(37).chain([0, 0x3FFF, 0x7F, 0x3F80]) {
                let chain = fallback_banks(dialect, bank);
                assert!(!chain.is_empty() && chain.len() <= MAX_FALLBACK_STEPS, "{dialect} {bank}");
                assert_eq!(*chain.last().unwrap(), 0);
                assert_eq!(chain[0], bank);
            }
        }
        assert_eq!(fallback_banks(Dialect::Gm1, 0), vec![0]);
    }

    #[test]
    fn gm2_rule_table() {
        assert_eq!(classify(Dialect::Gm2, 120, 1, false), BankSelection::Rhythm(bank_number(120, 1)));
        assert_eq!(classify(Dialect::Gm2, 121, 2, true), BankSelection::Melodic(bank_number(121, 2)));
        assert_eq!(classify(Dialect::Gm2, 0, 127, false), BankSelection::Rhythm(GM2_RHYTHM_BANK));
        assert_eq!(classify(Dialect::Gm2, 0, 0, true), BankSelection::Rhythm(GM2_RHYTHM_BANK));
        assert_eq!(classify(Dialect::Gm2, 0, 0, false), BankSelection::Melodic(0));
    }

    #[test]
    fn xg_drum_msbs() {
        assert!(classify(Dialect::Xg, 127, 0, false).is_rhythm());
        assert!(classify(Dialect::Xg, 126, 0, false).is_rhythm());
        assert!(!classify(Dialect::Xg, 64, 0, true).is_rhythm());
        assert_eq!(classify(Dialect::Xg, 0, 0, true), BankSelection::Rhythm(XG_DRUM_BANK));
    }
}
