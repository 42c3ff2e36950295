//! System-exclusive decoders.
//!
//! Each vendor module turns one message into calls on the channel manager
//! and the display, and returns a human readable account of what it did.
//! Messages the decoders do not understand come back as
//! [`MidiError::UnsupportedSysEx`]; a bad GS checksum as
//! [`MidiError::ChecksumMismatch`]. Neither ever has a side effect.

pub mod gm;
pub mod gs;
pub mod xg;
pub mod xg_tables;

use log::debug;

use crate::channel::ChannelManager;
use crate::channel::state::ReceiveFlags;
use crate::error::{MidiError, Result, unsupported};
use crate::midi::display::Display;
use crate::synth::SynthEngine;

pub const UNIVERSAL_NON_REAL_TIME: u8 = 0x7E;
pub const UNIVERSAL_REAL_TIME: u8 = 0x7F;
pub const ROLAND: u8 = 0x41;
pub const YAMAHA: u8 = 0x43;

/// What a decoder may touch while handling one message.
pub struct SysExContext<'a, E: SynthEngine> {
    pub channels: &'a mut ChannelManager<E>,
    pub display: &'a mut Display,
}

/// Decode one SysEx payload: the bytes after `F0`, with or without the
/// closing `F7`.
pub fn decode<E: SynthEngine>(payload: &[u8], ctx: &mut SysExContext<'_, E>) -> Result<String> {
    let payload = payload.strip_suffix(&[0xF7]).unwrap_or(payload);
    if let Some(pos) = payload.iter().position(|&b| b & 0x80 != 0) {
        return Err(unsupported(format!("byte {:#04x} at {pos} is not a data byte", payload[pos])));
    }
    match payload.first() {
        Some(&(UNIVERSAL_NON_REAL_TIME | UNIVERSAL_REAL_TIME)) => gm::decode(payload, ctx),
        Some(&ROLAND) => gs::decode(payload, ctx),
        Some(&YAMAHA) => xg::decode(payload, ctx),
        Some(id) => Err(unsupported(format!("manufacturer {id:#04x}"))),
        None => Err(unsupported("empty message")),
    }
}

/// Per-part receive switches, in the address order both GS (`40 1x 03..`)
/// and XG (`08 nn 30..`) use.
pub(crate) const RECEIVE_SWITCHES: [(ReceiveFlags, &str); 16] = [
    (ReceiveFlags::PITCH_BEND, "pitch bend"),
    (ReceiveFlags::CHANNEL_PRESSURE, "channel pressure"),
    (ReceiveFlags::PROGRAM_CHANGE, "program change"),
    (ReceiveFlags::CONTROL_CHANGE, "control change"),
    (ReceiveFlags::POLY_PRESSURE, "poly pressure"),
    (ReceiveFlags::NOTE, "note message"),
    (ReceiveFlags::RPN, "RPN"),
    (ReceiveFlags::NRPN, "NRPN"),
    (ReceiveFlags::MODULATION, "modulation"),
    (ReceiveFlags::VOLUME, "volume"),
    (ReceiveFlags::PAN, "panpot"),
    (ReceiveFlags::EXPRESSION, "expression"),
    (ReceiveFlags::HOLD1, "hold 1"),
    (ReceiveFlags::PORTAMENTO, "portamento"),
    (ReceiveFlags::SOSTENUTO, "sostenuto"),
    (ReceiveFlags::SOFT, "soft"),
];

/// One parameter write inside a bulk message: how many data bytes it used
/// and what it did.
pub(crate) type Written = (usize, String);

/// Step a 3-byte, 7-bit-per-byte parameter address forward by `count`.
pub(crate) fn advance(address: [u8; 3], count: usize) -> [u8; 3] {
    let flat = (u32::from(address[0]) << 14) | (u32::from(address[1]) << 7) | u32::from(address[2]);
    let flat = flat + count as u32;
    [((flat >> 14) & 0x7F) as u8, ((flat >> 7) & 0x7F) as u8, (flat & 0x7F) as u8]
}

/// Apply `data` starting at `address`, one parameter at a time. Each write
/// reports how many bytes it consumed; the address advances by the same
/// amount. Unsupported addresses inside a bulk write are skipped, but a
/// message where nothing applied is unsupported as a whole.
pub(crate) fn walk(
    mut address: [u8; 3],
    data: &[u8],
    mut write: impl FnMut([u8; 3], &[u8]) -> Result<Written>,
) -> Result<String> {
    let mut offset = 0;
    let mut applied = Vec::new();
    let mut first_error = None;
    while offset < data.len() {
        let consumed = match write(address, &data[offset..]) {
            Ok((consumed, text)) => {
                applied.push(text);
                consumed.max(1)
            }
            Err(e @ MidiError::UnsupportedSysEx(_)) => {
                debug!("{e}");
                first_error.get_or_insert(e);
                1
            }
            Err(e) => return Err(e),
        };
        offset += consumed;
        address = advance(address, consumed);
    }
    match (applied.is_empty(), first_error) {
        (true, Some(e)) => Err(e),
        _ => Ok(applied.join("; ")),
    }
}

/// Signed offset of a value centred on 64.
pub(crate) fn centred(value: u8) -> i8 {
    value as i8 - 64
}

pub(crate) fn ascii_text(data: &[u8]) -> String {
    data.iter().map(|&b| char::from(b)).collect::<String>().trim_end().to_string()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_advance_carries() {
        assert_eq!(advance([0x40, 0x01, 0x30], 1), [0x40, 0x01, 0x31]);
        assert_eq!(advance([0x40, 0x01, 0x7F], 1), [0x40, 0x02, 0x00]);
        assert_eq!(advance([0x40, 0x7F, 0x7F], 2), [0x41, 0x00, 0x01]);
    }

    #[test]
    fn walk_skips_unsupported_inside_bulk() {
        let mut seen = Vec::new();
        let text = walk([0, 0, 0], &[1, 2, 3], |addr, data| {
            if addr[2] == 1 {
                return Err(unsupported("nope"));
            }
            seen.push(data[0]);
            Ok((1, format!("p{}", addr[2])))
        })
        .unwrap();
        assert_eq!(seen, vec![1, 3]);
        assert_eq!(text, "p0; p2");
    }

    #[test]
    fn walk_with_nothing_applied_is_unsupported() {
        let err = walk([0, 0, 0], &[1], |_, _| Err(unsupported("nope"))).unwrap_err();
        assert!(matches!(err, MidiError::UnsupportedSysEx(_)));
    }

    #[test]
    fn unknown_manufacturer_and_high_bytes_are_unsupported() {
        let mut channels = testing::manager();
        let mut display = testing::display();
        let mut ctx = SysExContext { channels: &mut channels, display: &mut display };
        assert!(matches!(decode(&[0x42, 0x10, 0xF7], &mut ctx), Err(MidiError::UnsupportedSysEx(_))));
        assert!(matches!(decode(&[0x41, 0x90], &mut ctx), Err(MidiError::UnsupportedSysEx(_))));
        assert!(matches!(decode(&[], &mut ctx), Err(MidiError::UnsupportedSysEx(_))));
        assert!(channels.engine().calls.is_empty());
    }
}
