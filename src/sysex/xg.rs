//! Yamaha XG parameter change: `43 1n 4C hh mm ll data..`.
//!
//! No checksum. Effect parameters arrive as 0-127 codes and are turned into
//! physical units through the tables in [`xg_tables`](super::xg_tables).

use super::xg_tables::{self, DELAY_OFFSET_MS, EQ_FREQUENCY_HZ, LFO_FREQUENCY_HZ, REVERB_TIME_S, ROOM_DIMENSION_M};
use super::{RECEIVE_SWITCHES, SysExContext, Written, ascii_text, centred, walk};
use crate::channel::effects::{BusKind, BusParam, EffectPreset};
use crate::channel::state::{DrumParam, PartParam, ReceiveFlags};
use crate::dialect::Dialect;
use crate::error::{Result, unsupported};
use crate::synth::{MasterParam, SynthEngine};

const MODEL_XG: u8 = 0x4C;

pub const REVERB_TYPES: [((u8, u8), &str); 12] = [
    ((0x00, 0x00), "No Effect"),
    ((0x01, 0x00), "Hall 1"),
    ((0x01, 0x01), "Hall 2"),
    ((0x02, 0x00), "Room 1"),
    ((0x02, 0x01), "Room 2"),
    ((0x02, 0x02), "Room 3"),
    ((0x03, 0x00), "Stage 1"),
    ((0x03, 0x01), "Stage 2"),
    ((0x04, 0x00), "Plate"),
    ((0x10, 0x00), "White Room"),
    ((0x11, 0x00), "Tunnel"),
    ((0x13, 0x00), "Basement"),
];

pub const CHORUS_TYPES: [((u8, u8), &str); 12] = [
    ((0x00, 0x00), "No Effect"),
    ((0x41, 0x00), "Chorus 1"),
    ((0x41, 0x01), "Chorus 2"),
    ((0x41, 0x02), "Chorus 3"),
    ((0x41, 0x08), "Chorus 4"),
    ((0x42, 0x00), "Celeste 1"),
    ((0x42, 0x01), "Celeste 2"),
    ((0x42, 0x02), "Celeste 3"),
    ((0x42, 0x08), "Celeste 4"),
    ((0x43, 0x00), "Flanger 1"),
    ((0x43, 0x01), "Flanger 2"),
    ((0x43, 0x08), "Flanger 3"),
];

/// Variation types usable on the delay bus.
pub const VARIATION_TYPES: [((u8, u8), &str); 10] = [
    ((0x00, 0x00), "No Effect"),
    ((0x05, 0x00), "Delay L,C,R"),
    ((0x06, 0x00), "Delay L,R"),
    ((0x07, 0x00), "Echo"),
    ((0x08, 0x00), "Cross Delay"),
    ((0x09, 0x00), "ER 1"),
    ((0x09, 0x01), "ER 2"),
    ((0x0A, 0x00), "Gate Reverb"),
    ((0x0B, 0x00), "Reverse Gate"),
    ((0x14, 0x00), "Karaoke 1"),
];

/// Reverb types whose parameters 6-8 are room dimensions.
const ROOM_SIMULATIONS: [u8; 3] = [0x10, 0x11, 0x13];

fn type_name(table: &[((u8, u8), &'static str)], msb: u8, lsb: u8) -> Option<&'static str> {
    table
        .iter()
        .find(|(code, _)| *code == (msb, lsb))
        // An unknown LSB falls back to the type's first variant.
        .or_else(|| table.iter().find(|(code, _)| *code == (msb, 0)))
        .map(|(_, name)| *name)
}

pub(crate) fn decode<E: SynthEngine>(payload: &[u8], ctx: &mut SysExContext<'_, E>) -> Result<String> {
    let [_, device, model, hi, mid, lo, data @ ..] = payload else {
        return Err(unsupported("truncated Yamaha SysEx"));
    };
    if device & 0xF0 != 0x10 {
        return Err(unsupported(format!("Yamaha device byte {device:#04x} is not a parameter change")));
    }
    if *model != MODEL_XG {
        return Err(unsupported(format!("Yamaha model {model:#04x}")));
    }
    if data.is_empty() {
        return Err(unsupported("XG parameter change without data"));
    }
    match (*hi, *mid, *lo) {
        (0x06, 0x00, 0x00) => {
            let text = ascii_text(data);
            ctx.display.set_panel_text(Dialect::Xg, text.clone());
            Ok(format!("XG Display \"{text}\""))
        }
        (0x07, _, _) => Err(unsupported("XG display bitmap")),
        _ => walk([*hi, *mid, *lo], data, |address, data| write(ctx, address, data)),
    }
}

fn write<E: SynthEngine>(ctx: &mut SysExContext<'_, E>, address: [u8; 3], data: &[u8]) -> Result<Written> {
    let v = data[0];
    match address {
        [0x00, 0x00, 0x00] if data.len() >= 4 => {
            let nibbles = data[..4].iter().fold(0u16, |acc, &n| (acc << 4) | u16::from(n & 0x0F));
            let cents = (f32::from(nibbles) - 1024.0) / 10.0;
            ctx.channels.set_master(MasterParam::Tuning, cents);
            Ok((4, format!("XG Master Tune {cents:+.1} cents")))
        }
        [0x00, 0x00, 0x04] => {
            ctx.channels.set_master(MasterParam::Volume, f32::from(v) / 127.0);
            Ok((1, format!("XG Master Volume {v}")))
        }
        [0x00, 0x00, 0x06] => {
            let shift = centred(v).clamp(-24, 24);
            ctx.channels.set_master(MasterParam::KeyShift, f32::from(shift));
            Ok((1, format!("XG Transpose {shift:+}")))
        }
        [0x00, 0x00, 0x7D] => {
            ctx.channels.reset_drum_setup(v);
            Ok((1, format!("XG Drum Setup {} Reset", v + 1)))
        }
        [0x00, 0x00, 0x7E] => Ok((1, reset(ctx, "XG System On"))),
        [0x00, 0x00, 0x7F] => Ok((1, reset(ctx, "XG All Parameter Reset"))),
        [0x02, 0x01, lo @ 0x00..=0x1F] => reverb(ctx, lo, data),
        [0x02, 0x01, lo @ 0x20..=0x3F] => chorus(ctx, lo, data),
        [0x02, 0x01, lo @ 0x40..=0x7F] => variation(ctx, lo, data),
        [0x02, 0x40, lo] => equalizer(ctx, lo, v).map(|text| (1, text)),
        [0x03, 0x00, lo] => insertion(ctx, lo, v).map(|text| (1, text)),
        [0x08, part @ 0x00..=0x0F, lo] => multi_part(ctx, part, lo, data),
        [hi @ 0x30..=0x31, key, param] => drum(ctx, hi - 0x30, key, param, v).map(|text| (1, text)),
        [a, b, c] => Err(unsupported(format!("XG address {a:02X} {b:02X} {c:02X}"))),
    }
}

fn reset<E: SynthEngine>(ctx: &mut SysExContext<'_, E>, what: &str) -> String {
    let dialect = ctx.channels.reset(Dialect::Xg);
    ctx.channels.set_bus_preset(EffectPreset::new(BusKind::Reverb, "xg", "Hall 1"));
    ctx.channels.set_bus_preset(EffectPreset::new(BusKind::Chorus, "xg", "Chorus 1"));
    ctx.channels.set_bus_preset(EffectPreset::new(BusKind::Delay, "xg", "Delay L,C,R"));
    format!("{what} ({dialect})")
}

fn bus_param<E: SynthEngine>(ctx: &mut SysExContext<'_, E>, bus: BusKind, param: BusParam, value: f32) -> Result<Written> {
    ctx.channels.set_bus_param(bus, param, value);
    Ok((1, format!("XG {bus} {param:?} {value:.3}")))
}

/// Set the bus type from a 2-byte (MSB, LSB) write, or MSB alone keeping the
/// current LSB at zero.
fn set_type<E: SynthEngine>(
    ctx: &mut SysExContext<'_, E>,
    bus: BusKind,
    table: &[((u8, u8), &'static str)],
    data: &[u8],
) -> Result<Written> {
    let msb = data[0];
    let lsb = data.get(1).copied().unwrap_or(0);
    let Some(name) = type_name(table, msb, lsb) else {
        return Err(unsupported(format!("XG {bus} type {msb:02X} {lsb:02X}")));
    };
    ctx.channels.set_bus_preset(EffectPreset::new(bus, "xg", name));
    Ok((data.len().min(2), format!("XG {bus} type {name}")))
}

fn current_type_msb<E: SynthEngine>(ctx: &SysExContext<'_, E>, bus: BusKind, table: &[((u8, u8), &'static str)]) -> u8 {
    let name = ctx.channels.bus(bus).preset().map(|p| p.name.as_str());
    table.iter().find(|(_, n)| Some(*n) == name).map_or(0, |((msb, _), _)| *msb)
}

fn reverb<E: SynthEngine>(ctx: &mut SysExContext<'_, E>, lo: u8, data: &[u8]) -> Result<Written> {
    let v = data[0];
    let value = f32::from(v);
    let bus = BusKind::Reverb;
    match lo {
        0x00 => set_type(ctx, bus, &REVERB_TYPES, data),
        0x01 => {
            let msb = current_type_msb(ctx, bus, &REVERB_TYPES);
            set_type(ctx, bus, &REVERB_TYPES, &[msb, v]).map(|(_, text)| (1, text))
        }
        0x02 => bus_param(ctx, bus, BusParam::DecayTime, xg_tables::lookup(&REVERB_TIME_S, v)),
        0x03 => bus_param(ctx, bus, BusParam::DecayDepth, value.min(10.0) / 10.0),
        // Initial delay 0.1..=99.3 ms over codes 0..=63.
        0x04 => bus_param(ctx, bus, BusParam::PreDelay, 0.1 + value.min(63.0) * 99.2 / 63.0),
        0x05 => bus_param(ctx, bus, BusParam::HighPass, xg_tables::lookup(&EQ_FREQUENCY_HZ, v)),
        0x06 => bus_param(ctx, bus, BusParam::Cutoff, xg_tables::lookup(&EQ_FREQUENCY_HZ, v)),
        0x07..=0x09 => {
            let msb = current_type_msb(ctx, bus, &REVERB_TYPES);
            if !ROOM_SIMULATIONS.contains(&msb) {
                return Err(unsupported(format!("XG reverb parameter {} for this type", lo - 0x01)));
            }
            let metres = xg_tables::lookup(&ROOM_DIMENSION_M, v);
            if lo == 0x07 {
                bus_param(ctx, bus, BusParam::RoomSize, metres)
            } else {
                // Height and depth have no engine counterpart.
                let which = if lo == 0x08 { "height" } else { "depth" };
                Ok((1, format!("XG reverb room {which} {metres} m (not applied)")))
            }
        }
        0x0B => bus_param(ctx, bus, BusParam::Mix, value / 127.0),
        0x0C => bus_param(ctx, bus, BusParam::Level, value / 127.0),
        0x0D => bus_param(ctx, bus, BusParam::Pan, (f32::from(centred(v)) / 63.0).clamp(-1.0, 1.0)),
        0x10..=0x15 => Ok((1, format!("XG reverb parameter {} = {v} (not applied)", lo - 0x10 + 11))),
        _ => Err(unsupported(format!("XG reverb address 02 01 {lo:02X}"))),
    }
}

fn chorus<E: SynthEngine>(ctx: &mut SysExContext<'_, E>, lo: u8, data: &[u8]) -> Result<Written> {
    let v = data[0];
    let value = f32::from(v);
    let bus = BusKind::Chorus;
    match lo {
        0x20 => set_type(ctx, bus, &CHORUS_TYPES, data),
        0x21 => {
            let msb = current_type_msb(ctx, bus, &CHORUS_TYPES);
            set_type(ctx, bus, &CHORUS_TYPES, &[msb, v]).map(|(_, text)| (1, text))
        }
        0x22 => bus_param(ctx, bus, BusParam::Rate, xg_tables::lookup(&LFO_FREQUENCY_HZ, v)),
        0x23 => bus_param(ctx, bus, BusParam::Depth, value / 127.0),
        0x24 => bus_param(ctx, bus, BusParam::Feedback, f32::from(centred(v)) / 64.0),
        0x25 => bus_param(ctx, bus, BusParam::DelayTime, xg_tables::lookup(&DELAY_OFFSET_MS, v)),
        0x27 => bus_param(ctx, bus, BusParam::HighPass, xg_tables::lookup(&EQ_FREQUENCY_HZ, v)),
        0x29 => bus_param(ctx, bus, BusParam::Cutoff, xg_tables::lookup(&EQ_FREQUENCY_HZ, v)),
        0x2B => bus_param(ctx, bus, BusParam::Mix, value / 127.0),
        0x2C => bus_param(ctx, bus, BusParam::Level, value / 127.0),
        0x2D => bus_param(ctx, bus, BusParam::Pan, (f32::from(centred(v)) / 63.0).clamp(-1.0, 1.0)),
        0x2E => bus_param(ctx, bus, BusParam::SendToReverb, value / 127.0),
        0x26 | 0x28 | 0x2A | 0x30..=0x35 => Ok((1, format!("XG chorus address {lo:02X} = {v} (not applied)"))),
        _ => Err(unsupported(format!("XG chorus address 02 01 {lo:02X}"))),
    }
}

fn variation<E: SynthEngine>(ctx: &mut SysExContext<'_, E>, lo: u8, data: &[u8]) -> Result<Written> {
    let v = data[0];
    let value = f32::from(v);
    let bus = BusKind::Delay;
    match lo {
        0x40 => set_type(ctx, bus, &VARIATION_TYPES, data),
        0x41 => {
            let msb = current_type_msb(ctx, bus, &VARIATION_TYPES);
            set_type(ctx, bus, &VARIATION_TYPES, &[msb, v]).map(|(_, text)| (1, text))
        }
        // Parameters 1-10 are 14-bit, MSB first.
        0x42..=0x55 => {
            let index = (lo - 0x42) / 2 + 1;
            if (lo - 0x42) % 2 == 1 {
                return Err(unsupported(format!("XG variation parameter {index} LSB alone")));
            }
            let Some(&lsb) = data.get(1) else {
                return Err(unsupported(format!("XG variation parameter {index} without LSB")));
            };
            let raw = (u16::from(v) << 7) | u16::from(lsb);
            let (_, text) = match index {
                1 => bus_param(ctx, bus, BusParam::DelayTime, f32::from(raw) / 10.0)?,
                5 => bus_param(ctx, bus, BusParam::Feedback, (f32::from(raw) - 64.0) / 64.0)?,
                10 => bus_param(ctx, bus, BusParam::Mix, f32::from(raw) / 127.0)?,
                _ => (1, format!("XG variation parameter {index} = {raw} (not applied)")),
            };
            Ok((2, text))
        }
        0x56 => bus_param(ctx, bus, BusParam::Level, value / 127.0),
        0x57 => bus_param(ctx, bus, BusParam::Pan, (f32::from(centred(v)) / 63.0).clamp(-1.0, 1.0)),
        0x58 => bus_param(ctx, bus, BusParam::SendToReverb, value / 127.0),
        0x59 => bus_param(ctx, bus, BusParam::SendToChorus, value / 127.0),
        _ => Err(unsupported(format!("XG variation address 02 01 {lo:02X}"))),
    }
}

fn equalizer<E: SynthEngine>(ctx: &mut SysExContext<'_, E>, lo: u8, v: u8) -> Result<String> {
    let gain = f32::from(centred(v).clamp(-12, 12));
    let frequency = xg_tables::lookup(&EQ_FREQUENCY_HZ, v);
    match lo {
        0x00 => return Ok(format!("XG multi EQ type {v} (not applied)")),
        0x01 => ctx.channels.update_equalizer(|eq| eq.low_gain_db = gain),
        0x02 => ctx.channels.update_equalizer(|eq| eq.low_freq_hz = frequency),
        0x11 => ctx.channels.update_equalizer(|eq| eq.high_gain_db = gain),
        0x12 => ctx.channels.update_equalizer(|eq| eq.high_freq_hz = frequency),
        _ => return Err(unsupported(format!("XG multi EQ address 02 40 {lo:02X}"))),
    }
    let eq = ctx.channels.equalizer();
    Ok(format!(
        "XG EQ low {} Hz {:+} dB, high {} Hz {:+} dB",
        eq.low_freq_hz, eq.low_gain_db, eq.high_freq_hz, eq.high_gain_db
    ))
}

fn insertion<E: SynthEngine>(ctx: &mut SysExContext<'_, E>, lo: u8, v: u8) -> Result<String> {
    match lo {
        0x00 => ctx.channels.update_insertion(|efx| efx.kind = (u16::from(v) << 8) | (efx.kind & 0xFF)),
        0x01 => ctx.channels.update_insertion(|efx| efx.kind = (efx.kind & 0xFF00) | u16::from(v)),
        0x02..=0x0B => ctx.channels.update_insertion(|efx| efx.params[usize::from(lo - 0x02)] = v),
        0x0C => ctx.channels.update_insertion(|efx| {
            efx.parts.clear();
            if v < 0x10 {
                efx.parts.insert(v);
            }
        }),
        0x20..=0x25 => ctx.channels.update_insertion(|efx| efx.params[usize::from(lo - 0x20) + 10] = v),
        _ => return Err(unsupported(format!("XG insertion address 03 00 {lo:02X}"))),
    }
    Ok(format!("XG insertion {lo:02X} = {v}"))
}

fn multi_part<E: SynthEngine>(ctx: &mut SysExContext<'_, E>, channel: u8, lo: u8, data: &[u8]) -> Result<Written> {
    let v = data[0];
    let label = channel + 1;
    match lo {
        0x01 => {
            let ch = ctx.channels.channel(channel);
            let ((_, lsb), program) = (ch.requested_bank, ch.program);
            ctx.channels.program_change(channel, v, lsb, program);
            Ok((1, format!("XG part {label} bank MSB {v}")))
        }
        0x02 => {
            let ch = ctx.channels.channel(channel);
            let ((msb, _), program) = (ch.requested_bank, ch.program);
            ctx.channels.program_change(channel, msb, v, program);
            Ok((1, format!("XG part {label} bank LSB {v}")))
        }
        0x03 => {
            let (msb, lsb) = ctx.channels.channel(channel).requested_bank;
            ctx.channels.program_change(channel, msb, lsb, v);
            Ok((1, format!("XG part {label} program {v}")))
        }
        0x04 => {
            let on = v == channel;
            if v < 0x10 && !on {
                return Err(unsupported(format!("XG part {label} receive channel {}", v + 1)));
            }
            ctx.channels.set_part_param(channel, PartParam::Receive(ReceiveFlags::all(), on));
            Ok((1, format!("XG part {label} rcv channel {}", if on { "own" } else { "off" })))
        }
        0x05 => set(ctx, channel, v, PartParam::Mono(v == 0), "mono/poly"),
        0x07 => {
            let setup = match v {
                0 => None,
                1 => Some(0),
                2..=5 => Some(v - 2),
                _ => return Err(unsupported(format!("XG part {label} part mode {v}"))),
            };
            ctx.channels.set_rhythm_part(channel, setup);
            Ok((1, format!("XG part {label} part mode {v}")))
        }
        0x08 => set(ctx, channel, v, PartParam::KeyShift(centred(v).clamp(-24, 24)), "note shift"),
        0x0B => set(ctx, channel, v, PartParam::Volume(v), "volume"),
        0x0C => set(ctx, channel, v, PartParam::VelocitySenseDepth(v), "velocity sense depth"),
        0x0D => set(ctx, channel, v, PartParam::VelocitySenseOffset(v), "velocity sense offset"),
        0x0E if v == 0 => Err(unsupported(format!("XG part {label} random pan"))),
        0x0E => set(ctx, channel, v, PartParam::Pan(v), "pan"),
        0x0F => set(ctx, channel, v, PartParam::KeyRangeLow(v), "note limit low"),
        0x10 => set(ctx, channel, v, PartParam::KeyRangeHigh(v), "note limit high"),
        0x12 => {
            ctx.channels.set_chorus_level(channel, v);
            Ok((1, format!("XG part {label} chorus send {v}")))
        }
        0x13 => {
            ctx.channels.set_reverb_level(channel, v);
            Ok((1, format!("XG part {label} reverb send {v}")))
        }
        0x14 => {
            ctx.channels.set_delay_level(channel, v);
            Ok((1, format!("XG part {label} variation send {v}")))
        }
        0x15 => set(ctx, channel, v, PartParam::VibratoRate(v), "vibrato rate"),
        0x16 => set(ctx, channel, v, PartParam::VibratoDepth(v), "vibrato depth"),
        0x17 => set(ctx, channel, v, PartParam::VibratoDelay(v), "vibrato delay"),
        0x18 => set(ctx, channel, v, PartParam::FilterCutoff(v), "filter cutoff"),
        0x19 => set(ctx, channel, v, PartParam::FilterResonance(v), "filter resonance"),
        0x1A => set(ctx, channel, v, PartParam::Attack(v), "EG attack"),
        0x1B => set(ctx, channel, v, PartParam::Decay(v), "EG decay"),
        0x1C => set(ctx, channel, v, PartParam::Release(v), "EG release"),
        0x23 => {
            let semitones = v.saturating_sub(0x40).min(24);
            ctx.channels.set_part_param(channel, PartParam::BendRange { semitones, cents: 0 });
            Ok((1, format!("XG part {label} bend pitch control {semitones} semitones")))
        }
        0x30..=0x3F => {
            let (flag, name) = RECEIVE_SWITCHES[usize::from(lo - 0x30)];
            set(ctx, channel, v, PartParam::Receive(flag, v != 0), &format!("rcv {name}"))
        }
        0x40 => set(ctx, channel, v, PartParam::Receive(ReceiveFlags::BANK_SELECT, v != 0), "rcv bank select"),
        0x41..=0x4C => {
            set(ctx, channel, v, PartParam::ScaleTuning { pitch_class: lo - 0x41, cents: centred(v) }, "scale tuning")
        }
        _ => Err(unsupported(format!("XG multi part address 08 {channel:02X} {lo:02X}"))),
    }
}

fn set<E: SynthEngine>(ctx: &mut SysExContext<'_, E>, channel: u8, v: u8, param: PartParam, what: &str) -> Result<Written> {
    ctx.channels.set_part_param(channel, param);
    Ok((1, format!("XG part {} {what} {v}", channel + 1)))
}

fn drum<E: SynthEngine>(ctx: &mut SysExContext<'_, E>, setup: u8, key: u8, param: u8, v: u8) -> Result<String> {
    let drum_param = match param {
        0x00 => DrumParam::PitchCoarse(v),
        0x02 => DrumParam::Level(v),
        0x03 => DrumParam::AssignGroup(v),
        0x09 => DrumParam::ReceiveNoteOff(v != 0),
        0x0A => DrumParam::ReceiveNoteOn(v != 0),
        _ => return Err(unsupported(format!("XG drum setup parameter {param:02X} (key {key})"))),
    };
    ctx.channels.set_drum_param(setup, key, drum_param);
    Ok(format!("XG drum setup {} key {key} {drum_param:?}", setup + 1))
}
