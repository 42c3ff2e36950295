//! Roland GS data-set (DT1) messages.
//!
//! `41 dev 42 12 hh mm ll data.. sum`. The checksum covers the address and
//! data; a message whose checksum does not match is rejected before any of
//! it is applied.

use super::{RECEIVE_SWITCHES, SysExContext, Written, ascii_text, centred, walk, xg_tables};
use crate::channel::effects::{BusKind, BusParam, EffectPreset};
use crate::channel::state::{DrumParam, PartParam, ReceiveFlags};
use crate::dialect::Dialect;
use crate::error::{MidiError, Result, unsupported};
use crate::synth::{MasterParam, SynthEngine};

const MODEL_GS: u8 = 0x42;
const MODEL_SC_DISPLAY: u8 = 0x45;
const COMMAND_DATA_SET: u8 = 0x12;

pub const REVERB_MACROS: [&str; 8] =
    ["Room 1", "Room 2", "Room 3", "Hall 1", "Hall 2", "Plate", "Delay", "Panning Delay"];
pub const CHORUS_MACROS: [&str; 8] = [
    "Chorus 1",
    "Chorus 2",
    "Chorus 3",
    "Chorus 4",
    "Feedback Chorus",
    "Flanger",
    "Short Delay",
    "Short Delay (FB)",
];
pub const DELAY_MACROS: [&str; 10] = [
    "Delay 1",
    "Delay 2",
    "Delay 3",
    "Delay 4",
    "Pan Delay 1",
    "Pan Delay 2",
    "Pan Delay 3",
    "Pan Delay 4",
    "Delay to Reverb",
    "Pan Repeat",
];

/// `(128 - sum % 128) % 128` over address and data bytes.
pub fn checksum(bytes: &[u8]) -> u8 {
    let sum: u32 = bytes.iter().map(|&b| u32::from(b)).sum();
    ((128 - sum % 128) % 128) as u8
}

/// Part block (low nibble of the address middle byte) to MIDI channel.
/// Block 0 is the rhythm part on channel 10.
pub fn part_channel(block: u8) -> u8 {
    match block & 0x0F {
        0 => 9,
        b @ 1..=9 => b - 1,
        b => b,
    }
}

/// SC-88 delay time in ms for data 0x01..=0x73; piecewise linear.
pub fn delay_time_ms(value: u8) -> f32 {
    const SEGMENTS: [(u8, f32, f32); 9] = [
        (0x01, 0.1, 0.1),
        (0x14, 2.0, 0.2),
        (0x23, 5.0, 0.5),
        (0x2D, 10.0, 1.0),
        (0x37, 20.0, 2.0),
        (0x46, 50.0, 5.0),
        (0x50, 100.0, 10.0),
        (0x5A, 200.0, 20.0),
        (0x69, 500.0, 50.0),
    ];
    let value = value.clamp(0x01, 0x73);
    let (start, base, step) = SEGMENTS.iter().rev().find(|(start, _, _)| value >= *start).copied().unwrap_or(SEGMENTS[0]);
    base + f32::from(value - start) * step
}

pub(crate) fn decode<E: SynthEngine>(payload: &[u8], ctx: &mut SysExContext<'_, E>) -> Result<String> {
    let [_, device, model, command, body @ ..] = payload else {
        return Err(unsupported("truncated Roland SysEx"));
    };
    if *device > 0x1F && *device != 0x7F {
        return Err(unsupported(format!("Roland device id {device:#04x}")));
    }
    if *command != COMMAND_DATA_SET {
        return Err(unsupported(format!("Roland command {command:#04x}")));
    }
    let [hi, mid, lo, data @ .., sum] = body else {
        return Err(unsupported("truncated Roland data set"));
    };
    if data.is_empty() {
        return Err(unsupported("Roland data set without data"));
    }
    let expected = checksum(&body[..body.len() - 1]);
    if expected != *sum {
        return Err(MidiError::ChecksumMismatch { expected, found: *sum });
    }

    match *model {
        MODEL_GS => walk([*hi, *mid, *lo], data, |address, data| write(ctx, address, data)),
        MODEL_SC_DISPLAY => display(ctx, [*hi, *mid, *lo], data),
        other => Err(unsupported(format!("Roland model {other:#04x}"))),
    }
}

fn display<E: SynthEngine>(ctx: &mut SysExContext<'_, E>, address: [u8; 3], data: &[u8]) -> Result<String> {
    match address {
        [0x10, 0x00, 0x00] => {
            let text = ascii_text(data);
            ctx.display.set_panel_text(Dialect::Gs, text.clone());
            Ok(format!("GS Display \"{text}\""))
        }
        [a, b, c] => Err(unsupported(format!("SC display address {a:02X} {b:02X} {c:02X}"))),
    }
}

fn reset<E: SynthEngine>(ctx: &mut SysExContext<'_, E>) -> String {
    let dialect = ctx.channels.reset(Dialect::Gs);
    ctx.channels.set_bus_preset(EffectPreset::new(BusKind::Reverb, "gs", REVERB_MACROS[4]));
    ctx.channels.set_bus_preset(EffectPreset::new(BusKind::Chorus, "gs", CHORUS_MACROS[2]));
    ctx.channels.set_bus_preset(EffectPreset::new(BusKind::Delay, "gs", DELAY_MACROS[0]));
    format!("GS Reset ({dialect})")
}

fn write<E: SynthEngine>(ctx: &mut SysExContext<'_, E>, address: [u8; 3], data: &[u8]) -> Result<Written> {
    let v = data[0];
    match address {
        [0x40, 0x00, 0x7F] | [0x00, 0x00, 0x7F] => Ok((1, reset(ctx))),
        [0x40, 0x00, 0x00] if data.len() >= 4 => {
            let nibbles = data[..4].iter().fold(0u16, |acc, &n| (acc << 4) | u16::from(n & 0x0F));
            let cents = (f32::from(nibbles) - 1024.0) / 10.0;
            ctx.channels.set_master(MasterParam::Tuning, cents);
            Ok((4, format!("GS Master Tune {cents:+.1} cents")))
        }
        [0x40, 0x00, 0x04] => {
            ctx.channels.set_master(MasterParam::Volume, f32::from(v) / 127.0);
            Ok((1, format!("GS Master Volume {v}")))
        }
        [0x40, 0x00, 0x05] => {
            let shift = centred(v).clamp(-24, 24);
            ctx.channels.set_master(MasterParam::KeyShift, f32::from(shift));
            Ok((1, format!("GS Master Key Shift {shift:+}")))
        }
        [0x40, 0x00, 0x06] => {
            let balance = (f32::from(centred(v)) / 63.0).clamp(-1.0, 1.0);
            ctx.channels.set_master(MasterParam::Balance, balance);
            Ok((1, format!("GS Master Pan {balance:+.2}")))
        }
        [0x40, 0x01, lo @ 0x30..=0x5A] => effect(ctx, lo, v).map(|text| (1, text)),
        [0x40, 0x02, lo @ 0x00..=0x03] => Ok((1, equalizer(ctx, lo, v))),
        [0x40, 0x03, lo] => insertion(ctx, lo, data),
        [0x40, mid @ 0x10..=0x1F, lo] => part(ctx, part_channel(mid), lo, data),
        [0x40, mid @ 0x20..=0x2F, lo] => part_controller(ctx, part_channel(mid), lo, v).map(|text| (1, text)),
        [0x40, mid @ 0x40..=0x4F, 0x22] => {
            let channel = part_channel(mid);
            ctx.channels.update_insertion(|efx| {
                if v == 0 {
                    efx.parts.remove(&channel);
                } else {
                    efx.parts.insert(channel);
                }
            });
            Ok((1, format!("GS part {} EFX {}", channel + 1, if v == 0 { "bypass" } else { "on" })))
        }
        [0x41, mid, key] => drum(ctx, mid >> 4, mid & 0x0F, key, data),
        [a, b, c] => Err(unsupported(format!("GS address {a:02X} {b:02X} {c:02X}"))),
    }
}

fn set_macro<E: SynthEngine>(ctx: &mut SysExContext<'_, E>, bus: BusKind, names: &[&str], v: u8) -> Result<String> {
    let Some(name) = names.get(usize::from(v)) else {
        return Err(unsupported(format!("GS {bus} macro {v}")));
    };
    ctx.channels.set_bus_preset(EffectPreset::new(bus, "gs", name));
    Ok(format!("GS {bus} {name}"))
}

fn bus_param<E: SynthEngine>(ctx: &mut SysExContext<'_, E>, bus: BusKind, param: BusParam, value: f32) -> Result<String> {
    ctx.channels.set_bus_param(bus, param, value);
    Ok(format!("GS {bus} {param:?} {value:.3}"))
}

fn effect<E: SynthEngine>(ctx: &mut SysExContext<'_, E>, lo: u8, v: u8) -> Result<String> {
    let value = f32::from(v);
    match lo {
        0x30 | 0x31 => set_macro(ctx, BusKind::Reverb, &REVERB_MACROS, v),
        0x33 => bus_param(ctx, BusKind::Reverb, BusParam::Level, value / 127.0),
        0x34 => bus_param(ctx, BusKind::Reverb, BusParam::DecayTime, ((value - 40.0) * 0.025).exp()),
        0x35 => bus_param(ctx, BusKind::Reverb, BusParam::Feedback, value / 127.0),
        0x37 => bus_param(ctx, BusKind::Reverb, BusParam::PreDelay, value),
        0x38 => set_macro(ctx, BusKind::Chorus, &CHORUS_MACROS, v),
        0x3A => bus_param(ctx, BusKind::Chorus, BusParam::Level, value / 127.0),
        0x3B => bus_param(ctx, BusKind::Chorus, BusParam::Feedback, value / 127.0),
        0x3C => bus_param(ctx, BusKind::Chorus, BusParam::DelayTime, xg_tables::lookup(&xg_tables::DELAY_OFFSET_MS, v)),
        0x3D => bus_param(ctx, BusKind::Chorus, BusParam::Rate, value * 0.122),
        0x3E => bus_param(ctx, BusKind::Chorus, BusParam::Depth, (value + 1.0) / 3.2),
        0x3F => bus_param(ctx, BusKind::Chorus, BusParam::SendToReverb, value / 127.0),
        0x50 => set_macro(ctx, BusKind::Delay, &DELAY_MACROS, v),
        0x52 => bus_param(ctx, BusKind::Delay, BusParam::DelayTime, delay_time_ms(v)),
        0x58 => bus_param(ctx, BusKind::Delay, BusParam::Level, value / 127.0),
        0x59 => bus_param(ctx, BusKind::Delay, BusParam::Feedback, f32::from(centred(v)) / 64.0),
        0x5A => bus_param(ctx, BusKind::Delay, BusParam::SendToReverb, value / 127.0),
        _ => Err(unsupported(format!("GS effect parameter 40 01 {lo:02X}"))),
    }
}

fn equalizer<E: SynthEngine>(ctx: &mut SysExContext<'_, E>, lo: u8, v: u8) -> String {
    let gain = f32::from(centred(v).clamp(-12, 12));
    ctx.channels.update_equalizer(|eq| match lo {
        0x00 => eq.low_freq_hz = if v == 0 { 200.0 } else { 400.0 },
        0x01 => eq.low_gain_db = gain,
        0x02 => eq.high_freq_hz = if v == 0 { 3000.0 } else { 6000.0 },
        _ => eq.high_gain_db = gain,
    });
    let eq = ctx.channels.equalizer();
    format!(
        "GS EQ low {} Hz {:+} dB, high {} Hz {:+} dB",
        eq.low_freq_hz, eq.low_gain_db, eq.high_freq_hz, eq.high_gain_db
    )
}

fn insertion<E: SynthEngine>(ctx: &mut SysExContext<'_, E>, lo: u8, data: &[u8]) -> Result<Written> {
    let v = data[0];
    match lo {
        0x00 => {
            let lsb = data.get(1).copied();
            ctx.channels.update_insertion(|efx| {
                efx.kind = (u16::from(v) << 8) | lsb.map_or(efx.kind & 0xFF, u16::from);
            });
            let kind = ctx.channels.insertion().kind;
            Ok((1 + usize::from(lsb.is_some()), format!("GS EFX type {:02X} {:02X}", kind >> 8, kind & 0xFF)))
        }
        0x01 => {
            ctx.channels.update_insertion(|efx| efx.kind = (efx.kind & 0xFF00) | u16::from(v));
            Ok((1, format!("GS EFX type LSB {v:02X}")))
        }
        0x03..=0x16 => {
            let index = usize::from(lo - 0x03);
            ctx.channels.update_insertion(|efx| efx.params[index] = v);
            Ok((1, format!("GS EFX parameter {} = {v}", index + 1)))
        }
        0x17 => {
            ctx.channels.update_insertion(|efx| efx.send_reverb = v);
            Ok((1, format!("GS EFX send to reverb {v}")))
        }
        0x18 => {
            ctx.channels.update_insertion(|efx| efx.send_chorus = v);
            Ok((1, format!("GS EFX send to chorus {v}")))
        }
        0x19 => {
            ctx.channels.update_insertion(|efx| efx.send_delay = v);
            Ok((1, format!("GS EFX send to delay {v}")))
        }
        _ => Err(unsupported(format!("GS EFX parameter 40 03 {lo:02X}"))),
    }
}

fn part<E: SynthEngine>(ctx: &mut SysExContext<'_, E>, channel: u8, lo: u8, data: &[u8]) -> Result<Written> {
    let v = data[0];
    let label = channel + 1;
    match lo {
        0x00 => {
            let current = ctx.channels.channel(channel);
            let (_, lsb) = current.requested_bank;
            let program = data.get(1).copied();
            let program_number = program.unwrap_or(current.program);
            ctx.channels.program_change(channel, v, lsb, program_number);
            Ok((
                1 + usize::from(program.is_some()),
                format!("GS part {label} tone {v}:{program_number}"),
            ))
        }
        0x01 => {
            let (msb, lsb) = ctx.channels.channel(channel).requested_bank;
            ctx.channels.program_change(channel, msb, lsb, v);
            Ok((1, format!("GS part {label} program {v}")))
        }
        0x02 => {
            let on = v == channel;
            if v < 0x10 && !on {
                return Err(unsupported(format!("GS part {label} receive channel {}", v + 1)));
            }
            ctx.channels.set_part_param(channel, PartParam::Receive(ReceiveFlags::all(), on));
            Ok((1, format!("GS part {label} rx channel {}", if on { "own" } else { "off" })))
        }
        0x03..=0x12 => {
            let (flag, name) = RECEIVE_SWITCHES[usize::from(lo - 0x03)];
            ctx.channels.set_part_param(channel, PartParam::Receive(flag, v != 0));
            Ok((1, format!("GS part {label} rx {name} {}", if v != 0 { "on" } else { "off" })))
        }
        0x13 => set(ctx, channel, v, PartParam::Mono(v == 0), "mono/poly"),
        // Single/limited/full multi assign is not modelled; notes always retrigger.
        0x14 => Ok((1, format!("GS part {label} assign mode {v} (not applied)"))),
        0x15 => {
            let setup = match v {
                0 => None,
                1 | 2 => Some(v - 1),
                _ => return Err(unsupported(format!("GS part {label} rhythm mode {v}"))),
            };
            ctx.channels.set_rhythm_part(channel, setup);
            Ok((1, format!("GS part {label} use for rhythm {v}")))
        }
        0x16 => set(ctx, channel, v, PartParam::KeyShift(centred(v).clamp(-24, 24)), "key shift"),
        0x19 => set(ctx, channel, v, PartParam::Volume(v), "level"),
        0x1A => set(ctx, channel, v, PartParam::VelocitySenseDepth(v), "velocity sense depth"),
        0x1B => set(ctx, channel, v, PartParam::VelocitySenseOffset(v), "velocity sense offset"),
        0x1C => set(ctx, channel, v, PartParam::Pan(v), "pan"),
        0x1D => set(ctx, channel, v, PartParam::KeyRangeLow(v), "key range low"),
        0x1E => set(ctx, channel, v, PartParam::KeyRangeHigh(v), "key range high"),
        0x21 => {
            ctx.channels.set_chorus_level(channel, v);
            Ok((1, format!("GS part {label} chorus send {v}")))
        }
        0x22 => {
            ctx.channels.set_reverb_level(channel, v);
            Ok((1, format!("GS part {label} reverb send {v}")))
        }
        0x2C => {
            ctx.channels.set_delay_level(channel, v);
            Ok((1, format!("GS part {label} delay send {v}")))
        }
        0x23 => set(ctx, channel, v, PartParam::Receive(ReceiveFlags::BANK_SELECT_MSB, v != 0), "rx bank select MSB"),
        0x24 => set(ctx, channel, v, PartParam::Receive(ReceiveFlags::BANK_SELECT_LSB, v != 0), "rx bank select LSB"),
        0x2A if data.len() >= 2 => {
            let value = (u16::from(v) << 7) | u16::from(data[1]);
            let cents = (f32::from(value) - 8192.0) / 8192.0 * 100.0;
            ctx.channels.set_part_param(channel, PartParam::FineTune { cents });
            Ok((2, format!("GS part {label} fine tune {cents:+.1} cents")))
        }
        0x30 => set(ctx, channel, v, PartParam::VibratoRate(v), "vibrato rate"),
        0x31 => set(ctx, channel, v, PartParam::VibratoDepth(v), "vibrato depth"),
        0x32 => set(ctx, channel, v, PartParam::FilterCutoff(v), "TVF cutoff"),
        0x33 => set(ctx, channel, v, PartParam::FilterResonance(v), "TVF resonance"),
        0x34 => set(ctx, channel, v, PartParam::Attack(v), "TVF&TVA attack"),
        0x35 => set(ctx, channel, v, PartParam::Decay(v), "TVF&TVA decay"),
        0x36 => set(ctx, channel, v, PartParam::Release(v), "TVF&TVA release"),
        0x37 => set(ctx, channel, v, PartParam::VibratoDelay(v), "vibrato delay"),
        0x40..=0x4B => set(ctx, channel, v, PartParam::ScaleTuning { pitch_class: lo - 0x40, cents: centred(v) }, "scale tuning"),
        _ => Err(unsupported(format!("GS part parameter 40 1x {lo:02X}"))),
    }
}

fn set<E: SynthEngine>(ctx: &mut SysExContext<'_, E>, channel: u8, v: u8, param: PartParam, what: &str) -> Result<Written> {
    ctx.channels.set_part_param(channel, param);
    Ok((1, format!("GS part {} {what} {v}", channel + 1)))
}

fn part_controller<E: SynthEngine>(ctx: &mut SysExContext<'_, E>, channel: u8, lo: u8, v: u8) -> Result<String> {
    match lo {
        0x04 => {
            let cents = f32::from(v) * 600.0 / 127.0;
            ctx.channels.set_part_param(channel, PartParam::ModulationRange { cents });
            Ok(format!("GS part {} modulation depth {cents:.0} cents", channel + 1))
        }
        0x10 => {
            let semitones = v.saturating_sub(0x40).min(24);
            ctx.channels.set_part_param(channel, PartParam::BendRange { semitones, cents: 0 });
            Ok(format!("GS part {} bend range {semitones} semitones", channel + 1))
        }
        _ => Err(unsupported(format!("GS controller parameter 40 2x {lo:02X}"))),
    }
}

fn drum<E: SynthEngine>(ctx: &mut SysExContext<'_, E>, map: u8, param: u8, key: u8, data: &[u8]) -> Result<Written> {
    let v = data[0];
    let drum_param = match param {
        0x0 => {
            let name = ascii_text(&data[..data.len().min(12)]);
            return Ok((data.len().min(12), format!("GS drum map {} name \"{name}\"", map + 1)));
        }
        0x1 => DrumParam::PitchCoarse((64 + i16::from(v) - i16::from(key)).clamp(0, 127) as u8),
        0x2 => DrumParam::Level(v),
        0x3 => DrumParam::AssignGroup(v),
        0x7 => DrumParam::ReceiveNoteOff(v != 0),
        0x8 => DrumParam::ReceiveNoteOn(v != 0),
        _ => return Err(unsupported(format!("GS drum setup parameter {param:X} (key {key})"))),
    };
    if map > 1 {
        return Err(unsupported(format!("GS drum map {}", map + 1)));
    }
    ctx.channels.set_drum_param(map, key, drum_param);
    Ok((1, format!("GS drum map {} key {key} {drum_param:?}", map + 1)))
}
