//! Universal SysEx: GM/GM2 system on and the device-control messages.

use super::SysExContext;
use crate::channel::effects::{BusKind, BusParam, EffectPreset};
use crate::dialect::Dialect;
use crate::error::{Result, unsupported};
use crate::synth::{MasterParam, SynthEngine};

const GM2_REVERB_TYPES: [(u8, &str); 6] = [
    (0, "Small Room"),
    (1, "Medium Room"),
    (2, "Large Room"),
    (3, "Medium Hall"),
    (4, "Large Hall"),
    (8, "Plate"),
];

const GM2_CHORUS_TYPES: [&str; 6] = ["Chorus 1", "Chorus 2", "Chorus 3", "Chorus 4", "FB Chorus", "Flanger"];

pub(crate) fn decode<E: SynthEngine>(payload: &[u8], ctx: &mut SysExContext<'_, E>) -> Result<String> {
    let [kind, _device, sub_id1, sub_id2, data @ ..] = payload else {
        return Err(unsupported("truncated universal SysEx"));
    };
    match (*kind, *sub_id1, *sub_id2) {
        (0x7E, 0x09, 0x01) => Ok(system_on(ctx, Dialect::Gm1)),
        (0x7E, 0x09, 0x02) => {
            let dialect = ctx.channels.reset(Dialect::Unset);
            Ok(format!("GM System Off (staying in {dialect})"))
        }
        (0x7E, 0x09, 0x03) => Ok(system_on(ctx, Dialect::Gm2)),
        (0x7F, 0x04, 0x01) => {
            let value = fourteen_bit(data)?;
            let volume = f32::from(value) / 16383.0;
            ctx.channels.set_master(MasterParam::Volume, volume);
            Ok(format!("Master Volume {:.0}%", volume * 100.0))
        }
        (0x7F, 0x04, 0x02) => {
            let value = fourteen_bit(data)?;
            let balance = ((f32::from(value) - 8192.0) / 8192.0).clamp(-1.0, 1.0);
            ctx.channels.set_master(MasterParam::Balance, balance);
            Ok(format!("Master Balance {balance:+.2}"))
        }
        (0x7F, 0x04, 0x03) => {
            let value = fourteen_bit(data)?;
            let cents = (f32::from(value) - 8192.0) / 8192.0 * 100.0;
            ctx.channels.set_master(MasterParam::Tuning, cents);
            Ok(format!("Master Fine Tuning {cents:+.1} cents"))
        }
        (0x7F, 0x04, 0x04) => {
            let [_, msb, ..] = data else {
                return Err(unsupported("truncated master coarse tuning"));
            };
            let semitones = i32::from(*msb) - 64;
            ctx.channels.set_master(MasterParam::KeyShift, semitones as f32);
            Ok(format!("Master Coarse Tuning {semitones:+} semitones"))
        }
        (0x7F, 0x04, 0x05) => global_parameter(data, ctx),
        (kind, a, b) => Err(unsupported(format!("universal SysEx {kind:02X} {a:02X} {b:02X}"))),
    }
}

/// Little-endian 14-bit value (LSB first), as the device-control messages use.
fn fourteen_bit(data: &[u8]) -> Result<u16> {
    match data {
        [lsb, msb, ..] => Ok(u16::from(*lsb) | (u16::from(*msb) << 7)),
        _ => Err(unsupported("truncated device control message")),
    }
}

fn system_on<E: SynthEngine>(ctx: &mut SysExContext<'_, E>, requested: Dialect) -> String {
    let dialect = ctx.channels.reset(requested);
    let (vendor, reverb, chorus) = match requested {
        Dialect::Gm2 => ("gm2", "Large Hall", "Chorus 3"),
        _ => ("gm", "Hall", "Chorus"),
    };
    ctx.channels.set_bus_preset(EffectPreset::new(BusKind::Reverb, vendor, reverb));
    ctx.channels.set_bus_preset(EffectPreset::new(BusKind::Chorus, vendor, chorus));
    let name = if requested == Dialect::Gm2 { "GM2 System On" } else { "GM System On" };
    if dialect == requested {
        name.to_string()
    } else {
        format!("{name} (staying in {dialect})")
    }
}

/// Global Parameter Control (`7F dev 04 05`): slot path, then
/// parameter/value pairs of the declared widths.
fn global_parameter<E: SynthEngine>(data: &[u8], ctx: &mut SysExContext<'_, E>) -> Result<String> {
    let [slot_len, param_width, value_width, rest @ ..] = data else {
        return Err(unsupported("truncated global parameter control"));
    };
    let slot_bytes = usize::from(*slot_len) * 2;
    let (pw, vw) = (usize::from(*param_width), usize::from(*value_width));
    if pw == 0 || vw == 0 || rest.len() < slot_bytes {
        return Err(unsupported("malformed global parameter control"));
    }
    let (slot, mut body) = rest.split_at(slot_bytes);
    let bus = match slot {
        [0x01, 0x01] => BusKind::Reverb,
        [0x01, 0x02] => BusKind::Chorus,
        _ => return Err(unsupported(format!("global parameter slot {slot:02X?}"))),
    };

    let mut applied = Vec::new();
    while body.len() >= pw + vw {
        let (param, rest) = body.split_at(pw);
        let (value, rest) = rest.split_at(vw);
        body = rest;
        applied.push(global_value(ctx, bus, param[0], value[0])?);
    }
    if applied.is_empty() {
        return Err(unsupported("global parameter control without values"));
    }
    Ok(applied.join("; "))
}

fn global_value<E: SynthEngine>(ctx: &mut SysExContext<'_, E>, bus: BusKind, param: u8, v: u8) -> Result<String> {
    let value = f32::from(v);
    match (bus, param) {
        (BusKind::Reverb, 0) => {
            let Some((_, name)) = GM2_REVERB_TYPES.iter().find(|(code, _)| *code == v) else {
                return Err(unsupported(format!("GM2 reverb type {v}")));
            };
            ctx.channels.set_bus_preset(EffectPreset::new(bus, "gm2", name));
            Ok(format!("GM2 Reverb Type {name}"))
        }
        (BusKind::Reverb, 1) => {
            let seconds = ((value - 40.0) * 0.025).exp();
            ctx.channels.set_bus_param(bus, BusParam::DecayTime, seconds);
            Ok(format!("GM2 Reverb Time {seconds:.2} s"))
        }
        (BusKind::Chorus, 0) => {
            let Some(name) = GM2_CHORUS_TYPES.get(usize::from(v)) else {
                return Err(unsupported(format!("GM2 chorus type {v}")));
            };
            ctx.channels.set_bus_preset(EffectPreset::new(bus, "gm2", name));
            Ok(format!("GM2 Chorus Type {name}"))
        }
        (BusKind::Chorus, 1) => {
            let hz = value * 0.122;
            ctx.channels.set_bus_param(bus, BusParam::Rate, hz);
            Ok(format!("GM2 Chorus Mod Rate {hz:.2} Hz"))
        }
        (BusKind::Chorus, 2) => {
            let ms = (value + 1.0) / 3.2;
            ctx.channels.set_bus_param(bus, BusParam::Depth, ms);
            Ok(format!("GM2 Chorus Mod Depth {ms:.2} ms"))
        }
        (BusKind::Chorus, 3) => {
            let percent = value * 0.763;
            ctx.channels.set_bus_param(bus, BusParam::Feedback, percent / 100.0);
            Ok(format!("GM2 Chorus Feedback {percent:.1}%"))
        }
        (BusKind::Chorus, 4) => {
            let percent = value * 0.787;
            ctx.channels.set_bus_param(bus, BusParam::SendToReverb, percent / 100.0);
            Ok(format!("GM2 Chorus Send to Reverb {percent:.1}%"))
        }
        _ => Err(unsupported(format!("GM2 {bus} parameter {param}"))),
    }
}
