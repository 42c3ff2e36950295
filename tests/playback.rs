use std::time::Duration;

use smfplay::bank::fallback::GM2_RHYTHM_BANK;
use smfplay::bank::{BankResolver, BankSet, PresetRef};
use smfplay::channel::ChannelManager;
use smfplay::channel::effects::{BusKind, BusParam};
use smfplay::dialect::Dialect;
use smfplay::midi::loader::MidiFile;
use smfplay::midi::player::Scheduler;
use smfplay::synth::RecordingEngine;
use smfplay::sysex::xg_tables::REVERB_TIME_S;

const END_OF_TRACK: [u8; 4] = [0x00, 0xFF, 0x2F, 0x00];

fn smf(format: u16, division: u16, tracks: &[Vec<u8>]) -> Vec<u8> {
    let mut out = b"MThd".to_vec();
    out.extend_from_slice(&6u32.to_be_bytes());
    out.extend_from_slice(&format.to_be_bytes());
    out.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
    out.extend_from_slice(&division.to_be_bytes());
    for track in tracks {
        out.extend_from_slice(b"MTrk");
        out.extend_from_slice(&(track.len() as u32).to_be_bytes());
        out.extend_from_slice(track);
    }
    out
}

/// A SysEx event at delta 0. `payload` excludes the leading F0.
fn sysex(payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0x00, 0xF0, payload.len() as u8];
    out.extend_from_slice(payload);
    out
}

fn with_end(mut events: Vec<u8>) -> Vec<u8> {
    events.extend_from_slice(&END_OF_TRACK);
    events
}

fn manager() -> ChannelManager<RecordingEngine> {
    let mut set = BankSet::new();
    set.insert_instrument(0, 0, PresetRef::new("Piano", "piano.sfz"));
    set.insert_drum(GM2_RHYTHM_BANK, 0, 36, PresetRef::new("Kick", "kick.wav"));
    ChannelManager::new(RecordingEngine::new(), BankResolver::new(set))
}

#[test]
fn quarter_note_at_480_ppqn_is_half_a_second() {
    // Note on at tick 0, second note at tick 480, both off at 960.
    let track = with_end(vec![
        0x00, 0x90, 0x3C, 0x64, //
        0x83, 0x60, 0x90, 0x40, 0x64, //
        0x83, 0x60, 0x80, 0x3C, 0x40, //
        0x00, 0x80, 0x40, 0x40,
    ]);
    let midi = MidiFile::parse(&smf(0, 480, &[track])).unwrap();
    let mut scheduler = Scheduler::new(&midi, manager());

    assert_eq!(scheduler.step(Duration::ZERO).unwrap(), Some(Duration::from_millis(500)));
    assert_eq!(scheduler.channels().engine().played().len(), 1);
    assert_eq!(scheduler.step(Duration::from_millis(500)).unwrap(), Some(Duration::from_millis(500)));
    assert_eq!(scheduler.channels().engine().played().len(), 2);
    assert_eq!(scheduler.step(Duration::from_millis(500)).unwrap(), None);
    assert_eq!(scheduler.channels().engine().stopped().len(), 2);
}

#[test]
fn running_status_plays_like_explicit_status() {
    let explicit = with_end(vec![
        0x00, 0x90, 0x3C, 0x64, 0x10, 0x90, 0x40, 0x64, 0x10, 0x90, 0x3C, 0x00, 0x00, 0x90, 0x40, 0x00,
    ]);
    let running = with_end(vec![0x00, 0x90, 0x3C, 0x64, 0x10, 0x40, 0x64, 0x10, 0x3C, 0x00, 0x00, 0x40, 0x00]);

    let play = |track: Vec<u8>| {
        let midi = MidiFile::parse(&smf(0, 96, &[track])).unwrap();
        let mut scheduler = Scheduler::new(&midi, manager());
        let length = scheduler.run_to_end().unwrap();
        let engine = scheduler.into_context().channels.into_engine();
        (length, engine.played(), engine.stopped())
    };
    assert_eq!(play(explicit), play(running));
}

#[test]
fn overlong_delta_ends_only_its_track() {
    // Five-byte delta-time after the first note.
    let broken = vec![0x00, 0x91, 0x3C, 0x64, 0x81, 0x81, 0x81, 0x81, 0x01, 0x81, 0x3C, 0x40];
    let healthy = with_end(vec![0x00, 0x90, 0x3C, 0x64, 0x83, 0x60, 0x80, 0x3C, 0x40]);
    let midi = MidiFile::parse(&smf(1, 480, &[broken, healthy])).unwrap();

    let summary = midi.summary();
    assert_eq!(summary.damaged_tracks, 1);
    assert_eq!(summary.notes, 2);

    let mut scheduler = Scheduler::new(&midi, manager());
    assert_eq!(scheduler.run_to_end().unwrap(), Duration::from_millis(500));
    let engine = scheduler.channels().engine();
    assert_eq!(engine.played().len(), 2);
    assert_eq!(engine.stopped().len(), 1);
}

#[test]
fn gm2_lsb_127_selects_the_shared_rhythm_bank() {
    let mut track = sysex(&[0x7E, 0x7F, 0x09, 0x03, 0xF7]);
    track.extend_from_slice(&[
        0x00, 0xB0, 0x20, 0x7F, // bank select LSB 127
        0x00, 0xC0, 0x00, //
        0x00, 0x90, 0x24, 0x64, // key 36
    ]);
    let midi = MidiFile::parse(&smf(0, 96, &[with_end(track)])).unwrap();
    let mut scheduler = Scheduler::new(&midi, manager());
    scheduler.run_to_end().unwrap();

    let channels = scheduler.channels();
    assert_eq!(channels.dialect(), Dialect::Gm2);
    assert!(channels.channel(0).drums);
    assert_eq!(channels.channel(0).bank, GM2_RHYTHM_BANK);
    let played = channels.engine().played();
    assert_eq!(played.len(), 1);
    assert_eq!(played[0].3, "kick.wav");
}

#[test]
fn xg_reverb_time_uses_the_table() {
    let mut track = sysex(&[0x43, 0x10, 0x4C, 0x00, 0x00, 0x7E, 0x00, 0xF7]);
    track.extend(sysex(&[0x43, 0x10, 0x4C, 0x02, 0x01, 0x02, 0x0A, 0xF7]));
    let midi = MidiFile::parse(&smf(0, 96, &[with_end(track)])).unwrap();
    let mut scheduler = Scheduler::new(&midi, manager());
    scheduler.run_to_end().unwrap();

    let channels = scheduler.channels();
    assert_eq!(channels.dialect(), Dialect::Xg);
    assert_eq!(channels.engine().last_bus_param(BusKind::Reverb, BusParam::DecayTime), Some(REVERB_TIME_S[10]));
    assert_eq!(channels.bus(BusKind::Reverb).param(BusParam::DecayTime), Some(REVERB_TIME_S[10]));
}

#[test]
fn summary_agrees_with_playback_length() {
    // 120 BPM for a quarter note, then 60 BPM for another.
    let conductor = with_end(vec![0x83, 0x60, 0xFF, 0x51, 0x03, 0x0F, 0x42, 0x40]);
    let notes = with_end(vec![0x00, 0x90, 0x3C, 0x64, 0x87, 0x40, 0x80, 0x3C, 0x40]);
    let midi = MidiFile::parse(&smf(1, 480, &[conductor, notes])).unwrap();

    let summary = midi.summary();
    assert_eq!(summary.duration, Duration::from_millis(1500));
    let mut scheduler = Scheduler::new(&midi, manager());
    assert_eq!(scheduler.run_to_end().unwrap(), summary.duration);
}
