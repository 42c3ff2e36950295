use std::fs;
use std::path::Path;
use std::time::Duration;

use log::{debug, warn};
use rayon::prelude::*;

use crate::error::{MidiError, Result};
use crate::midi::cursor::ByteCursor;
use crate::midi::timing::{Division, Timing};
use crate::midi::track::{Event, EventReader, META_END_OF_TRACK, META_TEMPO};

const HEADER_MAGIC: &[u8; 4] = b"MThd";
const TRACK_MAGIC: &[u8; 4] = b"MTrk";
const HEADER_LENGTH: u32 = 6;

/// A parsed Standard MIDI File. Track data is kept as raw bytes; decoding
/// happens while playing.
#[derive(Debug, Clone)]
pub struct MidiFile {
    /// 0, 1, 2, or 3. Format 3 is played like format 2.
    pub format: u16,
    pub division: Division,
    pub tracks: Vec<Vec<u8>>,
}

/// Side-effect free statistics over every track.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FileSummary {
    pub events: usize,
    pub notes: usize,
    pub total_ticks: u64,
    pub duration: Duration,
    /// Tracks that stopped decoding early because of a malformed event.
    pub damaged_tracks: usize,
}

/// Per-track scan result.
#[derive(Debug, Default)]
struct TrackScan {
    events: usize,
    notes: usize,
    ticks: u64,
    tempo_changes: Vec<(u64, u32)>,
    damaged: bool,
}

impl MidiFile {
    /// Parse a complete file held in memory.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(data);

        // Read and verify the header
        let magic = cursor
            .read_array::<4>()
            .map_err(|_| MidiError::MalformedHeader("file too short for a header chunk".into()))?;
        if &magic != HEADER_MAGIC {
            return Err(MidiError::MalformedHeader("missing MThd chunk".into()));
        }
        let truncated = |_| MidiError::MalformedHeader("header chunk is truncated".into());
        let header_len = cursor.read_u32().map_err(truncated)?;
        if header_len != HEADER_LENGTH {
            return Err(MidiError::MalformedHeader(format!("header length {header_len}, expected 6")));
        }
        let format = cursor.read_u16().map_err(truncated)?;
        if format > 3 {
            return Err(MidiError::MalformedHeader(format!("unknown format {format}")));
        }
        let declared_tracks = cursor.read_u16().map_err(truncated)?;
        let division_word = cursor.read_u16().map_err(truncated)?;
        let division = Division::from_header(division_word)
            .ok_or_else(|| MidiError::MalformedHeader(format!("unknown SMPTE division {division_word:#06x}")))?;
        if format == 0 && declared_tracks != 1 {
            return Err(MidiError::ProtocolViolation(format!("format 0 file declares {declared_tracks} tracks")));
        }

        // Format 0 is scanned to the end so a stray second track is caught.
        let mut tracks = Vec::with_capacity(usize::from(declared_tracks));
        while cursor.remaining() >= 8 && (format == 0 || tracks.len() < usize::from(declared_tracks)) {
            let complete = tracks.len() >= usize::from(declared_tracks);
            let tag = cursor.read_array::<4>()?;
            let length = cursor.read_u32()? as usize;
            if &tag != TRACK_MAGIC {
                // Alien chunks are allowed anywhere, but must still fit.
                debug!("skipping {} byte chunk {:?}", length, String::from_utf8_lossy(&tag));
                match cursor.skip(length) {
                    Err(_) if complete => break,
                    result => result?,
                }
                continue;
            }
            if complete {
                return Err(MidiError::ProtocolViolation("format 0 file with more than one track".into()));
            }
            let data = cursor.read_bytes(length)?;
            tracks.push(data.to_vec());
        }

        if tracks.len() < usize::from(declared_tracks) {
            warn!("header declares {} tracks, found {}", declared_tracks, tracks.len());
        }
        Ok(MidiFile { format, division, tracks })
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Format 2 (and 3) tracks are independent sequences played one after
    /// another.
    pub fn is_sequential(&self) -> bool {
        self.format >= 2
    }

    pub fn ppqn(&self) -> u16 {
        self.division.ppqn()
    }

    /// Count events and notes in every track, in parallel, and work out how
    /// long the file plays for.
    pub fn summary(&self) -> FileSummary {
        let scans: Vec<TrackScan> = self.tracks.par_iter().map(|data| scan_track(data)).collect();

        let mut summary = FileSummary {
            events: scans.iter().map(|s| s.events).sum(),
            notes: scans.iter().map(|s| s.notes).sum(),
            damaged_tracks: scans.iter().filter(|s| s.damaged).count(),
            ..Default::default()
        };

        if self.is_sequential() {
            // Each track restarts at tempo 120 and runs after the previous one.
            for scan in &scans {
                summary.total_ticks += scan.ticks;
                summary.duration += self.play_time(scan.ticks, &scan.tempo_changes);
            }
        } else {
            summary.total_ticks = scans.iter().map(|s| s.ticks).max().unwrap_or(0);
            let mut changes: Vec<(u64, u32)> = scans.iter().flat_map(|s| s.tempo_changes.iter().copied()).collect();
            changes.sort_by_key(|&(tick, _)| tick);
            summary.duration = self.play_time(summary.total_ticks, &changes);
        }
        summary
    }

    /// Wall-clock time of `ticks` ticks given tempo changes sorted by tick.
    fn play_time(&self, ticks: u64, changes: &[(u64, u32)]) -> Duration {
        let mut timing = Timing::new(self.division);
        let mut total = Duration::ZERO;
        let mut at = 0u64;
        for &(tick, tempo) in changes.iter().filter(|(tick, _)| *tick < ticks) {
            total += timing.ticks_to_duration(tick - at);
            at = tick;
            timing.set_tempo(tempo);
        }
        total + timing.ticks_to_duration(ticks - at)
    }
}

fn scan_track(data: &[u8]) -> TrackScan {
    let mut scan = TrackScan::default();
    let mut reader = EventReader::new(data);
    loop {
        let delta = match reader.read_delta() {
            Ok(Some(delta)) => delta,
            Ok(None) => break,
            Err(_) => {
                scan.damaged = true;
                break;
            }
        };
        scan.ticks += u64::from(delta);
        match reader.read_event() {
            Ok(Event::Meta { kind: META_END_OF_TRACK, .. }) => {
                scan.events += 1;
                break;
            }
            Ok(Event::Meta { kind: META_TEMPO, data }) if data.len() >= 3 => {
                let tempo = u32::from_be_bytes([0, data[0], data[1], data[2]]);
                scan.tempo_changes.push((scan.ticks, tempo));
                scan.events += 1;
            }
            Ok(event) => {
                scan.events += 1;
                if event.is_note_on() {
                    scan.notes += 1;
                }
            }
            Err(_) => {
                scan.damaged = true;
                break;
            }
        }
    }
    scan
}

/// Load a MIDI file from disk.
pub fn load_midi_file<P: AsRef<Path>>(filename: P) -> Result<MidiFile> {
    let data = fs::read(&filename)?;
    MidiFile::parse(&data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn header(format: u16, tracks: u16, division: u16) -> Vec<u8> {
        let mut out = HEADER_MAGIC.to_vec();
        out.extend_from_slice(&HEADER_LENGTH.to_be_bytes());
        out.extend_from_slice(&format.to_be_bytes());
        out.extend_from_slice(&tracks.to_be_bytes());
        out.extend_from_slice(&division.to_be_bytes());
        out
    }

    fn chunk(tag: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = tag.to_vec();
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    const END: [u8; 4] = [0x00, 0xFF, 0x2F, 0x00];

    #[test]
    fn parses_format_one_with_alien_chunk() {
        let mut file = header(1, 2, 480);
        file.extend(chunk(TRACK_MAGIC, &END));
        file.extend(chunk(b"XFIH", &[1, 2, 3]));
        file.extend(chunk(TRACK_MAGIC, &[0x00, 0x90, 0x3C, 0x64, 0x83, 0x60, 0x80, 0x3C, 0x40, 0x00, 0xFF, 0x2F, 0x00]));
        let midi = MidiFile::parse(&file).unwrap();
        assert_eq!(midi.format, 1);
        assert_eq!(midi.track_count(), 2);
        assert_eq!(midi.ppqn(), 480);
    }

    #[test]
    fn header_errors() {
        assert!(matches!(MidiFile::parse(b"RIFF"), Err(MidiError::MalformedHeader(_))));
        let mut bad_len = header(0, 1, 96);
        bad_len[7] = 7;
        assert!(matches!(MidiFile::parse(&bad_len), Err(MidiError::MalformedHeader(_))));
        assert!(matches!(MidiFile::parse(&header(4, 1, 96)), Err(MidiError::MalformedHeader(_))));
    }

    #[test]
    fn truncated_track_is_premature_eof() {
        let mut file = header(0, 1, 96);
        let mut track = chunk(TRACK_MAGIC, &END);
        track[7] = 40;
        file.extend(track);
        assert!(matches!(MidiFile::parse(&file), Err(MidiError::PrematureEof { .. })));
    }

    #[test]
    fn second_track_in_format_zero_is_a_violation() {
        let mut file = header(0, 2, 96);
        file.extend(chunk(TRACK_MAGIC, &END));
        file.extend(chunk(TRACK_MAGIC, &END));
        assert!(matches!(MidiFile::parse(&file), Err(MidiError::ProtocolViolation(_))));
    }

    #[test]
    fn undeclared_second_track_in_format_zero_is_a_violation() {
        let mut file = header(0, 1, 96);
        file.extend(chunk(TRACK_MAGIC, &END));
        file.extend(chunk(b"XFIH", &[1, 2, 3]));
        file.extend(chunk(TRACK_MAGIC, &END));
        assert!(matches!(MidiFile::parse(&file), Err(MidiError::ProtocolViolation(_))));
    }

    #[test]
    fn format_zero_without_tracks_is_a_violation() {
        let file = header(0, 0, 96);
        assert!(matches!(MidiFile::parse(&file), Err(MidiError::ProtocolViolation(_))));
    }

    #[test]
    fn format_zero_tolerates_trailing_chunks() {
        let mut file = header(0, 1, 96);
        file.extend(chunk(TRACK_MAGIC, &END));
        file.extend(chunk(b"XFKM", &[0; 4]));
        assert_eq!(MidiFile::parse(&file).unwrap().track_count(), 1);
    }

    #[test]
    fn truncated_header_is_malformed() {
        let mut file = header(1, 1, 96);
        file.truncate(11);
        assert!(matches!(MidiFile::parse(&file), Err(MidiError::MalformedHeader(_))));
        assert!(matches!(MidiFile::parse(b"MThd\0\0"), Err(MidiError::MalformedHeader(_))));
    }

    #[test]
    fn summary_counts_notes_and_honours_tempo() {
        let mut file = header(1, 2, 480);
        // Tempo 250000 (240 BPM) at tick 0.
        file.extend(chunk(TRACK_MAGIC, &[0x00, 0xFF, 0x51, 0x03, 0x03, 0xD0, 0x90, 0x00, 0xFF, 0x2F, 0x00]));
        // Two notes, running status, last event at tick 960.
        file.extend(chunk(
            TRACK_MAGIC,
            &[0x00, 0x90, 0x3C, 0x64, 0x00, 0x40, 0x64, 0x87, 0x40, 0x3C, 0x00, 0x00, 0x40, 0x00, 0x00, 0xFF, 0x2F, 0x00],
        ));
        let summary = MidiFile::parse(&file).unwrap().summary();
        assert_eq!(summary.notes, 2);
        assert_eq!(summary.total_ticks, 960);
        assert_eq!(summary.duration, Duration::from_millis(500));
        assert_eq!(summary.damaged_tracks, 0);
    }

    #[test]
    fn loads_from_disk() {
        let mut file = header(0, 1, 96);
        file.extend(chunk(TRACK_MAGIC, &END));
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&file).unwrap();
        let midi = load_midi_file(tmp.path()).unwrap();
        assert_eq!(midi.track_count(), 1);
        assert!(matches!(load_midi_file(tmp.path().with_extension("missing")), Err(MidiError::Io(_))));
    }
}
