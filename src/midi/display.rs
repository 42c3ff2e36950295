//! Text and signature state a front-end can show while a file plays.

use std::collections::BTreeMap;
use std::fmt;

use crate::dialect::Dialect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u16,
    pub clocks_per_click: u8,
    pub notated_32nds_per_quarter: u8,
}

impl TimeSignature {
    /// From the four bytes of the time-signature meta event. The
    /// denominator is stored there as a power of two.
    pub fn from_meta(data: [u8; 4]) -> Self {
        TimeSignature {
            numerator: data[0],
            denominator: 1u16 << data[1].min(15),
            clocks_per_click: data[2],
            notated_32nds_per_quarter: data[3],
        }
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySignature {
    /// Negative for flats.
    pub sharps: i8,
    pub minor: bool,
}

const MAJOR_KEYS: [&str; 15] = ["Cb", "Gb", "Db", "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#"];
const MINOR_KEYS: [&str; 15] = ["Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#", "G#", "D#", "A#"];

impl KeySignature {
    pub fn from_meta(data: [u8; 2]) -> Self {
        KeySignature { sharps: data[0] as i8, minor: data[1] != 0 }
    }

    pub fn tonic(&self) -> &'static str {
        let index = (i16::from(self.sharps).clamp(-7, 7) + 7) as usize;
        if self.minor { MINOR_KEYS[index] } else { MAJOR_KEYS[index] }
    }
}

impl fmt::Display for KeySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.tonic(), if self.minor { "minor" } else { "major" })
    }
}

/// One line of lyrics. `paragraph` is set when the line was opened by a
/// `\` (new page) rather than a `/` (line break).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LyricLine {
    pub text: String,
    pub paragraph: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Display {
    pub track_names: BTreeMap<usize, String>,
    pub copyright: Vec<String>,
    pub texts: Vec<String>,
    pub markers: Vec<String>,
    pub cues: Vec<String>,
    pub lyrics: Vec<LyricLine>,
    pub time_signature: Option<TimeSignature>,
    pub key_signature: Option<KeySignature>,
    /// Front-panel text written by GS or XG display SysEx.
    pub panel_text: Option<(Dialect, String)>,
}

/// Meta-event text is not guaranteed to be UTF-8; Latin-1 is the common case.
pub fn decode_text(data: &[u8]) -> String {
    match std::str::from_utf8(data) {
        Ok(s) => s.trim_end_matches('\0').to_string(),
        Err(_) => data.iter().map(|&b| char::from(b)).collect::<String>().trim_end_matches('\0').to_string(),
    }
}

impl Display {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the first track that has one; by convention the song title.
    pub fn title(&self) -> Option<&str> {
        self.track_names.values().next().map(String::as_str)
    }

    pub fn set_track_name(&mut self, track: usize, name: String) {
        self.track_names.insert(track, name);
    }

    /// Text events starting with `\` or `/` are karaoke lyrics.
    pub fn is_lyric_text(text: &str) -> bool {
        text.starts_with('\\') || text.starts_with('/')
    }

    pub fn add_text(&mut self, text: String) {
        if Self::is_lyric_text(&text) {
            self.add_lyric(&text);
        } else {
            self.texts.push(text);
        }
    }

    pub fn add_lyric(&mut self, text: &str) {
        let (body, new_line, paragraph) = if let Some(rest) = text.strip_prefix('\\') {
            (rest, true, true)
        } else if let Some(rest) = text.strip_prefix('/') {
            (rest, true, false)
        } else {
            (text, false, false)
        };
        if new_line || self.lyrics.is_empty() {
            self.lyrics.push(LyricLine { text: String::new(), paragraph });
        }
        if let Some(line) = self.lyrics.last_mut() {
            line.text.push_str(body);
        }
    }

    /// The lyric line currently being sung.
    pub fn current_lyric(&self) -> Option<&str> {
        self.lyrics.last().map(|l| l.text.as_str())
    }

    pub fn set_panel_text(&mut self, source: Dialect, text: String) {
        self.panel_text = Some((source, text));
    }
}
