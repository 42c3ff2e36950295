use std::io;

pub type Result<T, E = MidiError> = std::result::Result<T, E>;

/// Everything that can go wrong between opening a file and driving the synth.
///
/// Only the structural variants (`MalformedHeader`, `PrematureEof`,
/// `ProtocolViolation`) and `PresetLoadFailure` ever reach the host. The rest
/// are reported through `log` where they happen and playback carries on.
#[derive(Debug, thiserror::Error)]
pub enum MidiError {
    #[error("malformed header: {0}")]
    MalformedHeader(String),
    #[error("unexpected end of data at offset {offset}: {what}")]
    PrematureEof { offset: usize, what: &'static str },
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("malformed event at offset {offset}: {reason}")]
    MalformedEvent { offset: usize, reason: &'static str },
    #[error("GS checksum mismatch (expected {expected:#04x}, found {found:#04x})")]
    ChecksumMismatch { expected: u8, found: u8 },
    #[error("unsupported SysEx: {0}")]
    UnsupportedSysEx(String),
    #[error("no preset for bank {bank} program {program}{}", .key.map(|k| format!(" key {k}")).unwrap_or_default())]
    PresetNotFound {
        bank: u16,
        program: u8,
        key: Option<u8>,
    },
    #[error("failed to load preset '{reference}': {reason}")]
    PresetLoadFailure { reference: String, reason: String },
    #[error("invalid bank definition {source_name}: {reason}")]
    BankDefinition { source_name: String, reason: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub(crate) fn unsupported(what: impl Into<String>) -> MidiError {
    MidiError::UnsupportedSysEx(what.into())
}

impl MidiError {
    /// True for the conditions that must abort the whole file or playback.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MidiError::MalformedHeader(_)
                | MidiError::PrematureEof { .. }
                | MidiError::ProtocolViolation(_)
                | MidiError::PresetLoadFailure { .. }
                | MidiError::Io(_)
        )
    }
}
