//! Standard MIDI File playback against a sample-based synthesis engine.
//!
//! [`midi::loader`] parses the container, [`midi::player::Scheduler`] plays
//! the tracks through a [`channel::ChannelManager`], which resolves presets
//! with [`bank::BankResolver`] and drives a [`synth::SynthEngine`]. GM, GS
//! and XG SysEx are decoded by [`sysex`].

pub mod bank;
pub mod channel;
pub mod config;
pub mod dialect;
pub mod error;
pub mod kdmapi;
pub mod midi;
pub mod stats_logger;
pub mod synth;
pub mod sysex;

pub use error::{MidiError, Result};
