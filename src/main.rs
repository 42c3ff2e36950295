use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use crossbeam_channel::{select, tick};
use log::{LevelFilter, info, warn};
use thousands::Separable;

use smfplay::bank::BankResolver;
use smfplay::bank::definition::load_banks;
use smfplay::channel::ChannelManager;
use smfplay::config::{DEFAULT_REFRESH_RATE, Pacing, PlayerConfig};
use smfplay::kdmapi::KdmapiEngine;
use smfplay::midi::loader::{MidiFile, load_midi_file};
use smfplay::midi::player::Scheduler;
use smfplay::midi::utils::{Clock, duration_from_100ns};
use smfplay::stats_logger::StatsLogger;
use smfplay::synth::{NullEngine, SynthEngine};

/// Play a Standard MIDI File through OmniMIDI.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// MIDI file to play
    file: PathBuf,

    /// Instrument bank definitions (TOML)
    #[arg(short, long, default_value = "banks.toml")]
    banks: PathBuf,

    /// Vendor overlay laid over the bank definitions; skipped if missing
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// Host loop frequency in Hz
    #[arg(long, default_value_t = DEFAULT_REFRESH_RATE)]
    refresh: u32,

    /// Linear output gain
    #[arg(long, default_value_t = 1.0)]
    gain: f32,

    /// Fold the output down to mono
    #[arg(long)]
    mono: bool,

    /// Only let these tracks start notes (repeatable)
    #[arg(long = "track", value_name = "N")]
    tracks: Vec<usize>,

    /// Only use presets whose name or file contains NAME (repeatable)
    #[arg(long = "select", value_name = "NAME")]
    selection: Vec<String>,

    /// More output; repeat for debug and trace
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Render as fast as possible instead of in real time
    #[arg(long)]
    batch: bool,

    /// Decode and schedule without opening the synth
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    fn player_config(&self) -> PlayerConfig {
        PlayerConfig {
            refresh_rate: self.refresh,
            output_gain: self.gain,
            mono: self.mono,
            active_tracks: self.tracks.clone(),
            selection: self.selection.clone(),
            pacing: if self.batch || self.dry_run { Pacing::Batch } else { Pacing::RealTime },
        }
        .validated()
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).parse_default_env().init();
}

fn print_summary(midi: &MidiFile) {
    println!("Tracks: {}, format {}, {} PPQN", midi.track_count(), midi.format, midi.ppqn());

    let start = Instant::now();
    let summary = midi.summary();
    let total_ms = summary.duration.as_millis();
    let minutes = total_ms / 60_000;
    let seconds = (total_ms % 60_000) / 1_000;
    let millis = total_ms % 1_000;

    println!(
        "MIDI Summary:\n\
     - Events: {}\n\
     - Note Count: {}\n\
     - Total Ticks: {}\n\
     - Total Duration: {:02}:{:02}.{:03}\n\
     - Scan Time: {:.2?}",
        summary.events.separate_with_commas(),
        summary.notes.separate_with_commas(),
        summary.total_ticks.separate_with_commas(),
        minutes,
        seconds,
        millis,
        start.elapsed()
    );
    if summary.damaged_tracks > 0 {
        warn!("{} track(s) end early on malformed data", summary.damaged_tracks);
    }
}

/// Step the scheduler against the wall clock, waking on the next event or
/// the next refresh frame, whichever comes first.
fn run_realtime<E: SynthEngine>(
    scheduler: &mut Scheduler<'_, E>,
    stats: &StatsLogger,
    config: &PlayerConfig,
) -> Result<()> {
    let ticker = tick(config.refresh_interval());
    let clock = Clock::start();
    let mut last = clock.now_100ns();
    let mut frames: u32 = 0;

    loop {
        let now = clock.now_100ns();
        let elapsed = duration_from_100ns(now - last);
        last = now;

        let Some(wait) = scheduler.step(elapsed)? else {
            break;
        };

        select! {
            recv(ticker) -> _ => {
                stats.next_frame();
                frames += 1;
                if frames % config.refresh_rate == 0 {
                    let display = &scheduler.context().display;
                    info!(
                        "{:.1}s  {} events/s  {}",
                        scheduler.position().as_secs_f64(),
                        stats.events_per_second().separate_with_commas(),
                        display.current_lyric().unwrap_or_default()
                    );
                }
            }
            default(wait) => {}
        }
    }
    Ok(())
}

fn play<E: SynthEngine>(midi: &MidiFile, engine: E, resolver: BankResolver, config: &PlayerConfig) -> Result<()> {
    let mut channels = ChannelManager::new(engine, resolver);
    channels.configure(config);

    let stats = Arc::new(StatsLogger::new(config.refresh_rate as usize));
    let mut scheduler = Scheduler::new(midi, channels).with_stats(Arc::clone(&stats));

    match config.pacing {
        Pacing::Batch => {
            let length = scheduler.run_to_end().context("playback stopped")?;
            info!("rendered {:.2}s", length.as_secs_f64());
        }
        Pacing::RealTime => run_realtime(&mut scheduler, &stats, config).context("playback stopped")?,
    }

    let context = scheduler.context();
    if let Some(title) = context.display.title() {
        println!("Title: {title}");
    }
    for line in &context.display.copyright {
        println!("Copyright: {line}");
    }
    println!(
        "Played {} events, {} presets loaded",
        stats.total_events().separate_with_commas(),
        context.channels.resident_presets()
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = cli.player_config();

    let midi = load_midi_file(&cli.file).with_context(|| format!("failed to open {}", cli.file.display()))?;
    print_summary(&midi);

    let banks = load_banks(&cli.banks, cli.overlay.as_deref())
        .with_context(|| format!("failed to load bank definitions from {}", cli.banks.display()))?;
    info!(
        "{} instruments and {} drum kits defined",
        banks.instrument_count(),
        banks.drum_kit_count()
    );
    let resolver = BankResolver::new(banks);

    if cli.dry_run {
        play(&midi, NullEngine::default(), resolver, &config)
    } else {
        let engine = KdmapiEngine::open().map_err(anyhow::Error::msg).context("failed to open the synth")?;
        play(&midi, engine, resolver, &config)
    }
}
