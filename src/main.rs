//! trancegen: generate psy-trance songs and browse the patterns they leave behind.
//!
//! - `play`: build a song from the current controls and run it through the sequencer
//! - `list`: show stored patterns
//! - `delete`: remove a stored pattern by index
//! - `replay`: loop a stored pattern on the lead voice

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use clap::{Parser, Subcommand};
use tracing::Level;
use trancegen::{
    ControlSurface, FileKv, JsonPatternStore, ManualTransport, PatternStore, Sequencer, TracingBackend,
    TranceError, Transport, Voice, SONG_STEPS,
};

type CliSequencer = Sequencer<TracingBackend, ManualTransport, JsonPatternStore<FileKv>>;

/// Generative psy-trance sequencer
#[derive(Parser)]
#[command(name = "trancegen")]
#[command(version)]
struct Cli {
    /// Directory holding the pattern store
    #[arg(short, long, global = true, default_value = "trancegen-data")]
    store: PathBuf,

    /// Control surface JSON (defaults when omitted)
    #[arg(short, long, global = true)]
    controls: Option<PathBuf>,

    /// More output; repeat for per-step traces
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a new song and play it
    Play {
        #[arg(long)]
        bpm: Option<u32>,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,

        /// Times through the 192-step song
        #[arg(short, long, default_value = "1")]
        loops: usize,

        /// Sleep between steps at tempo instead of running flat out
        #[arg(long)]
        realtime: bool,

        /// Write the controls in effect (after --bpm) to this JSON file
        #[arg(long, value_name = "FILE")]
        save_controls: Option<PathBuf>,
    },

    /// List stored patterns
    List,

    /// Delete a stored pattern
    Delete { index: usize },

    /// Loop a stored pattern on the lead voice
    Replay {
        index: usize,

        #[arg(long)]
        bpm: Option<u32>,

        #[arg(short, long, default_value = "1")]
        loops: usize,

        #[arg(long)]
        realtime: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).with_writer(std::io::stderr).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), TranceError> {
    let controls = match &cli.controls {
        Some(path) => ControlSurface::load(path)?,
        None => ControlSurface::default(),
    };

    match cli.command {
        Commands::Play { bpm, seed, loops, realtime, save_controls } => {
            let rng = seed.map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);
            let mut seq = sequencer(&cli.store, controls, rng)?;
            if let Some(bpm) = bpm {
                seq.set_bpm(bpm);
            }
            if let Some(path) = &save_controls {
                seq.controls().save(path)?;
            }
            seq.new_song()?;
            drive(&mut seq, SONG_STEPS * loops, realtime);
            report(&seq);
            seq.stop();
        }
        Commands::List => {
            let store = JsonPatternStore::open(FileKv::open(&cli.store)?);
            if store.is_empty() {
                println!("no stored patterns");
            }
            for (i, pattern) in store.list().iter().enumerate() {
                let hits = pattern.rhythm.iter().filter(|&&hit| hit).count();
                let notes: Vec<String> = pattern.scale.notes.iter().map(ToString::to_string).collect();
                println!(
                    "{:>4}  {}  {:>3} steps  {:>3} hits  [{}]",
                    i,
                    pattern.created_at.format("%Y-%m-%d %H:%M:%S"),
                    pattern.len(),
                    hits,
                    notes.join(" ")
                );
            }
        }
        Commands::Delete { index } => {
            let mut store = JsonPatternStore::open(FileKv::open(&cli.store)?);
            let removed = store.delete(index)?;
            println!("deleted pattern {} ({} steps), {} left", index, removed.len(), store.len());
        }
        Commands::Replay { index, bpm, loops, realtime } => {
            let mut seq = sequencer(&cli.store, controls, fastrand::Rng::new())?;
            if let Some(bpm) = bpm {
                seq.set_bpm(bpm);
            }
            seq.play_pattern(index)?;
            let steps = seq.store().get(index).map_or(0, |p| p.len());
            drive(&mut seq, steps * loops, realtime);
            report(&seq);
            seq.stop();
        }
    }
    Ok(())
}

fn sequencer(dir: &Path, controls: ControlSurface, rng: fastrand::Rng) -> Result<CliSequencer, TranceError> {
    let store = JsonPatternStore::open(FileKv::open(dir)?);
    let transport = ManualTransport::new(controls.bpm as f32);
    Ok(Sequencer::new(TracingBackend::new(), transport, store, controls, rng))
}

fn drive(seq: &mut CliSequencer, steps: usize, realtime: bool) {
    for _ in 0..steps {
        let pause = seq.transport().step_duration();
        seq.transport_mut().advance();
        if realtime {
            if let Some(pause) = pause {
                thread::sleep(pause);
            }
        }
    }
}

fn report(seq: &CliSequencer) {
    let counts: Vec<String> = seq.with_backend(|backend| {
        Voice::ALL
            .iter()
            .map(|voice| format!("{}={}", voice.name(), backend.count(*voice)))
            .collect()
    });
    println!(
        "{} triggers at {} bpm: {}",
        seq.triggered(),
        seq.transport().bpm(),
        counts.join(" ")
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn play_saves_the_controls_it_ran_with() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("store");
        let saved = dir.path().join("controls.json");
        let cli = Cli::try_parse_from([
            "trancegen",
            "--store",
            store.to_str().unwrap(),
            "play",
            "--seed",
            "3",
            "--bpm",
            "150",
            "--save-controls",
            saved.to_str().unwrap(),
        ])
        .unwrap();
        run(cli).unwrap();

        let controls = ControlSurface::load(&saved).unwrap();
        assert_eq!(controls.bpm, 150);
        assert_eq!(controls.note_count, ControlSurface::default().note_count);
        assert_eq!(JsonPatternStore::open(FileKv::open(&store).unwrap()).len(), 5);
    }
}
