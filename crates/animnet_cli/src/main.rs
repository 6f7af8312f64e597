// SPDX-License-Identifier: MIT OR Apache-2.0
//! `animnet` - runs animation networks against synthesised audio
//!
//! Networks are loaded from RON or JSON documents, or built from a named
//! preset, then evaluated once per frame and the resulting value printed.

mod settings;
mod synth;

use animnet_graph::{evaluate_with_stats, DocumentError, EvaluationError, Network, NetworkDocument, Preset};
use clap::{Parser, Subcommand};
use settings::{HostSettings, SettingsError, SETTINGS_FILE_NAME};
use std::path::{Path, PathBuf};
use synth::{FrameSynth, Tone};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Parser)]
#[command(name = "animnet", version, about = "Audio-reactive animation network runner")]
struct Cli {
    /// Settings file
    #[arg(long, global = true, default_value = SETTINGS_FILE_NAME)]
    settings: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Evaluate a network frame by frame and print its output
    Run {
        /// Network document, or a preset name
        network: String,
        /// Number of frames to run
        #[arg(long)]
        frames: Option<u32>,
        /// Tone frequency in Hz
        #[arg(long, default_value_t = 110.0)]
        tone: f32,
        /// Tone amplitude, 0..1
        #[arg(long, default_value_t = 0.8)]
        amplitude: f32,
        /// Go silent from this frame on
        #[arg(long)]
        gap_from: Option<u32>,
    },
    /// List the builtin presets
    Presets,
    /// Write a preset as a network document
    Export {
        /// Preset name
        preset: String,
        /// Write JSON instead of RON
        #[arg(long)]
        json: bool,
        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a network document
    Check {
        /// Network document
        network: PathBuf,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("Evaluation failed at frame {frame}: {error}")]
    Evaluation { frame: u32, error: EvaluationError },

    #[error("Unknown preset '{0}'")]
    UnknownPreset(String),

    #[error("Network has a cycle through node {0}")]
    Cycle(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn main() {
    let cli = Cli::parse();

    let settings = match HostSettings::load_or_default(&cli.settings) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load settings from {}: {e}", cli.settings.display());
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_directive));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting animnet v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = execute(cli.command, &settings) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

fn execute(command: Command, settings: &HostSettings) -> Result<(), CliError> {
    match command {
        Command::Run {
            network,
            frames,
            tone,
            amplitude,
            gap_from,
        } => {
            let mut network = open_network(&network)?;
            let tone = Tone {
                frequency: tone,
                amplitude,
                gap_from,
            };
            run(&mut network, settings, frames.unwrap_or(settings.default_frames), tone)
        }
        Command::Presets => {
            for preset in Preset::all() {
                println!(
                    "{:<16} {:<8} {}",
                    preset.name(),
                    preset.output_type().display_name(),
                    preset.description()
                );
            }
            Ok(())
        }
        Command::Export { preset, json, output } => {
            let preset = Preset::from_name(&preset).ok_or(CliError::UnknownPreset(preset))?;
            let document = preset.document();
            match output {
                Some(path) => {
                    if json {
                        std::fs::write(&path, document.to_json()?)?;
                    } else {
                        document.save(&path)?;
                    }
                    tracing::info!(path = %path.display(), preset = preset.name(), "exported preset");
                }
                None if json => println!("{}", document.to_json()?),
                None => println!("{}", document.to_ron()?),
            }
            Ok(())
        }
        Command::Check { network } => {
            let network = NetworkDocument::load(&network)?.into_network()?;
            let order = network
                .topological_order()
                .map_err(|cycle| CliError::Cycle(cycle.0.to_string()))?;
            println!(
                "{}: {} nodes, {} edges, output {}",
                network.id,
                network.node_count(),
                network.edge_count(),
                network
                    .output_type()
                    .map_or("missing", |output| output.display_name())
            );
            for id in order {
                if let Some(node) = network.node(&id) {
                    println!("  {id} {}", node.kind.label());
                }
            }
            Ok(())
        }
    }
}

/// A document path, or a preset name when no such file exists
fn open_network(source: &str) -> Result<Network, CliError> {
    let path = Path::new(source);
    if path.exists() {
        return Ok(NetworkDocument::load(path)?.into_network()?);
    }
    let preset = Preset::from_name(source).ok_or_else(|| CliError::UnknownPreset(source.to_string()))?;
    Ok(preset.build()?)
}

fn run(network: &mut Network, settings: &HostSettings, frames: u32, tone: Tone) -> Result<(), CliError> {
    let synth = FrameSynth::new(
        settings.sample_rate,
        settings.fft_size as usize,
        settings.frame_interval(),
        tone,
    );
    tracing::info!(network = %network.id, frames, "running network");

    for index in 0..frames {
        let frame = synth.frame(index);
        let (value, stats) = evaluate_with_stats(network, &frame)
            .map_err(|error| CliError::Evaluation { frame: index, error })?;
        tracing::trace!(frame = index, nodes = stats.nodes_computed, "frame evaluated");
        println!("{index:>5} {:>8.3} {value}", frame.time);
    }
    Ok(())
}
