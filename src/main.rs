//! rtmix CLI - render JSON scores to WAV

use clap::{Parser, Subcommand};
use rtmix::audio_io::{InputSource, WavFormat, WavInput, WavSink};
use rtmix::config::EngineConfig;
use rtmix::diagnostics::{init_logging, Severity};
use rtmix::engine::Engine;
use rtmix::render::{RenderOptions, Renderer};
use rtmix::score::Score;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "rtmix")]
#[command(about = "Sample-accurate instrument scheduler and bus mixer", long_about = None)]
struct Cli {
    /// Engine config file (TOML); defaults to the user config if present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Worker threads for running instruments (overrides the config)
    #[arg(short = 't', long, global = true)]
    threads: Option<usize>,

    /// Lowest message level printed: debug, advise, warn or fatal
    #[arg(short, long, global = true)]
    verbosity: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a score to a WAV file
    Render {
        /// Score file (JSON)
        score: PathBuf,

        /// Output WAV file path
        output: PathBuf,

        /// Stop after this many seconds (default: when the last note ends)
        #[arg(short, long)]
        duration: Option<f64>,

        /// Sample rate in Hz
        #[arg(short, long)]
        sample_rate: Option<f32>,

        /// Output channels
        #[arg(long)]
        channels: Option<usize>,

        /// Frames per block
        #[arg(short, long)]
        block_size: Option<usize>,

        /// WAV file feeding the IN buses
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Write 32-bit float samples instead of 16-bit PCM
        #[arg(long)]
        float: bool,

        /// Print the render statistics as JSON
        #[arg(long)]
        stats_json: bool,
    },

    /// Run a score's calls without rendering and report what was scheduled
    Check {
        /// Score file (JSON)
        score: PathBuf,
    },

    /// List callable functions and instruments
    List,
}

fn parse_severity(name: &str) -> Result<Severity, String> {
    match name.to_ascii_lowercase().as_str() {
        "debug" => Ok(Severity::Debug),
        "advise" | "info" => Ok(Severity::Advise),
        "warn" | "warning" => Ok(Severity::Warn),
        "fatal" | "error" => Ok(Severity::Fatal),
        other => Err(format!("unknown verbosity '{}'", other)),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::load_default()?,
    };
    if let Some(threads) = cli.threads {
        config.worker_threads = threads;
    }
    if let Some(level) = &cli.verbosity {
        config.verbosity = parse_severity(level)?;
    }
    init_logging(config.verbosity);

    match cli.command {
        Commands::Render {
            score,
            output,
            duration,
            sample_rate,
            channels,
            block_size,
            input,
            float,
            stats_json,
        } => {
            if let Some(sr) = sample_rate {
                config.sample_rate = sr;
            }
            if let Some(n) = channels {
                config.output_channels = n;
            }
            if let Some(frames) = block_size {
                config.block_frames = frames;
            }
            let wav_input = input.as_deref().map(WavInput::open).transpose()?;
            if let Some(wav) = &wav_input {
                config.input_channels = wav.channels();
            }

            let mut engine = Engine::new(config.clone())?;
            if let Some(wav) = wav_input {
                if wav.sample_rate() as f32 != config.sample_rate {
                    engine.reporter().warn(
                        Some("rtmix"),
                        format!(
                            "input is {} Hz but the engine runs at {} Hz; it will not be resampled",
                            wav.sample_rate(),
                            config.sample_rate
                        ),
                    );
                }
                engine.set_input(Box::new(wav));
            }

            let score = Score::load(&score)?;
            let report = score.run(&mut engine)?;
            info!("score: {} calls, {} failed", report.calls, report.failed);

            let format = if float { WavFormat::Float32 } else { WavFormat::Int16 };
            let mut sink = WavSink::create(&output, config.output_channels, config.sample_rate as u32, format)?;
            let stats = Renderer::new(RenderOptions { duration }).render(&mut engine, &mut sink)?;

            if stats_json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                stats.print_summary();
                println!("\nRender complete: {}", output.display());
            }
        }

        Commands::Check { score } => {
            let mut engine = Engine::new(config)?;
            let report = Score::load(&score)?.run(&mut engine)?;
            let sample_rate = engine.config().sample_rate as f64;
            println!("{} calls, {} failed", report.calls, report.failed);
            println!("{} notes scheduled", engine.scheduler().pending_count());
            if let Some(last) = engine.scheduler().last_frame() {
                println!("ends at {:.3} s", last as f64 / sample_rate);
            }
            for (name, slot) in engine.state().bus_config.slots() {
                println!("bus_config {}: {}", name, slot.describe());
            }
        }

        Commands::List => {
            let engine = Engine::new(config)?;
            let instruments: Vec<&str> = engine.registry().instruments().collect();
            for name in engine.registry().names() {
                let kind = if instruments.contains(&name) { "instrument" } else { "built-in" };
                println!("{:<12} {}", name, kind);
            }
        }
    }

    Ok(())
}
