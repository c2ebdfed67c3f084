//! # rtmix - instrument scheduler and bus mixer
//!
//! rtmix renders scores of timed instrument notes. Each note is an
//! instrument instance with its own DSP state; the scheduler starts and stops
//! notes sample-accurately and mixes them into shared buses one block at a
//! time.
//!
//! ## Core Features
//!
//! - **Bus Routing**: 32 IN, AUX and OUT buses; instruments read IN or AUX and
//!   write AUX and/or OUT, with aux chains ordered by a topological sort
//! - **Sample-Accurate Scheduling**: notes start mid-block at their exact frame
//! - **Unit Generators**: oscillators, table lookups, envelopes, filters,
//!   comb and delay lines, noise
//! - **Function Tables**: numbered gen tables for envelopes and waveforms
//! - **Parameter Fields**: constants, tables and arithmetic on them, passed to
//!   instruments as time-varying parameters
//! - **Parallel Stages**: instruments within a stage run on a rayon pool
//!
//! ## Quick Start
//!
//! ```no_run
//! use rtmix::audio_io::VecSink;
//! use rtmix::config::EngineConfig;
//! use rtmix::dispatch::ScriptValue;
//! use rtmix::engine::Engine;
//! use rtmix::render::{RenderOptions, Renderer};
//!
//! let mut engine = Engine::new(EngineConfig::default())?;
//! let note: Vec<ScriptValue> = [0.0, 1.0, 0.5, 440.0].iter().map(|&v| ScriptValue::Float(v)).collect();
//! engine.dispatch("WAVETABLE", &note)?;
//!
//! let mut sink = VecSink::new();
//! let stats = Renderer::new(RenderOptions::default()).render(&mut engine, &mut sink)?;
//! assert_eq!(stats.frames, 44100);
//! # Ok::<(), rtmix::error::EngineError>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! score/script -> dispatch -> Engine -> Scheduler -> Voice (Instrument)
//!                                 |                      |
//!                              GenStore             BusBuffers -> OutputSink
//! ```

pub mod audio_io;
pub mod bus;
pub mod config;
pub mod diagnostics;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod gen;
pub mod instrument;
pub mod pfield;
pub mod render;
pub mod scheduler;
pub mod score;
pub mod ugens;

pub use engine::Engine;
pub use error::{EngineError, Result};
