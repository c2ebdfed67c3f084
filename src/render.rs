//! Offline rendering
//!
//! Drives an [`Engine`] block by block into an [`OutputSink`] until every
//! scheduled note has finished (or a fixed duration has elapsed) and
//! collects statistics about what was written. The signal is passed through
//! untouched.

use crate::audio_io::OutputSink;
use crate::bus::PeakReport;
use crate::diagnostics::Severity;
use crate::engine::Engine;
use crate::error::Result;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Stop after this many seconds; by default render until the last note
    /// (ringdown included) ends
    pub duration: Option<f64>,
}

pub struct Renderer {
    options: RenderOptions,
}

impl Renderer {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    /// Render everything scheduled on `engine` into `sink`, then finish the
    /// sink
    pub fn render(&self, engine: &mut Engine, sink: &mut dyn OutputSink) -> Result<RenderStats> {
        let config = engine.config().clone();
        let channels = config.output_channels;
        let total = match self.options.duration {
            Some(seconds) => config.seconds_to_frames(seconds),
            None => engine.scheduler().last_frame().unwrap_or(0).saturating_sub(engine.clock()),
        };
        info!(
            "rendering {} frames ({:.3} s) on {} channels",
            total,
            total as f64 / config.sample_rate as f64,
            channels
        );

        let started = Instant::now();
        let mut stats = RenderStats::new(channels, config.sample_rate);
        let mut written = 0u64;
        let mut blocks = 0usize;
        while written < total {
            let (block, block_stats) = engine.render_block()?;
            let frames = (block.len() / channels).min((total - written) as usize);
            let block = &block[..frames * channels];
            stats.accumulate(block);
            sink.write(block)?;
            written += frames as u64;
            blocks += 1;
            if block_stats.activated + block_stats.retired > 0 {
                debug!(
                    "block {}: {} started, {} ran, {} finished",
                    blocks, block_stats.activated, block_stats.ran, block_stats.retired
                );
            }
        }
        sink.finish()?;

        stats.blocks = blocks;
        stats.elapsed_secs = started.elapsed().as_secs_f64();
        stats.peaks = if config.check_peaks {
            engine.state().peaks.reports().to_vec()
        } else {
            Vec::new()
        };
        stats.clipped = engine.state().peaks.total_clipped();
        stats.warnings = engine.reporter().count(Severity::Warn);
        stats.fatal_errors = engine.reporter().count(Severity::Fatal);
        Ok(stats)
    }
}

/// Statistics about rendered audio
#[derive(Debug, Clone, Default, Serialize)]
pub struct RenderStats {
    pub duration: f64,
    pub frames: u64,
    pub channels: usize,
    pub blocks: usize,
    pub rms: f32,
    pub peak: f32,
    pub dc_offset: f32,
    /// Sign changes on channel 0
    pub zero_crossings: usize,
    pub peaks: Vec<PeakReport>,
    pub clipped: u64,
    pub warnings: usize,
    pub fatal_errors: usize,
    pub elapsed_secs: f64,
    #[serde(skip)]
    sample_rate: f32,
    #[serde(skip)]
    sum: f64,
    #[serde(skip)]
    sum_squares: f64,
    #[serde(skip)]
    last_sign: Option<bool>,
}

impl RenderStats {
    fn new(channels: usize, sample_rate: f32) -> Self {
        Self {
            channels,
            sample_rate,
            ..Self::default()
        }
    }

    fn accumulate(&mut self, interleaved: &[f32]) {
        for &sample in interleaved {
            self.sum += sample as f64;
            self.sum_squares += (sample as f64) * (sample as f64);
            self.peak = self.peak.max(sample.abs());
        }
        for frame in interleaved.chunks_exact(self.channels.max(1)) {
            let positive = frame[0] >= 0.0;
            if matches!(self.last_sign, Some(last) if last != positive) {
                self.zero_crossings += 1;
            }
            self.last_sign = Some(positive);
        }
        self.frames += (interleaved.len() / self.channels.max(1)) as u64;

        let samples = (self.frames * self.channels as u64).max(1) as f64;
        self.rms = (self.sum_squares / samples).sqrt() as f32;
        self.dc_offset = (self.sum / samples) as f32;
        self.duration = self.frames as f64 / self.sample_rate as f64;
    }

    pub fn print_summary(&self) {
        println!("Render Statistics:");
        println!("  Duration:       {:.3} seconds", self.duration);
        println!("  Frames:         {} ({} blocks)", self.frames, self.blocks);
        println!("  RMS:            {:.3}", self.rms);
        println!("  Peak:           {:.3}", self.peak);
        println!("  DC Offset:      {:.6}", self.dc_offset);
        println!("  Zero Crossings: {}", self.zero_crossings);
        for report in &self.peaks {
            println!(
                "  Out {}: peak {:.4} at {:.4} s",
                report.channel,
                report.peak,
                report.location as f64 / self.sample_rate as f64
            );
        }
        if self.clipped > 0 {
            println!("  Clipped samples: {}", self.clipped);
        }
        if self.warnings + self.fatal_errors > 0 {
            println!("  Warnings: {}, fatal errors: {}", self.warnings, self.fatal_errors);
        }
        println!("  Rendered in {:.3} s", self.elapsed_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_io::{VecSink, WavFormat, WavSink};
    use crate::config::EngineConfig;
    use crate::dispatch::ScriptValue;
    use tempfile::tempdir;

    fn engine(channels: usize) -> Engine {
        Engine::new(EngineConfig {
            sample_rate: 8000.0,
            block_frames: 64,
            output_channels: channels,
            worker_threads: 1,
            ..EngineConfig::default()
        })
        .unwrap()
    }

    fn note(engine: &mut Engine, args: &[f64]) {
        let values: Vec<ScriptValue> = args.iter().map(|&v| ScriptValue::Float(v)).collect();
        engine.dispatch("WAVETABLE", &values).unwrap();
    }

    #[test]
    fn test_render_stops_at_last_note() {
        let mut engine = engine(1);
        note(&mut engine, &[0.0, 0.5, 0.5, 440.0]);
        note(&mut engine, &[0.25, 0.5, 0.5, 440.0]);

        let mut sink = VecSink::new();
        let stats = Renderer::new(RenderOptions::default())
            .render(&mut engine, &mut sink)
            .unwrap();

        // 0.75 s at 8 kHz, not rounded up to whole blocks
        assert_eq!(sink.samples.len(), 6000);
        assert_eq!(stats.frames, 6000);
        assert!((stats.duration - 0.75).abs() < 1e-9);

        // a 440 Hz sine crosses zero about 880 times a second
        let expected = 0.75 * 880.0;
        assert!((stats.zero_crossings as f64 - expected).abs() < 20.0);
        assert!(stats.peak > 0.9 && stats.peak < 1.01);
        assert!(engine.is_idle());
    }

    #[test]
    fn test_fixed_duration() {
        let mut engine = engine(2);
        note(&mut engine, &[0.0, 1.0, 0.3, 220.0, 0.0]);

        let mut sink = VecSink::new();
        let stats = Renderer::new(RenderOptions { duration: Some(0.1) })
            .render(&mut engine, &mut sink)
            .unwrap();
        assert_eq!(stats.frames, 800);
        assert_eq!(sink.samples.len(), 1600);
        // hard left pan leaves the right channel silent
        assert!(sink.samples.iter().skip(1).step_by(2).all(|&s| s.abs() < 1e-6));
        assert_eq!(stats.peaks.len(), 2);
    }

    #[test]
    fn test_render_to_wav_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("render.wav");
        let mut engine = engine(1);
        note(&mut engine, &[0.0, 0.25, 0.5, 440.0]);

        let mut sink = WavSink::create(&path, 1, 8000, WavFormat::Int16).unwrap();
        let stats = Renderer::new(RenderOptions::default())
            .render(&mut engine, &mut sink)
            .unwrap();
        assert_eq!(stats.frames, 2000);

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.len(), 2000);
    }
}
