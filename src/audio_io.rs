//! Where input blocks come from and where output blocks go
//!
//! The engine pulls one block of interleaved input from an [`InputSource`]
//! before any instrument runs, and pushes each finished output block to an
//! [`OutputSink`]. Files are read and written with `hound`.

use crate::error::{EngineError, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::{debug, info};

pub trait InputSource: Send {
    fn channels(&self) -> usize;

    /// Fill `dest` with up to `frames` interleaved frames. Returns how many
    /// frames were read; the rest of `dest` is left silent.
    fn read(&mut self, dest: &mut [f32], frames: usize) -> Result<usize>;
}

pub trait OutputSink {
    fn write(&mut self, interleaved: &[f32]) -> Result<()>;

    /// Flush and close. Writing after this is an error.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Endless silence
#[derive(Debug, Clone, Copy)]
pub struct SilentInput {
    channels: usize,
}

impl SilentInput {
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl InputSource for SilentInput {
    fn channels(&self) -> usize {
        self.channels
    }

    fn read(&mut self, dest: &mut [f32], _frames: usize) -> Result<usize> {
        dest.iter_mut().for_each(|s| *s = 0.0);
        Ok(0)
    }
}

/// Interleaved samples held in memory, then silence
#[derive(Debug, Clone)]
pub struct BufferInput {
    samples: Vec<f32>,
    channels: usize,
    position: usize,
}

impl BufferInput {
    pub fn new(samples: Vec<f32>, channels: usize) -> Self {
        Self {
            samples,
            channels: channels.max(1),
            position: 0,
        }
    }
}

impl InputSource for BufferInput {
    fn channels(&self) -> usize {
        self.channels
    }

    fn read(&mut self, dest: &mut [f32], frames: usize) -> Result<usize> {
        let wanted = (frames * self.channels).min(dest.len());
        let available = self.samples.len().saturating_sub(self.position);
        let take = wanted.min(available) / self.channels * self.channels;
        dest[..take].copy_from_slice(&self.samples[self.position..self.position + take]);
        dest[take..].iter_mut().for_each(|s| *s = 0.0);
        self.position += take;
        Ok(take / self.channels)
    }
}

/// A WAV file read block by block, then silence
pub struct WavInput {
    reader: hound::WavReader<BufReader<File>>,
    channels: usize,
    /// Scale from integer samples to [-1, 1]
    scale: f32,
}

impl WavInput {
    pub fn open(path: &Path) -> Result<Self> {
        let reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        info!(
            "input {}: {} channels, {} Hz, {} bits",
            path.display(),
            spec.channels,
            spec.sample_rate,
            spec.bits_per_sample
        );
        let scale = match spec.sample_format {
            hound::SampleFormat::Float => 1.0,
            hound::SampleFormat::Int => 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32,
        };
        Ok(Self {
            reader,
            channels: spec.channels as usize,
            scale,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.reader.spec().sample_rate
    }
}

impl InputSource for WavInput {
    fn channels(&self) -> usize {
        self.channels
    }

    fn read(&mut self, dest: &mut [f32], frames: usize) -> Result<usize> {
        let wanted = (frames * self.channels).min(dest.len());
        let mut read = 0;
        match self.reader.spec().sample_format {
            hound::SampleFormat::Float => {
                for (slot, sample) in dest[..wanted].iter_mut().zip(self.reader.samples::<f32>()) {
                    *slot = sample?;
                    read += 1;
                }
            }
            hound::SampleFormat::Int => {
                let scale = self.scale;
                for (slot, sample) in dest[..wanted].iter_mut().zip(self.reader.samples::<i32>()) {
                    *slot = sample? as f32 * scale;
                    read += 1;
                }
            }
        }
        dest[read..].iter_mut().for_each(|s| *s = 0.0);
        Ok(read / self.channels.max(1))
    }
}

/// Collects everything in memory
#[derive(Debug, Clone, Default)]
pub struct VecSink {
    pub samples: Vec<f32>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputSink for VecSink {
    fn write(&mut self, interleaved: &[f32]) -> Result<()> {
        self.samples.extend_from_slice(interleaved);
        Ok(())
    }
}

/// Sample encoding of a written WAV file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WavFormat {
    /// 16-bit PCM; samples beyond full scale are clamped on write
    #[default]
    Int16,
    /// 32-bit float, written unaltered
    Float32,
}

pub struct WavSink {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    format: WavFormat,
    frames: u64,
    channels: usize,
}

impl WavSink {
    pub fn create(path: &Path, channels: usize, sample_rate: u32, format: WavFormat) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: channels as u16,
            sample_rate,
            bits_per_sample: match format {
                WavFormat::Int16 => 16,
                WavFormat::Float32 => 32,
            },
            sample_format: match format {
                WavFormat::Int16 => hound::SampleFormat::Int,
                WavFormat::Float32 => hound::SampleFormat::Float,
            },
        };
        let writer = hound::WavWriter::create(path, spec)?;
        debug!("writing {} ({} channels, {:?})", path.display(), channels, format);
        Ok(Self {
            writer: Some(writer),
            format,
            frames: 0,
            channels,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }
}

impl OutputSink for WavSink {
    fn write(&mut self, interleaved: &[f32]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| EngineError::Io(std::io::Error::new(std::io::ErrorKind::Other, "WAV file already finalized")))?;
        for &sample in interleaved {
            match self.format {
                WavFormat::Int16 => writer.write_sample((sample.clamp(-1.0, 1.0) * 32767.0) as i16)?,
                WavFormat::Float32 => writer.write_sample(sample)?,
            }
        }
        self.frames += (interleaved.len() / self.channels.max(1)) as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_buffer_input_pads_with_silence() {
        let mut input = BufferInput::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2);
        let mut block = vec![9.0; 4];
        assert_eq!(input.read(&mut block, 2).unwrap(), 2);
        assert_eq!(block, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(input.read(&mut block, 2).unwrap(), 1);
        assert_eq!(block, vec![5.0, 6.0, 0.0, 0.0]);
        assert_eq!(input.read(&mut block, 2).unwrap(), 0);
        assert_eq!(block, vec![0.0; 4]);
    }

    #[test]
    fn test_wav_round_trip_float() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.wav");

        let mut sink = WavSink::create(&path, 2, 44100, WavFormat::Float32).unwrap();
        sink.write(&[0.5, -0.5, 1.5, 0.0]).unwrap();
        sink.finish().unwrap();
        assert_eq!(sink.frames_written(), 2);
        assert!(sink.write(&[0.0]).is_err());

        let mut input = WavInput::open(&path).unwrap();
        assert_eq!(input.channels(), 2);
        assert_eq!(input.sample_rate(), 44100);
        let mut block = vec![0.0; 6];
        assert_eq!(input.read(&mut block, 3).unwrap(), 2);
        // float output is not clamped
        assert_eq!(block, vec![0.5, -0.5, 1.5, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_int16_clamps_and_scales() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out16.wav");

        let mut sink = WavSink::create(&path, 1, 8000, WavFormat::Int16).unwrap();
        sink.write(&[2.0, 0.5]).unwrap();
        sink.finish().unwrap();

        let mut input = WavInput::open(&path).unwrap();
        let mut block = vec![0.0; 2];
        input.read(&mut block, 2).unwrap();
        assert!((block[0] - 32767.0 / 32768.0).abs() < 1e-6);
        assert!((block[1] - 0.5).abs() < 1e-3);
    }
}
