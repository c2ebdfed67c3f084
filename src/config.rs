//! Engine configuration
//!
//! Loaded from TOML, with every field optional:
//!
//! ```toml
//! sample_rate = 48000.0
//! block_frames = 256
//! output_channels = 2
//! verbosity = "warn"
//! fatal_policy = "skip_instrument"
//! ```

use crate::bus::MAX_BUS;
use crate::diagnostics::Severity;
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What a fatal error during instrument construction does to the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatalPolicy {
    /// Report the error, skip the offending instrument and keep going
    SkipInstrument,
    /// Report the error and stop the whole run
    Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sample rate in Hz
    pub sample_rate: f32,
    /// Frames per scheduler block
    pub block_frames: usize,
    /// Output channel count (OUT buses 0..n feed the output block)
    pub output_channels: usize,
    /// Input channel count (IN buses 0..n are loaded from the input source)
    pub input_channels: usize,
    /// Lowest severity that gets printed; fatal always prints
    pub verbosity: Severity,
    pub fatal_policy: FatalPolicy,
    /// Track per-bus peaks for the end-of-run report
    pub check_peaks: bool,
    /// Count samples beyond full scale
    pub report_clipping: bool,
    /// Threads used to run instruments within a block (1 = run inline)
    pub worker_threads: usize,
    /// Control-rate updates per second for instruments that subsample curves
    pub control_rate: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            block_frames: 512,
            output_channels: 2,
            input_channels: 0,
            verbosity: Severity::Advise,
            fatal_policy: FatalPolicy::SkipInstrument,
            check_peaks: true,
            report_clipping: true,
            worker_threads: num_cpus::get().max(1),
            control_rate: 1000,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document and validate it
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Load the user's config file if present, defaults otherwise
    pub fn load_default() -> Result<Self> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.sample_rate > 0.0) {
            return Err(EngineError::Config(format!(
                "sample_rate must be positive (got {})",
                self.sample_rate
            )));
        }
        if self.block_frames == 0 {
            return Err(EngineError::Config("block_frames must be at least 1".into()));
        }
        if self.output_channels == 0 || self.output_channels > MAX_BUS {
            return Err(EngineError::Config(format!(
                "output_channels must be in 1..={MAX_BUS} (got {})",
                self.output_channels
            )));
        }
        if self.input_channels > MAX_BUS {
            return Err(EngineError::Config(format!(
                "input_channels must be at most {MAX_BUS} (got {})",
                self.input_channels
            )));
        }
        if self.worker_threads == 0 {
            return Err(EngineError::Config("worker_threads must be at least 1".into()));
        }
        if self.control_rate == 0 {
            return Err(EngineError::Config("control_rate must be at least 1".into()));
        }
        Ok(())
    }

    /// Samples between control-rate updates
    pub fn control_skip(&self) -> usize {
        ((self.sample_rate / self.control_rate as f32) as usize).max(1)
    }

    /// Convert seconds to a whole number of frames, rounding to nearest
    pub fn seconds_to_frames(&self, seconds: f64) -> u64 {
        (seconds * self.sample_rate as f64 + 0.5).max(0.0) as u64
    }
}

/// `<config dir>/rtmix/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("rtmix").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sample_rate, 44100.0);
        assert_eq!(config.block_frames, 512);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            sample_rate = 48000.0
            verbosity = "warn"
            fatal_policy = "abort"
            "#,
        )
        .unwrap();

        assert_eq!(config.sample_rate, 48000.0);
        assert_eq!(config.verbosity, Severity::Warn);
        assert_eq!(config.fatal_policy, FatalPolicy::Abort);
        assert_eq!(config.block_frames, 512);
    }

    #[test]
    fn test_rejects_zero_block() {
        let result = EngineConfig::from_toml_str("block_frames = 0");
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_rejects_too_many_outputs() {
        let result = EngineConfig::from_toml_str("output_channels = 64");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "block_frames = 64\noutput_channels = 1").unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.block_frames, 64);
        assert_eq!(config.output_channels, 1);
    }

    #[test]
    fn test_seconds_to_frames_rounds() {
        let config = EngineConfig::default();
        assert_eq!(config.seconds_to_frames(1.0), 44100);
        assert_eq!(config.seconds_to_frames(0.5), 22050);
        assert_eq!(config.seconds_to_frames(-1.0), 0);
    }

    #[test]
    fn test_control_skip() {
        let config = EngineConfig::default();
        assert_eq!(config.control_skip(), 44);
    }
}
