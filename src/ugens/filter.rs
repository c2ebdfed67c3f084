/// Recursive filters: one-pole, two-zero, two-pole, notch and Butterworth
///
/// The small filters keep their own history and implement the textbook
/// recurrences directly. `Butter` wraps the `biquad` crate (Direct Form II
/// transposed) and recreates the filter on `clear()`.
///
/// # Recurrences
///
/// - **OnePole**: `y = g·x + p·y[n-1]`, with `g = 1 - |p|`
/// - **TwoZero**: `y = z0·h[0] + z1·h[1] + g·x`, where the history `h` holds
///   gain-scaled inputs
/// - **TwoPole**: `y = g·x + p0·y[n-1] + p1·y[n-2]`
use super::{Tickable, TWO_PI};
use crate::diagnostics::{below_nyquist, clamp_range, positive};
use crate::error::{EngineError, Result};
use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Q_BUTTERWORTH_F32};

/// First-order lowpass / DC-blocking filter
#[derive(Debug, Clone)]
pub struct OnePole {
    sample_rate: f32,
    pole: f32,
    gain: f32,
    last: f32,
}

impl OnePole {
    pub fn new(sample_rate: f32) -> Self {
        let mut filter = Self {
            sample_rate,
            pole: 0.0,
            gain: 1.0,
            last: 0.0,
        };
        filter.set_pole(0.9);
        filter
    }

    /// Pole position in (-1, 1); gain is set for unity at DC (or Nyquist)
    pub fn set_pole(&mut self, pole: f32) {
        self.pole = clamp_range("OnePole pole", pole, -0.9999, 0.9999).logged("OnePole");
        self.gain = 1.0 - self.pole.abs();
    }

    /// Lowpass with a -3 dB point near `freq`
    pub fn set_lowpass(&mut self, freq: f32) {
        let freq = below_nyquist("OnePole cutoff", freq.max(0.0), self.sample_rate).logged("OnePole");
        let pole = (-(TWO_PI as f32) * freq / self.sample_rate).exp();
        self.set_pole(pole);
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }
}

impl Tickable for OnePole {
    fn tick(&mut self, input: f32) -> f32 {
        self.last = self.gain * input + self.pole * self.last;
        self.last
    }

    fn clear(&mut self) {
        self.last = 0.0;
    }

    fn last_out(&self) -> f32 {
        self.last
    }
}

/// FIR with two zeros
#[derive(Debug, Clone)]
pub struct TwoZero {
    sample_rate: f32,
    zeros: [f32; 2],
    gain: f32,
    /// Gain-scaled input history
    inputs: [f32; 2],
    last: f32,
}

impl TwoZero {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            zeros: [0.0, 0.0],
            gain: 1.0,
            inputs: [0.0, 0.0],
            last: 0.0,
        }
    }

    pub fn set_zero_coeffs(&mut self, z0: f32, z1: f32) {
        self.zeros = [z0, z1];
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    /// Place the zero pair at angle `freq` with radius `width` in [0, 1)
    pub fn set_freq_and_width(&mut self, freq: f32, width: f32) {
        let angle = TWO_PI * (freq / self.sample_rate) as f64;
        self.zeros[0] = (-2.0 * width as f64 * angle.cos()) as f32;
        self.zeros[1] = width * width;
    }
}

impl Tickable for TwoZero {
    fn tick(&mut self, input: f32) -> f32 {
        let mut out = self.zeros[0] * self.inputs[0];
        out += self.zeros[1] * self.inputs[1];
        self.inputs[1] = self.inputs[0];
        self.inputs[0] = self.gain * input;
        out += self.inputs[0];
        self.last = out;
        out
    }

    fn clear(&mut self) {
        self.inputs = [0.0, 0.0];
        self.last = 0.0;
    }

    fn last_out(&self) -> f32 {
        self.last
    }
}

/// Resonator with two poles
#[derive(Debug, Clone)]
pub struct TwoPole {
    sample_rate: f32,
    poles: [f32; 2],
    gain: f32,
    outputs: [f32; 2],
}

impl TwoPole {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            poles: [0.0, 0.0],
            gain: 1.0,
            outputs: [0.0, 0.0],
        }
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    /// Pole pair at `freq` with radius `reson` in [0, 1)
    pub fn set_freq_and_reson(&mut self, freq: f32, reson: f32) {
        let reson = clamp_range("TwoPole resonance", reson, 0.0, 0.9999).logged("TwoPole");
        let angle = TWO_PI * (freq / self.sample_rate) as f64;
        self.poles[0] = (2.0 * reson as f64 * angle.cos()) as f32;
        self.poles[1] = -reson * reson;
    }
}

impl Tickable for TwoPole {
    fn tick(&mut self, input: f32) -> f32 {
        let out = self.gain * input + self.poles[0] * self.outputs[0] + self.poles[1] * self.outputs[1];
        self.outputs[1] = self.outputs[0];
        self.outputs[0] = out;
        out
    }

    fn clear(&mut self) {
        self.outputs = [0.0, 0.0];
    }

    fn last_out(&self) -> f32 {
        self.outputs[0]
    }
}

/// Two-zero notch described by centre frequency and bandwidth in Hz
#[derive(Debug, Clone)]
pub struct Notch {
    inner: TwoZero,
}

impl Notch {
    /// Bandwidth must be positive
    pub fn new(sample_rate: f32, freq: f32, bandwidth: f32) -> Result<Self> {
        let mut notch = Self {
            inner: TwoZero::new(sample_rate),
        };
        notch.set_freq_and_bandwidth(freq, bandwidth)?;
        Ok(notch)
    }

    pub fn set_freq_and_bandwidth(&mut self, freq: f32, bandwidth: f32) -> Result<()> {
        if !(bandwidth > 0.0) {
            return Err(EngineError::Bandwidth {
                who: "Notch".into(),
                bandwidth,
            });
        }
        let sr = self.inner.sample_rate;
        let freq = below_nyquist("Notch frequency", freq, sr).logged("Notch");
        let width = (-std::f32::consts::PI * bandwidth / sr).exp();
        self.inner.set_freq_and_width(freq, width);
        Ok(())
    }
}

impl Tickable for Notch {
    fn tick(&mut self, input: f32) -> f32 {
        self.inner.tick(input)
    }

    fn clear(&mut self) {
        self.inner.clear();
    }

    fn last_out(&self) -> f32 {
        self.inner.last_out()
    }
}

/// Butterworth response type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ButterKind {
    LowPass { cutoff: f32 },
    HighPass { cutoff: f32 },
    BandPass { center: f32, bandwidth: f32 },
}

/// Second-order Butterworth section
pub struct Butter {
    sample_rate: f32,
    kind: ButterKind,
    coeffs: Coefficients<f32>,
    filter: DirectForm2Transposed<f32>,
    last: f32,
}

impl Butter {
    pub fn new(sample_rate: f32, kind: ButterKind) -> Result<Self> {
        let coeffs = design(sample_rate, kind)?;
        Ok(Self {
            sample_rate,
            kind,
            coeffs,
            filter: DirectForm2Transposed::<f32>::new(coeffs),
            last: 0.0,
        })
    }

    pub fn lowpass(sample_rate: f32, cutoff: f32) -> Result<Self> {
        Self::new(sample_rate, ButterKind::LowPass { cutoff })
    }

    pub fn highpass(sample_rate: f32, cutoff: f32) -> Result<Self> {
        Self::new(sample_rate, ButterKind::HighPass { cutoff })
    }

    pub fn bandpass(sample_rate: f32, center: f32, bandwidth: f32) -> Result<Self> {
        Self::new(sample_rate, ButterKind::BandPass { center, bandwidth })
    }

    pub fn kind(&self) -> ButterKind {
        self.kind
    }

    /// Retune without clearing history
    pub fn set_kind(&mut self, kind: ButterKind) -> Result<()> {
        self.coeffs = design(self.sample_rate, kind)?;
        self.kind = kind;
        self.filter.update_coefficients(self.coeffs);
        Ok(())
    }
}

fn design(sample_rate: f32, kind: ButterKind) -> Result<Coefficients<f32>> {
    // stay a hair under Nyquist, biquad rejects anything above it
    let limit = |what: &str, f: f32| {
        below_nyquist(what, f.max(1.0), sample_rate * 0.999).logged("Butter")
    };
    let (filter_type, freq, q) = match kind {
        ButterKind::LowPass { cutoff } => (biquad::Type::LowPass, limit("Cutoff", cutoff), Q_BUTTERWORTH_F32),
        ButterKind::HighPass { cutoff } => (biquad::Type::HighPass, limit("Cutoff", cutoff), Q_BUTTERWORTH_F32),
        ButterKind::BandPass { center, bandwidth } => {
            let bandwidth = positive("Butter", "bandwidth", bandwidth).map_err(|_| EngineError::Bandwidth {
                who: "Butter".into(),
                bandwidth,
            })?;
            let center = limit("Center frequency", center);
            (biquad::Type::BandPass, center, center / bandwidth)
        }
    };
    Coefficients::<f32>::from_params(filter_type, sample_rate.hz(), freq.hz(), q).map_err(|e| {
        EngineError::Parameter {
            who: "Butter".into(),
            message: format!("cannot design filter: {:?}", e),
        }
    })
}

impl Tickable for Butter {
    fn tick(&mut self, input: f32) -> f32 {
        self.last = self.filter.run(input);
        self.last
    }

    fn clear(&mut self) {
        self.filter = DirectForm2Transposed::<f32>::new(self.coeffs);
        self.last = 0.0;
    }

    fn last_out(&self) -> f32 {
        self.last
    }
}
