/// Wavetable oscillator with a phase accumulator
///
/// Reads a shared wavetable (`Arc<[f32]>`, so many oscillators can play the
/// same gen table) with either no interpolation or linear interpolation.
/// The phase is kept in table-index units: each tick advances it by
/// `freq * table_len / sample_rate` and wraps into `[0, table_len)`.
///
/// The control-rate variant advances `how_often` samples worth of phase per
/// tick, for callers that only update every `how_often` audio samples.
use super::{Oscillator, TWO_PI};
use std::sync::Arc;

/// Length of the default sine table used when no wavetable is given
pub const DEFAULT_WAVETABLE_SIZE: usize = 1024;

/// How a table is read between stored points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    None,
    Linear,
}

#[derive(Debug, Clone)]
pub struct Oscil {
    table: Arc<[f32]>,
    interp: Interpolation,
    sample_rate: f64,
    /// Audio samples represented by one tick (1 at audio rate)
    how_often: u32,
    initial_phase: f64,
    phase: f64,
}

impl Oscil {
    /// Audio-rate oscillator.
    ///
    /// `initial_phase` is a fraction of a cycle in `[0, 1)`. With no table a
    /// `DEFAULT_WAVETABLE_SIZE`-point sine is used.
    pub fn new(
        sample_rate: f32,
        initial_phase: f32,
        table: Option<Arc<[f32]>>,
        interp: Interpolation,
    ) -> Self {
        Self::control_rate(1, sample_rate, initial_phase, table, interp)
    }

    /// Oscillator ticked once every `how_often` audio samples
    pub fn control_rate(
        how_often: u32,
        sample_rate: f32,
        initial_phase: f32,
        table: Option<Arc<[f32]>>,
        interp: Interpolation,
    ) -> Self {
        let table = match table {
            Some(t) if !t.is_empty() => t,
            _ => sine_table(DEFAULT_WAVETABLE_SIZE),
        };
        let initial_phase = (initial_phase as f64).rem_euclid(1.0) * table.len() as f64;
        Self {
            table,
            interp,
            sample_rate: sample_rate as f64,
            how_often: how_often.max(1),
            initial_phase,
            phase: initial_phase,
        }
    }

    pub fn table_len(&self) -> usize {
        self.table.len()
    }

    /// Current phase in table-index units
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Set phase as a fraction of a cycle
    pub fn set_phase(&mut self, fraction: f32) {
        self.phase = (fraction as f64).rem_euclid(1.0) * self.table.len() as f64;
    }

    fn read(&self) -> f32 {
        let len = self.table.len();
        match self.interp {
            Interpolation::None => self.table[(self.phase as usize).min(len - 1)],
            Interpolation::Linear => {
                let i = (self.phase as usize).min(len - 1);
                let frac = (self.phase - i as f64) as f32;
                let next = if i + 1 == len { 0 } else { i + 1 };
                self.table[i] + (self.table[next] - self.table[i]) * frac
            }
        }
    }
}

impl Oscillator for Oscil {
    fn tick(&mut self, freq: f32, amp: f32) -> f32 {
        let out = self.read() * amp;
        let len = self.table.len() as f64;
        let increment = freq as f64 * len / self.sample_rate * self.how_often as f64;
        self.phase = (self.phase + increment).rem_euclid(len);
        // rem_euclid can round up to exactly len for tiny negative phases
        if self.phase >= len {
            self.phase = 0.0;
        }
        out
    }

    fn clear(&mut self) {
        self.phase = self.initial_phase;
    }
}

/// Single-cycle sine table
pub fn sine_table(size: usize) -> Arc<[f32]> {
    (0..size)
        .map(|i| (TWO_PI * i as f64 / size as f64).sin() as f32)
        .collect::<Vec<f32>>()
        .into()
}
