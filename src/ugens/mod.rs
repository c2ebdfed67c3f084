//! Unit-generator primitives
//!
//! Small stateful building blocks that instruments compose. Each primitive
//! holds only its own running state and is exposed through one of four
//! capability traits instead of a class hierarchy:
//!
//! - [`Tickable`] - one sample in, one sample out (filters, delays, combs)
//! - [`Oscillator`] - frequency and amplitude in, one sample out
//! - [`Envelope`] - triggered with key on/off, one value out per tick
//! - [`Generator`] - no input, one sample out (noise)
//!
//! Every primitive implements `clear()`, which returns it to the state of a
//! freshly constructed instance without reallocating.
//!
//! Parameter setters follow a "correct and continue" policy: out-of-range
//! values are repaired and a warning is logged. Only values that cannot be
//! repaired (zero bandwidth, for example) produce an error.

pub mod comb;
pub mod delay;
pub mod envelope;
pub mod filter;
pub mod noise;
pub mod oscillator;
pub mod table;

pub use comb::{Comb, MAX_LOOP_SAMPLES};
pub use delay::DelayLine;
pub use envelope::{Adsr, EnvState, LinearEnvelope};
pub use filter::{Butter, ButterKind, Notch, OnePole, TwoPole, TwoZero};
pub use noise::{Noise, SubNoise};
pub use oscillator::{Interpolation, Oscil, DEFAULT_WAVETABLE_SIZE};
pub use table::TableLookup;

/// One sample in, one sample out
pub trait Tickable {
    fn tick(&mut self, input: f32) -> f32;

    /// Reset history to silence
    fn clear(&mut self);

    /// Most recent output
    fn last_out(&self) -> f32;
}

/// Periodic wavetable readout
pub trait Oscillator {
    fn tick(&mut self, freq: f32, amp: f32) -> f32;

    /// Reset phase to its initial value
    fn clear(&mut self);
}

/// Key-triggered control envelope
pub trait Envelope {
    fn tick(&mut self) -> f32;
    fn key_on(&mut self);
    fn key_off(&mut self);
    fn clear(&mut self);

    /// Current value without advancing
    fn value(&self) -> f32;
}

/// Input-less signal source
pub trait Generator {
    fn tick(&mut self) -> f32;
    fn clear(&mut self);
}

pub(crate) const TWO_PI: f64 = std::f64::consts::PI * 2.0;
