//! Instrument base contract
//!
//! An instrument is a scheduled voice with private DSP state. The engine
//! drives it through a fixed lifecycle:
//!
//! ```text
//! Uninitialized -> Initialized -> Running -> [Ringdown] -> Done
//! ```
//!
//! `init` validates parameters, looks up tables and claims an output
//! window; `run` is then called once per block the window overlaps and must
//! emit exactly `frames_to_run()` frames.

pub mod core;
pub mod library;
pub mod params;

pub use self::core::{BlockSpan, InitContext, InstrumentState, RunContext, Voice};
pub use self::params::{ParamLayout, ParamValue, Params};

use crate::error::Result;
use std::sync::Arc;

pub trait Instrument: Send {
    fn name(&self) -> &str;

    /// Declared parameters and the defaults of the optional trailing ones
    fn layout(&self) -> ParamLayout;

    /// Validate `params` (already filled with defaults) and set up state.
    /// Must call `ctx.set_output`. Returns the nominal frame count.
    fn init(&mut self, params: &Params, ctx: &mut InitContext) -> Result<u64>;

    /// Produce `ctx.frames_to_run()` frames through `ctx.add_out`.
    /// Returns the number of frames produced.
    fn run(&mut self, ctx: &mut RunContext) -> usize;
}

/// Makes a fresh, uninitialized instrument
pub type InstrumentFactory = Arc<dyn Fn() -> Box<dyn Instrument> + Send + Sync>;
