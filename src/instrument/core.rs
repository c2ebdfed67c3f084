//! Instrument lifecycle: construction, per-block runs and retirement
//!
//! A [`Voice`] wraps one instrument instance with everything the scheduler
//! needs: its bus binding, its absolute time window and its private I/O
//! buffers. The instrument itself only sees an [`InitContext`] while it is
//! being set up and a [`RunContext`] for each block it runs in.

use super::params::Params;
use super::Instrument;
use crate::bus::{BusBuffers, BusInput, BusKind, BusSlot};
use crate::diagnostics::Reporter;
use crate::error::{EngineError, Result};
use crate::gen::{FunctionTable, GenStore};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentState {
    Uninitialized,
    Initialized,
    Running,
    Ringdown,
    Done,
}

/// What an instrument can see and set while initializing
pub struct InitContext<'a> {
    name: &'a str,
    sample_rate: f32,
    control_skip: usize,
    slot: &'a BusSlot,
    gens: &'a GenStore,
    reporter: &'a Reporter,
    /// (start frame, nominal frames)
    output: Option<(u64, u64)>,
    ringdown: u64,
    inskip: f64,
}

impl<'a> InitContext<'a> {
    pub fn new(
        name: &'a str,
        sample_rate: f32,
        control_skip: usize,
        slot: &'a BusSlot,
        gens: &'a GenStore,
        reporter: &'a Reporter,
    ) -> Self {
        Self {
            name,
            sample_rate,
            control_skip,
            slot,
            gens,
            reporter,
            output: None,
            ringdown: 0,
            inskip: 0.0,
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Samples between control-rate updates
    pub fn control_skip(&self) -> usize {
        self.control_skip
    }

    pub fn input_channels(&self) -> usize {
        self.slot.input_channels()
    }

    pub fn output_channels(&self) -> usize {
        self.slot.output_channels()
    }

    fn frames(&self, seconds: f64) -> u64 {
        (seconds * self.sample_rate as f64 + 0.5).max(0.0) as u64
    }

    /// Claim the output window. Returns the nominal length in frames.
    ///
    /// A negative duration is read as an end time.
    pub fn set_output(&mut self, start: f64, duration: f64) -> u64 {
        let start = if start < 0.0 {
            self.warn(format!("start time {} is negative, using 0", start));
            0.0
        } else {
            start
        };
        let duration = if duration < 0.0 { -duration - start } else { duration };
        let duration = if duration < 0.0 {
            self.warn("end time precedes start time, note has no duration");
            0.0
        } else {
            duration
        };
        let start_frame = self.frames(start);
        let nsamps = self.frames(duration);
        self.output = Some((start_frame, nsamps));
        nsamps
    }

    /// Extra run time after the nominal duration
    pub fn set_ringdown(&mut self, seconds: f64) {
        self.ringdown = self.frames(seconds.max(0.0));
    }

    /// Declare that the instrument reads input
    pub fn set_input(&mut self, inskip: f64) -> Result<()> {
        if self.input_channels() == 0 {
            return Err(EngineError::BusConfig(format!(
                "{} reads input but its bus_config has no input buses",
                self.name
            )));
        }
        if inskip != 0.0 {
            self.advise("input skip is ignored when reading from buses");
        }
        self.inskip = inskip;
        Ok(())
    }

    pub fn inskip(&self) -> f64 {
        self.inskip
    }

    /// Function table at `slot`, if made
    pub fn table(&self, slot: u32) -> Option<Arc<FunctionTable>> {
        self.gens.lookup(slot)
    }

    /// Function table at `slot`, fatal if absent
    pub fn require_table(&self, slot: u32) -> Result<Arc<FunctionTable>> {
        self.gens.lookup(slot).ok_or_else(|| EngineError::MissingTable {
            who: self.name.to_owned(),
            slot,
        })
    }

    /// Channel index must exist on this instrument's input
    pub fn check_input_channel(&self, channel: usize) -> Result<usize> {
        if channel >= self.input_channels() {
            return Err(EngineError::InvalidChannel {
                who: self.name.to_owned(),
                channel,
                available: self.input_channels(),
            });
        }
        Ok(channel)
    }

    pub fn reporter(&self) -> &Reporter {
        self.reporter
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.reporter.warn(Some(self.name), message);
    }

    pub fn advise(&self, message: impl Into<String>) {
        self.reporter.advise(Some(self.name), message);
    }
}

/// What an instrument sees during one block
pub struct RunContext<'a> {
    frames_to_run: usize,
    /// Frames of the note already run before this block
    first_frame: u64,
    nsamps: u64,
    input_channels: usize,
    output_channels: usize,
    input: &'a [f32],
    output: &'a mut [f32],
    written: usize,
    sample_rate: f32,
}

impl<'a> RunContext<'a> {
    /// `output` must hold `frames_to_run * output_channels` zeroed samples
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        frames_to_run: usize,
        first_frame: u64,
        nsamps: u64,
        input: &'a [f32],
        input_channels: usize,
        output: &'a mut [f32],
        output_channels: usize,
        sample_rate: f32,
    ) -> Self {
        debug_assert_eq!(output.len(), frames_to_run * output_channels);
        Self {
            frames_to_run,
            first_frame,
            nsamps,
            input_channels,
            output_channels,
            input,
            output,
            written: 0,
            sample_rate,
        }
    }

    pub fn frames_to_run(&self) -> usize {
        self.frames_to_run
    }

    /// Note-relative frame of the next `add_out`
    pub fn current_frame(&self) -> u64 {
        self.first_frame + self.written as u64
    }

    pub fn input_channels(&self) -> usize {
        self.input_channels
    }

    pub fn output_channels(&self) -> usize {
        self.output_channels
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Nominal note length in frames, not counting ringdown
    pub fn nominal_frames(&self) -> u64 {
        self.nsamps
    }

    /// Interleaved input captured for this block
    pub fn input(&self) -> &[f32] {
        self.input
    }

    /// True once the nominal duration has elapsed
    pub fn in_ringdown(&self) -> bool {
        self.current_frame() >= self.nsamps
    }

    /// Emit one output frame. Missing channels are silent, extra ones are
    /// dropped, and frames beyond `frames_to_run` are ignored.
    pub fn add_out(&mut self, frame: &[f32]) {
        if self.written >= self.frames_to_run {
            return;
        }
        let base = self.written * self.output_channels;
        for (slot, &sample) in self.output[base..base + self.output_channels].iter_mut().zip(frame) {
            *slot = sample;
        }
        self.written += 1;
    }

    pub fn frames_written(&self) -> usize {
        self.written
    }
}

/// Where a voice falls in the current block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    /// Offset into the block of the first frame this voice runs
    pub offset: usize,
    pub frames: usize,
}

/// One scheduled instrument instance
pub struct Voice {
    id: u64,
    name: String,
    instrument: Box<dyn Instrument>,
    slot: Arc<BusSlot>,
    state: InstrumentState,
    /// Absolute first frame
    start: u64,
    /// Nominal length
    nsamps: u64,
    ringdown: u64,
    /// Frames run so far
    done: u64,
    stage: usize,
    sample_rate: f32,
    input: Vec<f32>,
    output: Vec<f32>,
}

impl Voice {
    /// Fill defaults, initialize the instrument and claim its window
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        id: u64,
        mut instrument: Box<dyn Instrument>,
        params: &Params,
        slot: Arc<BusSlot>,
        gens: &GenStore,
        reporter: &Reporter,
        sample_rate: f32,
        control_skip: usize,
    ) -> Result<Self> {
        let name = instrument.name().to_owned();
        let params = instrument.layout().fill(&name, params)?;

        let (start, nsamps, ringdown) = {
            let mut ctx = InitContext::new(&name, sample_rate, control_skip, &slot, gens, reporter);
            let claimed = reporter.collecting(|| instrument.init(&params, &mut ctx))?;
            let (start, nsamps) = ctx.output.ok_or_else(|| EngineError::Parameter {
                who: name.clone(),
                message: "instrument never set its output window".into(),
            })?;
            if claimed != nsamps {
                reporter.warn(
                    Some(&name),
                    format!(
                        "init() returned {} frames but set_output() claimed {}; using {}",
                        claimed, nsamps, nsamps
                    ),
                );
            }
            (start, nsamps, ctx.ringdown)
        };

        Ok(Self {
            id,
            name,
            instrument,
            slot,
            state: InstrumentState::Initialized,
            start,
            nsamps,
            ringdown,
            done: 0,
            stage: 0,
            sample_rate,
            input: Vec::new(),
            output: Vec::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> InstrumentState {
        self.state
    }

    pub fn slot(&self) -> &BusSlot {
        &self.slot
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn nsamps(&self) -> u64 {
        self.nsamps
    }

    /// Absolute frame after the last one this voice runs
    pub fn end(&self) -> u64 {
        self.start + self.nsamps + self.ringdown
    }

    pub fn frames_done(&self) -> u64 {
        self.done
    }

    pub fn stage(&self) -> usize {
        self.stage
    }

    pub fn set_stage(&mut self, stage: usize) {
        self.stage = stage;
    }

    pub fn is_done(&self) -> bool {
        self.state == InstrumentState::Done
    }

    /// Overlap of this voice with the block starting at `block_start`
    pub fn span(&self, block_start: u64, block_frames: usize) -> Option<BlockSpan> {
        let block_end = block_start + block_frames as u64;
        let from = block_start.max(self.start + self.done);
        let to = block_end.min(self.end());
        if from >= to {
            return None;
        }
        Some(BlockSpan {
            offset: (from - block_start) as usize,
            frames: (to - from) as usize,
        })
    }

    /// Start running at absolute frame `now`. Frames of the window before
    /// `now` are skipped; a voice with nothing left is finished unrun.
    pub fn activate(&mut self, now: u64) {
        let total = self.nsamps + self.ringdown;
        if self.start < now {
            self.done = self.done.max((now - self.start).min(total));
        }
        self.state = if self.done >= total {
            InstrumentState::Done
        } else if self.done >= self.nsamps {
            InstrumentState::Ringdown
        } else {
            InstrumentState::Running
        };
    }

    /// Run one block: capture input, call `run()`, mix the result into the
    /// output buses and advance the lifecycle.
    ///
    /// A panic inside `run()` silences and retires the voice. Corrections its
    /// unit generators make are reported as warnings.
    pub fn run_block(&mut self, block_start: u64, buses: &BusBuffers, reporter: &Reporter) {
        if self.is_done() {
            return;
        }
        let span = match self.span(block_start, buses.block_frames()) {
            Some(span) => span,
            None => {
                if block_start >= self.end() {
                    self.state = InstrumentState::Done;
                }
                return;
            }
        };

        let in_chans = self.slot.input_channels();
        let out_chans = self.slot.output_channels();
        match &self.slot.input {
            BusInput::None => self.input.clear(),
            BusInput::In(b) => buses.read_interleaved(BusKind::In, b, span.offset, span.frames, &mut self.input),
            BusInput::Aux(b) => buses.read_interleaved(BusKind::Aux, b, span.offset, span.frames, &mut self.input),
        }
        self.output.clear();
        self.output.resize(span.frames * out_chans, 0.0);

        let instrument = &mut self.instrument;
        let input = &self.input;
        let output = &mut self.output;
        let (first_frame, nsamps, sample_rate) = (self.done, self.nsamps, self.sample_rate);
        let result = reporter.collecting(|| catch_unwind(AssertUnwindSafe(|| {
            let mut ctx = RunContext::new(
                span.frames,
                first_frame,
                nsamps,
                input,
                in_chans,
                output,
                out_chans,
                sample_rate,
            );
            instrument.run(&mut ctx);
            ctx.frames_written()
        })));

        let written = match result {
            Ok(written) => written,
            Err(_) => {
                reporter.fatal(
                    Some(&self.name),
                    format!("instrument panicked at frame {}; removing it", self.start + self.done),
                );
                self.state = InstrumentState::Done;
                return;
            }
        };
        if written < span.frames {
            reporter.warn(
                Some(&self.name),
                format!(
                    "run() produced {} of {} frames; rest of block is silent",
                    written, span.frames
                ),
            );
        }

        for ch in 0..out_chans {
            if let Some(&bus) = self.slot.aux_out.get(ch) {
                buses.mix_channel(BusKind::Aux, bus, span.offset, &self.output, ch, out_chans);
            }
            if let Some(&bus) = self.slot.out.get(ch) {
                buses.mix_channel(BusKind::Out, bus, span.offset, &self.output, ch, out_chans);
            }
        }

        self.done += span.frames as u64;
        self.state = if self.done >= self.nsamps + self.ringdown {
            InstrumentState::Done
        } else if self.done >= self.nsamps {
            InstrumentState::Ringdown
        } else {
            InstrumentState::Running
        };
    }
}

impl std::fmt::Debug for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Voice")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("start", &self.start)
            .field("nsamps", &self.nsamps)
            .field("ringdown", &self.ringdown)
            .field("done", &self.done)
            .field("stage", &self.stage)
            .finish()
    }
}
