//! The engine: shared state plus the dispatch and block-rendering façade
//!
//! [`EngineState`] holds everything instruments and built-ins share: the
//! configuration, diagnostics, bus buffers, bus bindings, function tables
//! and peak statistics. [`Engine`] adds the scheduler and the function
//! registry and is what a score or script talks to.
//!
//! # Built-in functions
//!
//! | Name | Arguments | Returns |
//! |---|---|---|
//! | `makegen` | slot, gen number, size, args... | table length |
//! | `maketable` | gen number or name, size, args... | table handle |
//! | `bus_config` | instrument name, bus specs... | binding description |
//! | `print_on` | [level] | new level |
//! | `reset` | control rate | control rate |
//!
//! Every registered instrument name is callable too and returns the note's
//! nominal duration in seconds.

use crate::audio_io::{InputSource, SilentInput};
use crate::bus::{BusBuffers, BusConfigRegistry, BusSlot, PeakTracker, PlayLists};
use crate::config::{EngineConfig, FatalPolicy};
use crate::diagnostics::{Reporter, Severity};
use crate::dispatch::{
    float_arg, float_args, marshal_args, str_arg, Arg, BuiltinFn, Callable, FunctionRegistry, ReturnValue,
    ScriptValue,
};
use crate::error::{EngineError, Result};
use crate::gen::{GenSpec, GenStore};
use crate::instrument::library::builtin_instruments;
use crate::instrument::{InstrumentFactory, Params, Voice};
use crate::pfield::PField;
use crate::scheduler::{BlockStats, Scheduler};
use tracing::{debug, info};

/// State shared by every call and every instrument
pub struct EngineState {
    pub config: EngineConfig,
    pub reporter: Reporter,
    pub buses: BusBuffers,
    pub bus_config: BusConfigRegistry,
    pub gens: GenStore,
    pub peaks: PeakTracker,
}

impl EngineState {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            reporter: Reporter::new(config.verbosity),
            buses: BusBuffers::new(config.block_frames),
            bus_config: BusConfigRegistry::new(config.output_channels),
            gens: GenStore::new(),
            peaks: PeakTracker::new(config.output_channels, config.report_clipping),
            config,
        })
    }

    /// Binding used by instruments without their own `bus_config`
    pub fn default_slot(&self) -> BusSlot {
        BusSlot::default_for(self.config.output_channels)
    }
}

pub struct Engine {
    state: EngineState,
    scheduler: Scheduler,
    registry: FunctionRegistry,
    input: Box<dyn InputSource>,
    input_block: Vec<f32>,
    output_block: Vec<f32>,
    next_id: u64,
}

impl Engine {
    /// An engine with the built-in functions and instruments registered
    pub fn new(config: EngineConfig) -> Result<Self> {
        let state = EngineState::new(config)?;
        let config = &state.config;
        info!(
            "engine: {} Hz, {} frames/block, {} out, {} in, {} worker threads",
            config.sample_rate, config.block_frames, config.output_channels, config.input_channels, config.worker_threads
        );

        let mut registry = FunctionRegistry::new();
        let builtins: [(&str, BuiltinFn); 5] = [
            ("makegen", makegen),
            ("maketable", maketable),
            ("bus_config", bus_config),
            ("print_on", print_on),
            ("reset", reset),
        ];
        for (name, func) in builtins {
            registry.register_builtin(name, func);
        }
        for (name, factory) in builtin_instruments() {
            registry.register_instrument(name, factory);
        }

        let mut scheduler = Scheduler::new(config.worker_threads);
        scheduler.refresh_playlists(&state.bus_config, &state.default_slot())?;

        Ok(Self {
            input: Box::new(SilentInput::new(config.input_channels)),
            input_block: vec![0.0; config.block_frames * config.input_channels],
            output_block: vec![0.0; config.block_frames * config.output_channels],
            scheduler,
            registry,
            state,
            next_id: 0,
        })
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.state.config
    }

    pub fn reporter(&self) -> &Reporter {
        &self.state.reporter
    }

    pub fn gens(&self) -> &GenStore {
        &self.state.gens
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn register_builtin(&mut self, name: &str, func: BuiltinFn) {
        self.registry.register_builtin(name, func);
    }

    pub fn register_instrument(&mut self, name: &str, factory: InstrumentFactory) {
        self.registry.register_instrument(name, factory);
    }

    /// Replace the input source. Its channel count loads IN buses
    /// `0..channels`.
    pub fn set_input(&mut self, input: Box<dyn InputSource>) {
        self.input_block = vec![0.0; self.state.config.block_frames * input.channels()];
        self.input = input;
    }

    /// Call `name` with script values
    pub fn dispatch(&mut self, name: &str, values: &[ScriptValue]) -> Result<ReturnValue> {
        let callable = self
            .registry
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownFunction(name.to_owned()))?;
        let args = marshal_args(name, values)?;
        match callable {
            Callable::Builtin(func) => func(self, &args),
            Callable::Instrument(factory) => self.schedule_instrument(name, &factory, &args),
        }
    }

    /// Create an instrument and queue it. Under `FatalPolicy::SkipInstrument`
    /// a failure is reported as fatal here, the note is dropped and 0.0 is
    /// returned. Under `FatalPolicy::Abort` the error goes back to the caller,
    /// which reports it.
    fn schedule_instrument(&mut self, name: &str, factory: &InstrumentFactory, args: &[Arg]) -> Result<ReturnValue> {
        let created = Params::from_args(name, args).and_then(|params| {
            let state = &self.state;
            Voice::create(
                self.next_id,
                factory(),
                &params,
                state.bus_config.slot_for(name),
                &state.gens,
                &state.reporter,
                state.config.sample_rate,
                state.config.control_skip(),
            )
        });
        match created {
            Ok(voice) => {
                self.next_id += 1;
                let seconds = voice.nsamps() as f64 / self.state.config.sample_rate as f64;
                self.scheduler.schedule(voice, &self.state.reporter);
                Ok(ReturnValue::Float(seconds))
            }
            Err(err) => match self.state.config.fatal_policy {
                FatalPolicy::Abort => Err(err),
                FatalPolicy::SkipInstrument => {
                    self.state.reporter.fatal_error(Some(name), &err);
                    Ok(ReturnValue::Float(0.0))
                }
            },
        }
    }

    /// Nothing pending and nothing running
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    /// Absolute frame of the next block
    pub fn clock(&self) -> u64 {
        self.scheduler.clock()
    }

    /// Render one block into the engine's output buffer and return it
    /// interleaved, `output_channels` wide
    pub fn render_block(&mut self) -> Result<(&[f32], BlockStats)> {
        let state = &self.state;
        self.scheduler.refresh_playlists(&state.bus_config, &state.default_slot())?;

        let block_start = self.scheduler.clock();
        let frames = state.config.block_frames;
        state.buses.clear_for_block();
        let channels = self.input.channels();
        if channels > 0 {
            self.input.read(&mut self.input_block, frames)?;
            state.buses.load_inputs(&self.input_block, channels);
        }

        let stats = self.scheduler.run_block(&state.buses, &state.reporter);

        state
            .buses
            .interleave_outputs(state.config.output_channels, &mut self.output_block);
        if state.config.check_peaks {
            self.state.peaks.scan(&self.output_block, block_start);
        }
        Ok((&self.output_block, stats))
    }

    /// Forget every scheduled note and rewind to frame 0. Tables and bus
    /// bindings are kept.
    pub fn rewind(&mut self) {
        self.scheduler.reset();
        self.state.peaks.reset();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.state.config)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

/// Gen number and whether to rescale to peak 1.0
fn gen_kind(code: f64) -> (i64, bool) {
    let code = code as i64;
    (code.abs(), code > 0)
}

/// `makegen(slot, kind, size, args...)`
fn makegen(engine: &mut Engine, args: &[Arg]) -> Result<ReturnValue> {
    let slot = float_arg("makegen", args, 0)?;
    if slot < 1.0 {
        return Err(EngineError::InvalidSlot(slot.max(0.0) as u32));
    }
    let (kind, normalized) = gen_kind(float_arg("makegen", args, 1)?);
    let size = float_arg("makegen", args, 2)?.max(0.0) as usize;
    let rest = float_args("makegen", args, 3)?;

    let spec = GenSpec::from_args(kind, size, &rest)?;
    let len = engine.state.gens.create(slot as u32, &spec, normalized)?;
    Ok(ReturnValue::Float(len as f64))
}

/// Gen numbers for `maketable`'s named kinds, and whether each is
/// normalized
fn named_gen(name: &str) -> Option<(i64, bool)> {
    let kind = match name {
        "literal" => (2, false),
        "expbrk" => (5, false),
        "linebrk" => (7, false),
        "wave3" => (9, true),
        "wave" => (10, true),
        "random" => (20, false),
        "line" => (24, false),
        "window" => (25, false),
        _ => return None,
    };
    Some(kind)
}

/// `maketable(kind, size, args...)`: a table that lives only in the
/// returned handle
fn maketable(engine: &mut Engine, args: &[Arg]) -> Result<ReturnValue> {
    let (kind, normalized) = match args.first() {
        Some(Arg::Str(name)) => named_gen(name).ok_or_else(|| EngineError::Gen {
            kind: name.clone(),
            message: "unknown table type".into(),
        })?,
        _ => gen_kind(float_arg("maketable", args, 0)?),
    };
    let size = float_arg("maketable", args, 1)?.max(0.0) as usize;
    let rest = float_args("maketable", args, 2)?;

    let spec = GenSpec::from_args(kind, size, &rest)?;
    let mut samples = match &spec {
        GenSpec::Resample { source, size, interp } => engine
            .state
            .gens
            .resample(*source, *size, *interp)
            .ok_or_else(|| EngineError::MissingTable {
                who: "maketable".into(),
                slot: *source,
            })?,
        other => other.generate()?,
    };
    if normalized {
        crate::gen::normalize(&mut samples);
    }
    let table = std::sync::Arc::new(crate::gen::FunctionTable::new(samples, spec.name()));
    let frames = table.len() as u64;
    debug!("maketable: {} points of {}", frames, spec.name());
    Ok(ReturnValue::Handle(PField::table(table, frames)))
}

/// `bus_config(name, specs...)`. A binding that would close an aux loop
/// is rejected and the previous binding kept.
fn bus_config(engine: &mut Engine, args: &[Arg]) -> Result<ReturnValue> {
    let name = str_arg("bus_config", args, 0)?;
    let specs = (1..args.len())
        .map(|i| str_arg("bus_config", args, i))
        .collect::<Result<Vec<&str>>>()?;

    let state = &engine.state;
    let candidate = BusSlot::from_specs(&specs)?;
    let mut slots: Vec<BusSlot> = state
        .bus_config
        .slots()
        .into_iter()
        .filter(|(existing, _)| existing != name)
        .map(|(_, slot)| (*slot).clone())
        .collect();
    slots.push(candidate);
    PlayLists::build(slots.iter())?;

    let slot = state.bus_config.configure(name, &specs)?;
    let description = slot.describe();
    state
        .reporter
        .advise(Some("bus_config"), format!("({}) => {}", name, description));
    engine
        .scheduler
        .refresh_playlists(&engine.state.bus_config, &engine.state.default_slot())?;
    Ok(ReturnValue::Str(description))
}

/// `print_on([level])`: 0-2 fatal only, 3 warnings, 4-6 advisories, 7+
/// debug. No argument means advisories.
fn print_on(engine: &mut Engine, args: &[Arg]) -> Result<ReturnValue> {
    let level = match args.first() {
        None => 5.0,
        Some(_) => float_arg("print_on", args, 0)?,
    };
    let severity = match level as i64 {
        i64::MIN..=2 => Severity::Fatal,
        3 => Severity::Warn,
        4..=6 => Severity::Advise,
        _ => Severity::Debug,
    };
    engine.state.reporter.set_threshold(severity);
    engine.state.config.verbosity = severity;
    Ok(ReturnValue::Float(level))
}

/// `reset(control_rate)`: control-rate updates per second for notes
/// created from now on
fn reset(engine: &mut Engine, args: &[Arg]) -> Result<ReturnValue> {
    let rate = float_arg("reset", args, 0)?;
    if rate < 1.0 {
        return Err(EngineError::Parameter {
            who: "reset".into(),
            message: format!("control rate must be at least 1 (got {})", rate),
        });
    }
    let max = engine.state.config.sample_rate as f64;
    let rate = if rate > max {
        engine
            .state
            .reporter
            .warn(Some("reset"), format!("control rate {} above sample rate, using {}", rate, max));
        max
    } else {
        rate
    };
    engine.state.config.control_rate = rate as u32;
    Ok(ReturnValue::Float(rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusKind;

    fn engine() -> Engine {
        Engine::new(EngineConfig {
            sample_rate: 1000.0,
            block_frames: 100,
            output_channels: 1,
            worker_threads: 1,
            ..EngineConfig::default()
        })
        .unwrap()
    }

    fn call(engine: &mut Engine, name: &str, args: &[f64]) -> Result<ReturnValue> {
        let values: Vec<ScriptValue> = args.iter().map(|&v| ScriptValue::Float(v)).collect();
        engine.dispatch(name, &values)
    }

    #[test]
    fn test_unknown_function() {
        let mut engine = engine();
        assert!(matches!(call(&mut engine, "nope", &[]), Err(EngineError::UnknownFunction(_))));
    }

    #[test]
    fn test_makegen_sign_controls_normalization() {
        let mut engine = engine();
        call(&mut engine, "makegen", &[1.0, 2.0, 2.0, 0.5, 0.25]).unwrap();
        assert_eq!(engine.gens().lookup(1).unwrap().samples(), &[1.0, 0.5]);

        call(&mut engine, "makegen", &[1.0, -2.0, 2.0, 0.5, 0.25]).unwrap();
        assert_eq!(engine.gens().lookup(1).unwrap().samples(), &[0.5, 0.25]);

        assert!(matches!(
            call(&mut engine, "makegen", &[0.0, 2.0, 1.0, 1.0]),
            Err(EngineError::InvalidSlot(0))
        ));
    }

    #[test]
    fn test_maketable_returns_handle() {
        let mut engine = engine();
        let table = engine
            .dispatch(
                "maketable",
                &[
                    ScriptValue::Str("literal".into()),
                    ScriptValue::Float(3.0),
                    ScriptValue::Float(1.0),
                    ScriptValue::Float(2.0),
                    ScriptValue::Float(3.0),
                ],
            )
            .unwrap();
        let handle = table.as_handle().unwrap();
        assert_eq!(handle.len(), 3);
        assert_eq!(handle.value_at(0), 1.0);
        assert_eq!(handle.value_at_fraction(1.0), 3.0);
    }

    #[test]
    fn test_instrument_call_schedules_note() {
        let mut engine = engine();
        let seconds = call(&mut engine, "WAVETABLE", &[0.0, 0.25, 0.5, 100.0]).unwrap();
        assert_eq!(seconds.as_f64(), Some(0.25));
        assert_eq!(engine.scheduler().pending_count(), 1);

        let mut rendered = Vec::new();
        while !engine.is_idle() {
            let (block, _) = engine.render_block().unwrap();
            rendered.extend_from_slice(block);
        }
        assert_eq!(rendered.len(), 300);
        assert!(rendered[..250].iter().any(|&s| s != 0.0));
        assert!(rendered[250..].iter().all(|&s| s == 0.0));
        assert!(engine.state().peaks.reports()[0].peak > 0.0);
    }

    #[test]
    fn test_fatal_policy() {
        let mut engine = engine();
        // too few parameters
        let skipped = call(&mut engine, "WAVETABLE", &[0.0]).unwrap();
        assert_eq!(skipped.as_f64(), Some(0.0));
        assert!(engine.is_idle());
        assert_eq!(engine.reporter().count(Severity::Fatal), 1);

        let mut strict = Engine::new(EngineConfig {
            fatal_policy: FatalPolicy::Abort,
            worker_threads: 1,
            ..EngineConfig::default()
        })
        .unwrap();
        assert!(matches!(
            call(&mut strict, "WAVETABLE", &[0.0]),
            Err(EngineError::MissingParameters { .. })
        ));
        // returned errors are the caller's to report
        assert_eq!(strict.reporter().count(Severity::Fatal), 0);
    }

    #[test]
    fn test_makegen_rejects_oversized_table() {
        let mut engine = engine();
        let size = (crate::gen::MAX_TABLE_SIZE + 1) as f64;
        assert!(matches!(
            call(&mut engine, "makegen", &[1.0, 7.0, size, 0.0, 1.0, 1.0]),
            Err(EngineError::Gen { .. })
        ));
        assert!(engine.gens().lookup(1).is_none());
    }

    #[test]
    fn test_bus_config_rejects_aux_loop() {
        let mut engine = engine();
        let strs = |items: &[&str]| -> Vec<ScriptValue> { items.iter().map(|s| ScriptValue::Str((*s).into())).collect() };

        let described = engine
            .dispatch("bus_config", &strs(&["A", "aux 0 in", "aux 1 out"]))
            .unwrap();
        assert_eq!(described.to_string(), "\"aux 0 in, aux 1 out\"");

        let err = engine
            .dispatch("bus_config", &strs(&["B", "aux 1 in", "aux 0 out"]))
            .unwrap_err();
        assert!(matches!(err, EngineError::BusCycle(_)));
        assert!(!engine.state().bus_config.is_configured("B"));
    }

    #[test]
    fn test_routing_through_aux() {
        let mut engine = engine();
        let strs = |items: &[&str]| -> Vec<ScriptValue> { items.iter().map(|s| ScriptValue::Str((*s).into())).collect() };
        engine.dispatch("bus_config", &strs(&["WAVETABLE", "aux 3 out"])).unwrap();
        engine
            .dispatch("bus_config", &strs(&["MIX", "aux 3 in", "out 0"]))
            .unwrap();
        call(&mut engine, "makegen", &[2.0, 2.0, 4.0, 1.0, 1.0, 1.0, 1.0]).unwrap();

        call(&mut engine, "MIX", &[0.0, 0.0, 0.1, 0.5]).unwrap();
        call(&mut engine, "WAVETABLE", &[0.0, 0.1, 0.4, 10.0]).unwrap();

        let (block, stats) = engine.render_block().unwrap();
        assert_eq!(stats.stages, 2);
        assert!(block.iter().all(|&s| (s - 0.2).abs() < 1e-6));
        assert_eq!(engine.state().buses.read_bus(BusKind::Aux, 3), vec![0.4; 100]);
    }

    #[test]
    fn test_print_on_and_reset() {
        let mut engine = engine();
        call(&mut engine, "print_on", &[3.0]).unwrap();
        assert_eq!(engine.reporter().threshold(), Severity::Warn);
        call(&mut engine, "reset", &[500.0]).unwrap();
        assert_eq!(engine.config().control_skip(), 2);
        assert!(call(&mut engine, "reset", &[0.0]).is_err());
    }
}
