//! PField composition and dispatch marshaling through the engine

use rtmix::audio_io::VecSink;
use rtmix::config::EngineConfig;
use rtmix::dispatch::{compose, float_args, marshal_args, Arg, ReturnValue, ScriptValue};
use rtmix::engine::Engine;
use rtmix::instrument::{InitContext, Instrument, ParamLayout, ParamValue, Params, RunContext};
use rtmix::pfield::{BinaryOp, PField, DIVIDE_BY_ZERO_SENTINEL};
use rtmix::render::{RenderOptions, Renderer};
use rtmix::EngineError;
use std::sync::Arc;

fn engine() -> Engine {
    Engine::new(EngineConfig {
        sample_rate: 1000.0,
        block_frames: 25,
        output_channels: 1,
        worker_threads: 1,
        ..EngineConfig::default()
    })
    .unwrap()
}

fn floats(values: &[f64]) -> Vec<ScriptValue> {
    values.iter().map(|&v| ScriptValue::Float(v)).collect()
}

/// Plays parameter 2 as a signal across the note
#[derive(Default)]
struct FieldProbe {
    value: Option<ParamValue>,
    nsamps: u64,
}

impl Instrument for FieldProbe {
    fn name(&self) -> &str {
        "FIELD_PROBE"
    }

    fn layout(&self) -> ParamLayout {
        ParamLayout::new(3, &[])
    }

    fn init(&mut self, params: &Params, ctx: &mut InitContext) -> rtmix::Result<u64> {
        self.nsamps = ctx.set_output(params.get(0), params.get(1));
        self.value = params.value(2).cloned();
        Ok(self.nsamps)
    }

    fn run(&mut self, ctx: &mut RunContext) -> usize {
        let last = self.nsamps.saturating_sub(1).max(1) as f64;
        for i in 0..ctx.frames_to_run() {
            let frame = ctx.current_frame() + i as u64;
            let sample = self.value.as_ref().map_or(0.0, |v| v.at_fraction(frame as f64 / last));
            ctx.add_out(&[sample as f32]);
        }
        ctx.frames_to_run()
    }
}

#[test]
fn test_const_plus_const_is_seven_everywhere() {
    let seven = PField::binary(&PField::constant(3.0), &PField::constant(4.0), BinaryOp::Plus);
    for index in [0u64, 1, 99, 1_000_000] {
        assert_eq!(seven.value_at(index), 7.0);
    }
    for fraction in [0.0, 0.5, 1.0] {
        assert_eq!(seven.value_at_fraction(fraction), 7.0);
    }
}

#[test]
fn test_divide_by_zero_gives_sentinel() {
    let zero = PField::constant(0.0);
    let quotient = PField::binary(&PField::constant(5.0), &zero, BinaryOp::Div);
    assert_eq!(quotient.value_at(10), DIVIDE_BY_ZERO_SENTINEL);

    let float_result = compose(&ScriptValue::Float(1.0), &ScriptValue::Float(0.0), BinaryOp::Div).unwrap();
    assert!(matches!(float_result, ScriptValue::Float(v) if v == DIVIDE_BY_ZERO_SENTINEL));
}

#[test]
fn test_shared_subexpression_outlives_parent() {
    let shared = PField::constant(2.0);
    let parent = PField::binary(&shared, &shared, BinaryOp::Mul);
    assert_eq!(shared.ref_count(), 3);
    assert!(parent.contains(&shared));
    drop(parent);
    assert_eq!(shared.ref_count(), 1);
    assert_eq!(shared.value_at(0), 2.0);
}

#[test]
fn test_table_field_drives_an_instrument() {
    let mut engine = engine();
    engine.register_instrument("FIELD_PROBE", Arc::new(|| Box::new(FieldProbe::default()) as Box<dyn Instrument>));

    let mut args = vec![ScriptValue::Str("line".into())];
    args.extend(floats(&[1000.0, 0.0, 0.0, 1.0, 1.0]));
    let ramp = engine.dispatch("maketable", &args).unwrap().into_script();
    let doubled = compose(&ramp, &ScriptValue::Float(2.0), BinaryOp::Mul).unwrap();
    assert!(matches!(doubled, ScriptValue::Handle(_)));

    let args = vec![ScriptValue::Float(0.0), ScriptValue::Float(0.1), doubled];
    engine.dispatch("FIELD_PROBE", &args).unwrap();

    let mut sink = VecSink::new();
    Renderer::new(RenderOptions::default()).render(&mut engine, &mut sink).unwrap();
    assert_eq!(sink.samples.len(), 100);
    assert!(sink.samples[0].abs() < 0.01);
    assert!((sink.samples[99] - 2.0).abs() < 0.01);
    assert!((sink.samples[50] - 2.0 * 50.0 / 99.0).abs() < 0.01);
    assert!(sink.samples.windows(2).all(|w| w[1] >= w[0]));
}

#[test]
fn test_marshaling_errors_reach_the_caller() {
    let mut engine = engine();

    let err = engine.dispatch("WAVETABLE", &[ScriptValue::Void]).unwrap_err();
    assert!(matches!(err, EngineError::InvalidArgument { arg: 0, .. }));

    let err = engine.dispatch("WAVETABLE", &[ScriptValue::List(None)]).unwrap_err();
    assert!(matches!(err, EngineError::NullList { .. }));

    let nested = ScriptValue::List(Some(vec![ScriptValue::List(Some(floats(&[1.0])))]));
    let err = engine.dispatch("WAVETABLE", &[nested]).unwrap_err();
    assert!(matches!(err, EngineError::NestedList { .. }));

    let err = engine.dispatch("no_such_function", &floats(&[1.0])).unwrap_err();
    assert!(matches!(err, EngineError::UnknownFunction(name) if name == "no_such_function"));
}

#[test]
fn test_trailing_list_is_spliced_for_builtins() {
    fn sum(_: &mut Engine, args: &[Arg]) -> rtmix::Result<ReturnValue> {
        Ok(ReturnValue::Float(float_args("sum", args, 0)?.iter().sum()))
    }

    let mut engine = engine();
    engine.register_builtin("sum", sum);
    let args = vec![ScriptValue::Float(1.0), ScriptValue::List(Some(floats(&[2.0, 3.0, 4.0])))];
    let total = engine.dispatch("sum", &args).unwrap();
    assert_eq!(total.as_f64(), Some(10.0));

    // a list before the end stays an array, which sum rejects
    let args = vec![ScriptValue::List(Some(floats(&[2.0, 3.0]))), ScriptValue::Float(1.0)];
    assert!(matches!(marshal_args("sum", &args).unwrap()[0], Arg::Array(_)));
    assert!(matches!(
        engine.dispatch("sum", &args),
        Err(EngineError::ArgumentType { arg: 0, .. })
    ));
}

#[test]
fn test_handles_are_rejected_where_strings_are_expected() {
    let mut engine = engine();
    let args = vec![ScriptValue::Handle(PField::constant(1.0)), ScriptValue::Str("out 0".into())];
    assert!(matches!(
        engine.dispatch("bus_config", &args),
        Err(EngineError::ArgumentType { arg: 0, expected: "string", .. })
    ));
}
