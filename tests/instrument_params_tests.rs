//! Instrument parameter handling: defaults, tables and fatal parameters

use rtmix::audio_io::VecSink;
use rtmix::config::{EngineConfig, FatalPolicy};
use rtmix::diagnostics::Severity;
use rtmix::dispatch::{ReturnValue, ScriptValue};
use rtmix::engine::Engine;
use rtmix::render::{RenderOptions, Renderer};
use rtmix::EngineError;

fn engine(channels: usize, policy: FatalPolicy) -> Engine {
    Engine::new(EngineConfig {
        sample_rate: 8000.0,
        block_frames: 64,
        output_channels: channels,
        worker_threads: 1,
        fatal_policy: policy,
        ..EngineConfig::default()
    })
    .unwrap()
}

fn floats(values: &[f64]) -> Vec<ScriptValue> {
    values.iter().map(|&v| ScriptValue::Float(v)).collect()
}

fn render(engine: &mut Engine) -> Vec<f32> {
    let mut sink = VecSink::new();
    Renderer::new(RenderOptions::default()).render(engine, &mut sink).unwrap();
    sink.samples
}

#[test]
fn test_omitted_trailing_params_match_explicit_defaults() {
    let mut short = engine(2, FatalPolicy::Abort);
    short.dispatch("WAVETABLE", &floats(&[0.0, 0.2, 0.5, 330.0])).unwrap();

    let mut explicit = engine(2, FatalPolicy::Abort);
    explicit.dispatch("WAVETABLE", &floats(&[0.0, 0.2, 0.5, 330.0, 0.5])).unwrap();

    assert_eq!(render(&mut short), render(&mut explicit));
}

#[test]
fn test_missing_amp_table_means_unity_curve() {
    let mut engine = engine(1, FatalPolicy::Abort);
    assert!(engine.gens().lookup(1).is_none());
    engine.dispatch("WAVETABLE", &floats(&[0.0, 0.5, 0.25, 100.0])).unwrap();

    let samples = render(&mut engine);
    let peak = samples.iter().fold(0.0f32, |p, s| p.max(s.abs()));
    assert!((peak - 0.25).abs() < 0.01, "peak {}", peak);
}

#[test]
fn test_amp_table_shapes_the_note() {
    let mut engine = engine(1, FatalPolicy::Abort);
    // gen 1: rise from 0 to 1 across the note
    engine.dispatch("makegen", &floats(&[1.0, 24.0, 1000.0, 0.0, 0.0, 1.0, 1.0])).unwrap();
    engine.dispatch("WAVETABLE", &floats(&[0.0, 1.0, 1.0, 200.0])).unwrap();

    let samples = render(&mut engine);
    let peak = |range: &[f32]| range.iter().fold(0.0f32, |p, s| p.max(s.abs()));
    let head = peak(&samples[..800]);
    let tail = peak(&samples[samples.len() - 800..]);
    assert!(head < 0.15, "head {}", head);
    assert!(tail > 0.85, "tail {}", tail);
}

#[test]
fn test_too_few_params_is_fatal() {
    let mut strict = engine(1, FatalPolicy::Abort);
    let err = strict.dispatch("WAVETABLE", &floats(&[0.0, 1.0, 0.5])).unwrap_err();
    assert!(matches!(err, EngineError::MissingParameters { given: 3, required: 4, .. }));
    assert_eq!(strict.scheduler().pending_count(), 0);
}

#[test]
fn test_uncorrectable_param_skips_only_that_note() {
    let mut lenient = engine(1, FatalPolicy::SkipInstrument);
    lenient.dispatch("makegen", &floats(&[2.0, 10.0, 1024.0, 1.0])).unwrap();

    // comb frequency 0 cannot be repaired
    let skipped = lenient
        .dispatch("COMBIT", &floats(&[0.0, 0.0, 0.1, 1.0, 0.0, 0.5]))
        .unwrap();
    assert!(matches!(skipped, ReturnValue::Float(v) if v == 0.0));
    assert_eq!(lenient.reporter().count(Severity::Fatal), 1);

    lenient.dispatch("WAVETABLE", &floats(&[0.0, 0.1, 0.5, 440.0])).unwrap();
    assert_eq!(lenient.scheduler().pending_count(), 1);

    let mut strict = engine(1, FatalPolicy::Abort);
    assert!(matches!(
        strict.dispatch("COMBIT", &floats(&[0.0, 0.0, 0.1, 1.0, 0.0, 0.5])),
        Err(EngineError::Parameter { .. })
    ));
}

#[test]
fn test_instrument_returns_its_duration() {
    let mut engine = engine(1, FatalPolicy::Abort);
    let duration = engine.dispatch("WAVETABLE", &floats(&[0.5, 0.25, 0.5, 440.0])).unwrap();
    assert_eq!(duration.as_f64(), Some(0.25));
}

#[test]
fn test_input_instrument_without_input_bus_is_fatal() {
    let mut engine = engine(1, FatalPolicy::Abort);
    let args: Vec<ScriptValue> = ["MIX", "out 0"].iter().map(|s| ScriptValue::Str((*s).into())).collect();
    engine.dispatch("bus_config", &args).unwrap();
    assert!(matches!(
        engine.dispatch("MIX", &floats(&[0.0, 0.0, 0.1, 1.0])),
        Err(EngineError::BusConfig(_))
    ));
}
