//! Reference instruments
//!
//! Small compositions of the unit generators that exercise the instrument
//! contract end to end.
//!
//! | Name | Parameters |
//! |---|---|
//! | `WAVETABLE` | start, dur, amp, freq, [pan=0.5] |
//! | `MIX` | start, inskip, dur, amp |
//! | `COMBIT` | start, inskip, dur, amp, freq, reverb time, [inchan=0, pan=0.5, ringdown=reverb time] |
//! | `NOISEBAND` | start, dur, amp, cf, bw, [attack=0.01, release=0.1, seed=0, pan=0.5] |
//!
//! Amplitude curves come from function table 1 (all ones if absent);
//! `WAVETABLE` reads its waveform from table 2 (a sine if absent). An amp
//! or freq parameter passed as a handle overrides the table.

use super::{Instrument, InitContext, InstrumentFactory, ParamLayout, ParamValue, Params, RunContext};
use crate::diagnostics::non_negative;
use crate::error::{EngineError, Result};
use crate::ugens::{
    Adsr, Butter, Comb, Envelope, Generator, Interpolation, Noise, Oscil, Oscillator, TableLookup, Tickable,
    MAX_LOOP_SAMPLES,
};
use std::sync::Arc;

/// Every built-in instrument by name
pub fn builtin_instruments() -> Vec<(&'static str, InstrumentFactory)> {
    vec![
        ("WAVETABLE", Arc::new(|| Box::new(Wavetable::default()) as Box<dyn Instrument>)),
        ("MIX", Arc::new(|| Box::new(Mix::default()) as Box<dyn Instrument>)),
        ("COMBIT", Arc::new(|| Box::new(Combit::default()) as Box<dyn Instrument>)),
        ("NOISEBAND", Arc::new(|| Box::new(NoiseBand::default()) as Box<dyn Instrument>)),
    ]
}

/// Amplitude over the note: a field parameter, table 1, or flat
enum AmpCurve {
    Flat,
    Table(TableLookup),
    Field(ParamValue),
}

impl AmpCurve {
    fn load(name: &str, params: &Params, amp_index: usize, nsamps: u64, ctx: &InitContext) -> Self {
        if let Some(value) = params.value(amp_index).filter(|_| params.is_field(amp_index)) {
            return AmpCurve::Field(value.clone());
        }
        match ctx.table(1) {
            Some(table) => {
                let seconds = nsamps as f32 / ctx.sample_rate();
                AmpCurve::Table(TableLookup::new(seconds, ctx.sample_rate(), table.shared(), Interpolation::Linear))
            }
            None => {
                ctx.advise(format!("{}: setting phrase curve to all 1's", name));
                AmpCurve::Flat
            }
        }
    }

    /// Gain at note frame `frame`, times `amp` unless the curve is a field
    fn at(&self, frame: u64, nsamps: u64, amp: f32) -> f32 {
        match self {
            AmpCurve::Flat => amp,
            AmpCurve::Table(table) => table.tick(frame, amp),
            AmpCurve::Field(field) => field.at_fraction(frame as f64 / nsamps.max(1) as f64) as f32,
        }
    }
}

/// Equal-power split of a mono sample across one or two channels
fn pan_frame(sample: f32, pan: f32, channels: usize) -> [f32; 2] {
    if channels == 1 {
        [sample, 0.0]
    } else {
        let angle = pan.clamp(0.0, 1.0) * std::f32::consts::FRAC_PI_2;
        [sample * angle.cos(), sample * angle.sin()]
    }
}

fn mono_or_stereo(name: &str, ctx: &InitContext) -> Result<usize> {
    match ctx.output_channels() {
        1 | 2 => Ok(ctx.output_channels()),
        n => Err(EngineError::Parameter {
            who: name.to_owned(),
            message: format!("output must be either mono or stereo (got {} channels)", n),
        }),
    }
}

#[derive(Default)]
struct Wavetable {
    osc: Option<Oscil>,
    amp_curve: Option<AmpCurve>,
    freq: Option<ParamValue>,
    amp: f32,
    pan: f32,
    nsamps: u64,
    skip: usize,
    branch: usize,
    gain: f32,
}

impl Instrument for Wavetable {
    fn name(&self) -> &str {
        "WAVETABLE"
    }

    fn layout(&self) -> ParamLayout {
        ParamLayout::new(4, &[0.5])
    }

    fn init(&mut self, params: &Params, ctx: &mut InitContext) -> Result<u64> {
        let nsamps = ctx.set_output(params.get(0), params.get(1));
        mono_or_stereo("WAVETABLE", ctx)?;

        self.amp = params.get(2) as f32;
        self.freq = params.value(3).cloned();
        self.pan = params.get(4) as f32;
        self.nsamps = nsamps;
        self.skip = ctx.control_skip().max(1);

        let wavetable = match ctx.table(2) {
            Some(table) => Some(table.shared()),
            None => {
                ctx.advise("WAVETABLE: using a sine wave for the waveform");
                None
            }
        };
        self.osc = Some(Oscil::new(ctx.sample_rate(), 0.0, wavetable, Interpolation::Linear));
        self.amp_curve = Some(AmpCurve::load("WAVETABLE", params, 2, nsamps, ctx));
        Ok(nsamps)
    }

    fn run(&mut self, ctx: &mut RunContext) -> usize {
        let (osc, curve) = match (self.osc.as_mut(), self.amp_curve.as_ref()) {
            (Some(osc), Some(curve)) => (osc, curve),
            _ => return 0,
        };
        let channels = ctx.output_channels();
        for _ in 0..ctx.frames_to_run() {
            let frame = ctx.current_frame();
            if self.branch == 0 {
                self.gain = curve.at(frame, self.nsamps, self.amp);
                self.branch = self.skip;
            }
            self.branch -= 1;

            let freq = match &self.freq {
                Some(f) => f.at_fraction(frame as f64 / self.nsamps.max(1) as f64) as f32,
                None => 0.0,
            };
            let sample = osc.tick(freq, self.gain);
            ctx.add_out(&pan_frame(sample, self.pan, channels));
        }
        ctx.frames_to_run()
    }
}

#[derive(Default)]
struct Mix {
    amp: f32,
    amp_curve: Option<AmpCurve>,
    nsamps: u64,
    frame: Vec<f32>,
}

impl Instrument for Mix {
    fn name(&self) -> &str {
        "MIX"
    }

    fn layout(&self) -> ParamLayout {
        ParamLayout::new(4, &[])
    }

    fn init(&mut self, params: &Params, ctx: &mut InitContext) -> Result<u64> {
        let nsamps = ctx.set_output(params.get(0), params.get(2));
        ctx.set_input(params.get(1))?;
        self.amp = params.get(3) as f32;
        self.nsamps = nsamps;
        self.amp_curve = Some(AmpCurve::load("MIX", params, 3, nsamps, ctx));
        self.frame = vec![0.0; ctx.output_channels()];
        Ok(nsamps)
    }

    fn run(&mut self, ctx: &mut RunContext) -> usize {
        let curve = match self.amp_curve.as_ref() {
            Some(curve) => curve,
            None => return 0,
        };
        let in_chans = ctx.input_channels();
        let out_chans = ctx.output_channels();
        for i in 0..ctx.frames_to_run() {
            let gain = curve.at(ctx.current_frame(), self.nsamps, self.amp);
            self.frame.iter_mut().for_each(|s| *s = 0.0);
            for ch in 0..in_chans {
                let sample = ctx.input().get(i * in_chans + ch).copied().unwrap_or(0.0);
                self.frame[ch % out_chans] += sample * gain;
            }
            ctx.add_out(&self.frame);
        }
        ctx.frames_to_run()
    }
}

#[derive(Default)]
struct Combit {
    comb: Option<Comb>,
    amp: f32,
    amp_curve: Option<AmpCurve>,
    inchan: usize,
    pan: f32,
    nsamps: u64,
}

impl Instrument for Combit {
    fn name(&self) -> &str {
        "COMBIT"
    }

    fn layout(&self) -> ParamLayout {
        ParamLayout::new(6, &[0.0, 0.5, -1.0])
    }

    fn init(&mut self, params: &Params, ctx: &mut InitContext) -> Result<u64> {
        let freq = params.get(4) as f32;
        let reverb_time = params.get(5);
        if freq <= 0.0 {
            return Err(EngineError::Parameter {
                who: "COMBIT".into(),
                message: format!("comb frequency must be positive (got {})", freq),
            });
        }
        let longest = ctx.sample_rate() as f64 / freq as f64 * 1.1;
        if longest > MAX_LOOP_SAMPLES as f64 {
            return Err(EngineError::Parameter {
                who: "COMBIT".into(),
                message: format!(
                    "comb frequency {} is too low; the loop would need {:.0} samples (limit {})",
                    freq, longest, MAX_LOOP_SAMPLES
                ),
            });
        }
        if reverb_time <= 0.0 {
            return Err(EngineError::Parameter {
                who: "COMBIT".into(),
                message: "reverb time must be greater than 0".into(),
            });
        }

        let nsamps = ctx.set_output(params.get(0), params.get(2));
        ctx.set_input(params.get(1))?;
        mono_or_stereo("COMBIT", ctx)?;
        self.inchan = ctx.check_input_channel(params.get(6) as usize)?;
        self.pan = params.get(7) as f32;
        let ringdown = match params.get(8) {
            r if r < 0.0 => reverb_time,
            r => r,
        };
        ctx.set_ringdown(ringdown);

        // feedback that decays 60 dB over the reverb time
        let loop_time = 1.0 / freq as f64;
        let feedback = 10f64.powf(-3.0 * loop_time / reverb_time) as f32;
        let mut comb = Comb::new(ctx.sample_rate(), loop_time as f32 * 1.1, feedback);
        comb.set_frequency(freq);
        self.comb = Some(comb);

        self.amp = params.get(3) as f32;
        self.nsamps = nsamps;
        self.amp_curve = Some(AmpCurve::load("COMBIT", params, 3, nsamps, ctx));
        Ok(nsamps)
    }

    fn run(&mut self, ctx: &mut RunContext) -> usize {
        let (comb, curve) = match (self.comb.as_mut(), self.amp_curve.as_ref()) {
            (Some(comb), Some(curve)) => (comb, curve),
            _ => return 0,
        };
        let in_chans = ctx.input_channels().max(1);
        let channels = ctx.output_channels();
        for i in 0..ctx.frames_to_run() {
            let frame = ctx.current_frame();
            let input = if ctx.in_ringdown() {
                0.0
            } else {
                let gain = curve.at(frame, self.nsamps, self.amp);
                ctx.input().get(i * in_chans + self.inchan).copied().unwrap_or(0.0) * gain
            };
            let sample = comb.tick(input);
            ctx.add_out(&pan_frame(sample, self.pan, channels));
        }
        ctx.frames_to_run()
    }
}

#[derive(Default)]
struct NoiseBand {
    noise: Option<Noise>,
    filter: Option<Butter>,
    env: Option<Adsr>,
    amp: f32,
    pan: f32,
    released: bool,
}

impl Instrument for NoiseBand {
    fn name(&self) -> &str {
        "NOISEBAND"
    }

    fn layout(&self) -> ParamLayout {
        ParamLayout::new(5, &[0.01, 0.1, 0.0, 0.5])
    }

    fn init(&mut self, params: &Params, ctx: &mut InitContext) -> Result<u64> {
        let release = ctx.reporter().take("NOISEBAND", non_negative("release time", params.get(6) as f32));
        let nsamps = ctx.set_output(params.get(0), params.get(1));
        ctx.set_ringdown(release as f64);
        mono_or_stereo("NOISEBAND", ctx)?;

        let sr = ctx.sample_rate();
        self.filter = Some(Butter::bandpass(sr, params.get(3) as f32, params.get(4) as f32)?);

        let mut env = Adsr::new(sr);
        env.set_all_times(params.get(5) as f32, 0.0, 1.0, release);
        env.key_on();
        self.env = Some(env);

        self.noise = Some(Noise::new(params.get(7).max(0.0) as u64));
        self.amp = params.get(2) as f32;
        self.pan = params.get(8) as f32;
        Ok(nsamps)
    }

    fn run(&mut self, ctx: &mut RunContext) -> usize {
        let (noise, filter, env) = match (self.noise.as_mut(), self.filter.as_mut(), self.env.as_mut()) {
            (Some(n), Some(f), Some(e)) => (n, f, e),
            _ => return 0,
        };
        let channels = ctx.output_channels();
        for _ in 0..ctx.frames_to_run() {
            if !self.released && ctx.in_ringdown() {
                env.key_off();
                self.released = true;
            }
            let sample = filter.tick(noise.tick()) * env.tick() * self.amp;
            ctx.add_out(&pan_frame(sample, self.pan, channels));
        }
        ctx.frames_to_run()
    }
}
