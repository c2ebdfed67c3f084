/// Table generators
///
/// Each [`GenSpec`] variant computes one float array. Numbers in parentheses
/// are the traditional gen routine numbers accepted by `makegen`:
///
/// - `Literal` (2): values taken as given
/// - `ExpSegments` (5): exponential segments `v0 len1 v1 len2 v2 ...`
/// - `LineSegments` (7): straight-line segments, same layout
/// - `Partials` (9): sum of `(partial, amp, phase°)` sine components
/// - `Harmonics` (10): sum of harmonics with the given amplitudes
/// - `Random` (20): random values under a chosen distribution
/// - `TimeValue` (24): breakpoints `(time, value)` spread over the table
/// - `Window` (25): analysis windows
/// - `Resample`: another slot's table at a new length
///
/// Segment lengths are relative: they are scaled to fill the whole table.
use crate::error::{EngineError, Result};
use crate::ugens::{Interpolation, TWO_PI};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Largest table a gen will build, in points
pub const MAX_TABLE_SIZE: usize = 1 << 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distribution {
    Uniform,
    /// Linear, weighted toward the low end
    LowLinear,
    /// Linear, weighted toward the high end
    HighLinear,
    Triangle,
    Gaussian,
}

impl Distribution {
    fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Distribution::Uniform),
            1 => Some(Distribution::LowLinear),
            2 => Some(Distribution::HighLinear),
            3 => Some(Distribution::Triangle),
            4 => Some(Distribution::Gaussian),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    Hanning,
    Hamming,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenSpec {
    Literal(Vec<f32>),
    ExpSegments { size: usize, breakpoints: Vec<f64> },
    LineSegments { size: usize, breakpoints: Vec<f64> },
    Partials { size: usize, partials: Vec<(f64, f64, f64)> },
    Harmonics { size: usize, amplitudes: Vec<f64> },
    Random { size: usize, distribution: Distribution, seed: u64, min: f64, max: f64 },
    TimeValue { size: usize, points: Vec<(f64, f64)> },
    Window { size: usize, kind: WindowKind },
    Resample { source: u32, size: usize, interp: Interpolation },
}

impl GenSpec {
    /// Build a spec from `makegen`-style arguments.
    ///
    /// `kind` is the gen number; its sign is handled by the caller
    /// (negative disables normalization). Resampling uses kind 0 with
    /// args `source_slot [interp]`.
    pub fn from_args(kind: i64, size: usize, args: &[f64]) -> Result<Self> {
        let gen_err = |message: String| EngineError::Gen {
            kind: format!("gen{}", kind),
            message,
        };
        if size == 0 && kind != 2 {
            return Err(gen_err("table size must be at least 1".into()));
        }
        if size > MAX_TABLE_SIZE {
            return Err(gen_err(format!(
                "table size {} exceeds the limit of {} points",
                size, MAX_TABLE_SIZE
            )));
        }
        let spec = match kind {
            0 => {
                let source = *args.first().ok_or_else(|| gen_err("missing source slot".into()))?;
                let interp = match args.get(1) {
                    Some(&v) if v == 0.0 => Interpolation::None,
                    _ => Interpolation::Linear,
                };
                GenSpec::Resample {
                    source: source as u32,
                    size,
                    interp,
                }
            }
            2 => {
                let mut values: Vec<f32> = args.iter().map(|&v| v as f32).collect();
                if size > 0 {
                    values.resize(size, 0.0);
                }
                GenSpec::Literal(values)
            }
            5 => GenSpec::ExpSegments {
                size,
                breakpoints: args.to_vec(),
            },
            7 => GenSpec::LineSegments {
                size,
                breakpoints: args.to_vec(),
            },
            9 => {
                if args.len() % 3 != 0 {
                    return Err(gen_err("arguments must be (partial, amp, phase) triples".into()));
                }
                GenSpec::Partials {
                    size,
                    partials: args.chunks(3).map(|c| (c[0], c[1], c[2])).collect(),
                }
            }
            10 => GenSpec::Harmonics {
                size,
                amplitudes: args.to_vec(),
            },
            20 => {
                let code = args.first().copied().unwrap_or(0.0) as i64;
                let distribution = Distribution::from_code(code)
                    .ok_or_else(|| gen_err(format!("unknown distribution {}", code)))?;
                GenSpec::Random {
                    size,
                    distribution,
                    seed: args.get(1).copied().unwrap_or(0.0).max(0.0) as u64,
                    min: args.get(2).copied().unwrap_or(0.0),
                    max: args.get(3).copied().unwrap_or(1.0),
                }
            }
            24 => {
                if args.len() < 4 || args.len() % 2 != 0 {
                    return Err(gen_err("need at least two (time, value) pairs".into()));
                }
                GenSpec::TimeValue {
                    size,
                    points: args.chunks(2).map(|c| (c[0], c[1])).collect(),
                }
            }
            25 => {
                let kind = match args.first().copied().unwrap_or(1.0) as i64 {
                    2 => WindowKind::Hamming,
                    _ => WindowKind::Hanning,
                };
                GenSpec::Window { size, kind }
            }
            other => return Err(gen_err(format!("no generator numbered {}", other))),
        };
        Ok(spec)
    }

    /// Short name for diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            GenSpec::Literal(_) => "literal",
            GenSpec::ExpSegments { .. } => "expsegments",
            GenSpec::LineSegments { .. } => "linesegments",
            GenSpec::Partials { .. } => "partials",
            GenSpec::Harmonics { .. } => "harmonics",
            GenSpec::Random { .. } => "random",
            GenSpec::TimeValue { .. } => "timevalue",
            GenSpec::Window { .. } => "window",
            GenSpec::Resample { .. } => "resample",
        }
    }

    /// Compute the table. `Resample` needs the source table, so the store
    /// handles it before calling this.
    pub fn generate(&self) -> Result<Vec<f32>> {
        match self {
            GenSpec::Literal(values) => Ok(values.clone()),
            GenSpec::ExpSegments { size, breakpoints } => segments(*size, breakpoints, true),
            GenSpec::LineSegments { size, breakpoints } => segments(*size, breakpoints, false),
            GenSpec::Partials { size, partials } => Ok(partial_sum(*size, partials)),
            GenSpec::Harmonics { size, amplitudes } => {
                let partials: Vec<(f64, f64, f64)> = amplitudes
                    .iter()
                    .enumerate()
                    .map(|(i, &amp)| ((i + 1) as f64, amp, 0.0))
                    .collect();
                Ok(partial_sum(*size, &partials))
            }
            GenSpec::Random {
                size,
                distribution,
                seed,
                min,
                max,
            } => Ok(random(*size, *distribution, *seed, *min, *max)),
            GenSpec::TimeValue { size, points } => time_value(*size, points),
            GenSpec::Window { size, kind } => Ok(window(*size, *kind)),
            GenSpec::Resample { .. } => Err(EngineError::Gen {
                kind: "resample".into(),
                message: "resampling needs a source table".into(),
            }),
        }
    }
}

/// `v0 len1 v1 len2 v2 ...` with lengths scaled to fill `size` points
fn segments(size: usize, breakpoints: &[f64], exponential: bool) -> Result<Vec<f32>> {
    let kind = if exponential { "gen5" } else { "gen7" };
    if breakpoints.len() < 3 || breakpoints.len() % 2 == 0 {
        return Err(EngineError::Gen {
            kind: kind.into(),
            message: "arguments must be value, length, value [, length, value ...]".into(),
        });
    }
    if exponential && breakpoints.iter().step_by(2).any(|&v| v == 0.0) {
        return Err(EngineError::Gen {
            kind: kind.into(),
            message: "exponential segments cannot pass through zero".into(),
        });
    }
    let lengths: Vec<f64> = breakpoints.iter().skip(1).step_by(2).copied().collect();
    if lengths.iter().any(|&l| l < 0.0) {
        return Err(EngineError::Gen {
            kind: kind.into(),
            message: "segment lengths must not be negative".into(),
        });
    }
    let total: f64 = lengths.iter().sum();
    if total <= 0.0 {
        return Err(EngineError::Gen {
            kind: kind.into(),
            message: "segment lengths sum to zero".into(),
        });
    }

    let mut table = Vec::with_capacity(size);
    let span = (size.max(2) - 1) as f64;
    let mut seg_start = 0.0;
    let mut seg = 0;
    for i in 0..size {
        let pos = i as f64 / span * total;
        while seg + 1 < lengths.len() && pos > seg_start + lengths[seg] {
            seg_start += lengths[seg];
            seg += 1;
        }
        let v0 = breakpoints[seg * 2];
        let v1 = breakpoints[seg * 2 + 2];
        let frac = if lengths[seg] > 0.0 {
            ((pos - seg_start) / lengths[seg]).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let value = if exponential {
            v0 * (v1 / v0).powf(frac)
        } else {
            v0 + (v1 - v0) * frac
        };
        table.push(value as f32);
    }
    Ok(table)
}

fn partial_sum(size: usize, partials: &[(f64, f64, f64)]) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let x = i as f64 / size as f64;
            partials
                .iter()
                .map(|&(partial, amp, phase)| amp * (TWO_PI * partial * x + phase.to_radians()).sin())
                .sum::<f64>() as f32
        })
        .collect()
}

fn random(size: usize, distribution: Distribution, seed: u64, min: f64, max: f64) -> Vec<f32> {
    let mut rng = if seed == 0 {
        StdRng::from_entropy()
    } else {
        StdRng::seed_from_u64(seed)
    };
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    (0..size)
        .map(|_| {
            let unit: f64 = match distribution {
                Distribution::Uniform => rng.gen(),
                Distribution::LowLinear => rng.gen::<f64>().min(rng.gen()),
                Distribution::HighLinear => rng.gen::<f64>().max(rng.gen()),
                Distribution::Triangle => (rng.gen::<f64>() + rng.gen::<f64>()) * 0.5,
                Distribution::Gaussian => {
                    // sum of 12 uniforms, mean 6, sd 1; keep ±3 sd
                    let sum: f64 = (0..12).map(|_| rng.gen::<f64>()).sum();
                    ((sum - 6.0) / 6.0 + 0.5).clamp(0.0, 1.0)
                }
            };
            (lo + unit * (hi - lo)) as f32
        })
        .collect()
}

/// Breakpoints may use any time scale; times must not decrease
fn time_value(size: usize, points: &[(f64, f64)]) -> Result<Vec<f32>> {
    if points.windows(2).any(|w| w[1].0 < w[0].0) {
        return Err(EngineError::Gen {
            kind: "gen24".into(),
            message: "times must be non-decreasing".into(),
        });
    }
    let (t0, _) = points[0];
    let (t_end, last) = points[points.len() - 1];
    let duration = t_end - t0;
    if duration <= 0.0 {
        return Ok(vec![last as f32; size]);
    }

    let mut seg = 0;
    let table = (0..size)
        .map(|i| {
            let t = if size > 1 {
                t0 + duration * i as f64 / (size - 1) as f64
            } else {
                t0
            };
            while seg + 2 < points.len() && t > points[seg + 1].0 {
                seg += 1;
            }
            let (ta, va) = points[seg];
            let (tb, vb) = points[seg + 1];
            let v = if tb > ta {
                va + (vb - va) * ((t - ta) / (tb - ta)).clamp(0.0, 1.0)
            } else {
                vb
            };
            v as f32
        })
        .collect();
    Ok(table)
}

fn window(size: usize, kind: WindowKind) -> Vec<f32> {
    let (a, b) = match kind {
        WindowKind::Hanning => (0.5, 0.5),
        WindowKind::Hamming => (0.54, 0.46),
    };
    let denom = size.max(2) as f64 - 1.0;
    (0..size)
        .map(|i| (a - b * (TWO_PI * i as f64 / denom).cos()) as f32)
        .collect()
}

/// Rescale so the largest magnitude is 1.0; all-zero tables are left alone
pub fn normalize(table: &mut [f32]) {
    let peak = table.iter().fold(0.0f32, |m, &v| m.max(v.abs()));
    if peak > 0.0 {
        table.iter_mut().for_each(|v| *v /= peak);
    }
}

/// Copy of `source` stretched or squeezed to `new_len` points.
///
/// The first and last points are preserved.
pub fn resample_table(source: &[f32], new_len: usize, interp: Interpolation) -> Vec<f32> {
    if source.is_empty() || new_len == 0 {
        return Vec::new();
    }
    if new_len == 1 || source.len() == 1 {
        return vec![source[0]; new_len];
    }
    let scale = (source.len() - 1) as f64 / (new_len - 1) as f64;
    (0..new_len)
        .map(|i| {
            let pos = i as f64 * scale;
            let idx = (pos as usize).min(source.len() - 1);
            match interp {
                Interpolation::None => source[idx],
                Interpolation::Linear => {
                    let next = (idx + 1).min(source.len() - 1);
                    let frac = (pos - idx as f64) as f32;
                    source[idx] + (source[next] - source[idx]) * frac
                }
            }
        })
        .collect()
}
