/// Non-interpolating delay line of fixed maximum length
///
/// Two ways to use it:
///
/// 1. `set_delay(lag)` then `tick(input)`: the output is `lag` samples older
///    than the input.
/// 2. `put_sample(input)` then any number of `get_sample(lag)` calls: each
///    tap reads `lag` samples behind the most recent input. Useful for
///    multi-tap effects.
///
/// Mixing the two is fine as long as `set_delay` is called again before
/// going back to `tick`.
use super::Tickable;
use crate::diagnostics::clamp_range;

#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    /// Next write position
    in_point: usize,
    /// Lag used by `tick`
    delay: usize,
    last: f32,
}

impl DelayLine {
    /// Room for lags up to `max_length - 1` samples
    pub fn new(max_length: usize) -> Self {
        let length = max_length.max(2);
        Self {
            buffer: vec![0.0; length],
            in_point: 0,
            delay: 0,
            last: 0.0,
        }
    }

    pub fn max_delay(&self) -> usize {
        self.buffer.len() - 1
    }

    pub fn delay(&self) -> usize {
        self.delay
    }

    /// Lag for `tick`, rounded to whole samples
    pub fn set_delay(&mut self, lag: f32) {
        let lag = self.clamp_lag(lag.round());
        self.delay = lag as usize;
    }

    fn clamp_lag(&self, lag: f32) -> f32 {
        clamp_range("Delay length", lag, 0.0, self.max_delay() as f32).logged("DelayLine")
    }

    /// Write without reading
    pub fn put_sample(&mut self, input: f32) {
        self.buffer[self.in_point] = input;
        self.in_point = (self.in_point + 1) % self.buffer.len();
    }

    /// Read `lag` samples behind the last `put_sample`; lag 0 is that sample
    pub fn get_sample(&self, lag: usize) -> f32 {
        let lag = if lag > self.max_delay() {
            self.clamp_lag(lag as f32) as usize
        } else {
            lag
        };
        let len = self.buffer.len();
        self.buffer[(self.in_point + len - 1 - lag) % len]
    }

    /// Fractional tap, linearly interpolated between neighbours
    pub fn get_sample_linear(&self, lag: f32) -> f32 {
        let lag = self.clamp_lag(lag);
        let whole = lag.floor();
        let frac = lag - whole;
        let a = self.get_sample(whole as usize);
        if frac == 0.0 {
            return a;
        }
        let b = self.get_sample((whole as usize + 1).min(self.max_delay()));
        a + (b - a) * frac
    }
}

impl Tickable for DelayLine {
    fn tick(&mut self, input: f32) -> f32 {
        self.put_sample(input);
        self.last = self.get_sample(self.delay);
        self.last
    }

    fn clear(&mut self) {
        self.buffer.iter_mut().for_each(|s| *s = 0.0);
        self.in_point = 0;
        self.last = 0.0;
    }

    fn last_out(&self) -> f32 {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_delays_by_lag() {
        let mut line = DelayLine::new(16);
        line.set_delay(3.0);
        let out: Vec<f32> = (1..=6).map(|i| line.tick(i as f32)).collect();
        assert_eq!(out, vec![0.0, 0.0, 0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_zero_delay_passes_through() {
        let mut line = DelayLine::new(4);
        line.set_delay(0.0);
        assert_eq!(line.tick(0.5), 0.5);
    }

    #[test]
    fn test_multi_tap() {
        let mut line = DelayLine::new(8);
        for i in 1..=5 {
            line.put_sample(i as f32);
        }
        assert_eq!(line.get_sample(0), 5.0);
        assert_eq!(line.get_sample(2), 3.0);
        assert_eq!(line.get_sample(4), 1.0);
        assert_eq!(line.get_sample_linear(1.5), 3.5);
    }

    #[test]
    fn test_lag_beyond_capacity_is_clamped() {
        let mut line = DelayLine::new(4);
        line.set_delay(100.0);
        assert_eq!(line.delay(), 3);
        for i in 0..10 {
            line.put_sample(i as f32);
        }
        assert_eq!(line.get_sample(50), line.get_sample(3));
    }

    #[test]
    fn test_delay_clear_is_idempotent() {
        let mut line = DelayLine::new(32);
        line.set_delay(7.0);
        let input: Vec<f32> = (0..64).map(|i| (i as f32 * 0.3).sin()).collect();
        let first: Vec<f32> = input.iter().map(|&x| line.tick(x)).collect();
        line.clear();
        line.clear();
        let second: Vec<f32> = input.iter().map(|&x| line.tick(x)).collect();
        assert_eq!(first, second);
    }
}
