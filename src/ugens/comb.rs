/// Feedback comb filter: `y[n] = x[n] + g·y[n-D]`
///
/// The loop delay `D` is set in samples or from a fundamental frequency
/// (`D = round(sr / freq)`). Feedback outside (-1, 1) would make the loop
/// unstable, so it is pulled back to ±0.999 with a warning.
use super::Tickable;
use crate::diagnostics::clamp_range;

const MAX_FEEDBACK: f32 = 0.999;

/// Longest loop buffer a comb will allocate, in samples
pub const MAX_LOOP_SAMPLES: usize = 1 << 20;

#[derive(Debug, Clone)]
pub struct Comb {
    sample_rate: f32,
    /// Past outputs, `buffer.len()` is the maximum loop length
    buffer: Vec<f32>,
    write_pos: usize,
    loop_samples: usize,
    feedback: f32,
    last: f32,
}

impl Comb {
    /// `max_loop_time` in seconds sizes the buffer, up to
    /// [`MAX_LOOP_SAMPLES`]
    pub fn new(sample_rate: f32, max_loop_time: f32, feedback: f32) -> Self {
        let wanted = (max_loop_time.max(0.0) as f64 * sample_rate as f64).ceil().max(1.0);
        let capacity = clamp_range("Comb buffer length", wanted as f32, 1.0, MAX_LOOP_SAMPLES as f32)
            .logged("Comb") as usize;
        let capacity = capacity.max(1);
        let mut comb = Self {
            sample_rate,
            buffer: vec![0.0; capacity],
            write_pos: 0,
            loop_samples: capacity,
            feedback: 0.0,
            last: 0.0,
        };
        comb.set_feedback(feedback);
        comb
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn loop_samples(&self) -> usize {
        self.loop_samples
    }

    pub fn feedback(&self) -> f32 {
        self.feedback
    }

    pub fn set_feedback(&mut self, feedback: f32) {
        self.feedback = clamp_range("Comb feedback", feedback, -MAX_FEEDBACK, MAX_FEEDBACK).logged("Comb");
    }

    /// Loop length in samples, clamped to `1..=capacity`
    pub fn set_loop_samples(&mut self, samples: usize) {
        let capacity = self.buffer.len();
        let clamped = clamp_range("Comb loop length", samples as f32, 1.0, capacity as f32).logged("Comb");
        self.loop_samples = clamped as usize;
    }

    /// Loop tuned so the comb rings at `freq`
    pub fn set_frequency(&mut self, freq: f32) {
        let freq = if freq > 0.0 { freq } else { self.sample_rate };
        let samples = (self.sample_rate / freq).round() as usize;
        self.set_loop_samples(samples);
    }

    /// Loop time in seconds
    pub fn set_loop_time(&mut self, seconds: f32) {
        let samples = (seconds * self.sample_rate).round().max(1.0) as usize;
        self.set_loop_samples(samples);
    }
}

impl Tickable for Comb {
    fn tick(&mut self, input: f32) -> f32 {
        let capacity = self.buffer.len();
        let read_pos = (self.write_pos + capacity - self.loop_samples) % capacity;
        let out = input + self.feedback * self.buffer[read_pos];
        self.buffer[self.write_pos] = out;
        self.write_pos = (self.write_pos + 1) % capacity;
        self.last = out;
        out
    }

    fn clear(&mut self) {
        self.buffer.iter_mut().for_each(|s| *s = 0.0);
        self.write_pos = 0;
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
    fn test_comb_echoes_at_loop_length() {
        let mut comb = Comb::new(10.0, 1.0, 0.5);
        comb.set_loop_samples(3);

        let mut input = vec![0.0; 10];
        input[0] = 1.0;
        let out: Vec<f32> = input.iter().map(|&x| comb.tick(x)).collect();

        assert_eq!(out[0], 1.0);
        assert_eq!(out[3], 0.5);
        assert_eq!(out[6], 0.25);
        assert_eq!(out[9], 0.125);
        assert_eq!(out[1], 0.0);
    }

    #[test]
    fn test_feedback_is_clamped_inside_unit_circle() {
        let comb = Comb::new(44100.0, 0.1, 1.5);
        assert!(comb.feedback() < 1.0);

        let comb = Comb::new(44100.0, 0.1, -3.0);
        assert!(comb.feedback() > -1.0);
    }

    #[test]
    fn test_frequency_sets_loop() {
        let mut comb = Comb::new(44100.0, 0.1, 0.9);
        comb.set_frequency(441.0);
        assert_eq!(comb.loop_samples(), 100);
    }

    #[test]
    fn test_loop_longer_than_buffer_is_clamped() {
        let mut comb = Comb::new(100.0, 0.1, 0.9);
        comb.set_loop_samples(1000);
        assert_eq!(comb.loop_samples(), comb.capacity());
    }

    #[test]
    fn test_buffer_size_is_capped() {
        let comb = Comb::new(44100.0, 1.0e9, 0.5);
        assert_eq!(comb.capacity(), MAX_LOOP_SAMPLES);
    }

    #[test]
    fn test_comb_clear_is_idempotent() {
        let mut comb = Comb::new(1000.0, 0.05, 0.7);
        comb.set_loop_samples(13);
        let input: Vec<f32> = (0..200).map(|i| ((i * 7) % 11) as f32 / 11.0 - 0.5).collect();

        let first: Vec<f32> = input.iter().map(|&x| comb.tick(x)).collect();
        comb.clear();
        comb.clear();
        let second: Vec<f32> = input.iter().map(|&x| comb.tick(x)).collect();
        assert_eq!(first, second);
    }
}
