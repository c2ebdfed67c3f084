/// One-shot table lookup
///
/// Spreads a table across a duration and reads it by absolute sample index
/// (the note's current frame). Unlike [`super::Oscil`] it never wraps: past
/// the end of the duration it holds the last table value.
use super::Interpolation;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct TableLookup {
    table: Arc<[f32]>,
    interp: Interpolation,
    /// Table positions advanced per sample
    increment: f64,
}

impl TableLookup {
    /// `duration` in seconds; a non-positive duration reads only the last value
    pub fn new(duration: f32, sample_rate: f32, table: Arc<[f32]>, interp: Interpolation) -> Self {
        let frames = duration as f64 * sample_rate as f64;
        let increment = if frames > 0.0 {
            table.len() as f64 / frames
        } else {
            f64::INFINITY
        };
        Self {
            table,
            interp,
            increment,
        }
    }

    /// Table value at sample `nsample`, times `amp`
    pub fn tick(&self, nsample: u64, amp: f32) -> f32 {
        let len = self.table.len();
        if len == 0 {
            return 0.0;
        }
        let last = len - 1;
        let pos = nsample as f64 * self.increment;
        if !(pos < last as f64) {
            return self.table[last] * amp;
        }
        let i = pos as usize;
        let value = match self.interp {
            Interpolation::None => self.table[i],
            Interpolation::Linear => {
                let frac = (pos - i as f64) as f32;
                self.table[i] + (self.table[i + 1] - self.table[i]) * frac
            }
        };
        value * amp
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Arc<[f32]> {
        vec![0.0, 1.0, 2.0, 3.0].into()
    }

    #[test]
    fn test_table_reads_across_duration() {
        // 1 second at 4 Hz over 4 points: one point per sample
        let table = TableLookup::new(1.0, 4.0, ramp(), Interpolation::None);
        let out: Vec<f32> = (0..4).map(|n| table.tick(n, 1.0)).collect();
        assert_eq!(out, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_table_holds_last_value_past_end() {
        let table = TableLookup::new(1.0, 4.0, ramp(), Interpolation::Linear);
        assert_eq!(table.tick(10, 1.0), 3.0);
        assert_eq!(table.tick(10_000, 2.0), 6.0);
    }

    #[test]
    fn test_table_linear_interpolation() {
        // 2 seconds at 4 Hz over 4 points: half a point per sample
        let table = TableLookup::new(2.0, 4.0, ramp(), Interpolation::Linear);
        assert_eq!(table.tick(1, 1.0), 0.5);
        assert_eq!(table.tick(3, 1.0), 1.5);
    }

    #[test]
    fn test_all_ones_table_is_unity() {
        let ones: Arc<[f32]> = vec![1.0; 2].into();
        let table = TableLookup::new(1.0, 44100.0, ones, Interpolation::Linear);
        for n in (0..44100).step_by(97) {
            assert_eq!(table.tick(n, 1.0), 1.0);
        }
    }
}
