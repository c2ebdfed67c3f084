//! Peak and clipping statistics for the output buses

use serde::Serialize;

/// Largest magnitude seen on one output channel
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PeakReport {
    pub channel: usize,
    pub peak: f32,
    /// Absolute frame where the peak occurred
    pub location: u64,
    /// Samples with |x| > 1.0
    pub clipped: u64,
}

#[derive(Debug, Clone)]
pub struct PeakTracker {
    channels: Vec<PeakReport>,
    count_clipping: bool,
}

impl PeakTracker {
    pub fn new(channels: usize, count_clipping: bool) -> Self {
        Self {
            channels: (0..channels)
                .map(|channel| PeakReport {
                    channel,
                    ..PeakReport::default()
                })
                .collect(),
            count_clipping,
        }
    }

    /// Scan one interleaved block that starts at absolute frame `first_frame`
    pub fn scan(&mut self, interleaved: &[f32], first_frame: u64) {
        let nchans = self.channels.len();
        if nchans == 0 {
            return;
        }
        for (frame, samples) in interleaved.chunks_exact(nchans).enumerate() {
            for (report, &sample) in self.channels.iter_mut().zip(samples) {
                let magnitude = sample.abs();
                if magnitude > report.peak {
                    report.peak = magnitude;
                    report.location = first_frame + frame as u64;
                }
                if self.count_clipping && magnitude > 1.0 {
                    report.clipped += 1;
                }
            }
        }
    }

    pub fn reports(&self) -> &[PeakReport] {
        &self.channels
    }

    pub fn total_clipped(&self) -> u64 {
        self.channels.iter().map(|r| r.clipped).sum()
    }

    pub fn reset(&mut self) {
        for report in &mut self.channels {
            *report = PeakReport {
                channel: report.channel,
                ..PeakReport::default()
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_and_location() {
        let mut peaks = PeakTracker::new(2, true);
        peaks.scan(&[0.1, -0.2, 0.5, 0.3], 0);
        peaks.scan(&[-0.9, 0.0, 0.2, 1.5], 100);

        let reports = peaks.reports();
        assert_eq!(reports[0].peak, 0.9);
        assert_eq!(reports[0].location, 100);
        assert_eq!(reports[1].peak, 1.5);
        assert_eq!(reports[1].location, 101);
        assert_eq!(reports[1].clipped, 1);
        assert_eq!(peaks.total_clipped(), 1);
    }

    #[test]
    fn test_clipping_count_can_be_disabled() {
        let mut peaks = PeakTracker::new(1, false);
        peaks.scan(&[2.0, -3.0], 0);
        assert_eq!(peaks.total_clipped(), 0);
        assert_eq!(peaks.reports()[0].peak, 3.0);

        peaks.reset();
        assert_eq!(peaks.reports()[0].peak, 0.0);
    }
}
