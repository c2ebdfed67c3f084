//! Per-bus block buffers
//!
//! Every bus owns one mono block behind its own mutex. Instruments never
//! hold a bus lock while running: inputs are copied out before `run()` and
//! outputs are summed in after it.

use super::{BusKind, MAX_BUS};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub struct BusBuffers {
    block_frames: usize,
    ins: Vec<Mutex<Vec<f32>>>,
    aux: Vec<Mutex<Vec<f32>>>,
    out: Vec<Mutex<Vec<f32>>>,
}

fn bank(block_frames: usize) -> Vec<Mutex<Vec<f32>>> {
    (0..MAX_BUS).map(|_| Mutex::new(vec![0.0; block_frames])).collect()
}

impl BusBuffers {
    pub fn new(block_frames: usize) -> Self {
        Self {
            block_frames,
            ins: bank(block_frames),
            aux: bank(block_frames),
            out: bank(block_frames),
        }
    }

    pub fn block_frames(&self) -> usize {
        self.block_frames
    }

    fn lock(&self, kind: BusKind, bus: usize) -> MutexGuard<'_, Vec<f32>> {
        let bank = match kind {
            BusKind::In => &self.ins,
            BusKind::Aux => &self.aux,
            BusKind::Out => &self.out,
        };
        bank[bus].lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Zero AUX and OUT buses for a new block
    pub fn clear_for_block(&self) {
        for bus in 0..MAX_BUS {
            self.lock(BusKind::Aux, bus).iter_mut().for_each(|s| *s = 0.0);
            self.lock(BusKind::Out, bus).iter_mut().for_each(|s| *s = 0.0);
        }
    }

    /// Deinterleave captured input into IN buses `0..channels`.
    ///
    /// Frames missing from `interleaved` are filled with silence.
    pub fn load_inputs(&self, interleaved: &[f32], channels: usize) {
        for ch in 0..channels.min(MAX_BUS) {
            let mut bus = self.lock(BusKind::In, ch);
            for (frame, sample) in bus.iter_mut().enumerate() {
                *sample = interleaved.get(frame * channels + ch).copied().unwrap_or(0.0);
            }
        }
    }

    /// Copy `frames` samples starting at `offset` from each bus into
    /// `dest`, interleaved in `buses` order
    pub fn read_interleaved(&self, kind: BusKind, buses: &[usize], offset: usize, frames: usize, dest: &mut Vec<f32>) {
        let nchans = buses.len();
        dest.clear();
        dest.resize(frames * nchans, 0.0);
        for (ch, &bus) in buses.iter().enumerate() {
            let source = self.lock(kind, bus);
            let end = (offset + frames).min(source.len());
            for (i, &sample) in source[offset.min(end)..end].iter().enumerate() {
                dest[i * nchans + ch] = sample;
            }
        }
    }

    /// Sum channel `channel` of an interleaved buffer into `bus`, starting
    /// at block frame `offset`
    pub fn mix_channel(
        &self,
        kind: BusKind,
        bus: usize,
        offset: usize,
        interleaved: &[f32],
        channel: usize,
        nchans: usize,
    ) {
        debug_assert!(channel < nchans);
        let mut target = self.lock(kind, bus);
        let frames = interleaved.len() / nchans;
        for frame in 0..frames {
            if let Some(slot) = target.get_mut(offset + frame) {
                *slot += interleaved[frame * nchans + channel];
            }
        }
    }

    /// Snapshot of one bus
    pub fn read_bus(&self, kind: BusKind, bus: usize) -> Vec<f32> {
        self.lock(kind, bus).clone()
    }

    /// Interleave OUT buses `0..channels` into `dest`
    pub fn interleave_outputs(&self, channels: usize, dest: &mut [f32]) {
        debug_assert_eq!(dest.len(), self.block_frames * channels);
        for ch in 0..channels {
            let bus = self.lock(BusKind::Out, ch);
            for (frame, &sample) in bus.iter().enumerate() {
                dest[frame * channels + ch] = sample;
            }
        }
    }
}
