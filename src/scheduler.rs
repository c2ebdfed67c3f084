//! Time-ordered instrument scheduler
//!
//! Pending voices wait in a min-heap keyed by (start frame, insertion
//! order). Each block:
//!
//! 1. Pending voices whose start falls before the block end become active
//! 2. Active voices are grouped into stages from the bus play-lists, which
//!    cover the current bindings plus the slot every active voice was
//!    created with
//! 3. Stages run in order; voices within a stage run on the worker pool
//! 4. Finished voices are retired and the clock advances one block
//!
//! Bus clearing, input loading and output interleaving belong to the caller,
//! which owns the [`BusBuffers`].

use crate::bus::{BusBuffers, BusConfigRegistry, BusSlot, PlayLists};
use crate::diagnostics::Reporter;
use crate::error::Result;
use crate::instrument::Voice;
use rayon::prelude::*;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use tracing::{debug, warn};

struct Pending {
    start: u64,
    seq: u64,
    voice: Voice,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        (self.start, self.seq) == (other.start, other.seq)
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.start, self.seq).cmp(&(other.start, other.seq))
    }
}

/// What happened during one block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockStats {
    pub activated: usize,
    pub ran: usize,
    pub retired: usize,
    pub stages: usize,
}

pub struct Scheduler {
    pending: BinaryHeap<Reverse<Pending>>,
    active: Vec<Voice>,
    seq: u64,
    /// Absolute frame of the next block
    clock: u64,
    playlists: PlayLists,
    /// Bus registry generation the play-lists were built from
    built_from: Option<u64>,
    /// Registry slots and the default slot as of `built_from`
    bound: Vec<Arc<BusSlot>>,
    /// The active set changed since the play-lists were last built
    restage: bool,
    pool: Option<rayon::ThreadPool>,
}

impl Scheduler {
    /// `worker_threads > 1` runs each stage on a dedicated rayon pool
    pub fn new(worker_threads: usize) -> Self {
        let pool = if worker_threads > 1 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(worker_threads)
                .thread_name(|i| format!("rtmix-worker-{}", i))
                .build()
            {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!("cannot start {} worker threads, running inline: {}", worker_threads, e);
                    None
                }
            }
        } else {
            None
        };
        Self {
            pending: BinaryHeap::new(),
            active: Vec::new(),
            seq: 0,
            clock: 0,
            playlists: PlayLists::default(),
            built_from: None,
            bound: Vec::new(),
            restage: false,
            pool,
        }
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.active.is_empty()
    }

    pub fn playlists(&self) -> &PlayLists {
        &self.playlists
    }

    /// Last frame any scheduled voice will run, if any are scheduled
    pub fn last_frame(&self) -> Option<u64> {
        self.pending
            .iter()
            .map(|Reverse(p)| p.voice.end())
            .chain(self.active.iter().map(Voice::end))
            .max()
    }

    /// Queue a voice. One starting before the current clock is clipped to
    /// the frames that remain.
    pub fn schedule(&mut self, voice: Voice, reporter: &Reporter) {
        if voice.start() < self.clock {
            reporter.warn(
                Some(voice.name()),
                format!(
                    "start frame {} has already passed (now {}); note will be clipped",
                    voice.start(),
                    self.clock
                ),
            );
        }
        debug!(
            "scheduled {} #{} at frame {} for {} frames",
            voice.name(),
            voice.id(),
            voice.start(),
            voice.end() - voice.start()
        );
        let seq = self.seq;
        self.seq += 1;
        self.pending.push(Reverse(Pending {
            start: voice.start(),
            seq,
            voice,
        }));
    }

    /// Pick up the bus bindings if they changed since last time.
    ///
    /// # Errors
    /// The bindings themselves form an AUX loop.
    pub fn refresh_playlists(&mut self, bus_config: &BusConfigRegistry, default_slot: &BusSlot) -> Result<()> {
        let generation = bus_config.generation();
        if self.built_from == Some(generation) {
            return Ok(());
        }
        let mut bound: Vec<Arc<BusSlot>> = bus_config.slots().into_iter().map(|(_, slot)| slot).collect();
        bound.push(Arc::new(default_slot.clone()));
        self.playlists = PlayLists::build(bound.iter().map(Arc::as_ref))?;
        self.bound = bound;
        self.built_from = Some(generation);
        self.restage = true;
        Ok(())
    }

    /// Rebuild the play-lists from the bindings plus every active voice's
    /// own slot, which may predate a rebinding of its name, and restage
    /// the active voices
    fn restage_active(&mut self, reporter: &Reporter) {
        self.restage = false;
        let playlists = match PlayLists::build(
            self.bound
                .iter()
                .map(Arc::as_ref)
                .chain(self.active.iter().map(Voice::slot)),
        ) {
            Ok(playlists) => playlists,
            Err(e) => {
                // only stale bindings still in use can close a loop here
                reporter.warn(
                    None,
                    format!("active notes from earlier bus_config calls conflict ({}); ordering by current bindings", e),
                );
                match PlayLists::build(self.bound.iter().map(Arc::as_ref)) {
                    Ok(playlists) => playlists,
                    Err(_) => return,
                }
            }
        };
        debug!(
            "play-lists rebuilt: aux->aux {:?}, to aux {:?}, to out {:?}",
            playlists.aux_to_aux, playlists.to_aux, playlists.to_out
        );
        self.playlists = playlists;
        for voice in &mut self.active {
            voice.set_stage(self.playlists.stage_for(voice.slot()));
        }
    }

    /// Run one block on `buses`, which the caller has already cleared and
    /// loaded with input
    pub fn run_block(&mut self, buses: &BusBuffers, reporter: &Reporter) -> BlockStats {
        let block_start = self.clock;
        let block_frames = buses.block_frames();
        let block_end = block_start + block_frames as u64;
        let mut stats = BlockStats::default();

        while let Some(Reverse(next)) = self.pending.peek() {
            if next.start >= block_end {
                break;
            }
            if let Some(Reverse(Pending { mut voice, .. })) = self.pending.pop() {
                voice.activate(block_start);
                self.active.push(voice);
                stats.activated += 1;
            }
        }
        if stats.activated > 0 || self.restage {
            self.restage_active(reporter);
        }

        let stages = self.active.iter().map(Voice::stage).max().map_or(0, |s| s + 1);
        stats.stages = stages;
        for stage in 0..stages {
            let mut runnable: Vec<&mut Voice> = self
                .active
                .iter_mut()
                .filter(|v| v.stage() == stage && !v.is_done() && v.span(block_start, block_frames).is_some())
                .collect();
            stats.ran += runnable.len();
            match &self.pool {
                Some(pool) if runnable.len() > 1 => pool.install(|| {
                    runnable
                        .par_iter_mut()
                        .for_each(|voice| voice.run_block(block_start, buses, reporter));
                }),
                _ => {
                    for voice in runnable {
                        voice.run_block(block_start, buses, reporter);
                    }
                }
            }
        }

        let before = self.active.len();
        self.active.retain(|voice| {
            if voice.is_done() || voice.end() <= block_end {
                debug!("retired {} #{} after {} frames", voice.name(), voice.id(), voice.frames_done());
                false
            } else {
                true
            }
        });
        stats.retired = before - self.active.len();
        if stats.retired > 0 {
            self.restage = true;
        }

        self.clock = block_end;
        stats
    }

    /// Drop everything scheduled and rewind the clock
    pub fn reset(&mut self) {
        self.pending.clear();
        self.active.clear();
        self.clock = 0;
        self.restage = true;
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("clock", &self.clock)
            .field("pending", &self.pending.len())
            .field("active", &self.active.len())
            .field("parallel", &self.pool.is_some())
            .finish()
    }
}
