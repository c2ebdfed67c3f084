//! Slot-addressed store of function tables
//!
//! Tables are immutable once created; replacing a slot swaps in a new
//! `Arc`, so instruments holding the old table keep reading it safely.

use super::generators::{normalize, resample_table, GenSpec};
use crate::error::{EngineError, Result};
use crate::ugens::Interpolation;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// An immutable float array produced by a generator
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionTable {
    samples: Arc<[f32]>,
    /// Generator that produced it, for diagnostics
    origin: &'static str,
}

impl FunctionTable {
    pub fn new(samples: Vec<f32>, origin: &'static str) -> Self {
        Self {
            samples: samples.into(),
            origin,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Shared handle on the data, for oscillators and table lookups
    pub fn shared(&self) -> Arc<[f32]> {
        Arc::clone(&self.samples)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn origin(&self) -> &'static str {
        self.origin
    }
}

#[derive(Debug, Default)]
pub struct GenStore {
    tables: RwLock<HashMap<u32, Arc<FunctionTable>>>,
}

impl GenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute a table and store it at `slot`, replacing whatever was there.
    ///
    /// Returns the table length. Slot 0 is reserved.
    pub fn create(&self, slot: u32, spec: &GenSpec, normalized: bool) -> Result<usize> {
        if slot == 0 {
            return Err(EngineError::InvalidSlot(slot));
        }

        // computed outside the write lock so lookups are never blocked on it
        let mut samples = match spec {
            GenSpec::Resample { source, size, interp } => self
                .resample(*source, *size, *interp)
                .ok_or_else(|| EngineError::MissingTable {
                    who: "makegen".into(),
                    slot: *source,
                })?,
            other => other.generate()?,
        };
        if normalized {
            normalize(&mut samples);
        }

        let len = samples.len();
        let table = Arc::new(FunctionTable::new(samples, spec.name()));
        self.write().insert(slot, table);
        debug!(slot, len, kind = spec.name(), "created function table");
        Ok(len)
    }

    /// Store precomputed samples
    pub fn insert(&self, slot: u32, samples: Vec<f32>) -> Result<usize> {
        if slot == 0 {
            return Err(EngineError::InvalidSlot(slot));
        }
        let len = samples.len();
        self.write()
            .insert(slot, Arc::new(FunctionTable::new(samples, "literal")));
        Ok(len)
    }

    /// The table at `slot`, or `None` if it was never made or is empty
    pub fn lookup(&self, slot: u32) -> Option<Arc<FunctionTable>> {
        self.read()
            .get(&slot)
            .filter(|table| !table.is_empty())
            .cloned()
    }

    /// Length of the table at `slot`, 0 when absent
    pub fn size(&self, slot: u32) -> usize {
        self.lookup(slot).map_or(0, |table| table.len())
    }

    /// Fresh copy of a table at a new length; the caller owns the result
    pub fn resample(&self, slot: u32, new_len: usize, interp: Interpolation) -> Option<Vec<f32>> {
        let table = self.lookup(slot)?;
        Some(resample_table(table.samples(), new_len, interp))
    }

    pub fn remove(&self, slot: u32) -> Option<Arc<FunctionTable>> {
        self.write().remove(&slot)
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    /// Occupied slots in ascending order
    pub fn slots(&self) -> Vec<u32> {
        let mut slots: Vec<u32> = self.read().keys().copied().collect();
        slots.sort_unstable();
        slots
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<u32, Arc<FunctionTable>>> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<u32, Arc<FunctionTable>>> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}
