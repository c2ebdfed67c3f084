//! Function tables ("gens")
//!
//! Numeric arrays addressed by small slot numbers and consumed by
//! instruments as envelopes, curves and wavetables. A slot nobody has
//! filled reads as `None`; each caller decides whether that is fatal or
//! whether a default curve will do.

pub mod generators;
pub mod store;

pub use generators::{normalize, resample_table, Distribution, GenSpec, WindowKind, MAX_TABLE_SIZE};
pub use store::{FunctionTable, GenStore};
