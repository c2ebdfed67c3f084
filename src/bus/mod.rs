//! Bus routing and mixing
//!
//! Three banks of mono buses, each `MAX_BUS` wide:
//!
//! - **IN**: loaded from the input source at the top of every block
//! - **AUX**: summed from instruments, readable by other instruments in the
//!   same block
//! - **OUT**: summed from instruments and interleaved into the output block
//!
//! Instruments declare their buses per instrument name with `bus_config`.
//! Play-lists derived from those declarations order the block so every AUX
//! bus is completely written before anything reads it.

pub mod buffers;
pub mod config;
pub mod peaks;
pub mod playlist;

pub use buffers::BusBuffers;
pub use config::{parse_bus_spec, BusConfigRegistry, BusInput, BusSlot, BusSpec};
pub use peaks::{PeakReport, PeakTracker};
pub use playlist::PlayLists;

use std::fmt;

/// Buses per bank
pub const MAX_BUS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BusKind {
    In,
    Aux,
    Out,
}

impl fmt::Display for BusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusKind::In => f.write_str("in"),
            BusKind::Aux => f.write_str("aux"),
            BusKind::Out => f.write_str("out"),
        }
    }
}
