//! Device facades for the pixel readout bench.
//!
//! This crate defines the boundary between the calibration engine and
//! the physical bench: the readout/DAC facade consumed by scans, the
//! high-voltage supply facade, and a deterministic emulator that stands
//! in for the real transport during tests and dry runs.

pub mod emulator;
pub mod hvsupply;
pub mod readout;

pub use emulator::EmulatedReadout;
pub use hvsupply::{BenchHvSupply, HvSupply, HvSupplyError};
pub use readout::{AcqFlags, DacSnapshot, PixelReading, ReadoutApi, ReadoutError, ReadoutResult};
