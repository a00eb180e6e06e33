//! Shared DUT configuration model for the pixel readout bench.
//!
//! This crate holds the configuration records describing a device under
//! test (pixels, readout chips) and the predicate machinery used to
//! search collections of those records. It is a leaf crate: the hardware
//! facades and the test bench both build on top of it.

pub mod dut;
pub mod predicates;

pub use dut::{ConfigError, DutConfig, PixelConfig, RocConfig, ROC_NUM_COLS, ROC_NUM_ROWS};
pub use predicates::{
    filter_matching, find_first, AtCoordinate, BeyondCoordinate, EnabledIs, HasBusAddress,
    HasCoordinates, HasEnable, HasMask, HasRocId, MaskedIs, Matcher, WithBusAddress,
};
