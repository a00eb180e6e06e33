//! Readout facade consumed by the calibration engine.
//!
//! The engine never talks to a transport directly; it drives a
//! [`ReadoutApi`] implementation. Real deployments back this with the
//! USB/serial chain to the testboard, the bench backs it with
//! [`EmulatedReadout`](crate::emulator::EmulatedReadout).

use std::collections::BTreeMap;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use shared::{HasCoordinates, HasRocId};
use thiserror::Error;

bitflags! {
    /// Acquisition flags passed with every measurement call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AcqFlags: u16 {
        /// Keep the mask bits applied while triggering.
        const FORCE_MASKED = 0x0010;
        /// Read chips out one after another rather than interleaved.
        const FORCE_SERIAL = 0x0020;
    }
}

/// One pixel hit reported by the readout chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelReading {
    pub column: u8,
    pub row: u8,
    pub roc_id: u8,
    /// Pulse height in ADC counts.
    pub value: u16,
}

impl PixelReading {
    pub fn new(column: u8, row: u8, roc_id: u8, value: u16) -> Self {
        Self {
            column,
            row,
            roc_id,
            value,
        }
    }
}

impl HasCoordinates for PixelReading {
    fn column(&self) -> u8 {
        self.column
    }

    fn row(&self) -> u8 {
        self.row
    }
}

impl HasRocId for PixelReading {
    fn roc_id(&self) -> u8 {
        self.roc_id
    }
}

/// Opaque snapshot of the DAC register state, handed back verbatim to
/// [`ReadoutApi::restore_dacs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DacSnapshot {
    registers: BTreeMap<String, u16>,
}

impl DacSnapshot {
    pub fn new(registers: BTreeMap<String, u16>) -> Self {
        Self { registers }
    }

    pub fn registers(&self) -> &BTreeMap<String, u16> {
        &self.registers
    }

    pub fn into_registers(self) -> BTreeMap<String, u16> {
        self.registers
    }
}

/// Errors reported by the readout chain.
#[derive(Error, Debug)]
pub enum ReadoutError {
    /// Transient hardware/communication fault. The caller is expected to
    /// retry the same call a bounded number of times.
    #[error("transient readout fault: {0}")]
    Transient(String),

    /// The named DAC register does not exist on this chip generation.
    #[error("unknown DAC register: {0}")]
    UnknownDac(String),

    /// No testboard connected.
    #[error("readout chain not connected")]
    NotConnected,
}

/// Result type for readout operations.
pub type ReadoutResult<T> = Result<T, ReadoutError>;

/// The measurement, DAC and pixel-control surface of the testboard.
///
/// All calls are blocking; the underlying bus is not safe for concurrent
/// access, so one scan drives one facade at a time.
pub trait ReadoutApi {
    /// Measure pulse height for every armed pixel while sweeping the
    /// named DAC over `[dac_low, dac_high]`, sending `nreps` triggers per
    /// point. Readings are grouped per ROC.
    fn get_pulseheight_vs_dac(
        &mut self,
        dac: &str,
        dac_low: u16,
        dac_high: u16,
        flags: AcqFlags,
        nreps: u16,
    ) -> ReadoutResult<Vec<(u8, Vec<PixelReading>)>>;

    /// Program one DAC register on all enabled ROCs.
    fn set_dac(&mut self, name: &str, value: u16) -> ReadoutResult<()>;

    /// Capture the current DAC state for later restoration.
    fn snapshot_dacs(&mut self) -> DacSnapshot;

    /// Reapply a previously captured DAC state.
    fn restore_dacs(&mut self, snapshot: DacSnapshot);

    /// Include or exclude one pixel from test pulses.
    fn set_pixel_test_mode(&mut self, column: u8, row: u8, on: bool);

    /// Mask or unmask one pixel.
    fn set_pixel_mask(&mut self, column: u8, row: u8, masked: bool);

    /// Include or exclude every pixel from test pulses.
    fn set_all_pixels_test_mode(&mut self, on: bool);

    /// Mask or unmask every pixel.
    fn mask_all_pixels(&mut self, masked: bool);
}
