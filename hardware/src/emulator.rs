//! Deterministic testboard emulator.
//!
//! Implements [`ReadoutApi`] entirely in memory: a DAC register map,
//! per-pixel test/mask bookkeeping and a synthetic pulse-height response
//! that depends only on the DAC point and the pixel address. Tests use
//! the fault-injection hooks to exercise the engine's retry and
//! drop paths; the `ph_scan` binary uses it for dry runs without a
//! testboard attached.

use std::collections::{BTreeMap, HashMap};

use shared::{ROC_NUM_COLS, ROC_NUM_ROWS};
use tracing::debug;

use crate::readout::{AcqFlags, DacSnapshot, PixelReading, ReadoutApi, ReadoutError, ReadoutResult};

/// DAC registers the emulated chip generation knows about.
const KNOWN_DACS: &[&str] = &["vana", "vdig", "vsh", "vcal", "caldel", "vthrcomp", "ctrlreg"];

/// In-memory stand-in for the testboard and readout chain.
pub struct EmulatedReadout {
    registers: BTreeMap<String, u16>,
    rocs: Vec<u8>,
    test_default: bool,
    mask_default: bool,
    test_overrides: HashMap<(u8, u8), bool>,
    mask_overrides: HashMap<(u8, u8), bool>,
    pending_faults: usize,
    ghost_readings: Vec<PixelReading>,
    measure_calls: usize,
    restore_count: usize,
    max_armed_during_measure: usize,
}

impl EmulatedReadout {
    /// Emulate a testboard serving the given ROCs, all DACs at their
    /// power-up defaults, all pixels masked and out of test mode.
    pub fn new(rocs: Vec<u8>) -> Self {
        let registers = KNOWN_DACS
            .iter()
            .map(|name| (name.to_string(), 100u16))
            .collect();
        Self {
            registers,
            rocs,
            test_default: false,
            mask_default: true,
            test_overrides: HashMap::new(),
            mask_overrides: HashMap::new(),
            pending_faults: 0,
            ghost_readings: Vec::new(),
            measure_calls: 0,
            restore_count: 0,
            max_armed_during_measure: 0,
        }
    }

    /// Make the next `count` measurement calls fail with a transient
    /// fault before succeeding again.
    pub fn inject_transient_faults(&mut self, count: usize) {
        self.pending_faults = count;
    }

    /// Emit this reading with every measurement batch, regardless of the
    /// armed pixel set. Exercises the caller's unbooked-reading path.
    pub fn add_ghost_reading(&mut self, reading: PixelReading) {
        self.ghost_readings.push(reading);
    }

    /// Total measurement calls seen, including ones that faulted.
    pub fn measure_calls(&self) -> usize {
        self.measure_calls
    }

    /// Times the DAC state was restored from a snapshot.
    pub fn restore_count(&self) -> usize {
        self.restore_count
    }

    /// Largest number of simultaneously armed (test-mode, unmasked)
    /// pixels observed during any measurement call.
    pub fn max_armed_during_measure(&self) -> usize {
        self.max_armed_during_measure
    }

    pub fn registers(&self) -> &BTreeMap<String, u16> {
        &self.registers
    }

    fn pixel_in_test_mode(&self, column: u8, row: u8) -> bool {
        *self
            .test_overrides
            .get(&(column, row))
            .unwrap_or(&self.test_default)
    }

    fn pixel_masked(&self, column: u8, row: u8) -> bool {
        *self
            .mask_overrides
            .get(&(column, row))
            .unwrap_or(&self.mask_default)
    }

    fn armed_pixels(&self) -> Vec<(u8, u8)> {
        let mut armed = Vec::new();
        for column in 0..ROC_NUM_COLS {
            for row in 0..ROC_NUM_ROWS {
                if self.pixel_in_test_mode(column, row) && !self.pixel_masked(column, row) {
                    armed.push((column, row));
                }
            }
        }
        armed
    }

    /// Synthetic pulse height: monotone in the DAC point, offset per
    /// pixel so neighbouring histograms are distinguishable.
    fn response(dac_value: u16, column: u8, row: u8) -> u16 {
        (dac_value / 2 + 3 * column as u16 + 2 * row as u16) % 256
    }
}

impl ReadoutApi for EmulatedReadout {
    fn get_pulseheight_vs_dac(
        &mut self,
        dac: &str,
        dac_low: u16,
        dac_high: u16,
        _flags: AcqFlags,
        _nreps: u16,
    ) -> ReadoutResult<Vec<(u8, Vec<PixelReading>)>> {
        self.measure_calls += 1;

        if self.pending_faults > 0 {
            self.pending_faults -= 1;
            return Err(ReadoutError::Transient("deserializer lost lock".into()));
        }

        if !self.registers.contains_key(dac) {
            return Err(ReadoutError::UnknownDac(dac.to_string()));
        }

        let armed = self.armed_pixels();
        self.max_armed_during_measure = self.max_armed_during_measure.max(armed.len());

        let mut batches = Vec::with_capacity(self.rocs.len());
        for &roc_id in &self.rocs {
            let mut readings = Vec::new();
            for point in dac_low..=dac_high {
                for &(column, row) in &armed {
                    readings.push(PixelReading::new(
                        column,
                        row,
                        roc_id,
                        Self::response(point, column, row),
                    ));
                }
            }
            readings.extend(self.ghost_readings.iter().copied());
            batches.push((roc_id, readings));
        }
        Ok(batches)
    }

    fn set_dac(&mut self, name: &str, value: u16) -> ReadoutResult<()> {
        match self.registers.get_mut(name) {
            Some(register) => {
                debug!("set_dac {name} = {value}");
                *register = value;
                Ok(())
            }
            None => Err(ReadoutError::UnknownDac(name.to_string())),
        }
    }

    fn snapshot_dacs(&mut self) -> DacSnapshot {
        DacSnapshot::new(self.registers.clone())
    }

    fn restore_dacs(&mut self, snapshot: DacSnapshot) {
        self.registers = snapshot.into_registers();
        self.restore_count += 1;
    }

    fn set_pixel_test_mode(&mut self, column: u8, row: u8, on: bool) {
        self.test_overrides.insert((column, row), on);
    }

    fn set_pixel_mask(&mut self, column: u8, row: u8, masked: bool) {
        self.mask_overrides.insert((column, row), masked);
    }

    fn set_all_pixels_test_mode(&mut self, on: bool) {
        self.test_default = on;
        self.test_overrides.clear();
    }

    fn mask_all_pixels(&mut self, masked: bool) {
        self.mask_default = masked;
        self.mask_overrides.clear();
    }
}
