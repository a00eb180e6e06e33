//! Configuration records for the device under test.
//!
//! A DUT is a set of readout chips (ROCs), each serving a block of
//! pixels. Pixel enable/mask state lives here as plain data; the scan
//! engine mutates it through the methods below and mirrors every change
//! to the hardware through the readout facade.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::predicates::{
    filter_matching, AtCoordinate, EnabledIs, HasBusAddress, HasCoordinates, HasEnable, HasMask,
    HasRocId, Matcher,
};

/// Number of pixel columns on one ROC.
pub const ROC_NUM_COLS: u8 = 52;

/// Number of pixel rows on one ROC.
pub const ROC_NUM_ROWS: u8 = 80;

/// Errors raised while assembling a DUT configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Two pixel records share the same (column, row, roc) identity.
    #[error("duplicate pixel c{column} r{row} on ROC {roc_id}")]
    DuplicatePixel { column: u8, row: u8, roc_id: u8 },

    /// A pixel record lies outside the sensor extent.
    #[error("pixel c{column} r{row} on ROC {roc_id} is outside the sensor extent")]
    PixelOutOfRange { column: u8, row: u8, roc_id: u8 },
}

/// Per-pixel configuration record.
///
/// Identity is (column, row, roc_id). Pixels are constructed in the
/// baseline state: masked and not enabled for testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelConfig {
    pub column: u8,
    pub row: u8,
    pub roc_id: u8,
    pub enabled: bool,
    pub masked: bool,
}

impl PixelConfig {
    pub fn new(column: u8, row: u8, roc_id: u8) -> Self {
        Self {
            column,
            row,
            roc_id,
            enabled: false,
            masked: true,
        }
    }
}

impl HasEnable for PixelConfig {
    fn enabled(&self) -> bool {
        self.enabled
    }
}

impl HasMask for PixelConfig {
    fn masked(&self) -> bool {
        self.masked
    }
}

impl HasCoordinates for PixelConfig {
    fn column(&self) -> u8 {
        self.column
    }

    fn row(&self) -> u8 {
        self.row
    }
}

impl HasRocId for PixelConfig {
    fn roc_id(&self) -> u8 {
        self.roc_id
    }
}

/// Per-chip configuration record: bus address plus the pixels it serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RocConfig {
    pub i2c_address: u8,
    pub enabled: bool,
    pub pixels: Vec<PixelConfig>,
}

impl RocConfig {
    pub fn new(i2c_address: u8, pixels: Vec<PixelConfig>) -> Self {
        Self {
            i2c_address,
            enabled: true,
            pixels,
        }
    }

    /// A ROC populated with its full pixel matrix, all pixels in the
    /// baseline masked/disabled state.
    pub fn full(i2c_address: u8) -> Self {
        let mut pixels = Vec::with_capacity(ROC_NUM_COLS as usize * ROC_NUM_ROWS as usize);
        for column in 0..ROC_NUM_COLS {
            for row in 0..ROC_NUM_ROWS {
                pixels.push(PixelConfig::new(column, row, i2c_address));
            }
        }
        Self::new(i2c_address, pixels)
    }
}

impl HasEnable for RocConfig {
    fn enabled(&self) -> bool {
        self.enabled
    }
}

impl HasBusAddress for RocConfig {
    fn i2c_address(&self) -> u8 {
        self.i2c_address
    }
}

/// The device under test: an owned, validated table of ROC and pixel
/// configuration.
///
/// Construction rejects duplicate pixel identities and out-of-range
/// coordinates; after that the table is only mutated through the
/// enable/mask methods, which the scan engine drives from a single
/// execution context (one scan at a time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DutConfig {
    rocs: Vec<RocConfig>,
}

impl DutConfig {
    pub fn new(rocs: Vec<RocConfig>) -> Result<Self, ConfigError> {
        let beyond_edge = crate::predicates::BeyondCoordinate::new(ROC_NUM_COLS - 1, ROC_NUM_ROWS - 1);
        let mut seen = HashSet::new();
        for roc in &rocs {
            for pixel in &roc.pixels {
                if beyond_edge.matches(pixel) {
                    return Err(ConfigError::PixelOutOfRange {
                        column: pixel.column,
                        row: pixel.row,
                        roc_id: pixel.roc_id,
                    });
                }
                if !seen.insert((pixel.column, pixel.row, pixel.roc_id)) {
                    return Err(ConfigError::DuplicatePixel {
                        column: pixel.column,
                        row: pixel.row,
                        roc_id: pixel.roc_id,
                    });
                }
            }
        }
        Ok(Self { rocs })
    }

    pub fn rocs(&self) -> &[RocConfig] {
        &self.rocs
    }

    /// ROCs currently enabled for readout.
    pub fn enabled_rocs(&self) -> Vec<&RocConfig> {
        filter_matching(&self.rocs, &EnabledIs(true))
    }

    /// Look up one pixel record by its full identity.
    pub fn pixel(&self, column: u8, row: u8, roc_id: u8) -> Option<&PixelConfig> {
        let matcher = AtCoordinate::on_roc(column, row, roc_id);
        self.rocs
            .iter()
            .flat_map(|roc| roc.pixels.iter())
            .find(|p| matcher.matches(*p))
    }

    /// Set the test-mode bit of the addressed pixel on every ROC.
    pub fn test_pixel(&mut self, column: u8, row: u8, on: bool) {
        let matcher = AtCoordinate::new(column, row);
        let mut hit = false;
        for roc in &mut self.rocs {
            for pixel in roc.pixels.iter_mut().filter(|p| matcher.matches(&**p)) {
                pixel.enabled = on;
                hit = true;
            }
        }
        if !hit {
            log::warn!("test_pixel: no pixel at c{column} r{row}");
        }
    }

    /// Set the mask bit of the addressed pixel on every ROC.
    pub fn mask_pixel(&mut self, column: u8, row: u8, masked: bool) {
        let matcher = AtCoordinate::new(column, row);
        let mut hit = false;
        for roc in &mut self.rocs {
            for pixel in roc.pixels.iter_mut().filter(|p| matcher.matches(&**p)) {
                pixel.masked = masked;
                hit = true;
            }
        }
        if !hit {
            log::warn!("mask_pixel: no pixel at c{column} r{row}");
        }
    }

    /// Set the test-mode bit of every pixel on the DUT.
    pub fn test_all_pixels(&mut self, on: bool) {
        for roc in &mut self.rocs {
            for pixel in &mut roc.pixels {
                pixel.enabled = on;
            }
        }
    }

    /// Set the mask bit of every pixel on the DUT.
    pub fn mask_all_pixels(&mut self, masked: bool) {
        for roc in &mut self.rocs {
            for pixel in &mut roc.pixels {
                pixel.masked = masked;
            }
        }
    }

    /// Number of pixels currently enabled and unmasked.
    ///
    /// During a scan pass this never exceeds the number of pixels being
    /// measured at that instant.
    pub fn armed_pixel_count(&self) -> usize {
        self.rocs
            .iter()
            .flat_map(|roc| roc.pixels.iter())
            .filter(|p| p.enabled && !p.masked)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_roc_dut() -> DutConfig {
        DutConfig::new(vec![RocConfig::full(0), RocConfig::full(1)]).unwrap()
    }

    #[test]
    fn duplicate_pixel_identity_rejected() {
        let pixels = vec![PixelConfig::new(7, 8, 0), PixelConfig::new(7, 8, 0)];
        let err = DutConfig::new(vec![RocConfig::new(0, pixels)]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::DuplicatePixel {
                column: 7,
                row: 8,
                roc_id: 0
            }
        );
    }

    #[test]
    fn same_position_on_different_rocs_is_fine() {
        let dut = DutConfig::new(vec![
            RocConfig::new(0, vec![PixelConfig::new(7, 8, 0)]),
            RocConfig::new(1, vec![PixelConfig::new(7, 8, 1)]),
        ]);
        assert!(dut.is_ok());
    }

    #[test]
    fn out_of_range_pixel_rejected() {
        let pixels = vec![PixelConfig::new(ROC_NUM_COLS, 0, 0)];
        let err = DutConfig::new(vec![RocConfig::new(0, pixels)]).unwrap_err();
        assert!(matches!(err, ConfigError::PixelOutOfRange { .. }));

        let pixels = vec![PixelConfig::new(0, ROC_NUM_ROWS, 0)];
        assert!(DutConfig::new(vec![RocConfig::new(0, pixels)]).is_err());
    }

    #[test]
    fn arming_one_pixel() {
        let mut dut = two_roc_dut();
        assert_eq!(dut.armed_pixel_count(), 0);

        dut.test_pixel(12, 34, true);
        dut.mask_pixel(12, 34, false);
        // The pixel is armed on both ROCs.
        assert_eq!(dut.armed_pixel_count(), 2);

        let pixel = dut.pixel(12, 34, 1).unwrap();
        assert!(pixel.enabled && !pixel.masked);

        dut.test_pixel(12, 34, false);
        dut.mask_pixel(12, 34, true);
        assert_eq!(dut.armed_pixel_count(), 0);
    }

    #[test]
    fn baseline_reset_covers_all_pixels() {
        let mut dut = two_roc_dut();
        dut.test_all_pixels(true);
        dut.mask_all_pixels(false);
        assert_eq!(dut.armed_pixel_count(), 2 * 52 * 80);

        dut.test_all_pixels(false);
        dut.mask_all_pixels(true);
        assert_eq!(dut.armed_pixel_count(), 0);
    }

    #[test]
    fn enabled_rocs_filters() {
        let mut rocs = vec![RocConfig::full(0), RocConfig::full(1), RocConfig::full(2)];
        rocs[1].enabled = false;
        let dut = DutConfig::new(rocs).unwrap();
        let enabled: Vec<u8> = dut.enabled_rocs().iter().map(|r| r.i2c_address).collect();
        assert_eq!(enabled, vec![0, 2]);
    }

    #[test]
    fn pixel_lookup_misses_yield_none() {
        let dut = two_roc_dut();
        assert!(dut.pixel(0, 0, 5).is_none());
        assert!(dut.pixel(51, 79, 1).is_some());
    }
}
