//! Pulse-height calibration scan.
//!
//! Measures the pulse-height response of selected pixels at a fixed DAC
//! point: every target pixel is armed alone, triggered `ntrig` times
//! through the readout facade, and its responses are accumulated into a
//! per-pixel histogram. Transient readout faults are retried a bounded
//! number of times and never abort the pass; the DAC state active before
//! the pass is restored unconditionally at the end.

use hardware::{AcqFlags, PixelReading, ReadoutApi, ReadoutError};
use shared::DutConfig;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::histogram::{HistogramSink, PixelId, ResponseHistogram};
use crate::test_parameters::TestParameters;

/// Attempts per measurement call: the initial try plus five retries.
const MAX_MEASURE_ATTEMPTS: usize = 6;

/// Parameter names this scan accepts.
const DECLARED_PARAMETERS: &[&str] = &["ntrig", "dac", "dacval", "pix"];

/// Errors that abort a scan pass.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Non-transient readout failure, e.g. an unknown DAC register.
    #[error("readout failure: {0}")]
    Readout(#[from] ReadoutError),
}

/// Bookkeeping of one completed (or aborted) pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Configured trigger count.
    pub triggers: u16,
    /// Histograms booked for this pass.
    pub histograms: usize,
    /// Measurement calls issued, including faulted attempts.
    pub measure_calls: usize,
    /// Transient faults seen across all attempts.
    pub transient_faults: usize,
    /// Measurement calls abandoned after exhausting all attempts.
    pub calls_abandoned: usize,
    /// Readings attributed to a booked histogram.
    pub readings_filled: usize,
    /// Readings dropped for lack of a booked histogram.
    pub readings_dropped: usize,
}

/// Pulse-height scan at a fixed point of one DAC.
pub struct PulseHeightScan {
    test_name: String,
    ntrig: u16,
    dac: String,
    dac_value: u16,
    /// Selected (column, row) targets. A negative column marks an
    /// inactive entry, skipped for booking and measurement.
    targets: Vec<(i32, i32)>,
}

impl PulseHeightScan {
    pub fn new(test_name: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            ntrig: 10,
            dac: "vcal".to_string(),
            dac_value: 100,
            targets: Vec::new(),
        }
    }

    /// Apply one named parameter. Returns false for names this scan does
    /// not declare. Values have embedded spaces stripped first.
    ///
    /// `pix` values of the form `c,r` accumulate into the target list;
    /// a `pix` value without a comma clears it.
    pub fn set_parameter(&mut self, name: &str, value: &str) -> bool {
        let name = name.to_lowercase();
        if !DECLARED_PARAMETERS.contains(&name.as_str()) {
            return false;
        }
        let value: String = value.chars().filter(|c| *c != ' ').collect();

        match name.as_str() {
            "ntrig" => {
                self.ntrig = value.parse().unwrap_or(0);
                debug!("setting ntrig ->{}<- from {value}", self.ntrig);
            }
            "dac" => {
                debug!("setting dac ->{value}<-");
                self.dac = value;
            }
            "dacval" => {
                self.dac_value = value.parse().unwrap_or(0);
                debug!("setting dacval ->{}<- from {value}", self.dac_value);
            }
            "pix" => match value.split_once(',') {
                Some((column, row)) => {
                    let column = column.parse().unwrap_or(-1);
                    let row = row.parse().unwrap_or(-1);
                    self.targets.push((column, row));
                    debug!(
                        "adding target {column}/{row}, {} selected",
                        self.targets.len()
                    );
                }
                None => {
                    debug!("clearing {} selected targets", self.targets.len());
                    self.targets.clear();
                }
            },
            _ => unreachable!("gated by DECLARED_PARAMETERS"),
        }
        true
    }

    /// Apply every parameter stored for this scan's test name.
    pub fn configure(&mut self, parameters: &TestParameters) {
        let stored = parameters.parameters(&self.test_name);
        if stored.is_empty() {
            warn!("no stored parameters for test {:?}", self.test_name);
        }
        for parameter in stored {
            self.set_parameter(&parameter.name, &parameter.value);
        }
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    pub fn ntrig(&self) -> u16 {
        self.ntrig
    }

    pub fn dac(&self) -> &str {
        &self.dac
    }

    pub fn dac_value(&self) -> u16 {
        self.dac_value
    }

    pub fn targets(&self) -> &[(i32, i32)] {
        &self.targets
    }

    /// Run one scan pass.
    ///
    /// The DAC state captured at entry is reapplied unconditionally,
    /// whether the pass completes or aborts.
    pub fn run(
        &mut self,
        dut: &mut DutConfig,
        api: &mut dyn ReadoutApi,
        sink: &mut dyn HistogramSink,
    ) -> Result<ScanSummary, ScanError> {
        let snapshot = api.snapshot_dacs();
        let outcome = self.run_pass(dut, api, sink);
        api.restore_dacs(snapshot);
        outcome
    }

    fn run_pass(
        &mut self,
        dut: &mut DutConfig,
        api: &mut dyn ReadoutApi,
        sink: &mut dyn HistogramSink,
    ) -> Result<ScanSummary, ScanError> {
        let flags = AcqFlags::FORCE_MASKED | AcqFlags::FORCE_SERIAL;
        debug!("using flags {flags:?}");

        // Book one accumulator per enabled ROC and active target.
        let mut bookings: Vec<(PixelId, ResponseHistogram)> = Vec::new();
        for roc in dut.enabled_rocs() {
            for &(column, row) in &self.targets {
                if column > -1 {
                    let id = PixelId::new(column as u8, row as u8, roc.i2c_address);
                    bookings.push((id, ResponseHistogram::for_pixel(id, &self.dac, self.dac_value)));
                }
            }
        }
        let mut last_touched = bookings.last().map(|(id, _)| *id);

        let mut summary = ScanSummary {
            triggers: self.ntrig,
            histograms: bookings.len(),
            ..Default::default()
        };

        // Apply the scan point. An unknown register aborts the pass.
        api.set_dac(&self.dac, self.dac_value)?;

        // Baseline: everything out of test mode and masked.
        dut.test_all_pixels(false);
        dut.mask_all_pixels(true);
        api.set_all_pixels_test_mode(false);
        api.mask_all_pixels(true);

        let mut collected: Vec<(u8, Vec<PixelReading>)> = Vec::new();
        for _ in 0..self.ntrig {
            for &(column, row) in &self.targets {
                if column < 0 {
                    continue;
                }
                let (column, row) = (column as u8, row as u8);

                dut.test_pixel(column, row, true);
                dut.mask_pixel(column, row, false);
                api.set_pixel_test_mode(column, row, true);
                api.set_pixel_mask(column, row, false);

                let outcome = self.measure_with_retry(api, flags, &mut summary);

                // The pixel goes back behind the mask no matter how the
                // measurement ended.
                dut.test_pixel(column, row, false);
                dut.mask_pixel(column, row, true);
                api.set_pixel_test_mode(column, row, false);
                api.set_pixel_mask(column, row, true);

                if let Some(batch) = outcome? {
                    collected.extend(batch);
                }
            }
        }

        // Attribute readings by their own reported identity.
        for (_batch_roc, readings) in &collected {
            for reading in readings {
                let key = PixelId::new(reading.column, reading.row, reading.roc_id);
                match bookings.iter_mut().find(|(id, _)| *id == key) {
                    Some((_, histogram)) => {
                        histogram.fill(reading.value);
                        last_touched = Some(key);
                        summary.readings_filled += 1;
                    }
                    None => {
                        summary.readings_dropped += 1;
                        debug!("histogram PH_c{}_r{}_C{} not found", reading.column, reading.row, reading.roc_id);
                    }
                }
            }
        }

        for (id, histogram) in bookings {
            sink.record(id, histogram);
        }
        if let Some(id) = last_touched {
            sink.set_displayed(id);
        }

        info!(
            "scan {} done: {} histograms, {} filled, {} dropped, {} transient faults",
            self.test_name,
            summary.histograms,
            summary.readings_filled,
            summary.readings_dropped,
            summary.transient_faults
        );
        Ok(summary)
    }

    /// Issue one measurement call, retrying transient faults up to the
    /// attempt cap. Exhausting the cap abandons this call only; any
    /// other error is fatal to the pass.
    fn measure_with_retry(
        &self,
        api: &mut dyn ReadoutApi,
        flags: AcqFlags,
        summary: &mut ScanSummary,
    ) -> Result<Option<Vec<(u8, Vec<PixelReading>)>>, ScanError> {
        for attempt in 1..=MAX_MEASURE_ATTEMPTS {
            summary.measure_calls += 1;
            match api.get_pulseheight_vs_dac(&self.dac, self.dac_value, self.dac_value, flags, 1) {
                Ok(batch) => return Ok(Some(batch)),
                Err(ReadoutError::Transient(message)) => {
                    summary.transient_faults += 1;
                    warn!("transient readout fault (attempt {attempt}/{MAX_MEASURE_ATTEMPTS}): {message}");
                }
                Err(fatal) => return Err(fatal.into()),
            }
        }
        summary.calls_abandoned += 1;
        warn!("measurement abandoned after {MAX_MEASURE_ATTEMPTS} attempts");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undeclared_parameter_is_refused() {
        let mut scan = PulseHeightScan::new("ph");
        assert!(!scan.set_parameter("vcal", "77"));
        assert!(scan.set_parameter("NTRIG", "5"));
        assert_eq!(scan.ntrig(), 5);
    }

    #[test]
    fn values_have_spaces_stripped() {
        let mut scan = PulseHeightScan::new("ph");
        assert!(scan.set_parameter("dacval", " 12 0"));
        assert_eq!(scan.dac_value(), 120);
        assert!(scan.set_parameter("dac", " ca ldel "));
        assert_eq!(scan.dac(), "caldel");
    }

    #[test]
    fn pix_accumulates_and_clears() {
        let mut scan = PulseHeightScan::new("ph");
        scan.set_parameter("pix", "11,20");
        scan.set_parameter("pix", "12,25");
        assert_eq!(scan.targets(), &[(11, 20), (12, 25)]);

        scan.set_parameter("pix", "clear");
        assert!(scan.targets().is_empty());
    }

    #[test]
    fn malformed_pix_halves_become_inactive() {
        let mut scan = PulseHeightScan::new("ph");
        scan.set_parameter("pix", "x,20");
        assert_eq!(scan.targets(), &[(-1, 20)]);
    }

    #[test]
    fn configure_pulls_stored_parameters() {
        let store = TestParameters::parse("-- ph\nntrig 7\ndac caldel\ndacval 130\npix 3,4\npix 5,6\n");
        let mut scan = PulseHeightScan::new("ph");
        scan.configure(&store);

        assert_eq!(scan.ntrig(), 7);
        assert_eq!(scan.dac(), "caldel");
        assert_eq!(scan.dac_value(), 130);
        assert_eq!(scan.targets(), &[(3, 4), (5, 6)]);
    }
}
