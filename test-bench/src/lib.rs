//! Calibration test bench for pixel readout chips.
//!
//! Ties the DUT configuration model and the hardware facades together
//! into runnable calibration procedures: the test-parameter store feeds
//! scan configuration, the scan engine drives the readout facade, and
//! results land in per-pixel response histograms handed to a sink.

pub mod histogram;
pub mod pulse_height;
pub mod test_parameters;

pub use histogram::{CollectingSink, HistogramSink, PixelId, ResponseHistogram};
pub use pulse_height::{PulseHeightScan, ScanError, ScanSummary};
pub use test_parameters::{Parameter, ParameterFileError, TestParameters};
