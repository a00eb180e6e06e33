//! High-voltage bias supply facade.
//!
//! Thin device-control surface for the sensor bias supply: output
//! switching, voltage programming and current readback. The bench
//! implementation models a resistive load with a compliance limit so the
//! trip path can be exercised without real hardware.

use thiserror::Error;

/// Errors reported by a high-voltage supply.
#[derive(Error, Debug, PartialEq)]
pub enum HvSupplyError {
    /// The supply tripped on overcurrent and latched its output off.
    #[error("supply tripped on overcurrent")]
    Tripped,

    /// The requested voltage is outside the supply's output range.
    #[error("voltage {0} V outside supply range")]
    VoltageOutOfRange(f64),
}

/// Control surface of a high-voltage bias supply.
pub trait HvSupply {
    /// Turn on the HV output.
    fn hv_on(&mut self) -> Result<(), HvSupplyError>;

    /// Turn off the HV output.
    fn hv_off(&mut self) -> Result<(), HvSupplyError>;

    /// Program the output voltage in volts.
    fn set_voltage(&mut self, volts: f64) -> Result<(), HvSupplyError>;

    /// Configured output voltage in volts.
    fn voltage(&self) -> f64;

    /// Current drawn in amperes.
    fn current(&self) -> f64;

    /// Set the compliance limit in microamperes.
    fn set_current_limit(&mut self, microampere: u32) -> Result<(), HvSupplyError>;

    /// Compliance limit in microamperes.
    fn current_limit(&self) -> u32;

    /// Did the supply trip?
    fn tripped(&self) -> bool;
}

/// Maximum output voltage of the bench supply model.
const MAX_VOLTAGE: f64 = 500.0;

/// Load resistance used to model sensor leakage, in ohms.
const LOAD_OHMS: f64 = 50.0e6;

/// Bench model of an HV supply driving a resistive sensor load.
#[derive(Debug, Clone)]
pub struct BenchHvSupply {
    output_on: bool,
    volts: f64,
    limit_ua: u32,
    tripped: bool,
}

impl BenchHvSupply {
    pub fn new() -> Self {
        Self {
            output_on: false,
            volts: 0.0,
            limit_ua: 100,
            tripped: false,
        }
    }

    fn check_compliance(&mut self) {
        let drawn_ua = self.current() * 1e6;
        if drawn_ua > self.limit_ua as f64 {
            self.tripped = true;
            self.output_on = false;
        }
    }
}

impl Default for BenchHvSupply {
    fn default() -> Self {
        Self::new()
    }
}

impl HvSupply for BenchHvSupply {
    fn hv_on(&mut self) -> Result<(), HvSupplyError> {
        if self.tripped {
            return Err(HvSupplyError::Tripped);
        }
        self.output_on = true;
        self.check_compliance();
        if self.tripped {
            return Err(HvSupplyError::Tripped);
        }
        Ok(())
    }

    fn hv_off(&mut self) -> Result<(), HvSupplyError> {
        self.output_on = false;
        Ok(())
    }

    fn set_voltage(&mut self, volts: f64) -> Result<(), HvSupplyError> {
        if self.tripped {
            return Err(HvSupplyError::Tripped);
        }
        if !(0.0..=MAX_VOLTAGE).contains(&volts) {
            return Err(HvSupplyError::VoltageOutOfRange(volts));
        }
        self.volts = volts;
        self.check_compliance();
        if self.tripped {
            return Err(HvSupplyError::Tripped);
        }
        Ok(())
    }

    fn voltage(&self) -> f64 {
        self.volts
    }

    fn current(&self) -> f64 {
        if self.output_on {
            self.volts / LOAD_OHMS
        } else {
            0.0
        }
    }

    fn set_current_limit(&mut self, microampere: u32) -> Result<(), HvSupplyError> {
        self.limit_ua = microampere;
        Ok(())
    }

    fn current_limit(&self) -> u32 {
        self.limit_ua
    }

    fn tripped(&self) -> bool {
        self.tripped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_switching() {
        let mut supply = BenchHvSupply::new();
        assert_eq!(supply.current(), 0.0);

        supply.set_voltage(150.0).unwrap();
        supply.hv_on().unwrap();
        assert!(supply.current() > 0.0);

        supply.hv_off().unwrap();
        assert_eq!(supply.current(), 0.0);
    }

    #[test]
    fn voltage_range_enforced() {
        let mut supply = BenchHvSupply::new();
        assert_eq!(
            supply.set_voltage(600.0),
            Err(HvSupplyError::VoltageOutOfRange(600.0))
        );
        assert_eq!(
            supply.set_voltage(-5.0),
            Err(HvSupplyError::VoltageOutOfRange(-5.0))
        );
    }

    #[test]
    fn overcurrent_trips_and_latches() {
        let mut supply = BenchHvSupply::new();
        // 1 µA limit, 150 V over 50 MΩ draws 3 µA.
        supply.set_current_limit(1).unwrap();
        supply.set_voltage(150.0).unwrap();
        assert_eq!(supply.hv_on(), Err(HvSupplyError::Tripped));
        assert!(supply.tripped());
        assert_eq!(supply.current(), 0.0);
        assert_eq!(supply.set_voltage(10.0), Err(HvSupplyError::Tripped));
    }
}
