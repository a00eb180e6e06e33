//! Search predicates over configuration records.
//!
//! The bench keeps pixel and ROC configuration in plain ordered vectors,
//! and every lookup goes through a small set of reusable matchers rather
//! than ad-hoc loops. Each matcher is a stateless value constructed with
//! its parameters; the capability traits below describe the record fields
//! a matcher is allowed to inspect, so the same matcher works on a
//! `PixelConfig` and on a raw reading coming back from the readout chain.

/// Records carrying an enable bit (pixels and ROCs).
pub trait HasEnable {
    fn enabled(&self) -> bool;
}

/// Records carrying a mask bit.
pub trait HasMask {
    fn masked(&self) -> bool;
}

/// Records addressed by a column/row position on a sensor.
pub trait HasCoordinates {
    fn column(&self) -> u8;
    fn row(&self) -> u8;
}

/// Records attributed to a specific readout chip.
pub trait HasRocId {
    fn roc_id(&self) -> u8;
}

/// Records addressed by an I2C bus address (ROCs).
pub trait HasBusAddress {
    fn i2c_address(&self) -> u8;
}

/// A predicate over records of shape `R`.
///
/// Matchers never mutate the record or themselves and can be applied to
/// any number of collections.
pub trait Matcher<R> {
    fn matches(&self, record: &R) -> bool;
}

/// Matches records whose enable bit equals the wanted value.
#[derive(Debug, Clone, Copy)]
pub struct EnabledIs(pub bool);

impl<R: HasEnable> Matcher<R> for EnabledIs {
    fn matches(&self, record: &R) -> bool {
        record.enabled() == self.0
    }
}

/// Matches records whose mask bit equals the wanted value.
#[derive(Debug, Clone, Copy)]
pub struct MaskedIs(pub bool);

impl<R: HasMask> Matcher<R> for MaskedIs {
    fn matches(&self, record: &R) -> bool {
        record.masked() == self.0
    }
}

/// Matches records at an exact (column, row) position, optionally pinned
/// to one ROC.
///
/// The two-argument form matches the position on any chip; [`on_roc`]
/// additionally requires the record's ROC id to match.
///
/// [`on_roc`]: AtCoordinate::on_roc
#[derive(Debug, Clone, Copy)]
pub struct AtCoordinate {
    column: u8,
    row: u8,
    roc: Option<u8>,
}

impl AtCoordinate {
    pub fn new(column: u8, row: u8) -> Self {
        Self {
            column,
            row,
            roc: None,
        }
    }

    pub fn on_roc(column: u8, row: u8, roc: u8) -> Self {
        Self {
            column,
            row,
            roc: Some(roc),
        }
    }
}

impl<R: HasCoordinates + HasRocId> Matcher<R> for AtCoordinate {
    fn matches(&self, record: &R) -> bool {
        if record.row() != self.row || record.column() != self.column {
            return false;
        }
        match self.roc {
            Some(roc) => record.roc_id() == roc,
            None => true,
        }
    }
}

/// Matches records lying beyond a reference position.
///
/// A record matches when its row OR its column exceeds the reference.
/// This is deliberately not a conjunction: a record one row past the
/// reference matches even if its column is smaller.
#[derive(Debug, Clone, Copy)]
pub struct BeyondCoordinate {
    column: u8,
    row: u8,
}

impl BeyondCoordinate {
    pub fn new(column: u8, row: u8) -> Self {
        Self { column, row }
    }
}

impl<R: HasCoordinates> Matcher<R> for BeyondCoordinate {
    fn matches(&self, record: &R) -> bool {
        record.row() > self.row || record.column() > self.column
    }
}

/// Matches ROC records by their I2C bus address.
#[derive(Debug, Clone, Copy)]
pub struct WithBusAddress(pub u8);

impl<R: HasBusAddress> Matcher<R> for WithBusAddress {
    fn matches(&self, record: &R) -> bool {
        record.i2c_address() == self.0
    }
}

/// Return the first record matching the predicate, or `None`.
pub fn find_first<'a, R, M: Matcher<R>>(records: &'a [R], matcher: &M) -> Option<&'a R> {
    records.iter().find(|r| matcher.matches(r))
}

/// Return all records matching the predicate, in sequence order.
pub fn filter_matching<'a, R, M: Matcher<R>>(records: &'a [R], matcher: &M) -> Vec<&'a R> {
    records.iter().filter(|r| matcher.matches(r)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dut::{PixelConfig, RocConfig};

    fn pixels() -> Vec<PixelConfig> {
        vec![
            PixelConfig::new(10, 20, 0),
            PixelConfig::new(10, 21, 0),
            PixelConfig::new(11, 20, 1),
            PixelConfig::new(3, 50, 1),
        ]
    }

    #[test]
    fn coordinate_match_selects_exact_position() {
        let pix = pixels();
        let hits = filter_matching(&pix, &AtCoordinate::new(10, 20));
        assert_eq!(hits.len(), 1);
        assert_eq!((hits[0].column, hits[0].row), (10, 20));
    }

    #[test]
    fn coordinate_match_can_pin_roc() {
        let pix = vec![PixelConfig::new(5, 5, 0), PixelConfig::new(5, 5, 3)];
        let on_roc3 = find_first(&pix, &AtCoordinate::on_roc(5, 5, 3)).unwrap();
        assert_eq!(on_roc3.roc_id, 3);
        assert!(find_first(&pix, &AtCoordinate::on_roc(5, 5, 7)).is_none());
    }

    #[test]
    fn beyond_is_a_disjunction() {
        // Row exceeds the reference while the column does not: must match.
        let pix = vec![PixelConfig::new(3, 50, 1)];
        assert!(BeyondCoordinate::new(10, 40).matches(&pix[0]));
        // Column exceeds, row does not.
        let pix = vec![PixelConfig::new(30, 10, 1)];
        assert!(BeyondCoordinate::new(10, 40).matches(&pix[0]));
        // Neither exceeds.
        let pix = vec![PixelConfig::new(10, 40, 1)];
        assert!(!BeyondCoordinate::new(10, 40).matches(&pix[0]));
    }

    #[test]
    fn beyond_filters_expected_subset() {
        let pix = pixels();
        let hits = filter_matching(&pix, &BeyondCoordinate::new(10, 21));
        // (11,20): column beyond. (3,50): row beyond. (10,20)/(10,21): neither.
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn enable_and_mask_filters() {
        let mut pix = pixels();
        pix[1].enabled = true;
        pix[2].masked = false;

        let enabled = filter_matching(&pix, &EnabledIs(true));
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].row, 21);

        let unmasked = filter_matching(&pix, &MaskedIs(false));
        assert_eq!(unmasked.len(), 1);
        assert_eq!(unmasked[0].roc_id, 1);
    }

    #[test]
    fn find_roc_by_bus_address() {
        let rocs = vec![RocConfig::new(0, vec![]), RocConfig::new(4, vec![])];
        let roc = find_first(&rocs, &WithBusAddress(4)).unwrap();
        assert_eq!(roc.i2c_address, 4);
        assert!(find_first(&rocs, &WithBusAddress(9)).is_none());
    }

    #[test]
    fn find_first_returns_earliest_match() {
        let pix = vec![
            PixelConfig::new(1, 1, 0),
            PixelConfig::new(1, 1, 1),
            PixelConfig::new(1, 1, 2),
        ];
        let hit = find_first(&pix, &AtCoordinate::new(1, 1)).unwrap();
        assert_eq!(hit.roc_id, 0);
    }
}
