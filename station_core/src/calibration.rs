//! Three-anchor piecewise-linear calibration tables.
//!
//! Each tip carries, per sensor type, an ordered list of (measured
//! value, temperature) anchors persisted by `station_config::TipStore`.
//! The core interpolates between them and clamps at the table edges;
//! it never extrapolates past the outermost anchors.

use crate::error::CalibrationError;

/// Number of calibration anchors per table.
pub const ANCHOR_COUNT: usize = 3;

/// One calibration anchor: a measured value (millivolts for
/// thermocouples, ohms for thermistors) and the reference temperature
/// it was captured at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalPoint {
    pub measured: f32,
    pub temperature_c: f32,
}

#[derive(Debug, Clone)]
pub struct CalTable {
    anchors: [CalPoint; ANCHOR_COUNT],
}

impl CalTable {
    /// Build a table from anchors. Measured values must strictly
    /// increase; the temperatures may be arbitrary.
    pub fn new(anchors: [CalPoint; ANCHOR_COUNT]) -> Result<Self, CalibrationError> {
        for pair in anchors.windows(2) {
            if pair[1].measured <= pair[0].measured {
                return Err(CalibrationError::NotMonotonic);
            }
        }
        Ok(Self { anchors })
    }

    pub fn anchors(&self) -> &[CalPoint; ANCHOR_COUNT] {
        &self.anchors
    }

    /// Replace a single anchor, keeping the monotonicity invariant.
    pub fn set_anchor(&mut self, index: usize, point: CalPoint) -> Result<(), CalibrationError> {
        if index >= ANCHOR_COUNT {
            return Err(CalibrationError::BadIndex(index));
        }
        let mut candidate = self.anchors;
        candidate[index] = point;
        let updated = Self::new(candidate)?;
        *self = updated;
        Ok(())
    }

    /// Piecewise-linear interpolation, clamped to the edge anchors.
    pub fn temperature_at(&self, measured: f32) -> f32 {
        let first = self.anchors[0];
        let last = self.anchors[ANCHOR_COUNT - 1];
        if measured <= first.measured {
            return first.temperature_c;
        }
        if measured >= last.measured {
            return last.temperature_c;
        }
        for pair in self.anchors.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if measured <= hi.measured {
                let span = hi.measured - lo.measured;
                let frac = (measured - lo.measured) / span;
                return lo.temperature_c + frac * (hi.temperature_c - lo.temperature_c);
            }
        }
        last.temperature_c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thermocouple_table() -> CalTable {
        CalTable::new([
            CalPoint {
                measured: 4.64,
                temperature_c: 221.77,
            },
            CalPoint {
                measured: 5.81,
                temperature_c: 296.06,
            },
            CalPoint {
                measured: 6.64,
                temperature_c: 369.61,
            },
        ])
        .unwrap()
    }

    #[test]
    fn interpolates_within_first_segment() {
        let t = thermocouple_table().temperature_at(5.0);
        assert!(t > 221.77 && t < 296.06, "got {t}");
    }

    #[test]
    fn exact_anchor_reproduces_anchor_temperature() {
        let table = thermocouple_table();
        for anchor in table.anchors() {
            let t = table.temperature_at(anchor.measured);
            assert!((t - anchor.temperature_c).abs() < 1e-3);
        }
    }

    #[test]
    fn clamps_at_edges_instead_of_extrapolating() {
        let table = thermocouple_table();
        assert_eq!(table.temperature_at(0.0), 221.77);
        assert_eq!(table.temperature_at(50.0), 369.61);
    }

    #[test]
    fn rejects_non_monotonic_anchors() {
        let err = CalTable::new([
            CalPoint {
                measured: 2.0,
                temperature_c: 100.0,
            },
            CalPoint {
                measured: 1.0,
                temperature_c: 200.0,
            },
            CalPoint {
                measured: 3.0,
                temperature_c: 300.0,
            },
        ])
        .unwrap_err();
        assert_eq!(err, CalibrationError::NotMonotonic);
    }

    #[test]
    fn set_anchor_refuses_ordering_violations() {
        let mut table = thermocouple_table();
        let err = table
            .set_anchor(
                1,
                CalPoint {
                    measured: 10.0,
                    temperature_c: 300.0,
                },
            )
            .unwrap_err();
        assert_eq!(err, CalibrationError::NotMonotonic);
        // Table unchanged on failure
        assert_eq!(table.anchors()[1].measured, 5.81);
    }
}
