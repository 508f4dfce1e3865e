//! Sensor models: per-tip conversion from raw samples to temperature.
//!
//! The variant set is fixed and known at compile time, so models are a
//! closed enum dispatched by match rather than trait objects. Each
//! model owns the averagers for the analog paths it samples and the
//! calibration table used for the measured-value to temperature map.

use crate::averager::Averager;
use crate::calibration::{ANCHOR_COUNT, CalPoint, CalTable};
use crate::channel::ChannelId;
use crate::error::CalibrationError;
use crate::tag::MeasureTag;

/// Full-scale ADC count of the front-end converter.
pub const ADC_MAX: i32 = 4095;
/// Converter reference in millivolts.
const VREF_MV: f32 = 3300.0;
/// Gain of the boost amplifier in front of the thermocouple path.
const GAIN_BOOST_FACTOR: f32 = 251.0;
/// Cold-junction sensor transfer: 10 mV/°C with a 500 mV offset.
const CJ_OFFSET_MV: f32 = 500.0;
const CJ_MV_PER_C: f32 = 10.0;
/// Thermistor bias current in milliamps; ohms = millivolts / mA.
const BIAS_CURRENT_MA: f32 = 0.25;
/// Readings at or above this count sit on the supply rail: no tip.
const TIP_ABSENT_FLOOR: i32 = ADC_MAX - 32;

/// Plausibility bounds for calibration captures.
const TC_MV_RANGE: (f32, f32) = (0.2, 13.0);
const CJ_C_RANGE: (f32, f32) = (0.0, 60.0);
const OHM_RANGE: (f32, f32) = (10.0, 50_000.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Thermocouple,
    Ntc,
    Ptc,
    Dummy,
}

#[inline]
fn counts_to_mv(raw: i32) -> f32 {
    raw as f32 * VREF_MV / ADC_MAX as f32
}

#[inline]
fn check_range(
    quantity: &'static str,
    value: f32,
    (min, max): (f32, f32),
) -> Result<(), CalibrationError> {
    if !value.is_finite() || value < min || value > max {
        return Err(CalibrationError::OutOfRange {
            quantity,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Thermocouple tip with cold-junction compensation.
///
/// Samples two paths: the gain-boosted thermocouple voltage (path A)
/// and the connector cold-junction sensor (path B). The calibration
/// table maps thermocouple millivolts to the temperature *difference*
/// over the cold junction; compensation is added afterwards.
#[derive(Debug)]
pub struct Thermocouple {
    channel: ChannelId,
    table: CalTable,
    tc: Averager,
    cold_junction: Averager,
}

impl Thermocouple {
    fn tc_mv(&self, raw: i32) -> f32 {
        counts_to_mv(raw) / GAIN_BOOST_FACTOR
    }

    fn cj_temperature_c(&self, raw: i32) -> f32 {
        (counts_to_mv(raw) - CJ_OFFSET_MV) / CJ_MV_PER_C
    }
}

/// NTC or PTC thermistor tip: one biased sense path, resistance mapped
/// to temperature through the calibration table.
#[derive(Debug)]
pub struct Thermistor {
    channel: ChannelId,
    kind: SensorKind,
    table: CalTable,
    sense: Averager,
}

impl Thermistor {
    fn ohms(&self, raw: i32) -> f32 {
        counts_to_mv(raw) / BIAS_CURRENT_MA
    }
}

#[derive(Debug)]
pub enum SensorModel {
    Thermocouple(Thermocouple),
    Ntc(Thermistor),
    Ptc(Thermistor),
    /// Placeholder for a channel with no usable tip configuration.
    Dummy,
}

impl SensorModel {
    pub fn thermocouple(channel: ChannelId, table: CalTable) -> Self {
        SensorModel::Thermocouple(Thermocouple {
            channel,
            table,
            tc: Averager::window(8),
            cold_junction: Averager::window(8),
        })
    }

    pub fn ntc(channel: ChannelId, table: CalTable) -> Self {
        SensorModel::Ntc(Thermistor {
            channel,
            kind: SensorKind::Ntc,
            table,
            sense: Averager::window(8),
        })
    }

    pub fn ptc(channel: ChannelId, table: CalTable) -> Self {
        SensorModel::Ptc(Thermistor {
            channel,
            kind: SensorKind::Ptc,
            table,
            sense: Averager::window(8),
        })
    }

    pub fn kind(&self) -> SensorKind {
        match self {
            SensorModel::Thermocouple(_) => SensorKind::Thermocouple,
            SensorModel::Ntc(t) | SensorModel::Ptc(t) => t.kind,
            SensorModel::Dummy => SensorKind::Dummy,
        }
    }

    /// Ordered measurement tags this sensor needs each cycle.
    pub fn measurement_sequence(&self) -> Vec<MeasureTag> {
        match self {
            SensorModel::Thermocouple(tc) => vec![
                MeasureTag::for_path(tc.channel, false, false, true),
                MeasureTag::for_path(tc.channel, true, false, false),
            ],
            SensorModel::Ntc(t) | SensorModel::Ptc(t) => {
                vec![MeasureTag::for_path(t.channel, false, true, false)]
            }
            SensorModel::Dummy => Vec::new(),
        }
    }

    /// Route a completed conversion to the averager its tag selects.
    pub fn accumulate(&mut self, tag: MeasureTag, raw: i32) {
        match self {
            SensorModel::Thermocouple(tc) => {
                if tag.contains(MeasureTag::PATH_B) {
                    tc.cold_junction.push(raw);
                } else {
                    tc.tc.push(raw);
                }
            }
            SensorModel::Ntc(t) | SensorModel::Ptc(t) => t.sense.push(raw),
            SensorModel::Dummy => {}
        }
    }

    /// Temperature from averaged samples.
    pub fn temperature_c(&self) -> f32 {
        match self {
            SensorModel::Thermocouple(tc) => {
                let mv = tc.tc_mv(tc.tc.average());
                let cj = tc.cj_temperature_c(tc.cold_junction.average());
                tc.table.temperature_at(mv) + cj
            }
            SensorModel::Ntc(t) | SensorModel::Ptc(t) => {
                t.table.temperature_at(t.ohms(t.sense.average()))
            }
            SensorModel::Dummy => 0.0,
        }
    }

    /// Temperature from the most recent raw samples, unfiltered.
    pub fn instant_temperature_c(&self) -> f32 {
        match self {
            SensorModel::Thermocouple(tc) => {
                let mv = tc.tc_mv(tc.tc.last_raw());
                let cj = tc.cj_temperature_c(tc.cold_junction.last_raw());
                tc.table.temperature_at(mv) + cj
            }
            SensorModel::Ntc(t) | SensorModel::Ptc(t) => {
                t.table.temperature_at(t.ohms(t.sense.last_raw()))
            }
            SensorModel::Dummy => 0.0,
        }
    }

    /// False once the sense path saturates near the supply rail, which
    /// is what an unplugged tool looks like. Before any sample has been
    /// accumulated the tip is assumed present.
    pub fn tip_present(&self) -> bool {
        match self {
            SensorModel::Thermocouple(tc) => {
                !tc.cold_junction.is_primed() || tc.cold_junction.last_raw() < TIP_ABSENT_FLOOR
            }
            SensorModel::Ntc(t) | SensorModel::Ptc(t) => {
                !t.sense.is_primed() || t.sense.last_raw() < TIP_ABSENT_FLOOR
            }
            SensorModel::Dummy => false,
        }
    }

    /// Capture the current averaged reading as calibration anchor
    /// `index` at the given reference temperature. Rejects physically
    /// implausible captures without mutating the table.
    pub fn save_calibration_point(
        &mut self,
        index: usize,
        reference_c: f32,
    ) -> Result<CalPoint, CalibrationError> {
        match self {
            SensorModel::Thermocouple(tc) => {
                if !tc.tc.is_primed() || !tc.cold_junction.is_primed() {
                    return Err(CalibrationError::NotCaptured);
                }
                let mv = tc.tc_mv(tc.tc.average());
                let cj = tc.cj_temperature_c(tc.cold_junction.average());
                check_range("thermocouple millivolts", mv, TC_MV_RANGE)?;
                check_range("cold-junction temperature", cj, CJ_C_RANGE)?;
                let point = CalPoint {
                    measured: mv,
                    temperature_c: reference_c - cj,
                };
                tc.table.set_anchor(index, point)?;
                Ok(point)
            }
            SensorModel::Ntc(t) | SensorModel::Ptc(t) => {
                if !t.sense.is_primed() {
                    return Err(CalibrationError::NotCaptured);
                }
                let ohms = t.ohms(t.sense.average());
                check_range("sense resistance", ohms, OHM_RANGE)?;
                let point = CalPoint {
                    measured: ohms,
                    temperature_c: reference_c,
                };
                t.table.set_anchor(index, point)?;
                Ok(point)
            }
            SensorModel::Dummy => Err(CalibrationError::NoTable),
        }
    }

    /// Load a full set of anchors into the interpolation table.
    pub fn set_calibration_values(
        &mut self,
        anchors: [CalPoint; ANCHOR_COUNT],
    ) -> Result<(), CalibrationError> {
        let table = CalTable::new(anchors)?;
        match self {
            SensorModel::Thermocouple(tc) => tc.table = table,
            SensorModel::Ntc(t) | SensorModel::Ptc(t) => t.table = table,
            SensorModel::Dummy => return Err(CalibrationError::NoTable),
        }
        Ok(())
    }

    /// Current calibration anchors, if the sensor has a table.
    pub fn calibration_values(&self) -> Option<[CalPoint; ANCHOR_COUNT]> {
        match self {
            SensorModel::Thermocouple(tc) => Some(*tc.table.anchors()),
            SensorModel::Ntc(t) | SensorModel::Ptc(t) => Some(*t.table.anchors()),
            SensorModel::Dummy => None,
        }
    }

    /// Drop accumulated samples, e.g. after a tip change.
    pub fn reset(&mut self) {
        match self {
            SensorModel::Thermocouple(tc) => {
                tc.tc.reset();
                tc.cold_junction.reset();
            }
            SensorModel::Ntc(t) | SensorModel::Ptc(t) => t.sense.reset(),
            SensorModel::Dummy => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tc_table() -> CalTable {
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

    fn mv_to_counts(mv: f32) -> i32 {
        (mv * GAIN_BOOST_FACTOR / VREF_MV * ADC_MAX as f32).round() as i32
    }

    fn cj_counts(temp_c: f32) -> i32 {
        ((temp_c * CJ_MV_PER_C + CJ_OFFSET_MV) / VREF_MV * ADC_MAX as f32).round() as i32
    }

    #[test]
    fn thermocouple_adds_cold_junction_after_interpolation() {
        let mut sensor = SensorModel::thermocouple(ChannelId::One, tc_table());
        let seq = sensor.measurement_sequence();
        assert_eq!(seq.len(), 2);
        sensor.accumulate(seq[0], mv_to_counts(5.81));
        sensor.accumulate(seq[1], cj_counts(25.0));
        let t = sensor.temperature_c();
        // table says 296.06 at 5.81 mV; cold junction adds ~25 °C
        assert!((t - 321.06).abs() < 3.0, "got {t}");
    }

    #[test]
    fn tip_absent_when_sense_path_saturates() {
        let mut sensor = SensorModel::thermocouple(ChannelId::One, tc_table());
        assert!(sensor.tip_present());
        let seq = sensor.measurement_sequence();
        sensor.accumulate(seq[1], ADC_MAX);
        assert!(!sensor.tip_present());
    }

    #[test]
    fn calibration_round_trip_reproduces_anchor() {
        let mut sensor = SensorModel::thermocouple(ChannelId::One, tc_table());
        let seq = sensor.measurement_sequence();
        sensor.accumulate(seq[0], mv_to_counts(5.2));
        sensor.accumulate(seq[1], cj_counts(24.0));
        let reference_c = 260.0;
        let point = sensor.save_calibration_point(1, reference_c).unwrap();

        let mut anchors = sensor.calibration_values().unwrap();
        anchors[1] = point;
        sensor.set_calibration_values(anchors).unwrap();
        // With the same readings still accumulated, the model reports
        // the reference temperature at the anchor within tolerance.
        assert!((sensor.temperature_c() - reference_c).abs() < 1.0);
    }

    #[test]
    fn implausible_capture_is_rejected_and_mutates_nothing() {
        let mut sensor = SensorModel::thermocouple(ChannelId::One, tc_table());
        let before = sensor.calibration_values().unwrap();
        let seq = sensor.measurement_sequence();
        // Saturated thermocouple path: way outside the millivolt range.
        sensor.accumulate(seq[0], ADC_MAX);
        sensor.accumulate(seq[1], cj_counts(25.0));
        let err = sensor.save_calibration_point(2, 400.0).unwrap_err();
        assert!(matches!(err, CalibrationError::OutOfRange { .. }));
        assert_eq!(sensor.calibration_values().unwrap(), before);
    }

    #[test]
    fn capture_without_samples_reports_not_captured() {
        let mut sensor = SensorModel::ntc(
            ChannelId::Two,
            CalTable::new([
                CalPoint {
                    measured: 100.0,
                    temperature_c: 300.0,
                },
                CalPoint {
                    measured: 1000.0,
                    temperature_c: 150.0,
                },
                CalPoint {
                    measured: 10_000.0,
                    temperature_c: 25.0,
                },
            ])
            .unwrap(),
        );
        assert_eq!(
            sensor.save_calibration_point(0, 300.0).unwrap_err(),
            CalibrationError::NotCaptured
        );
    }

    #[test]
    fn dummy_sensor_has_no_sequence_and_no_tip() {
        let sensor = SensorModel::Dummy;
        assert!(sensor.measurement_sequence().is_empty());
        assert!(!sensor.tip_present());
        assert_eq!(sensor.temperature_c(), 0.0);
    }
}
