#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and calibration parsing for the soldering station.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Calibration CSV loader enforces headers and condenses a reference
//!   measurement sweep into the three interpolation anchors the core
//!   uses.
//! - `tipstore` persists per-tip calibration tables as TOML files.

use serde::{Deserialize, Serialize};

pub mod tipstore;

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PolicyCfg {
    /// Both channels measured every half-cycle.
    #[default]
    Interleave,
    /// One channel per half-cycle, alternating.
    Alternate,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StationCfg {
    /// Mains grid frequency in Hz; one control cycle per half-wave.
    pub mains_hz: u32,
    pub policy: PolicyCfg,
    /// Display refresh interval in cycles.
    pub refresh_every: u32,
    /// Telemetry report interval in cycles.
    pub report_every: u32,
}

impl Default for StationCfg {
    fn default() -> Self {
        Self {
            mains_hz: 50,
            policy: PolicyCfg::Interleave,
            refresh_every: 25,
            report_every: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct TimingCfg {
    /// Mux settle when the analog configuration is unchanged (us).
    pub settle_plain_us: u64,
    /// Settle after enabling the thermistor bias source (us).
    pub settle_bias_us: u64,
    /// Settle after switching in the gain-boost amplifier (us).
    pub settle_gain_us: u64,
    /// Recovery settle for the first conversion after heater drive-off (us).
    pub settle_first_us: u64,
    pub conversion_timeout_ms: u64,
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self {
            settle_plain_us: 50,
            settle_bias_us: 300,
            settle_gain_us: 500,
            settle_first_us: 750,
            conversion_timeout_ms: 2,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct PidCfg {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub i_limit: f32,
}

impl Default for PidCfg {
    fn default() -> Self {
        Self {
            kp: 8.0,
            ki: 0.4,
            kd: 0.0,
            i_limit: 60.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SensorKindCfg {
    #[default]
    Thermocouple,
    Ntc,
    Ptc,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ControlKindCfg {
    #[default]
    Pid,
    Tbh,
    BangBang,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ChannelCfg {
    pub sensor: SensorKindCfg,
    pub control: ControlKindCfg,
    /// Name of the calibration table in the tip store; a missing or
    /// unknown tip leaves the channel without a usable sensor.
    pub tip: Option<String>,
    /// Three user presets in °C.
    pub presets: [i32; 3],
    /// Per-channel PID override; gains stored with a tuned tip take
    /// precedence, then this, then `[pid]`.
    pub pid: Option<PidCfg>,
    /// Integrator gain for the take-back-half law.
    pub tbh_ki: f32,
}

impl Default for ChannelCfg {
    fn default() -> Self {
        Self {
            sensor: SensorKindCfg::Thermocouple,
            control: ControlKindCfg::Pid,
            tip: None,
            presets: [300, 350, 400],
            pid: None,
            tbh_ki: 40.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct IdleCfg {
    /// Degrees subtracted from the target while backing off.
    pub setback_c: i32,
    pub setback_after_ms: u64,
    pub standby_after_ms: u64,
}

impl Default for IdleCfg {
    fn default() -> Self {
        Self {
            setback_c: 100,
            setback_after_ms: 120_000,
            standby_after_ms: 600_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct SafetyCfg {
    /// Consecutive asserted comparator polls required to latch.
    pub overcurrent_debounce_n: u8,
}

impl Default for SafetyCfg {
    fn default() -> Self {
        Self {
            overcurrent_debounce_n: 2,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub station: StationCfg,
    pub timing: TimingCfg,
    pub pid: PidCfg,
    /// Exactly two entries, `[[channel]]` tables in order.
    pub channel: Vec<ChannelCfg>,
    pub idle: IdleCfg,
    pub safety: SafetyCfg,
    pub logging: Logging,
    /// Directory holding per-tip calibration TOML files.
    pub tip_store: Option<String>,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Station
        if !(40..=70).contains(&self.station.mains_hz) {
            eyre::bail!("station.mains_hz must be in [40, 70]");
        }
        if self.station.refresh_every == 0 {
            eyre::bail!("station.refresh_every must be >= 1");
        }
        if self.station.report_every == 0 {
            eyre::bail!("station.report_every must be >= 1");
        }

        // Channels
        if self.channel.len() > 2 {
            eyre::bail!("at most two [[channel]] tables are supported");
        }
        for (i, ch) in self.channel.iter().enumerate() {
            for p in ch.presets {
                if !(100..=450).contains(&p) {
                    eyre::bail!("channel {} preset {p} outside [100, 450]", i + 1);
                }
            }
            if ch.control == ControlKindCfg::Tbh && ch.tbh_ki <= 0.0 {
                eyre::bail!("channel {} tbh_ki must be > 0", i + 1);
            }
        }

        // PID
        for pid in std::iter::once(&self.pid).chain(self.channel.iter().filter_map(|c| c.pid.as_ref()))
        {
            if pid.kp < 0.0 || pid.ki < 0.0 || pid.kd < 0.0 {
                eyre::bail!("pid gains must be >= 0");
            }
            if pid.i_limit <= 0.0 {
                eyre::bail!("pid.i_limit must be > 0");
            }
        }

        // Timing
        if self.timing.conversion_timeout_ms == 0 {
            eyre::bail!("timing.conversion_timeout_ms must be >= 1");
        }
        if self.timing.settle_gain_us > 50_000
            || self.timing.settle_bias_us > 50_000
            || self.timing.settle_plain_us > 50_000
            || self.timing.settle_first_us > 50_000
        {
            eyre::bail!("timing.settle_*_us is unreasonably large (>50ms)");
        }
        if self.timing.settle_first_us < self.timing.settle_gain_us {
            eyre::bail!("timing.settle_first_us must cover the slowest path (>= settle_gain_us)");
        }

        // Idle
        if self.idle.setback_c < 0 {
            eyre::bail!("idle.setback_c must be >= 0");
        }
        if self.idle.standby_after_ms != 0
            && self.idle.standby_after_ms <= self.idle.setback_after_ms
        {
            eyre::bail!("idle.standby_after_ms must exceed idle.setback_after_ms");
        }

        // Safety
        if self.safety.overcurrent_debounce_n == 0 {
            eyre::bail!("safety.overcurrent_debounce_n must be >= 1");
        }

        Ok(())
    }
}

/// Calibration CSV schema.
///
/// Expected headers:
/// measured,temperature
///
/// `measured` is in the sensor's native unit: millivolts for
/// thermocouples, ohms for thermistors.
///
/// Example:
/// measured,temperature
/// 4.64,221.77
/// 5.81,296.06
/// 6.64,369.61
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct CalibrationRow {
    pub measured: f32,
    pub temperature: f32,
}

/// One interpolation anchor, as consumed by the core.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalAnchor {
    pub measured: f32,
    pub temperature_c: f32,
}

/// Condense a reference sweep into the three anchors used by the
/// piecewise-linear table: first, median and last row after sorting by
/// measured value. Exactly three rows pass through unchanged.
pub fn anchors_from_rows(mut rows: Vec<CalibrationRow>) -> eyre::Result<[CalAnchor; 3]> {
    if rows.len() < 3 {
        eyre::bail!("calibration requires at least three rows, got {}", rows.len());
    }
    for row in &rows {
        if !row.measured.is_finite() || !row.temperature.is_finite() {
            eyre::bail!("calibration rows must be finite");
        }
    }
    rows.sort_by(|a, b| a.measured.total_cmp(&b.measured));
    for pair in rows.windows(2) {
        if pair[1].measured <= pair[0].measured {
            eyre::bail!(
                "calibration measured values must be strictly increasing after sort (duplicate {})",
                pair[0].measured
            );
        }
    }
    let pick = |r: &CalibrationRow| CalAnchor {
        measured: r.measured,
        temperature_c: r.temperature,
    };
    Ok([
        pick(&rows[0]),
        pick(&rows[rows.len() / 2]),
        pick(&rows[rows.len() - 1]),
    ])
}

pub fn load_calibration_csv(path: &std::path::Path) -> eyre::Result<[CalAnchor; 3]> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["measured", "temperature"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "calibration CSV must have headers 'measured,temperature', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }

    anchors_from_rows(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[test]
    fn minimal_toml_gets_defaults() {
        let cfg = load_toml("").unwrap();
        assert_eq!(cfg.station.mains_hz, 50);
        assert_eq!(cfg.timing.conversion_timeout_ms, 2);
        assert!(cfg.channel.is_empty());
        cfg.validate().unwrap();
    }

    #[test]
    fn full_toml_round_trips() {
        let cfg = load_toml(
            r#"
            [station]
            mains_hz = 60
            policy = "alternate"

            [pid]
            kp = 10.0
            ki = 0.2
            kd = 0.0
            i_limit = 50.0

            [[channel]]
            sensor = "thermocouple"
            control = "pid"
            tip = "t245"
            presets = [280, 320, 380]

            [[channel]]
            sensor = "ntc"
            control = "bangbang"

            [idle]
            setback_c = 50
            setback_after_ms = 60000
            standby_after_ms = 300000
            "#,
        )
        .unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.station.policy, PolicyCfg::Alternate);
        assert_eq!(cfg.channel.len(), 2);
        assert_eq!(cfg.channel[0].tip.as_deref(), Some("t245"));
        assert_eq!(cfg.channel[1].sensor, SensorKindCfg::Ntc);
    }

    #[rstest]
    #[case("[station]\nmains_hz = 400\n", "mains_hz")]
    #[case("[[channel]]\npresets = [50, 350, 400]\n", "preset")]
    #[case("[pid]\ni_limit = 0.0\n", "i_limit")]
    #[case("[timing]\nsettle_first_us = 100\n", "settle_first_us")]
    #[case(
        "[idle]\nsetback_after_ms = 1000\nstandby_after_ms = 500\n",
        "standby_after_ms"
    )]
    fn invalid_configs_are_rejected(#[case] toml: &str, #[case] needle: &str) {
        let cfg = load_toml(toml).unwrap();
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains(needle), "{err}");
    }

    #[test]
    fn csv_sweep_condenses_to_three_anchors() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "measured,temperature").unwrap();
        for (m, t) in [(6.64, 369.61), (4.64, 221.77), (5.2, 260.0), (5.81, 296.06), (6.1, 320.0)]
        {
            writeln!(f, "{m},{t}").unwrap();
        }
        let anchors = load_calibration_csv(f.path()).unwrap();
        assert_eq!(anchors[0].measured, 4.64);
        assert_eq!(anchors[1].measured, 5.81);
        assert_eq!(anchors[2].measured, 6.64);
    }

    #[test]
    fn csv_with_wrong_headers_is_rejected() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "mv,degc").unwrap();
        writeln!(f, "4.64,221.77").unwrap();
        let err = load_calibration_csv(f.path()).unwrap_err().to_string();
        assert!(err.contains("measured,temperature"), "{err}");
    }

    #[test]
    fn duplicate_measured_values_are_rejected() {
        let rows = vec![
            CalibrationRow {
                measured: 4.64,
                temperature: 221.77,
            },
            CalibrationRow {
                measured: 4.64,
                temperature: 225.0,
            },
            CalibrationRow {
                measured: 6.64,
                temperature: 369.61,
            },
        ];
        assert!(anchors_from_rows(rows).is_err());
    }
}
