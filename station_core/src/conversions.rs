//! `From` implementations bridging `station_config` types to
//! `station_core` types.
//!
//! These eliminate manual field-by-field mapping in the CLI.

use crate::calibration::{CalPoint, CalTable};
use crate::channel::IdlePolicy;
use crate::controller::PidGains;
use crate::error::CalibrationError;
use crate::scheduler::{SamplePolicy, TimingCfg};

// ── TimingCfg ────────────────────────────────────────────────────────────────

impl From<&station_config::TimingCfg> for TimingCfg {
    fn from(c: &station_config::TimingCfg) -> Self {
        Self {
            settle_plain_us: c.settle_plain_us,
            settle_bias_us: c.settle_bias_us,
            settle_gain_us: c.settle_gain_us,
            settle_first_us: c.settle_first_us,
            conversion_timeout_ms: c.conversion_timeout_ms,
        }
    }
}

// ── SamplePolicy ─────────────────────────────────────────────────────────────

impl From<station_config::PolicyCfg> for SamplePolicy {
    fn from(c: station_config::PolicyCfg) -> Self {
        match c {
            station_config::PolicyCfg::Interleave => SamplePolicy::Interleave,
            station_config::PolicyCfg::Alternate => SamplePolicy::Alternate,
        }
    }
}

// ── IdlePolicy ───────────────────────────────────────────────────────────────

impl From<&station_config::IdleCfg> for IdlePolicy {
    fn from(c: &station_config::IdleCfg) -> Self {
        Self {
            setback_c: c.setback_c,
            setback_after_ms: c.setback_after_ms,
            standby_after_ms: c.standby_after_ms,
        }
    }
}

// ── PidGains ─────────────────────────────────────────────────────────────────

impl From<&station_config::PidCfg> for PidGains {
    fn from(c: &station_config::PidCfg) -> Self {
        Self {
            kp: c.kp,
            ki: c.ki,
            kd: c.kd,
            i_limit: c.i_limit,
        }
    }
}

// ── Calibration anchors ──────────────────────────────────────────────────────

impl From<&station_config::CalAnchor> for CalPoint {
    fn from(a: &station_config::CalAnchor) -> Self {
        Self {
            measured: a.measured,
            temperature_c: a.temperature_c,
        }
    }
}

impl TryFrom<&[station_config::CalAnchor; 3]> for CalTable {
    type Error = CalibrationError;

    fn try_from(anchors: &[station_config::CalAnchor; 3]) -> Result<Self, Self::Error> {
        CalTable::new([
            CalPoint::from(&anchors[0]),
            CalPoint::from(&anchors[1]),
            CalPoint::from(&anchors[2]),
        ])
    }
}
