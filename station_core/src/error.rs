use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum StationError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("timeout waiting for conversion")]
    Timeout,
    #[error("invalid state: {0}")]
    State(String),
    #[error("aborted: {0}")]
    Abort(AbortReason),
}

/// Reasons the control loop gives up on a run. Each maps to a stable
/// CLI exit code.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    #[error("overcurrent trip")]
    Overcurrent,
    #[error("zero-crossing events stalled beyond the watchdog budget")]
    WatchdogStall,
    #[error("shutdown requested")]
    Shutdown,
}

/// Failures of a calibration session. Surfaced as values to the UI
/// layer; a rejected capture mutates nothing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("{quantity} {value} outside plausible range {min}..{max}")]
    OutOfRange {
        quantity: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    #[error("no sample accumulated yet")]
    NotCaptured,
    #[error("calibration anchor index {0} out of bounds")]
    BadIndex(usize),
    #[error("calibration anchors must strictly increase in measured value")]
    NotMonotonic,
    #[error("sensor has no calibration table")]
    NoTable,
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing analog front-end")]
    MissingFrontEnd,
    #[error("missing heater drives")]
    MissingHeaters,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
