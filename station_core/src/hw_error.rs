//! Mapping of hardware-layer errors into the core error type.

use crate::error::StationError;

/// Map a boxed hardware error to a typed `StationError`.
///
/// Attempts to downcast known hardware error types first, then falls
/// back to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> StationError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<station_hardware::error::HwError>() {
            return match hw {
                station_hardware::error::HwError::Timeout => StationError::Timeout,
                station_hardware::error::HwError::ConversionTimeout => StationError::Timeout,
                other => StationError::HardwareFault(other.to_string()),
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        StationError::Timeout
    } else {
        StationError::Hardware(s)
    }
}
