//! Human-readable error descriptions and structured JSON error formatting.

use crate::cli::LAST_SAFETY;
use crate::run::abort_reason_name;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use station_core::error::{BuildError, StationError};

    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingFrontEnd => {
                "What happened: No analog front-end was provided to the station builder.\nLikely causes: The ADC failed to initialize or was not wired into the builder.\nHow to fix: Ensure the front-end is created successfully and passed via with_front_end(...).".to_string()
            }
            BuildError::MissingHeaters => {
                "What happened: No heater drives were provided to the station builder.\nLikely causes: PWM outputs failed to initialize or were not wired into the builder.\nHow to fix: Ensure both heater drives are created successfully and passed via with_heaters(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See README for a sample."
            ),
        };
    }

    if let Some(se) = err.downcast_ref::<StationError>() {
        // Specific domain cases first
        if matches!(se, StationError::Timeout) {
            return "What happened: An ADC conversion timed out.\nLikely causes: Front-end not responding, wiring/power issues, or timing.conversion_timeout_ms too low.\nHow to fix: Check the analog board connection and consider raising timing.conversion_timeout_ms in the config.".to_string();
        }
        if let StationError::Abort(reason) = se {
            use station_core::error::AbortReason::*;
            return match reason {
                Overcurrent => "What happened: The overcurrent comparator latched and both channels were shut down.\nLikely causes: Shorted heater element, wrong tip cartridge, or a supply fault.\nHow to fix: Power down, inspect the tip and wiring, then re-enable the channel to clear the latch.".to_string(),
                WatchdogStall => "What happened: Zero-crossing events stopped arriving within the watchdog budget.\nLikely causes: Mains sync circuit disconnected, or the edge source thread stalled.\nHow to fix: Check the zero-crossing detector wiring; in simulation this indicates a scheduling stall.".to_string(),
                Shutdown => "What happened: Shutdown was requested (Ctrl-C or signal).\nLikely causes: Operator interrupt.\nHow to fix: Nothing to fix; heaters were forced off before exit.".to_string(),
            };
        }
        // Fallback to generic for other domain errors
        return format!(
            "What happened: {se}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
        );
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("timeout") && (lower.contains("conversion") || lower.contains("adc")) {
        return "What happened: The ADC did not produce a result within the configured timeout.\nLikely causes: Wiring/power issues, or timing.conversion_timeout_ms configured too low.\nHow to fix: Verify the analog board, and raise timing.conversion_timeout_ms.".to_string();
    }

    if lower.contains("invalid configuration") || lower.contains("configuration error") {
        return "What happened: Configuration is invalid or incomplete.\nLikely causes: Out-of-range values ([station] mains_hz, [[channel]] presets, [timing] settle windows, ...).\nHow to fix: Edit the TOML config and try again.".to_string();
    }

    // Calibration CSV header special-case
    if lower.contains("calibration csv must have headers") {
        return "Invalid headers in calibration CSV. Expected 'measured,temperature'.".to_string();
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Map AbortReason (if present) to stable exit codes; non-abort errors return 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    use station_core::error::StationError;
    if let Some(StationError::Abort(reason)) = err.downcast_ref::<StationError>() {
        return match reason {
            station_core::error::AbortReason::Overcurrent => 2,
            station_core::error::AbortReason::WatchdogStall => 3,
            station_core::error::AbortReason::Shutdown => 4,
        };
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;
    use station_core::error::StationError;

    if let Some(StationError::Abort(reason)) = err.downcast_ref::<StationError>() {
        let msg = humanize(err);
        let details = LAST_SAFETY.get();
        let reason_name = abort_reason_name(reason);

        let detail_obj = match reason {
            station_core::error::AbortReason::Overcurrent => {
                details.map(|s| json!({ "overcurrent_debounce_n": s.overcurrent_debounce_n }))
            }
            station_core::error::AbortReason::WatchdogStall => details.map(|s| {
                json!({ "watchdog_budget_ms": s.watchdog_budget_ms, "mains_hz": s.mains_hz })
            }),
            _ => None,
        };

        let obj = if let Some(d) = detail_obj {
            json!({ "reason": reason_name, "details": d, "message": msg })
        } else {
            json!({ "reason": reason_name, "message": msg })
        };
        return obj.to_string();
    }

    // Generic error JSON
    json!({ "reason": "Error", "message": humanize(err) }).to_string()
}
