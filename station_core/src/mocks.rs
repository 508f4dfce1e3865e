//! Test and helper mocks for station_core

use std::time::Duration;

/// A front-end that always reports mid-scale conversions; useful for
/// exercising the scheduler without hardware or a simulator.
pub struct NoopFrontEnd;

impl station_traits::FrontEnd for NoopFrontEnd {
    fn select(&mut self, _tag_bits: u8) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }

    fn start_conversion(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }

    fn read_result(
        &mut self,
        _timeout: Duration,
    ) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        Ok(crate::sensor::ADC_MAX / 2)
    }
}

/// A heater that swallows every command.
pub struct NullHeater;

impl station_traits::HeaterDrive for NullHeater {
    fn set_duty(&mut self, _percent: u8) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }

    fn force_off(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

/// A watchdog that never bites.
pub struct NoopWatchdog;

impl station_traits::Watchdog for NoopWatchdog {
    fn feed(&mut self) {}
}
