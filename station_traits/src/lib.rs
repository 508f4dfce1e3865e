pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Analog front-end of one acquisition board.
///
/// The front-end multiplexes several sense paths (per channel, sub-path,
/// bias current, gain boost) behind a single converter. The scheduler
/// programs a mux-select code, waits out the settling delay, starts a
/// conversion and later collects the result. `read_result` blocks until
/// the conversion finishes or the timeout expires; results always belong
/// to the most recently started conversion.
pub trait FrontEnd {
    /// Program the mux/bias/gain lines for a measurement tag (raw bits).
    fn select(&mut self, tag_bits: u8) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Kick off a conversion under the currently selected configuration.
    fn start_conversion(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Wait for the pending conversion and return its raw counts.
    fn read_result(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<i32, Box<dyn std::error::Error + Send + Sync>>;
}

/// Duty-cycle controlled heater switch for one channel.
pub trait HeaterDrive {
    /// Set the drive duty cycle in percent (0..=100).
    fn set_duty(&mut self, percent: u8) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Force the output into a non-drivable state immediately.
    fn force_off(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Hardware watchdog. Must be fed at least once per control cycle.
pub trait Watchdog {
    fn feed(&mut self);
}

impl<T: FrontEnd + ?Sized> FrontEnd for Box<T> {
    fn select(&mut self, tag_bits: u8) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).select(tag_bits)
    }
    fn start_conversion(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).start_conversion()
    }
    fn read_result(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read_result(timeout)
    }
}

impl<T: HeaterDrive + ?Sized> HeaterDrive for Box<T> {
    fn set_duty(&mut self, percent: u8) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set_duty(percent)
    }
    fn force_off(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).force_off()
    }
}

impl<T: Watchdog + ?Sized> Watchdog for Box<T> {
    fn feed(&mut self) {
        (**self).feed()
    }
}
