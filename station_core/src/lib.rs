#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core soldering-station logic (hardware-agnostic).
//!
//! This crate provides the hardware-independent measurement and control
//! engine for a dual-channel station. All hardware interactions go
//! through the `station_traits::FrontEnd`, `station_traits::HeaterDrive`
//! and `station_traits::Watchdog` traits.
//!
//! ## Architecture
//!
//! - **Acquisition**: mains-synchronized cycles walking a sorted tag
//!   sequence through the one-behind conversion pipeline (`scheduler`)
//! - **Measurement**: per-tip sensor models, averaging and 3-anchor
//!   piecewise-linear calibration (`sensor`, `averager`, `calibration`)
//! - **Control**: PID, take-back-half, bang-bang and fixed-power laws
//!   behind one surface (`controller`)
//! - **Channels**: per-channel state machine with the drive policy
//!   (`channel`)
//! - **Safety**: overcurrent latch and watchdog budgets (`safety`)
//!
//! ## Timing
//!
//! One control cycle per mains half-wave. The control interval is
//! `1 / (2 * mains_hz)` seconds and all controller gains are pre-scaled
//! with it at construction.

// Module declarations
pub mod averager;
pub mod builder;
pub mod calibration;
pub mod channel;
pub mod controller;
pub mod conversions;
pub mod error;
pub mod hw_error;
pub mod mains;
pub mod mocks;
pub mod runner;
pub mod safety;
pub mod scheduler;
pub mod sensor;
pub mod tag;

pub use builder::{BoxedScheduler, StationBuilder, build_scheduler};
pub use channel::{Channel, ChannelId, ChannelState, IdlePolicy, MAX_TEMP, MIN_TEMP};
pub use controller::{Controller, PidGains};
pub use error::{AbortReason, BuildError, CalibrationError, StationError};
pub use mains::MainsSync;
pub use runner::{RunReport, run};
pub use safety::OvercurrentGuard;
pub use scheduler::{CycleOutcome, SamplePolicy, Scheduler, TimingCfg};
pub use sensor::{SensorKind, SensorModel};
pub use tag::MeasureTag;

/// Control interval in seconds for a given mains frequency.
#[inline]
pub fn control_interval_s(mains_hz: u32) -> f32 {
    1.0 / (2.0 * mains_hz.max(1) as f32)
}
