//! Builder for the acquisition scheduler.
//!
//! The front-end and the heater pair are mandatory and tracked through
//! type-state markers, so `build()` only exists once both have been
//! provided; `try_build()` is available in any state and reports what
//! is missing. Everything else has a default.

use std::marker::PhantomData;

use station_traits::clock::{Clock, MonotonicClock};
use station_traits::{FrontEnd, HeaterDrive, Watchdog};

use crate::channel::{Channel, ChannelId, IdlePolicy};
use crate::controller::Controller;
use crate::error::{BuildError, Result};
use crate::mocks::NoopWatchdog;
use crate::safety::OvercurrentGuard;
use crate::scheduler::{HolderCheck, SamplePolicy, Scheduler, TimingCfg};
use crate::sensor::SensorModel;

// Type-state markers for the builder
pub struct Missing;
pub struct Set;

/// Scheduler with all seams boxed, as produced by the builder.
pub type BoxedScheduler = Scheduler<
    Box<dyn FrontEnd>,
    Box<dyn HeaterDrive>,
    Box<dyn Watchdog>,
    Box<dyn Clock + Send + Sync>,
>;

pub struct StationBuilder<F, H> {
    front_end: Option<Box<dyn FrontEnd>>,
    heaters: Option<[Box<dyn HeaterDrive>; 2]>,
    watchdog: Option<Box<dyn Watchdog>>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    channels: Option<[Channel; 2]>,
    overcurrent_check: Option<Box<dyn Fn() -> bool + Send + 'static>>,
    overcurrent_debounce_n: Option<u8>,
    holder_check: Option<HolderCheck>,
    policy: Option<SamplePolicy>,
    timing: Option<TimingCfg>,
    mains_hz: Option<u32>,
    refresh_every: Option<u32>,
    report_every: Option<u32>,
    // Type-state markers
    _f: PhantomData<F>,
    _h: PhantomData<H>,
}

impl Default for StationBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            front_end: None,
            heaters: None,
            watchdog: None,
            clock: None,
            channels: None,
            overcurrent_check: None,
            overcurrent_debounce_n: None,
            holder_check: None,
            policy: None,
            timing: None,
            mains_hz: None,
            refresh_every: None,
            report_every: None,
            _f: PhantomData,
            _h: PhantomData,
        }
    }
}

impl StationBuilder<Missing, Missing> {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Chainable setters that do not affect type-state
impl<F, H> StationBuilder<F, H> {
    pub fn with_watchdog(mut self, watchdog: impl Watchdog + 'static) -> Self {
        self.watchdog = Some(Box::new(watchdog));
        self
    }

    /// Provide a custom clock implementation; defaults to MonotonicClock.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_channels(mut self, channels: [Channel; 2]) -> Self {
        self.channels = Some(channels);
        self
    }

    pub fn with_overcurrent_check<G>(mut self, check: G) -> Self
    where
        G: Fn() -> bool + Send + 'static,
    {
        self.overcurrent_check = Some(Box::new(check));
        self
    }

    pub fn with_overcurrent_debounce(mut self, n: u8) -> Self {
        self.overcurrent_debounce_n = Some(n.max(1));
        self
    }

    pub fn with_holder_check<G>(mut self, check: G) -> Self
    where
        G: Fn(ChannelId) -> bool + Send + 'static,
    {
        self.holder_check = Some(Box::new(check));
        self
    }

    pub fn with_policy(mut self, policy: SamplePolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_timing(mut self, timing: TimingCfg) -> Self {
        self.timing = Some(timing);
        self
    }

    pub fn with_mains_hz(mut self, hz: u32) -> Self {
        self.mains_hz = Some(hz);
        self
    }

    pub fn with_refresh_every(mut self, cycles: u32) -> Self {
        self.refresh_every = Some(cycles);
        self
    }

    pub fn with_report_every(mut self, cycles: u32) -> Self {
        self.report_every = Some(cycles);
        self
    }

    /// Fallible build available in any type-state; returns a detailed
    /// BuildError for missing pieces.
    pub fn try_build(self) -> Result<BoxedScheduler> {
        let StationBuilder {
            front_end,
            heaters,
            watchdog,
            clock,
            channels,
            overcurrent_check,
            overcurrent_debounce_n,
            holder_check,
            policy,
            timing,
            mains_hz,
            refresh_every,
            report_every,
            _f: _,
            _h: _,
        } = self;

        let front_end = front_end.ok_or_else(|| eyre::Report::new(BuildError::MissingFrontEnd))?;
        let heaters = heaters.ok_or_else(|| eyre::Report::new(BuildError::MissingHeaters))?;

        let watchdog = watchdog.unwrap_or_else(|| Box::new(NoopWatchdog));
        let clock: Box<dyn Clock + Send + Sync> = match clock {
            Some(c) => c,
            None => Box::new(MonotonicClock::new()),
        };
        let channels = match channels {
            Some(c) => c,
            None => default_channels(),
        };
        let guard = match overcurrent_check {
            Some(check) => OvercurrentGuard::new(check, overcurrent_debounce_n.unwrap_or(2)),
            None => OvercurrentGuard::disabled(),
        };
        let policy = policy.unwrap_or_default();
        let timing = timing.unwrap_or_default();
        let mains_hz = mains_hz.unwrap_or(50);
        let refresh_every = refresh_every.unwrap_or(25);
        let report_every = report_every.unwrap_or(100);

        build_scheduler(
            front_end,
            heaters,
            watchdog,
            clock,
            channels,
            guard,
            holder_check,
            policy,
            timing,
            mains_hz,
            refresh_every,
            report_every,
        )
    }
}

// Setters that advance type-state when providing mandatory components
impl<H> StationBuilder<Missing, H> {
    pub fn with_front_end(self, front_end: impl FrontEnd + 'static) -> StationBuilder<Set, H> {
        let StationBuilder {
            front_end: _,
            heaters,
            watchdog,
            clock,
            channels,
            overcurrent_check,
            overcurrent_debounce_n,
            holder_check,
            policy,
            timing,
            mains_hz,
            refresh_every,
            report_every,
            _f: _,
            _h: _,
        } = self;
        StationBuilder {
            front_end: Some(Box::new(front_end)),
            heaters,
            watchdog,
            clock,
            channels,
            overcurrent_check,
            overcurrent_debounce_n,
            holder_check,
            policy,
            timing,
            mains_hz,
            refresh_every,
            report_every,
            _f: PhantomData,
            _h: PhantomData,
        }
    }
}

impl<F> StationBuilder<F, Missing> {
    pub fn with_heaters(
        self,
        one: impl HeaterDrive + 'static,
        two: impl HeaterDrive + 'static,
    ) -> StationBuilder<F, Set> {
        let StationBuilder {
            front_end,
            heaters: _,
            watchdog,
            clock,
            channels,
            overcurrent_check,
            overcurrent_debounce_n,
            holder_check,
            policy,
            timing,
            mains_hz,
            refresh_every,
            report_every,
            _f: _,
            _h: _,
        } = self;
        StationBuilder {
            front_end,
            heaters: Some([Box::new(one), Box::new(two)]),
            watchdog,
            clock,
            channels,
            overcurrent_check,
            overcurrent_debounce_n,
            holder_check,
            policy,
            timing,
            mains_hz,
            refresh_every,
            report_every,
            _f: PhantomData,
            _h: PhantomData,
        }
    }
}

impl StationBuilder<Set, Set> {
    /// Infallible-by-construction build: both mandatory components are
    /// present at the type level; only config validation can fail.
    pub fn build(self) -> Result<BoxedScheduler> {
        self.try_build()
    }
}

/// Channels with no tip configured; they park in `NoTip` on enable.
fn default_channels() -> [Channel; 2] {
    ChannelId::ALL.map(|id| {
        Channel::new(
            id,
            SensorModel::Dummy,
            Controller::bang_bang(id),
            [300, 350, 400],
            IdlePolicy::default(),
        )
    })
}

/// Validate the shared configuration and assemble a scheduler with
/// static dispatch. The type-state builder funnels into this with
/// boxed components.
#[allow(clippy::too_many_arguments)]
pub fn build_scheduler<F, H, W, C>(
    front_end: F,
    heaters: [H; 2],
    watchdog: W,
    clock: C,
    channels: [Channel; 2],
    guard: OvercurrentGuard,
    holder_check: Option<HolderCheck>,
    policy: SamplePolicy,
    timing: TimingCfg,
    mains_hz: u32,
    refresh_every: u32,
    report_every: u32,
) -> Result<Scheduler<F, H, W, C>>
where
    F: FrontEnd,
    H: HeaterDrive,
    W: Watchdog,
    C: Clock,
{
    if !(40..=70).contains(&mains_hz) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "mains_hz must be in 40..=70",
        )));
    }
    if timing.conversion_timeout_ms == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "conversion_timeout_ms must be >= 1",
        )));
    }
    if refresh_every == 0 || report_every == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "refresh/report intervals must be >= 1",
        )));
    }

    Ok(Scheduler::new(
        front_end,
        heaters,
        watchdog,
        clock,
        channels,
        guard,
        holder_check,
        policy,
        timing,
        refresh_every,
        report_every,
    ))
}
