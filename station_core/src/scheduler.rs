//! Acquisition scheduler: one measure/control cycle per mains
//! half-cycle.
//!
//! Each cycle forces the heaters off, walks the sorted acquisition
//! sequence through the front-end's one-behind conversion pipeline,
//! then runs every channel's control law and reapplies the heater
//! duties. A cycle that arrives while the previous one is still being
//! processed is ignored rather than queued; the mains delivers the
//! next edge soon enough.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, trace};

use station_traits::clock::Clock;
use station_traits::{FrontEnd, HeaterDrive, Watchdog};

use crate::channel::{Channel, ChannelId};
use crate::error::StationError;
use crate::hw_error::map_hw_error;
use crate::safety::OvercurrentGuard;
use crate::tag::{MeasureTag, sort_sequence};

/// Which channels get measured on a given edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplePolicy {
    /// Both channels every half-cycle.
    #[default]
    Interleave,
    /// One channel per half-cycle, alternating by edge parity.
    Alternate,
}

/// Settling and conversion timing, all front-end specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingCfg {
    /// Mux switch with no analog reconfiguration.
    pub settle_plain_us: u64,
    /// Settle after enabling the thermistor bias source.
    pub settle_bias_us: u64,
    /// Settle after switching in the gain-boost amplifier.
    pub settle_gain_us: u64,
    /// Recovery settle for the first conversion after heater drive-off.
    /// Must cover the slowest analog path.
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed,
    /// Edge arrived while the previous cycle was still in flight.
    Ignored,
    /// Overcurrent latched; all channels were forced to `Overload`.
    OverloadTripped,
}

pub type HolderCheck = Box<dyn Fn(ChannelId) -> bool + Send>;

pub struct Scheduler<F, H, W, C> {
    front_end: F,
    heaters: [H; 2],
    watchdog: W,
    clock: C,
    channels: [Channel; 2],
    guard: OvercurrentGuard,
    holder_check: Option<HolderCheck>,
    policy: SamplePolicy,
    timing: TimingCfg,
    in_flight: AtomicBool,
    cycle: u64,
    refresh_every: u32,
    report_every: u32,
    refresh_pending: bool,
    report_pending: bool,
    last_settle_key: Option<u8>,
}

impl<F, H, W, C> std::fmt::Debug for Scheduler<F, H, W, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").finish_non_exhaustive()
    }
}

impl<F, H, W, C> Scheduler<F, H, W, C>
where
    F: FrontEnd,
    H: HeaterDrive,
    W: Watchdog,
    C: Clock,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        front_end: F,
        heaters: [H; 2],
        watchdog: W,
        clock: C,
        channels: [Channel; 2],
        guard: OvercurrentGuard,
        holder_check: Option<HolderCheck>,
        policy: SamplePolicy,
        timing: TimingCfg,
        refresh_every: u32,
        report_every: u32,
    ) -> Self {
        Self {
            front_end,
            heaters,
            watchdog,
            clock,
            channels,
            guard,
            holder_check,
            policy,
            timing,
            in_flight: AtomicBool::new(false),
            cycle: 0,
            refresh_every: refresh_every.max(1),
            report_every: report_every.max(1),
            refresh_pending: false,
            report_pending: false,
            last_settle_key: None,
        }
    }

    pub fn channel(&self, id: ChannelId) -> &Channel {
        &self.channels[id.index()]
    }

    pub fn channel_mut(&mut self, id: ChannelId) -> &mut Channel {
        &mut self.channels[id.index()]
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle
    }

    /// Re-enable a channel; this also clears the overcurrent latch.
    pub fn enable_channel(&mut self, id: ChannelId) {
        self.guard.reset();
        self.channels[id.index()].enable();
        self.refresh_pending = true;
    }

    pub fn disable_channel(&mut self, id: ChannelId) {
        self.channels[id.index()].disable();
        self.refresh_pending = true;
    }

    /// True once per `refresh_every` cycles, or after a state change
    /// worth redrawing for. Reading clears the flag.
    pub fn take_refresh(&mut self) -> bool {
        std::mem::take(&mut self.refresh_pending)
    }

    /// True once per `report_every` cycles. Reading clears the flag.
    pub fn take_report(&mut self) -> bool {
        std::mem::take(&mut self.report_pending)
    }

    /// Run one full acquisition/control cycle for the given edge.
    pub fn run_cycle(&mut self, edge: u64, elapsed_ms: u64) -> Result<CycleOutcome, StationError> {
        if self.in_flight.swap(true, Ordering::Acquire) {
            trace!(edge, "previous cycle still in flight, edge ignored");
            return Ok(CycleOutcome::Ignored);
        }
        let outcome = self.cycle_body(edge, elapsed_ms);
        if outcome.is_err() {
            // A cycle that died half-way may have already driven a
            // heater. No error path leaves an output energized.
            self.force_safe();
        }
        self.in_flight.store(false, Ordering::Release);
        outcome
    }

    fn cycle_body(&mut self, edge: u64, elapsed_ms: u64) -> Result<CycleOutcome, StationError> {
        self.cycle = self.cycle.wrapping_add(1);

        // Heater switching noise must be out of the measurement window.
        for heater in &mut self.heaters {
            heater.force_off().map_err(|e| map_hw_error(e.as_ref()))?;
        }
        // First sample of a cycle always settles in full: the analog
        // paths need to recover from the heater drive just switched off.
        self.last_settle_key = None;

        if self.guard.poll() {
            self.trip_all();
            return Ok(CycleOutcome::OverloadTripped);
        }

        let sequence = self.build_sequence(edge);
        if sequence.len() > 1 {
            let tripped = self.run_sequence(&sequence)?;
            if tripped {
                self.trip_all();
                return Ok(CycleOutcome::OverloadTripped);
            }
        }

        for i in 0..self.channels.len() {
            let id = self.channels[i].id();
            let in_holder = match &self.holder_check {
                Some(check) => check(id),
                None => false,
            };
            self.channels[i].update_idle(in_holder, elapsed_ms);
            self.channels[i].run_control();
        }
        self.apply_drives()?;

        self.watchdog.feed();

        if self.cycle % u64::from(self.refresh_every) == 0 {
            self.refresh_pending = true;
        }
        if self.cycle % u64::from(self.report_every) == 0 {
            self.report_pending = true;
        }
        Ok(CycleOutcome::Completed)
    }

    /// Tags to measure this edge, sorted for minimal reconfiguration
    /// and terminated by the sentinel.
    fn build_sequence(&self, edge: u64) -> Vec<MeasureTag> {
        let mut sequence = Vec::with_capacity(5);
        for channel in &self.channels {
            let due = match self.policy {
                SamplePolicy::Interleave => true,
                SamplePolicy::Alternate => channel.id().index() as u64 == edge % 2,
            };
            if due {
                sequence.extend(channel.sensor().measurement_sequence());
            }
        }
        sort_sequence(&mut sequence);
        sequence.push(MeasureTag::COMPLETE);
        sequence
    }

    /// Walk the one-behind conversion pipeline. While conversion `n`
    /// runs, the front-end is already reconfigured and settling for
    /// tag `n+1`; each result is routed by the tag that produced it,
    /// one step behind the tag currently selected.
    ///
    /// Returns true if overcurrent latched mid-sequence. The pending
    /// sample is then dropped on the floor; accumulators only ever see
    /// completed, routed conversions.
    fn run_sequence(&mut self, sequence: &[MeasureTag]) -> Result<bool, StationError> {
        let timeout = Duration::from_millis(self.timing.conversion_timeout_ms);

        let first = sequence[0];
        self.front_end
            .select(first.bits())
            .map_err(|e| map_hw_error(e.as_ref()))?;
        self.settle(first);
        self.front_end
            .start_conversion()
            .map_err(|e| map_hw_error(e.as_ref()))?;
        let mut pending = first;

        for &next in &sequence[1..] {
            let raw = self
                .front_end
                .read_result(timeout)
                .map_err(|e| map_hw_error(e.as_ref()))?;
            self.watchdog.feed();

            if self.guard.poll() {
                return Ok(true);
            }

            if next.is_complete() {
                self.route(pending, raw);
                break;
            }

            self.front_end
                .select(next.bits())
                .map_err(|e| map_hw_error(e.as_ref()))?;
            // Routing happens inside the settle window of the next tag.
            self.route(pending, raw);
            self.settle(next);
            self.front_end
                .start_conversion()
                .map_err(|e| map_hw_error(e.as_ref()))?;
            pending = next;
        }
        Ok(false)
    }

    fn route(&mut self, tag: MeasureTag, raw: i32) {
        trace!(tag = tag.bits(), raw, "sample routed");
        self.channels[tag.channel().index()]
            .sensor_mut()
            .accumulate(tag, raw);
    }

    /// Wait out the analog settling time the tag requires. A tag that
    /// keeps the previous {bias, gain-boost} configuration only needs
    /// the short mux settle.
    fn settle(&mut self, tag: MeasureTag) {
        let key = tag.settle_key();
        let us = if self.last_settle_key.is_none() {
            // The analog front end is still recovering from the heater
            // drive that was just switched off, whatever tag leads.
            self.timing.settle_first_us
        } else if self.last_settle_key == Some(key) {
            self.timing.settle_plain_us
        } else if tag.contains(MeasureTag::GAIN_BOOST) {
            self.timing.settle_gain_us
        } else if tag.contains(MeasureTag::BIAS) {
            self.timing.settle_bias_us
        } else {
            self.timing.settle_plain_us
        };
        self.last_settle_key = Some(key);
        self.clock.sleep(Duration::from_micros(us));
    }

    fn trip_all(&mut self) {
        debug!("overcurrent: forcing all channels to overload");
        for channel in &mut self.channels {
            channel.trip_overload();
        }
        for heater in &mut self.heaters {
            // A trip must end with the switches open even if one of
            // them reports a fault on the way down.
            if let Err(e) = heater.force_off() {
                tracing::error!(error = %e, "heater force_off failed on overload");
            }
        }
        self.refresh_pending = true;
    }

    fn apply_drives(&mut self) -> Result<(), StationError> {
        for i in 0..self.channels.len() {
            let duty = self.channels[i].duty();
            let permits = self.channels[i].state().permits_drive();
            let heater = &mut self.heaters[i];
            if permits && duty > 0 {
                heater
                    .set_duty(duty)
                    .map_err(|e| map_hw_error(e.as_ref()))?;
            } else {
                heater.force_off().map_err(|e| map_hw_error(e.as_ref()))?;
            }
        }
        Ok(())
    }

    /// Best-effort: drive both heater outputs into the non-drivable
    /// state. Used on shutdown and right before a watchdog abort.
    pub fn force_safe(&mut self) {
        for heater in &mut self.heaters {
            if let Err(e) = heater.force_off() {
                tracing::error!(error = %e, "heater force_off failed during safe-state entry");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn set_in_flight_for_test(&self, v: bool) {
        self.in_flight.store(v, Ordering::Relaxed);
    }
}
