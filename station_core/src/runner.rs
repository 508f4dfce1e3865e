//! Top-level control loop: block on zero-crossing edges and run one
//! scheduler cycle per edge, with a software stall watchdog on the
//! edge source itself.

use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;

use station_traits::clock::Clock;
use station_traits::{FrontEnd, HeaterDrive, Watchdog};

use crate::error::{AbortReason, Result, StationError};
use crate::mains::{MainsSync, half_cycle_ms};
use crate::safety::watchdog_budget_ms;
use crate::scheduler::{CycleOutcome, Scheduler};

/// Counters accumulated over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub cycles_completed: u64,
    pub cycles_ignored: u64,
    pub overload_trips: u64,
}

/// Drive the scheduler from a mains edge source until `max_cycles`
/// completed cycles (forever when `None`), a shutdown request, or a
/// stall of the edge source.
///
/// The stall budget is slightly over one control cycle: a single
/// missing edge aborts the run with the heaters forced safe first,
/// mirroring what the hardware watchdog would do on the real board.
pub fn run<F, H, W, C>(
    scheduler: &mut Scheduler<F, H, W, C>,
    edges: &MainsSync,
    mains_hz: u32,
    conversion_timeout_ms: u64,
    max_cycles: Option<u64>,
    shutdown_check: Option<Box<dyn Fn() -> bool + Send + Sync>>,
) -> Result<RunReport>
where
    F: FrontEnd,
    H: HeaterDrive,
    W: Watchdog,
    C: Clock,
{
    let half_ms = half_cycle_ms(mains_hz);
    let budget = Duration::from_millis(watchdog_budget_ms(half_ms, conversion_timeout_ms));
    let mut report = RunReport::default();

    tracing::info!(mains_hz, budget_ms = budget.as_millis() as u64, "control loop start");

    loop {
        if let Some(check) = &shutdown_check
            && check()
        {
            scheduler.force_safe();
            tracing::info!(?report, "shutdown requested");
            return Err(crate::error::Report::new(StationError::Abort(
                AbortReason::Shutdown,
            )));
        }

        match edges.recv_edge(budget) {
            Ok(edge) => {
                match scheduler.run_cycle(edge, half_ms)? {
                    CycleOutcome::Completed => report.cycles_completed += 1,
                    CycleOutcome::Ignored => report.cycles_ignored += 1,
                    CycleOutcome::OverloadTripped => {
                        report.overload_trips += 1;
                        tracing::error!(edge, "overcurrent trip, channels latched in overload");
                    }
                }
                if scheduler.take_report() {
                    log_status(scheduler);
                }
                if let Some(max) = max_cycles
                    && report.cycles_completed >= max
                {
                    scheduler.force_safe();
                    tracing::info!(?report, "cycle budget reached");
                    return Ok(report);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                // The edge source went quiet for more than one cycle
                // plus margin. Outputs go safe before anything else.
                scheduler.force_safe();
                tracing::error!(
                    stalled_ms = edges.stalled_for_now(),
                    "zero-crossing edges stalled"
                );
                return Err(crate::error::Report::new(StationError::Abort(
                    AbortReason::WatchdogStall,
                )));
            }
            Err(RecvTimeoutError::Disconnected) => {
                scheduler.force_safe();
                return Err(crate::error::Report::new(StationError::State(
                    "edge source disconnected".into(),
                )));
            }
        }
    }
}

fn log_status<F, H, W, C>(scheduler: &Scheduler<F, H, W, C>)
where
    F: FrontEnd,
    H: HeaterDrive,
    W: Watchdog,
    C: Clock,
{
    for id in crate::channel::ChannelId::ALL {
        let ch = scheduler.channel(id);
        tracing::info!(
            channel = %id,
            state = ?ch.state(),
            temperature_c = ch.current_temperature_c(),
            target_c = ch.target_temperature_c(),
            duty = ch.duty(),
            "channel status"
        );
    }
}
