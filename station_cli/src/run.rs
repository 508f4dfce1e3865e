//! Station assembly: config mapping, simulated board wiring, and run execution.

use crate::cli::{CliSafety, LAST_SAFETY, RtLock};
use crate::rt::setup_rt_once;
use station_config::tipstore::TipStore;
use station_config::{CalAnchor, ChannelCfg, Config, ControlKindCfg, PidCfg, SensorKindCfg};
use station_core::calibration::CalTable;
use station_core::channel::{Channel, ChannelId};
use station_core::controller::Controller;
use station_core::error::Result as CoreResult;
use station_core::mains::{MainsSync, half_cycle_ms};
use station_core::runner::RunReport;
use station_core::safety::watchdog_budget_ms;
use station_core::sensor::SensorModel;
use station_core::{StationBuilder, control_interval_s};
use station_hardware::{SimSensorKind, Simulator};
use station_traits::clock::MonotonicClock;

pub fn abort_reason_name(r: &station_core::error::AbortReason) -> &'static str {
    use station_core::error::AbortReason::*;
    match r {
        Overcurrent => "Overcurrent",
        WatchdogStall => "WatchdogStall",
        Shutdown => "Shutdown",
    }
}

/// Factory anchors used when a channel has no stored tip calibration.
/// Thermocouple anchors are in millivolts, thermistor anchors in ohms.
fn factory_anchors(kind: SensorKindCfg) -> [CalAnchor; 3] {
    let points: [(f32, f32); 3] = match kind {
        SensorKindCfg::Thermocouple => [(4.64, 221.77), (5.81, 296.06), (6.64, 369.61)],
        SensorKindCfg::Ntc => [(600.0, 350.0), (1200.0, 200.0), (1800.0, 50.0)],
        SensorKindCfg::Ptc => [(1000.0, 50.0), (1600.0, 200.0), (2200.0, 350.0)],
    };
    points.map(|(measured, temperature_c)| CalAnchor {
        measured,
        temperature_c,
    })
}

/// What the tip store contributed to a channel: anchors always, gains
/// only when the stored tip carries a tuned set.
struct ResolvedTip {
    anchors: [CalAnchor; 3],
    pid: Option<PidCfg>,
}

/// Resolve a channel's tip data: CLI CSV override first, then the tip
/// store, then the factory defaults for the sensor kind.
fn resolve_tip(
    ccfg: &ChannelCfg,
    tips: Option<&TipStore>,
    override_anchors: Option<&[CalAnchor; 3]>,
) -> CoreResult<ResolvedTip> {
    if let Some(a) = override_anchors {
        return Ok(ResolvedTip {
            anchors: *a,
            pid: None,
        });
    }
    if let Some(store) = tips
        && let Some(tip) = &ccfg.tip
    {
        if let Some(rec) = store.load(tip)? {
            tracing::info!(tip, tuned = rec.pid.is_some(), "loaded tip calibration");
            return Ok(ResolvedTip {
                anchors: rec.anchors,
                pid: rec.pid,
            });
        }
        tracing::warn!(tip, "tip not found in store, using factory anchors");
    }
    Ok(ResolvedTip {
        anchors: factory_anchors(ccfg.sensor),
        pid: None,
    })
}

fn build_sensor(
    id: ChannelId,
    kind: SensorKindCfg,
    anchors: &[CalAnchor; 3],
) -> CoreResult<SensorModel> {
    let table = CalTable::try_from(anchors)?;
    Ok(match kind {
        SensorKindCfg::Thermocouple => SensorModel::thermocouple(id, table),
        SensorKindCfg::Ntc => SensorModel::ntc(id, table),
        SensorKindCfg::Ptc => SensorModel::ptc(id, table),
    })
}

/// Gain precedence: tip-specific over per-channel over station-wide.
fn build_controller(
    id: ChannelId,
    cfg: &Config,
    ccfg: &ChannelCfg,
    tip_pid: Option<&PidCfg>,
) -> Controller {
    let interval_s = control_interval_s(cfg.station.mains_hz);
    match ccfg.control {
        ControlKindCfg::Pid => {
            let pcfg = tip_pid.or(ccfg.pid.as_ref()).unwrap_or(&cfg.pid);
            Controller::pid(id, pcfg.into(), interval_s)
        }
        ControlKindCfg::Tbh => Controller::take_back_half(id, ccfg.tbh_ki, interval_s),
        ControlKindCfg::BangBang => Controller::bang_bang(id),
    }
}

fn sim_kind(kind: SensorKindCfg) -> SimSensorKind {
    match kind {
        SensorKindCfg::Thermocouple => SimSensorKind::Thermocouple,
        // The analog board model only distinguishes voltage vs resistance paths
        SensorKindCfg::Ntc | SensorKindCfg::Ptc => SimSensorKind::Ntc,
    }
}

#[allow(clippy::too_many_arguments)]
pub fn run_station(
    cfg: &Config,
    calib: Option<&[CalAnchor; 3]>,
    cycles: Option<u64>,
    temp1: Option<i32>,
    temp2: Option<i32>,
    rt: bool,
    rt_prio: Option<i32>,
    rt_lock: Option<RtLock>,
    rt_cpu: Option<usize>,
    stats: bool,
    shutdown: std::sync::Arc<std::sync::atomic::AtomicBool>,
) -> CoreResult<RunReport> {
    // Real-time mode setup (Linux/macOS), once per process
    #[cfg(target_os = "linux")]
    {
        let mode = rt_lock.unwrap_or(RtLock::os_default());
        setup_rt_once(rt, rt_prio, mode, rt_cpu);
    }
    #[cfg(target_os = "macos")]
    {
        let mode = rt_lock.unwrap_or(RtLock::os_default());
        let _rt_prio = rt_prio; // silence unused on non-Linux builds
        let _rt_cpu = rt_cpu; // silence unused on non-Linux builds
        setup_rt_once(rt, mode);
    }

    let mains_hz = cfg.station.mains_hz;
    let budget_ms = watchdog_budget_ms(half_cycle_ms(mains_hz), cfg.timing.conversion_timeout_ms);
    let _ = LAST_SAFETY.set(CliSafety {
        overcurrent_debounce_n: cfg.safety.overcurrent_debounce_n,
        watchdog_budget_ms: budget_ms,
        mains_hz,
    });

    let tips = cfg.tip_store.as_ref().map(TipStore::new);
    let default_ccfg = ChannelCfg::default();
    let ccfg_for = |i: usize| cfg.channel.get(i).unwrap_or(&default_ccfg);

    let sim = Simulator::new(sim_kind(ccfg_for(0).sensor), sim_kind(ccfg_for(1).sensor));

    let channels = {
        let mut build = |id: ChannelId| -> CoreResult<Channel> {
            let ccfg = ccfg_for(id.index());
            // The CSV override applies to channel 1 only
            let over = if id == ChannelId::One { calib } else { None };
            let tip = resolve_tip(ccfg, tips.as_ref(), over)?;
            Ok(Channel::new(
                id,
                build_sensor(id, ccfg.sensor, &tip.anchors)?,
                build_controller(id, cfg, ccfg, tip.pid.as_ref()),
                ccfg.presets,
                (&cfg.idle).into(),
            ))
        };
        [build(ChannelId::One)?, build(ChannelId::Two)?]
    };

    let holder = sim.holder_checker();
    let mut scheduler = StationBuilder::new()
        .with_watchdog(sim.watchdog())
        .with_channels(channels)
        .with_overcurrent_check(sim.overcurrent_checker())
        .with_overcurrent_debounce(cfg.safety.overcurrent_debounce_n)
        .with_holder_check(move |id: ChannelId| holder(id.index()))
        .with_policy(cfg.station.policy.into())
        .with_timing((&cfg.timing).into())
        .with_mains_hz(mains_hz)
        .with_refresh_every(cfg.station.refresh_every)
        .with_report_every(cfg.station.report_every)
        .with_front_end(sim.front_end())
        .with_heaters(sim.heater(0), sim.heater(1))
        .build()?;

    if let Some(t) = temp1 {
        scheduler.channel_mut(ChannelId::One).set_user_temperature(t);
    }
    scheduler.enable_channel(ChannelId::One);
    if let Some(t) = temp2 {
        scheduler.channel_mut(ChannelId::Two).set_user_temperature(t);
        scheduler.enable_channel(ChannelId::Two);
    }

    let edges = MainsSync::paced(mains_hz, MonotonicClock::new());
    tracing::info!(
        mains_hz,
        target1 = scheduler.channel(ChannelId::One).user_temperature_c(),
        "station run start"
    );

    let shutdown_check: Box<dyn Fn() -> bool + Send + Sync> =
        Box::new(move || shutdown.load(std::sync::atomic::Ordering::Relaxed));
    let report = station_core::runner::run(
        &mut scheduler,
        &edges,
        mains_hz,
        cfg.timing.conversion_timeout_ms,
        cycles,
        Some(shutdown_check),
    )?;

    if stats {
        print_stats(&scheduler, &sim, &report);
    }
    Ok(report)
}

/// Print run counters and final channel readings to stderr.
fn print_stats(scheduler: &station_core::BoxedScheduler, sim: &Simulator, report: &RunReport) {
    eprintln!(
        "cycles: completed={} ignored={} overload_trips={}",
        report.cycles_completed, report.cycles_ignored, report.overload_trips
    );
    for id in ChannelId::ALL {
        let ch = scheduler.channel(id);
        eprintln!(
            "channel {id}: state={:?} target_c={} measured_c={:.1} duty={} plant_c={:.1}",
            ch.state(),
            ch.target_temperature_c(),
            ch.current_temperature_c(),
            ch.duty(),
            sim.temperature(id.index()),
        );
    }
    eprintln!("watchdog feeds: {}", sim.watchdog_feeds());
}

/// Run a short closed-loop burst against the simulated board and verify that
/// the scheduler completed its cycles and kept feeding the watchdog.
pub fn self_check(cfg: &Config) -> CoreResult<()> {
    let sim = Simulator::new(SimSensorKind::Thermocouple, SimSensorKind::Thermocouple);
    let table = CalTable::try_from(&factory_anchors(SensorKindCfg::Thermocouple))?;
    let interval_s = control_interval_s(cfg.station.mains_hz);
    let channels = ChannelId::ALL.map(|id| {
        Channel::new(
            id,
            SensorModel::thermocouple(id, table.clone()),
            Controller::pid(id, (&cfg.pid).into(), interval_s),
            [300, 350, 400],
            (&cfg.idle).into(),
        )
    });

    let holder = sim.holder_checker();
    let mut scheduler = StationBuilder::new()
        .with_watchdog(sim.watchdog())
        .with_channels(channels)
        .with_overcurrent_check(sim.overcurrent_checker())
        .with_holder_check(move |id: ChannelId| holder(id.index()))
        .with_timing((&cfg.timing).into())
        .with_mains_hz(cfg.station.mains_hz)
        .with_front_end(sim.front_end())
        .with_heaters(sim.heater(0), sim.heater(1))
        .build()?;

    scheduler.enable_channel(ChannelId::One);
    let edges = MainsSync::paced(cfg.station.mains_hz, MonotonicClock::new());
    let report = station_core::runner::run(
        &mut scheduler,
        &edges,
        cfg.station.mains_hz,
        cfg.timing.conversion_timeout_ms,
        Some(20),
        None,
    )?;

    if report.cycles_completed < 20 {
        return Err(station_core::error::Report::new(
            station_core::error::StationError::State(format!(
                "self-check completed only {} cycles",
                report.cycles_completed
            )),
        ));
    }
    if sim.watchdog_feeds() == 0 {
        return Err(station_core::error::Report::new(
            station_core::error::StationError::State("watchdog was never fed".into()),
        ));
    }
    if !scheduler.channel(ChannelId::One).state().permits_drive() {
        return Err(station_core::error::Report::new(
            station_core::error::StationError::State(format!(
                "channel 1 parked in {:?}",
                scheduler.channel(ChannelId::One).state()
            )),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use station_config::tipstore::TipRecord;

    fn tuned_record() -> TipRecord {
        TipRecord {
            anchors: factory_anchors(SensorKindCfg::Thermocouple),
            pid: Some(PidCfg {
                kp: 12.0,
                ki: 0.8,
                kd: 0.1,
                i_limit: 40.0,
            }),
        }
    }

    #[test]
    fn stored_tip_supplies_anchors_and_gains() {
        let dir = tempfile::tempdir().unwrap();
        let store = TipStore::new(dir.path());
        let mut rec = tuned_record();
        rec.anchors[1].temperature_c = 290.0;
        store.save("c245", &rec).unwrap();

        let ccfg = ChannelCfg {
            tip: Some("c245".into()),
            ..ChannelCfg::default()
        };
        let tip = resolve_tip(&ccfg, Some(&store), None).unwrap();
        assert_eq!(tip.anchors[1].temperature_c, 290.0);
        assert_eq!(tip.pid, rec.pid);
    }

    #[test]
    fn calibration_override_suppresses_stored_gains() {
        let dir = tempfile::tempdir().unwrap();
        let store = TipStore::new(dir.path());
        store.save("c245", &tuned_record()).unwrap();

        let ccfg = ChannelCfg {
            tip: Some("c245".into()),
            ..ChannelCfg::default()
        };
        let over = factory_anchors(SensorKindCfg::Thermocouple);
        let tip = resolve_tip(&ccfg, Some(&store), Some(&over)).unwrap();
        assert_eq!(tip.anchors, over);
        assert!(tip.pid.is_none());
    }

    #[test]
    fn unknown_tip_falls_back_to_factory_anchors() {
        let dir = tempfile::tempdir().unwrap();
        let store = TipStore::new(dir.path());
        let ccfg = ChannelCfg {
            tip: Some("bc2".into()),
            ..ChannelCfg::default()
        };
        let tip = resolve_tip(&ccfg, Some(&store), None).unwrap();
        assert_eq!(tip.anchors, factory_anchors(SensorKindCfg::Thermocouple));
        assert!(tip.pid.is_none());
    }
}
