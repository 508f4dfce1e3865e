//! Closed-loop tests against the simulated analog board: the scheduler,
//! sensor decode, control laws and safety paths all run end to end with
//! the thermal plant model supplying the ADC counts.

use station_core::builder::build_scheduler;
use station_core::calibration::{CalPoint, CalTable};
use station_core::channel::{Channel, ChannelId, ChannelState, IdlePolicy};
use station_core::controller::{Controller, PidGains};
use station_core::safety::OvercurrentGuard;
use station_core::scheduler::{CycleOutcome, SamplePolicy, Scheduler, TimingCfg};
use station_core::sensor::SensorModel;
use station_core::{MAX_TEMP, control_interval_s};
use station_hardware::{
    SimSensorKind, SimulatedFrontEnd, SimulatedHeater, SimulatedWatchdog, Simulator,
};
use station_traits::clock::test_clock::TestClock;

type SimScheduler = Scheduler<SimulatedFrontEnd, SimulatedHeater, SimulatedWatchdog, TestClock>;

/// Anchors consistent with the board model's thermocouple response, so
/// the decoded temperature should track the plant temperature.
fn plant_matched_table() -> CalTable {
    CalTable::new([
        CalPoint {
            measured: 4.64,
            temperature_c: 221.77,
        },
        CalPoint {
            measured: 5.64,
            temperature_c: 295.67,
        },
        CalPoint {
            measured: 6.64,
            temperature_c: 369.57,
        },
    ])
    .unwrap()
}

fn pid_gains() -> PidGains {
    PidGains {
        kp: 8.0,
        ki: 0.4,
        kd: 0.0,
        i_limit: 60.0,
    }
}

fn sim_station(sim: &Simulator, policy: SamplePolicy) -> SimScheduler {
    let interval_s = control_interval_s(50);
    let channels = ChannelId::ALL.map(|id| {
        Channel::new(
            id,
            SensorModel::thermocouple(id, plant_matched_table()),
            Controller::pid(id, pid_gains(), interval_s),
            [300, 350, 400],
            IdlePolicy::default(),
        )
    });
    let holder = sim.holder_checker();
    build_scheduler(
        sim.front_end(),
        [sim.heater(0), sim.heater(1)],
        sim.watchdog(),
        TestClock::new(),
        channels,
        OvercurrentGuard::new(sim.overcurrent_checker(), 2),
        Some(Box::new(move |id: ChannelId| holder(id.index()))),
        policy,
        TimingCfg::default(),
        50,
        25,
        100,
    )
    .unwrap()
}

fn run_cycles(s: &mut SimScheduler, from: u64, n: u64) {
    for edge in from..from + n {
        s.run_cycle(edge, 10).unwrap();
    }
}

#[test]
fn heats_to_target_and_decoded_temperature_tracks_plant() {
    let sim = Simulator::new(SimSensorKind::Thermocouple, SimSensorKind::Thermocouple);
    let mut s = sim_station(&sim, SamplePolicy::Interleave);

    s.channel_mut(ChannelId::One).set_user_temperature(350);
    s.enable_channel(ChannelId::One);
    assert_eq!(s.channel(ChannelId::One).state(), ChannelState::Active);

    run_cycles(&mut s, 1, 1200);

    let plant = sim.temperature(0);
    let decoded = s.channel(ChannelId::One).current_temperature_c();
    assert!(plant > 300.0, "plant only reached {plant}");
    assert!(plant < 400.0, "plant overshot to {plant}");
    assert!(
        (decoded - plant).abs() < 10.0,
        "decoded {decoded} vs plant {plant}"
    );
    assert_eq!(s.channel(ChannelId::One).state(), ChannelState::Active);
    assert!(sim.watchdog_feeds() > 1200);
}

#[test]
fn disabled_channel_never_drives_its_heater() {
    let sim = Simulator::new(SimSensorKind::Thermocouple, SimSensorKind::Thermocouple);
    let mut s = sim_station(&sim, SamplePolicy::Interleave);

    s.enable_channel(ChannelId::One);
    run_cycles(&mut s, 1, 200);

    assert_eq!(s.channel(ChannelId::Two).state(), ChannelState::Off);
    assert_eq!(sim.duty(1), 0);
    assert!((sim.temperature(1) - 25.0).abs() < 1.0);
}

#[test]
fn overcurrent_latches_both_channels_until_reenabled() {
    let sim = Simulator::new(SimSensorKind::Thermocouple, SimSensorKind::Thermocouple);
    let mut s = sim_station(&sim, SamplePolicy::Interleave);

    s.enable_channel(ChannelId::One);
    run_cycles(&mut s, 1, 20);
    assert!(sim.duty(0) > 0);

    sim.set_overcurrent(true);
    // Debounce is 2 polls; the trip lands within a couple of cycles
    let mut tripped = false;
    for edge in 21..30 {
        if s.run_cycle(edge, 10).unwrap() == CycleOutcome::OverloadTripped {
            tripped = true;
            break;
        }
    }
    assert!(tripped);
    for id in ChannelId::ALL {
        assert_eq!(s.channel(id).state(), ChannelState::Overload);
    }
    assert_eq!(sim.duty(0), 0);

    // The latch holds even after the comparator clears
    sim.set_overcurrent(false);
    s.run_cycle(30, 10).unwrap();
    assert_eq!(s.channel(ChannelId::One).state(), ChannelState::Overload);

    // Re-enabling resets the guard and resumes control
    s.enable_channel(ChannelId::One);
    assert_eq!(s.run_cycle(31, 10).unwrap(), CycleOutcome::Completed);
    run_cycles(&mut s, 32, 10);
    assert_eq!(s.channel(ChannelId::One).state(), ChannelState::Active);
    assert!(sim.duty(0) > 0);
}

#[test]
fn unplugged_tip_parks_the_channel_and_replug_recovers() {
    let sim = Simulator::new(SimSensorKind::Thermocouple, SimSensorKind::Thermocouple);
    let mut s = sim_station(&sim, SamplePolicy::Interleave);

    s.enable_channel(ChannelId::One);
    run_cycles(&mut s, 1, 20);
    assert_eq!(s.channel(ChannelId::One).state(), ChannelState::Active);

    sim.set_tip_present(0, false);
    run_cycles(&mut s, 21, 10);
    assert_eq!(s.channel(ChannelId::One).state(), ChannelState::NoTip);
    assert_eq!(sim.duty(0), 0);

    sim.set_tip_present(0, true);
    run_cycles(&mut s, 31, 10);
    assert_eq!(s.channel(ChannelId::One).state(), ChannelState::Active);
    assert!(sim.duty(0) > 0);
}

#[test]
fn alternate_policy_still_services_both_channels() {
    let sim = Simulator::new(SimSensorKind::Thermocouple, SimSensorKind::Thermocouple);
    let mut s = sim_station(&sim, SamplePolicy::Alternate);

    s.channel_mut(ChannelId::One).set_user_temperature(300);
    s.channel_mut(ChannelId::Two).set_user_temperature(300);
    s.enable_channel(ChannelId::One);
    s.enable_channel(ChannelId::Two);

    run_cycles(&mut s, 1, 1600);

    for index in 0..2 {
        let t = sim.temperature(index);
        assert!(t > 150.0, "plant {index} only reached {t}");
        assert!(t < MAX_TEMP as f32, "plant {index} ran away to {t}");
    }
}

#[test]
fn idle_ladder_backs_off_then_sleeps_in_the_holder() {
    let sim = Simulator::new(SimSensorKind::Thermocouple, SimSensorKind::Thermocouple);
    let mut s = sim_station(&sim, SamplePolicy::Interleave);

    s.enable_channel(ChannelId::One);
    sim.set_in_holder(0, true);

    // 10 ms per cycle: setback after 120 s, standby after 600 s
    run_cycles(&mut s, 1, 12_100);
    assert_eq!(s.channel(ChannelId::One).state(), ChannelState::Backoff);
    assert!(
        s.channel(ChannelId::One).target_temperature_c()
            < s.channel(ChannelId::One).user_temperature_c()
    );

    run_cycles(&mut s, 12_101, 48_000);
    assert_eq!(s.channel(ChannelId::One).state(), ChannelState::Standby);
    assert_eq!(sim.duty(0), 0);

    // Picking the iron back up wakes it
    sim.set_in_holder(0, false);
    run_cycles(&mut s, 60_101, 5);
    assert_eq!(s.channel(ChannelId::One).state(), ChannelState::Active);
}
