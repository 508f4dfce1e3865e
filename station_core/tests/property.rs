use proptest::prelude::*;
use station_core::averager::Averager;
use station_core::calibration::{CalPoint, CalTable};
use station_core::channel::ChannelId;
use station_core::controller::{Controller, PidGains};

fn table() -> CalTable {
    CalTable::new([
        CalPoint {
            measured: 4.64,
            temperature_c: 221.77,
        },
        CalPoint {
            measured: 5.81,
            temperature_c: 296.06,
        },
        CalPoint {
            measured: 6.64,
            temperature_c: 369.61,
        },
    ])
    .unwrap()
}

proptest! {
    // The PID output must honor the output limits no matter what the
    // sensor feeds it, including integral windup conditions.
    #[test]
    fn pid_output_stays_within_limits(
        inputs in proptest::collection::vec(-100.0f32..900.0, 1..400),
        target in 100.0f32..450.0,
    ) {
        let gains = PidGains { kp: 10.0, ki: 2.0, kd: 0.5, i_limit: 80.0 };
        let mut c = Controller::pid(ChannelId::One, gains, 0.01);
        c.set_target(target);
        c.enable(true);
        for input in inputs {
            let out = c.new_sample(input);
            prop_assert!((0.0..=100.0).contains(&out), "output {out} for input {input}");
        }
    }

    // Take-back-half may ring internally but its visible output is
    // clamped like every other law.
    #[test]
    fn tbh_output_stays_within_limits(
        inputs in proptest::collection::vec(-100.0f32..900.0, 1..400),
    ) {
        let mut c = Controller::take_back_half(ChannelId::One, 40.0, 0.01);
        c.set_target(350.0);
        c.enable(true);
        for input in inputs {
            let out = c.new_sample(input);
            prop_assert!((0.0..=100.0).contains(&out), "output {out} for input {input}");
        }
    }

    // A window average never escapes the range of its inputs.
    #[test]
    fn window_average_is_bounded_by_inputs(
        samples in proptest::collection::vec(0i32..=4095, 8..64),
    ) {
        let mut avg = Averager::window(8);
        for &s in &samples {
            avg.push(s);
        }
        let lo = *samples.iter().min().unwrap();
        let hi = *samples.iter().max().unwrap();
        let a = avg.average();
        prop_assert!(a >= lo && a <= hi, "average {a} outside [{lo}, {hi}]");
    }

    // Piecewise-linear lookup is monotonic for monotonic anchors and
    // clamps at the table edges.
    #[test]
    fn calibration_lookup_is_monotonic_and_clamped(
        a in 0.0f32..20.0,
        b in 0.0f32..20.0,
    ) {
        let t = table();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(t.temperature_at(lo) <= t.temperature_at(hi) + 1e-3);
        prop_assert!(t.temperature_at(0.0) == t.temperature_at(4.64));
        prop_assert!(t.temperature_at(20.0) == t.temperature_at(6.64));
    }
}
