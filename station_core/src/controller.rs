//! Control laws for heater power.
//!
//! The law set is fixed, so dispatch is a closed enum matched inline
//! rather than a trait object. All laws share the same outer surface:
//! feed one temperature sample per control interval, read back a
//! clamped output.
//!
//! `f32` math throughout. Gains are pre-scaled at construction with
//! the control interval so the per-sample update needs no division.

use tracing::trace;

use crate::channel::ChannelId;

/// Overshoot beyond this many degrees discharges the PID integral
/// faster than it charged.
pub const INTEGRAL_DISCHARGE_THRESHOLD_C: f32 = -2.0;
/// Discharge speed-up applied past the threshold.
pub const INTEGRAL_DISCHARGE_FACTOR: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Absolute bound on the integral term.
    pub i_limit: f32,
}

#[derive(Debug, Clone)]
pub struct Pid {
    kp: f32,
    /// `ki` scaled by the control interval.
    ki_eff: f32,
    /// `kd` divided by the control interval.
    kd_eff: f32,
    i_limit: f32,
    integral: f32,
    last_input: Option<f32>,
}

impl Pid {
    fn new(gains: PidGains, interval_s: f32) -> Self {
        Self {
            kp: gains.kp,
            ki_eff: gains.ki * interval_s,
            kd_eff: gains.kd / interval_s,
            i_limit: gains.i_limit.abs(),
            integral: 0.0,
            last_input: None,
        }
    }

    fn update(&mut self, error: f32, input: f32) -> f32 {
        let p = self.kp * error;

        // Overshoot discharges the integral faster than it charged, so
        // a long heat-up does not turn into a long overshoot.
        let rate = if error <= INTEGRAL_DISCHARGE_THRESHOLD_C {
            INTEGRAL_DISCHARGE_FACTOR
        } else {
            1.0
        };
        self.integral = (self.integral + self.ki_eff * error * rate)
            .clamp(-self.i_limit, self.i_limit);

        // Derivative on input, not error, so target steps do not kick.
        let d = match self.last_input {
            Some(last) => -self.kd_eff * (input - last),
            None => 0.0,
        };
        self.last_input = Some(input);

        p + self.integral + d
    }

    fn preload(&mut self, output: f32) {
        self.integral = output.clamp(-self.i_limit, self.i_limit);
        self.last_input = None;
    }
}

/// Take-back-half: a pure integrator that gives back half the distance
/// to the output at the previous zero crossing each time the error
/// changes sign.
#[derive(Debug, Clone)]
pub struct TakeBackHalf {
    ki_eff: f32,
    accum: f32,
    at_last_crossing: f32,
    last_error_sign: Option<bool>,
}

impl TakeBackHalf {
    fn new(ki: f32, interval_s: f32) -> Self {
        Self {
            ki_eff: ki * interval_s,
            accum: 0.0,
            at_last_crossing: 0.0,
            last_error_sign: None,
        }
    }

    fn update(&mut self, error: f32) -> f32 {
        self.accum += self.ki_eff * error;
        let sign = error >= 0.0;
        if let Some(last) = self.last_error_sign {
            if sign != last {
                self.accum = 0.5 * (self.accum + self.at_last_crossing);
                self.at_last_crossing = self.accum;
            }
        }
        self.last_error_sign = Some(sign);
        self.accum
    }

    fn preload(&mut self, output: f32) {
        self.accum = output;
        self.at_last_crossing = output;
        self.last_error_sign = None;
    }
}

#[derive(Debug, Clone)]
pub enum ControlLaw {
    Pid(Pid),
    TakeBackHalf(TakeBackHalf),
    /// Full power below target, zero above. Sign of the error alone.
    BangBang,
    /// Constant commanded power, no feedback.
    FixedPower { duty: f32 },
}

impl ControlLaw {
    fn name(&self) -> &'static str {
        match self {
            ControlLaw::Pid(_) => "pid",
            ControlLaw::TakeBackHalf(_) => "tbh",
            ControlLaw::BangBang => "bangbang",
            ControlLaw::FixedPower { .. } => "fixed",
        }
    }
}

/// One channel's control law plus the shared enable/output plumbing.
#[derive(Debug, Clone)]
pub struct Controller {
    channel: ChannelId,
    law: ControlLaw,
    target_c: f32,
    out_min: f32,
    out_max: f32,
    enabled: bool,
    output: f32,
    /// Samples since the last rising enable edge.
    tick_count: u32,
}

impl Controller {
    pub fn pid(channel: ChannelId, gains: PidGains, interval_s: f32) -> Self {
        Self::with_law(channel, ControlLaw::Pid(Pid::new(gains, interval_s)))
    }

    pub fn take_back_half(channel: ChannelId, ki: f32, interval_s: f32) -> Self {
        Self::with_law(
            channel,
            ControlLaw::TakeBackHalf(TakeBackHalf::new(ki, interval_s)),
        )
    }

    pub fn bang_bang(channel: ChannelId) -> Self {
        Self::with_law(channel, ControlLaw::BangBang)
    }

    pub fn fixed_power(channel: ChannelId, duty: f32) -> Self {
        Self::with_law(channel, ControlLaw::FixedPower { duty })
    }

    fn with_law(channel: ChannelId, law: ControlLaw) -> Self {
        Self {
            channel,
            law,
            target_c: 0.0,
            out_min: 0.0,
            out_max: 100.0,
            enabled: false,
            output: 0.0,
            tick_count: 0,
        }
    }

    pub fn set_output_limits(&mut self, min: f32, max: f32) {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        self.out_min = min;
        self.out_max = max;
        self.output = self.output.clamp(min, max);
    }

    pub fn set_target(&mut self, target_c: f32) {
        self.target_c = target_c;
    }

    pub fn target(&self) -> f32 {
        self.target_c
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable the law. Enabling an already-enabled
    /// controller changes nothing; the rising edge preloads the law
    /// with the current output so the handover is bumpless.
    pub fn enable(&mut self, on: bool) {
        if on && !self.enabled {
            match &mut self.law {
                ControlLaw::Pid(pid) => pid.preload(self.output),
                ControlLaw::TakeBackHalf(tbh) => tbh.preload(self.output),
                ControlLaw::BangBang | ControlLaw::FixedPower { .. } => {}
            }
            self.tick_count = 0;
        }
        self.enabled = on;
    }

    /// Force the held output, e.g. before handing a frozen controller
    /// back to the user. Clamped to the output limits.
    pub fn set_output(&mut self, output: f32) {
        self.output = output.clamp(self.out_min, self.out_max);
    }

    pub fn tick_count(&self) -> u32 {
        self.tick_count
    }

    /// Feed one temperature sample and recompute the output. While
    /// disabled the state is frozen and the previous output returned.
    pub fn new_sample(&mut self, input_c: f32) -> f32 {
        if !self.enabled {
            return self.output;
        }
        self.tick_count = self.tick_count.wrapping_add(1);
        let error = self.target_c - input_c;
        let raw = match &mut self.law {
            ControlLaw::Pid(pid) => pid.update(error, input_c),
            ControlLaw::TakeBackHalf(tbh) => tbh.update(error),
            ControlLaw::BangBang => {
                if error > 0.0 {
                    self.out_max
                } else {
                    self.out_min
                }
            }
            ControlLaw::FixedPower { duty } => *duty,
        };
        self.output = raw.clamp(self.out_min, self.out_max);
        self.output
    }

    pub fn output(&self) -> f32 {
        self.output
    }

    /// Emit the law's current operating point to the trace log.
    pub fn report(&self, input_c: f32) {
        trace!(
            channel = ?self.channel,
            law = self.law.name(),
            target_c = self.target_c,
            input_c,
            output = self.output,
            enabled = self.enabled,
            "control step"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL_50HZ_S: f32 = 0.01;

    fn wide_pid() -> Controller {
        let mut c = Controller::pid(
            ChannelId::One,
            PidGains {
                kp: 10.0,
                ki: 0.2,
                kd: 0.0,
                i_limit: 500.0,
            },
            INTERVAL_50HZ_S,
        );
        c.set_output_limits(-1000.0, 1000.0);
        c
    }

    #[test]
    fn pid_first_step_is_p_plus_scaled_i() {
        let mut c = wide_pid();
        c.set_target(300.0);
        c.enable(true);
        let out = c.new_sample(280.0);
        // p = 10 * 20 = 200, i = 0.2 * 0.01 * 20 = 0.04
        assert!((out - 200.04).abs() < 1e-3, "got {out}");
    }

    #[test]
    fn pid_integral_stays_within_limit() {
        let mut c = Controller::pid(
            ChannelId::One,
            PidGains {
                kp: 0.0,
                ki: 100.0,
                kd: 0.0,
                i_limit: 30.0,
            },
            INTERVAL_50HZ_S,
        );
        c.set_output_limits(-1000.0, 1000.0);
        c.set_target(400.0);
        c.enable(true);
        for _ in 0..10_000 {
            c.new_sample(0.0);
        }
        assert!(c.output() <= 30.0 + 1e-3);
    }

    #[test]
    fn pid_discharges_overshoot_faster_than_it_charged() {
        let base = Controller::pid(
            ChannelId::One,
            PidGains {
                kp: 0.0,
                ki: 1.0,
                kd: 0.0,
                i_limit: 100.0,
            },
            INTERVAL_50HZ_S,
        );
        let mut charging = base.clone();
        charging.set_target(300.0);
        charging.enable(true);
        let up = charging.new_sample(295.0); // error +5

        let mut discharging = base;
        discharging.set_target(300.0);
        discharging.enable(true);
        let down = discharging.new_sample(305.0); // error -5, past threshold
        assert!(
            down.abs() > up.abs() * 4.0,
            "discharge {down} vs charge {up}"
        );
    }

    #[test]
    fn pid_derivative_acts_on_input_not_target() {
        let mut c = Controller::pid(
            ChannelId::One,
            PidGains {
                kp: 0.0,
                ki: 0.0,
                kd: 1.0,
                i_limit: 100.0,
            },
            INTERVAL_50HZ_S,
        );
        c.set_output_limits(-1000.0, 1000.0);
        c.set_target(100.0);
        c.enable(true);
        c.new_sample(50.0);
        // Target step with constant input: no derivative kick.
        c.set_target(400.0);
        assert_eq!(c.new_sample(50.0), 0.0);
        // Input step produces an opposing derivative term.
        assert!(c.new_sample(60.0) < 0.0);
    }

    #[test]
    fn enable_rising_edge_is_bumpless_and_idempotent() {
        let mut c = wide_pid();
        c.set_target(300.0);
        c.enable(true);
        for _ in 0..100 {
            c.new_sample(280.0);
        }
        let before = c.output();
        c.enable(false);
        c.enable(true); // preloads integral with the frozen output
        c.enable(true); // second enable must not preload again
        let after = c.new_sample(300.0); // zero error: pure integral
        assert!((after - before).abs() < 1.0, "{before} -> {after}");
    }

    #[test]
    fn disabled_controller_holds_output_and_state() {
        let mut c = wide_pid();
        c.set_target(300.0);
        c.enable(true);
        let running = c.new_sample(280.0);
        c.enable(false);
        assert_eq!(c.new_sample(0.0), running);
        assert_eq!(c.new_sample(500.0), running);
    }

    #[test]
    fn tbh_halves_toward_last_crossing_on_sign_change() {
        let mut c = Controller::take_back_half(ChannelId::Two, 1.0, INTERVAL_50HZ_S);
        c.set_output_limits(0.0, 100.0);
        c.set_target(300.0);
        c.enable(true);
        let mut last = 0.0;
        for _ in 0..40 {
            last = c.new_sample(250.0); // ramps up while below target
        }
        assert!(last > 0.0);
        let crossed = c.new_sample(310.0); // error sign flips
        // output = (accum + 0) / 2 minus one integration step
        assert!(crossed < last && crossed > 0.0, "{last} -> {crossed}");
    }

    #[test]
    fn bang_bang_follows_error_sign() {
        let mut c = Controller::bang_bang(ChannelId::One);
        c.set_target(300.0);
        c.enable(true);
        assert_eq!(c.new_sample(299.0), 100.0);
        assert_eq!(c.new_sample(301.0), 0.0);
        assert_eq!(c.new_sample(300.0), 0.0);
    }

    #[test]
    fn fixed_power_ignores_input() {
        let mut c = Controller::fixed_power(ChannelId::Two, 35.0);
        c.enable(true);
        assert_eq!(c.new_sample(0.0), 35.0);
        assert_eq!(c.new_sample(450.0), 35.0);
    }
}
