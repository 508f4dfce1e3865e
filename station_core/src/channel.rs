//! Per-channel state machine tying a sensor model and a control law
//! to one heater output.

use tracing::{debug, warn};

use crate::controller::Controller;
use crate::sensor::SensorModel;

/// Settable temperature bounds in °C.
pub const MIN_TEMP: i32 = 100;
pub const MAX_TEMP: i32 = 450;
pub const PRESET_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelId {
    One,
    Two,
}

impl ChannelId {
    pub const ALL: [ChannelId; 2] = [ChannelId::One, ChannelId::Two];

    pub fn index(self) -> usize {
        match self {
            ChannelId::One => 0,
            ChannelId::Two => 1,
        }
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.index() + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Off,
    /// No usable tip detected; controller disabled until one appears.
    NoTip,
    /// Overcurrent latch. Cleared only by an explicit re-enable.
    Overload,
    /// Long idle: heater off, target retained.
    Standby,
    /// Short idle: reduced target, heater still driven.
    Backoff,
    Active,
    /// Diagnostic mode driving a fixed duty, bypassing the controller.
    FixedPower,
}

impl ChannelState {
    /// Whether the heater hardware may follow the duty cycle. Every
    /// other state forces the duty to 0 and the switch open.
    pub fn permits_drive(self) -> bool {
        matches!(
            self,
            ChannelState::Active | ChannelState::Backoff | ChannelState::FixedPower
        )
    }
}

/// Idle-time setback thresholds for a channel in its holder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdlePolicy {
    /// Degrees subtracted from the target while in `Backoff`.
    pub setback_c: i32,
    /// In-holder time before `Active` drops to `Backoff`.
    pub setback_after_ms: u64,
    /// In-holder time before the channel parks in `Standby`.
    pub standby_after_ms: u64,
}

impl Default for IdlePolicy {
    fn default() -> Self {
        Self {
            setback_c: 100,
            setback_after_ms: 120_000,
            standby_after_ms: 600_000,
        }
    }
}

#[derive(Debug)]
pub struct Channel {
    id: ChannelId,
    state: ChannelState,
    user_temperature_c: i32,
    current_temperature_c: f32,
    duty: u8,
    presets: [i32; PRESET_COUNT],
    preset: usize,
    modified: bool,
    sensor: SensorModel,
    controller: Controller,
    idle: IdlePolicy,
    idle_ms: u64,
    fixed_duty: u8,
}

impl Channel {
    pub fn new(
        id: ChannelId,
        sensor: SensorModel,
        controller: Controller,
        presets: [i32; PRESET_COUNT],
        idle: IdlePolicy,
    ) -> Self {
        let presets = presets.map(|p| p.clamp(MIN_TEMP, MAX_TEMP));
        Self {
            id,
            state: ChannelState::Off,
            user_temperature_c: presets[0],
            current_temperature_c: 0.0,
            duty: 0,
            presets,
            preset: 0,
            modified: false,
            sensor,
            controller,
            idle,
            idle_ms: 0,
            fixed_duty: 0,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn duty(&self) -> u8 {
        self.duty
    }

    pub fn current_temperature_c(&self) -> f32 {
        self.current_temperature_c
    }

    pub fn user_temperature_c(&self) -> i32 {
        self.user_temperature_c
    }

    pub fn preset_index(&self) -> usize {
        self.preset
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn sensor(&self) -> &SensorModel {
        &self.sensor
    }

    pub fn sensor_mut(&mut self) -> &mut SensorModel {
        &mut self.sensor
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Effective control target: the user temperature, lowered by the
    /// setback while backing off. Always within the settable range.
    pub fn target_temperature_c(&self) -> i32 {
        let t = match self.state {
            ChannelState::Backoff => self.user_temperature_c - self.idle.setback_c,
            _ => self.user_temperature_c,
        };
        t.clamp(MIN_TEMP, MAX_TEMP)
    }

    /// Turn the channel on. This is the only way out of `Overload`.
    pub fn enable(&mut self) {
        if !self.sensor.tip_present() {
            warn!(channel = %self.id, "enable with no tip");
            self.state = ChannelState::NoTip;
            self.controller.enable(false);
            return;
        }
        self.state = ChannelState::Active;
        self.idle_ms = 0;
        self.controller.set_target(self.target_temperature_c() as f32);
        self.controller.enable(true);
        debug!(channel = %self.id, target_c = self.user_temperature_c, "channel enabled");
    }

    pub fn disable(&mut self) {
        self.state = ChannelState::Off;
        self.controller.enable(false);
        self.controller.set_output(0.0);
        self.duty = 0;
    }

    pub fn set_user_temperature(&mut self, temp_c: i32) {
        self.user_temperature_c = temp_c.clamp(MIN_TEMP, MAX_TEMP);
        self.modified = self.user_temperature_c != self.presets[self.preset];
    }

    pub fn select_preset(&mut self, index: usize) {
        let index = index.min(PRESET_COUNT - 1);
        self.preset = index;
        self.user_temperature_c = self.presets[index];
        self.modified = false;
    }

    /// Store the current user temperature into the active preset slot.
    pub fn store_preset(&mut self) {
        self.presets[self.preset] = self.user_temperature_c;
        self.modified = false;
    }

    pub fn presets(&self) -> [i32; PRESET_COUNT] {
        self.presets
    }

    /// Swap in a new tip's sensor model and control law, e.g. after a
    /// tool change. A dummy sensor parks the channel in `NoTip`.
    pub fn set_tip(&mut self, sensor: SensorModel, controller: Controller) {
        self.sensor = sensor;
        self.controller = controller;
        if self.state != ChannelState::Off {
            if self.sensor.tip_present() {
                self.enable();
            } else {
                self.state = ChannelState::NoTip;
                self.duty = 0;
            }
        }
    }

    /// Latch the overcurrent state. Controller output is zeroed so a
    /// later re-enable starts from a safe operating point.
    pub fn trip_overload(&mut self) {
        warn!(channel = %self.id, "overcurrent trip");
        self.state = ChannelState::Overload;
        self.controller.enable(false);
        self.controller.set_output(0.0);
        self.duty = 0;
    }

    pub fn enter_fixed_power(&mut self, duty: u8) {
        if matches!(self.state, ChannelState::Active | ChannelState::Standby) {
            self.fixed_duty = duty.min(100);
            self.state = ChannelState::FixedPower;
            self.controller.enable(false);
        }
    }

    pub fn leave_fixed_power(&mut self) {
        if self.state == ChannelState::FixedPower {
            self.enable();
        }
    }

    /// Advance the idle clock. `in_holder` comes from the tool-rest
    /// switch; time out of the holder resets the clock and wakes the
    /// channel back to `Active`.
    pub fn update_idle(&mut self, in_holder: bool, elapsed_ms: u64) {
        match self.state {
            ChannelState::Active | ChannelState::Backoff | ChannelState::Standby => {}
            _ => return,
        }
        if !in_holder {
            self.idle_ms = 0;
            if self.state != ChannelState::Active {
                debug!(channel = %self.id, "waking from idle setback");
                self.state = ChannelState::Active;
                self.controller.enable(true);
            }
            return;
        }
        self.idle_ms = self.idle_ms.saturating_add(elapsed_ms);
        if self.idle_ms >= self.idle.standby_after_ms {
            if self.state != ChannelState::Standby {
                debug!(channel = %self.id, "long idle, parking in standby");
                self.state = ChannelState::Standby;
                self.controller.enable(false);
            }
        } else if self.idle_ms >= self.idle.setback_after_ms
            && self.state == ChannelState::Active
        {
            debug!(channel = %self.id, "idle setback");
            self.state = ChannelState::Backoff;
        }
    }

    /// One control step: refresh the temperature, run the law, and
    /// derive the duty under the drive policy.
    pub fn run_control(&mut self) {
        self.current_temperature_c = self.sensor.temperature_c();

        if !self.sensor.tip_present() {
            if self.state != ChannelState::Off && self.state != ChannelState::Overload {
                if self.state != ChannelState::NoTip {
                    warn!(channel = %self.id, "tip removed");
                }
                self.state = ChannelState::NoTip;
                self.controller.enable(false);
            }
        } else if self.state == ChannelState::NoTip {
            // Tool plugged back in: resume where the user left off.
            self.enable();
        }

        self.controller.set_target(self.target_temperature_c() as f32);
        let output = self.controller.new_sample(self.current_temperature_c);
        self.controller.report(self.current_temperature_c);

        self.duty = if self.state.permits_drive() {
            match self.state {
                ChannelState::FixedPower => self.fixed_duty,
                _ => output.clamp(0.0, 100.0).round() as u8,
            }
        } else {
            0
        };
    }
}
