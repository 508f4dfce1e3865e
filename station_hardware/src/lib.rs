#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
//! Hardware backends for the station.
//!
//! Only the simulated backend is built here: a two-channel thermal
//! plant behind the `station_traits` seams, good enough to close the
//! control loop end to end on a host. A real board backend plugs in
//! behind the same traits.

pub mod error;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use station_traits::{FrontEnd, HeaterDrive, Watchdog};

use crate::error::HwError;

// Mux-select line assignments, matching the acquisition board.
const SEL_CHANNEL_2: u8 = 0b0001;
const SEL_PATH_B: u8 = 0b0010;
const SEL_BIAS: u8 = 0b0100;
const SEL_GAIN_BOOST: u8 = 0b1000;

const ADC_MAX: i32 = 4095;
const VREF_MV: f32 = 3300.0;
const GAIN_BOOST_FACTOR: f32 = 251.0;
const CJ_OFFSET_MV: f32 = 500.0;
const CJ_MV_PER_C: f32 = 10.0;
const BIAS_CURRENT_MA: f32 = 0.25;

/// Thermocouple transfer used by the plant: degrees above the cold
/// junction per millivolt, anchored at 4.64 mV = 221.77 °C.
const TC_C_PER_MV: f32 = 73.9;
const TC_ANCHOR_MV: f32 = 4.64;
const TC_ANCHOR_C: f32 = 221.77;

/// Plant time advanced per completed conversion.
const STEP_S: f32 = 0.002;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimSensorKind {
    Thermocouple,
    Ntc,
}

/// First-order thermal model for one tip.
#[derive(Debug, Clone)]
struct ThermalPlant {
    kind: SimSensorKind,
    temperature_c: f32,
    ambient_c: f32,
    /// Heating rate at 100% duty, °C per second.
    heat_rate_c_per_s: f32,
    /// Cooling time constant towards ambient, seconds.
    cool_tau_s: f32,
    duty: u8,
    tip_present: bool,
    in_holder: bool,
}

impl ThermalPlant {
    fn new(kind: SimSensorKind) -> Self {
        Self {
            kind,
            temperature_c: 25.0,
            ambient_c: 25.0,
            heat_rate_c_per_s: 120.0,
            cool_tau_s: 30.0,
            duty: 0,
            tip_present: true,
            in_holder: false,
        }
    }

    fn step(&mut self, dt_s: f32) {
        let heating = f32::from(self.duty) / 100.0 * self.heat_rate_c_per_s;
        let cooling = (self.temperature_c - self.ambient_c) / self.cool_tau_s;
        self.temperature_c += (heating - cooling) * dt_s;
    }
}

#[derive(Debug)]
struct SimState {
    plants: [ThermalPlant; 2],
    cold_junction_c: f32,
    selected: u8,
    conversion_pending: bool,
    overcurrent: bool,
    watchdog_feeds: u64,
}

fn mv_to_counts(mv: f32) -> i32 {
    ((mv / VREF_MV) * ADC_MAX as f32).round() as i32
}

impl SimState {
    fn synthesize(&self) -> i32 {
        let index = usize::from(self.selected & SEL_CHANNEL_2 != 0);
        let plant = &self.plants[index];
        if !plant.tip_present {
            // Open input floats to the rail.
            return ADC_MAX;
        }

        let mv = if self.selected & SEL_BIAS != 0 {
            // Thermistor sense path: constant current through the tip.
            let ohms = match plant.kind {
                SimSensorKind::Ntc => (2_000.0 - 4.0 * plant.temperature_c).max(10.0),
                SimSensorKind::Thermocouple => 100.0,
            };
            ohms * BIAS_CURRENT_MA
        } else if self.selected & SEL_GAIN_BOOST != 0 {
            // Gain-boosted thermocouple voltage.
            let tc_mv = TC_ANCHOR_MV
                + (plant.temperature_c - self.cold_junction_c - TC_ANCHOR_C) / TC_C_PER_MV;
            tc_mv.max(0.0) * GAIN_BOOST_FACTOR
        } else if self.selected & SEL_PATH_B != 0 {
            // Cold-junction sensor in the tool connector.
            CJ_OFFSET_MV + CJ_MV_PER_C * self.cold_junction_c
        } else {
            0.0
        };

        mv_to_counts(mv).clamp(0, ADC_MAX)
    }
}

/// Shared simulator: hands out front-end, heater and watchdog
/// endpoints all backed by the same thermal state.
#[derive(Clone)]
pub struct Simulator {
    state: Arc<Mutex<SimState>>,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new(SimSensorKind::Thermocouple, SimSensorKind::Thermocouple)
    }
}

impl Simulator {
    pub fn new(one: SimSensorKind, two: SimSensorKind) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                plants: [ThermalPlant::new(one), ThermalPlant::new(two)],
                cold_junction_c: 25.0,
                selected: 0,
                conversion_pending: false,
                overcurrent: false,
                watchdog_feeds: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // A poisoned lock means a test already panicked; propagating
        // the panic here is the right outcome.
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn front_end(&self) -> SimulatedFrontEnd {
        SimulatedFrontEnd { sim: self.clone() }
    }

    pub fn heater(&self, index: usize) -> SimulatedHeater {
        SimulatedHeater {
            sim: self.clone(),
            index: index.min(1),
        }
    }

    pub fn watchdog(&self) -> SimulatedWatchdog {
        SimulatedWatchdog { sim: self.clone() }
    }

    /// Closure polling the simulated overcurrent comparator.
    pub fn overcurrent_checker(&self) -> impl Fn() -> bool + Send + use<> {
        let sim = self.clone();
        move || sim.lock().overcurrent
    }

    /// Closure polling the simulated tool-rest switches.
    pub fn holder_checker(&self) -> impl Fn(usize) -> bool + Send + use<> {
        let sim = self.clone();
        move |index| sim.lock().plants[index.min(1)].in_holder
    }

    pub fn set_overcurrent(&self, asserted: bool) {
        self.lock().overcurrent = asserted;
    }

    pub fn set_tip_present(&self, index: usize, present: bool) {
        self.lock().plants[index.min(1)].tip_present = present;
    }

    pub fn set_in_holder(&self, index: usize, in_holder: bool) {
        self.lock().plants[index.min(1)].in_holder = in_holder;
    }

    pub fn set_temperature(&self, index: usize, temp_c: f32) {
        self.lock().plants[index.min(1)].temperature_c = temp_c;
    }

    pub fn temperature(&self, index: usize) -> f32 {
        self.lock().plants[index.min(1)].temperature_c
    }

    pub fn duty(&self, index: usize) -> u8 {
        self.lock().plants[index.min(1)].duty
    }

    pub fn watchdog_feeds(&self) -> u64 {
        self.lock().watchdog_feeds
    }
}

pub struct SimulatedFrontEnd {
    sim: Simulator,
}

impl FrontEnd for SimulatedFrontEnd {
    fn select(&mut self, tag_bits: u8) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.sim.lock().selected = tag_bits;
        Ok(())
    }

    fn start_conversion(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.sim.lock().conversion_pending = true;
        Ok(())
    }

    fn read_result(
        &mut self,
        _timeout: Duration,
    ) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        let mut state = self.sim.lock();
        if !state.conversion_pending {
            return Err(Box::new(HwError::Bus("no conversion started".into())));
        }
        state.conversion_pending = false;
        for plant in &mut state.plants {
            plant.step(STEP_S);
        }
        Ok(state.synthesize())
    }
}

pub struct SimulatedHeater {
    sim: Simulator,
    index: usize,
}

impl HeaterDrive for SimulatedHeater {
    fn set_duty(&mut self, percent: u8) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.sim.lock().plants[self.index].duty = percent.min(100);
        Ok(())
    }

    fn force_off(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.sim.lock().plants[self.index].duty = 0;
        Ok(())
    }
}

pub struct SimulatedWatchdog {
    sim: Simulator,
}

impl Watchdog for SimulatedWatchdog {
    fn feed(&mut self) {
        self.sim.lock().watchdog_feeds += 1;
    }
}
