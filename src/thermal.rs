// MIT License
//
// Copyright (c) 2025 Ronan LE MEILLAT for SCTG Development
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Thermal model of the culture vessel, for simulation and tests.
//!
//! The peltier pumps heat in or out depending on its direction; the vessel
//! loses heat to the room through a single lumped coefficient.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::peripherals::{Direction, PeltierDriver, PeltierState, TemperatureProbes};

/// Thermal model for simulation
#[derive(Debug, Clone)]
pub struct ThermalSystem {
    temperature: f64,          // Current temperature (°C)
    pub ambient_temp: f64,     // Ambient temperature (°C)
    pub thermal_capacity: f64, // Thermal capacity (J/°C)
    pub heating_power: f64,    // Heat pumped in at 100% duty (W)
    pub cooling_power: f64,    // Heat pumped out at 100% duty (W)
    pub heat_loss_coeff: f64,  // Heat loss coefficient (W/°C)
}

impl ThermalSystem {
    pub fn new(
        initial_temp: f64,
        ambient_temp: f64,
        thermal_capacity: f64,
        heating_power: f64,
        cooling_power: f64,
        heat_loss_coeff: f64,
    ) -> Self {
        ThermalSystem {
            temperature: initial_temp,
            ambient_temp,
            thermal_capacity,
            heating_power,
            cooling_power,
            heat_loss_coeff,
        }
    }

    /// A 500 mL vessel on a 40 W peltier in a 21 °C room.
    pub fn bench_vessel(initial_temp: f64) -> Self {
        ThermalSystem::new(initial_temp, 21.0, 2100.0, 40.0, 25.0, 0.8)
    }

    /// Advance the model by `dt` seconds with the peltier in `state`.
    pub fn update(&mut self, state: PeltierState, dt: f64) {
        // Heat pumped by the peltier (J)
        let pumped = match state {
            PeltierState::Off => 0.0,
            PeltierState::On {
                duty,
                direction: Direction::Heat,
            } => self.heating_power * duty / 100.0 * dt,
            PeltierState::On {
                duty,
                direction: Direction::Cool,
            } => -self.cooling_power * duty / 100.0 * dt,
        };

        // Heat lost to environment (J)
        let heat_lost = self.heat_loss_coeff * (self.temperature - self.ambient_temp) * dt;

        self.temperature += (pumped - heat_lost) / self.thermal_capacity;
    }

    pub fn get_temperature(&self) -> f64 {
        self.temperature
    }
}

struct PlantInner {
    vessel: ThermalSystem,
    peltier: PeltierState,
    probe_online: bool,
}

/// Simulated hardware around a [`ThermalSystem`]: hands out a peltier driver
/// and a temperature probe that both act on the same vessel.
#[derive(Clone)]
pub struct SimulatedPlant {
    inner: Arc<Mutex<PlantInner>>,
}

impl SimulatedPlant {
    pub fn new(vessel: ThermalSystem) -> Self {
        SimulatedPlant {
            inner: Arc::new(Mutex::new(PlantInner {
                vessel,
                peltier: PeltierState::Off,
                probe_online: true,
            })),
        }
    }

    pub fn advance(&self, dt: f64) {
        let mut inner = self.inner.lock();
        let state = inner.peltier;
        inner.vessel.update(state, dt);
    }

    pub fn temperature(&self) -> f64 {
        self.inner.lock().vessel.get_temperature()
    }

    pub fn peltier(&self) -> PeltierState {
        self.inner.lock().peltier
    }

    /// Unplug (or re-plug) the probe; an offline probe reads NaN.
    pub fn set_probe_online(&self, online: bool) {
        self.inner.lock().probe_online = online;
    }

    pub fn peltier_driver(&self) -> Box<dyn PeltierDriver> {
        Box::new(SimPeltier(self.clone()))
    }

    pub fn probes(&self) -> Box<dyn TemperatureProbes> {
        Box::new(SimProbe(self.clone()))
    }
}

struct SimPeltier(SimulatedPlant);

impl PeltierDriver for SimPeltier {
    fn drive(&mut self, duty: f64, direction: Direction) -> Result<()> {
        self.0.inner.lock().peltier = PeltierState::On { duty, direction };
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.0.inner.lock().peltier = PeltierState::Off;
        Ok(())
    }
}

struct SimProbe(SimulatedPlant);

impl TemperatureProbes for SimProbe {
    fn count(&self) -> usize {
        1
    }

    fn read_celsius(&mut self, _index: usize) -> Result<f64> {
        let inner = self.0.inner.lock();
        Ok(if inner.probe_online {
            inner.vessel.get_temperature()
        } else {
            f64::NAN
        })
    }
}
