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

//! PID temperature controller for the peltier.
//!
//! One [`TemperatureController::step`] per scheduler tick: read the vessel
//! temperature, run the PID math with a low-pass filtered derivative, and
//! turn the signed output into a bounded duty cycle plus a heat/cool
//! direction.
//!
//! The integral is deliberately left unbounded. Saturation at `max_duty`
//! does not stop integration.

use std::time::{SystemTime, UNIX_EPOCH};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::components::Component;
use crate::error::Result;
use crate::peripherals::{ActuatorCommand, Direction, Peripherals};

/// Tuning and limits for the temperature loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidSettings {
    pub setpoint: f64,         // Target temperature (°C)
    pub kp: f64,               // Proportional gain
    pub ki: f64,               // Integral gain
    pub kd: f64,               // Derivative gain
    pub sensor_index: usize,   // Temperature probe used as feedback
    pub max_duty: f64,         // Hardware ceiling on peltier duty (%)
    pub derivative_alpha: f64, // Derivative low-pass coefficient, higher = smoother
}

impl Default for PidSettings {
    fn default() -> Self {
        PidSettings {
            setpoint: 25.0,
            kp: 12.0,
            ki: 0.015,
            kd: 0.0,
            sensor_index: 0,
            max_duty: 70.0,
            derivative_alpha: 0.7,
        }
    }
}

/// State carried from one invocation to the next.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControllerState {
    pub integral: f64,
    pub last_error: f64,
    pub last_derivative: f64,
    /// `None` until the first invocation.
    pub last_time: Option<f64>,
}

/// Optional per-call overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepInputs {
    /// Use this reading instead of asking the temperature probe.
    pub current_temp: Option<f64>,
    /// Explicit time step in seconds.
    ///
    /// A tiny but non-zero step (subnormal) makes the raw derivative
    /// infinite. With `kd == 0` the output then becomes NaN, and
    /// [`command_for`] maps a NaN output to `max_duty` in the cooling
    /// direction. Pass `None` or a realistic period.
    pub dt: Option<f64>,
    /// Timestamp in seconds since the run started; replaces the wall clock.
    pub elapsed: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// Temperature or error was NaN; state untouched, nothing commanded.
    Skipped { current_temp: f64 },
    Applied {
        error: f64,
        output: f64,
        duty: f64,
        command: ActuatorCommand,
        /// `false` when the peltier was unavailable and the command was dropped.
        actuated: bool,
    },
}

/// Signed PID output mapped onto the peltier.
pub fn command_for(output: f64, max_duty: f64) -> (f64, ActuatorCommand) {
    let duty = output.abs().min(max_duty).max(0.0);
    let direction = if output > 0.0 {
        Direction::Heat
    } else {
        Direction::Cool
    };
    if duty > 0.0 {
        (duty, ActuatorCommand::Drive { duty, direction })
    } else {
        (duty, ActuatorCommand::Stop)
    }
}

pub struct TemperatureController {
    pub settings: PidSettings,
    state: ControllerState,
}

impl TemperatureController {
    pub fn new(settings: PidSettings) -> Self {
        TemperatureController {
            settings,
            state: ControllerState::default(),
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Forget integral, derivative history and timing.
    pub fn reset(&mut self) {
        self.state = ControllerState::default();
    }

    /// Set a new temperature setpoint
    pub fn set_setpoint(&mut self, setpoint: f64) {
        self.settings.setpoint = setpoint;
    }

    /// Run one control cycle against `io`.
    ///
    /// Hardware errors from the probe or the driver are returned; controller
    /// state is already updated when a driver error surfaces.
    pub fn step<P: Peripherals + ?Sized>(
        &mut self,
        io: &P,
        inputs: StepInputs,
    ) -> Result<StepOutcome> {
        let s = self.settings;

        let current_temp = match inputs.current_temp {
            Some(t) => t,
            None => io.read_temperature(s.sensor_index)?,
        };
        let error = s.setpoint - current_temp;

        let now = inputs.elapsed.unwrap_or_else(wall_clock_secs);
        let dt = match (inputs.dt, self.state.last_time) {
            (Some(dt), _) => dt,
            (None, Some(last)) => now - last,
            (None, None) => 1.0,
        };
        self.state.last_time = Some(now);

        if error.is_nan() || current_temp.is_nan() {
            warn!(
                "Temperature PID: NaN detected, skipping update. setpoint={:.2}°C, current_temp={}",
                s.setpoint, current_temp
            );
            return Ok(StepOutcome::Skipped { current_temp });
        }

        self.state.integral += error * dt;

        let raw_derivative = if dt > 0.0 {
            (error - self.state.last_error) / dt
        } else {
            0.0
        };
        let derivative = s.derivative_alpha * self.state.last_derivative
            + (1.0 - s.derivative_alpha) * raw_derivative;
        self.state.last_derivative = derivative;

        let output = s.kp * error + s.ki * self.state.integral + s.kd * derivative;
        let (duty, command) = command_for(output, s.max_duty);
        self.state.last_error = error;

        let actuated = if io.is_component_initialized(Component::PeltierDriver) {
            let accepted = match command {
                ActuatorCommand::Drive { duty, direction } => io.set_peltier(duty, direction)?,
                ActuatorCommand::Stop => {
                    io.stop_peltier()?;
                    true
                }
            };
            if accepted {
                info!(
                    "Temperature PID: setpoint={:.2}°C, current={:.2}°C, error={:.2}°C, \
                     output={:.2}, duty={:.1}%, direction={}, integral={:.2}",
                    s.setpoint,
                    current_temp,
                    error,
                    output,
                    duty,
                    direction_label(command),
                    self.state.integral
                );
            } else {
                warn!("Peltier driver rejected command; PID controller cannot modulate temperature.");
            }
            accepted
        } else {
            warn!("Peltier driver not initialized; PID controller cannot modulate temperature.");
            false
        };

        Ok(StepOutcome::Applied {
            error,
            output,
            duty,
            command,
            actuated,
        })
    }
}

fn direction_label(command: ActuatorCommand) -> &'static str {
    match command {
        ActuatorCommand::Drive { direction, .. } => direction.as_str(),
        ActuatorCommand::Stop => "off",
    }
}

fn wall_clock_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}
