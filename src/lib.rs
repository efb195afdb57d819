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

//! Bioreactor temperature control.
//!
//! A PID loop drives a peltier through an H-bridge to hold the culture at a
//! setpoint, alongside sensor recording and a light cycle. All of it runs as
//! periodic jobs on a small thread-per-job [`scheduler::Scheduler`].
//!
//! Hardware drivers for the Raspberry Pi live behind the `rpi` feature; the
//! [`thermal`] module provides a simulated vessel for everything else.

pub mod components;
pub mod config;
pub mod controller;
pub mod drivers;
pub mod error;
pub mod jobs;
pub mod peripherals;
pub mod recorder;
pub mod scheduler;
pub mod thermal;

pub use crate::components::{Component, ComponentRegistry, ComponentStatus};
pub use crate::config::BioreactorConfig;
pub use crate::controller::{PidSettings, StepInputs, StepOutcome, TemperatureController};
pub use crate::error::{Error, Result};
pub use crate::peripherals::{ActuatorCommand, Bioreactor, Direction, PeltierState, Peripherals};
pub use crate::scheduler::{Job, JobContext, Period, RunFor, Scheduler, StopReport};
pub use crate::thermal::{SimulatedPlant, ThermalSystem};
