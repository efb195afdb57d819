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

//! Component registry.
//!
//! Tracks which pieces of hardware came up at start-up. Anything that failed
//! or was disabled in the configuration is reported as unavailable, and the
//! control loop degrades around it instead of stopping.

use std::collections::BTreeMap;
use std::fmt;

use log::{error, info};

/// Hardware components the bioreactor knows how to bring up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Component {
    I2c,
    TempSensor,
    PeltierDriver,
    Stirrer,
    Led,
    OpticalDensity,
    Co2Sensor,
}

impl Component {
    pub const ALL: [Component; 7] = [
        Component::I2c,
        Component::TempSensor,
        Component::PeltierDriver,
        Component::Stirrer,
        Component::Led,
        Component::OpticalDensity,
        Component::Co2Sensor,
    ];

    /// Configuration key, as used by `init_components`.
    pub fn name(self) -> &'static str {
        match self {
            Component::I2c => "i2c",
            Component::TempSensor => "temp_sensor",
            Component::PeltierDriver => "peltier_driver",
            Component::Stirrer => "stirrer",
            Component::Led => "led",
            Component::OpticalDensity => "optical_density",
            Component::Co2Sensor => "co2_sensor",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentStatus {
    Initialized,
    Failed(String),
    Disabled,
}

#[derive(Debug, Default, Clone)]
pub struct ComponentRegistry {
    status: BTreeMap<Component, ComponentStatus>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_initialized(&mut self, component: Component) {
        info!("{component} initialized");
        self.status.insert(component, ComponentStatus::Initialized);
    }

    pub fn mark_failed(&mut self, component: Component, reason: impl Into<String>) {
        let reason = reason.into();
        error!("{component} initialization failed: {reason}");
        self.status.insert(component, ComponentStatus::Failed(reason));
    }

    pub fn mark_disabled(&mut self, component: Component) {
        self.status.insert(component, ComponentStatus::Disabled);
    }

    /// Record the outcome of an init function.
    pub fn record<T, E: fmt::Display>(
        &mut self,
        component: Component,
        result: Result<T, E>,
    ) -> Option<T> {
        match result {
            Ok(value) => {
                self.mark_initialized(component);
                Some(value)
            }
            Err(e) => {
                self.mark_failed(component, e.to_string());
                None
            }
        }
    }

    pub fn is_initialized(&self, component: Component) -> bool {
        matches!(self.status.get(&component), Some(ComponentStatus::Initialized))
    }

    pub fn status(&self, component: Component) -> Option<&ComponentStatus> {
        self.status.get(&component)
    }

    /// Components that were requested but failed, with the reason.
    pub fn failures(&self) -> impl Iterator<Item = (Component, &str)> {
        self.status.iter().filter_map(|(c, s)| match s {
            ComponentStatus::Failed(reason) => Some((*c, reason.as_str())),
            _ => None,
        })
    }
}
