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

//! Bioreactor configuration.
//!
//! Loaded from a JSON file; anything missing falls back to the defaults of
//! the bench rig (Raspberry Pi 5, peltier on GPIO 21/20, stirrer on 12, LED
//! on 25).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::components::Component;
use crate::controller::PidSettings;
use crate::drivers::k33;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BioreactorConfig {
    /// `error`, `warn`, `info`, `debug` or `trace`; `RUST_LOG` wins if set.
    pub log_level: String,
    /// Which components to bring up, keyed by component name.
    pub init_components: BTreeMap<String, bool>,
    /// I2C device node shared by the ADC and the CO2 sensor.
    pub i2c_device: String,
    /// Reorders the 1-Wire probes found on the bus; `None` keeps bus order.
    pub temp_sensor_order: Option<Vec<usize>>,
    pub peltier: PeltierConfig,
    pub stirrer: StirrerConfig,
    pub led: LedConfig,
    /// OD channel name -> ADS1115 input (`A0`..`A3`).
    pub od_adc_channels: BTreeMap<String, String>,
    pub co2: Co2Config,
    pub pid: PidSettings,
    /// Seconds between two PID invocations.
    pub pid_period_secs: f64,
    pub recording: RecordingConfig,
    pub light_cycle: Option<LightCycleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeltierConfig {
    pub pwm_pin: Option<u8>,
    pub dir_pin: Option<u8>,
    pub pwm_freq: f64, // Hz
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StirrerConfig {
    pub pwm_pin: Option<u8>,
    pub pwm_freq: f64,
    pub default_duty: f64, // %
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedConfig {
    pub pwm_pin: Option<u8>,
    pub pwm_freq: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Co2Config {
    pub i2c_address: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub period_secs: f64,
    /// LED power while sampling optical density (%).
    pub led_power: f64,
    pub averaging_secs: f64,
    pub data_out_file: String,
    /// Column header used for each reading key.
    pub sensor_labels: BTreeMap<String, String>,
}

/// LED on for `on_secs`, off for `off_secs`, repeating.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LightCycleConfig {
    pub power: f64,
    pub on_secs: f64,
    pub off_secs: f64,
    /// How often the cycle state is re-evaluated.
    pub check_period_secs: f64,
}

impl Default for PeltierConfig {
    fn default() -> Self {
        PeltierConfig {
            pwm_pin: Some(21),
            dir_pin: Some(20),
            pwm_freq: 1000.0,
        }
    }
}

impl Default for StirrerConfig {
    fn default() -> Self {
        StirrerConfig {
            pwm_pin: Some(12),
            pwm_freq: 1000.0,
            default_duty: 30.0,
        }
    }
}

impl Default for LedConfig {
    fn default() -> Self {
        LedConfig {
            pwm_pin: Some(25),
            pwm_freq: 500.0,
        }
    }
}

impl Default for Co2Config {
    fn default() -> Self {
        Co2Config {
            i2c_address: k33::DEFAULT_ADDRESS,
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        let labels = [
            ("temperature", "temperature_C"),
            ("od_135", "OD_135_V"),
            ("od_90", "OD_90_V"),
            ("od_ref", "OD_Ref_V"),
            ("co2", "CO2_ppm"),
            ("peltier_duty", "peltier_duty"),
            ("peltier_forward", "peltier_forward"),
        ];
        RecordingConfig {
            period_secs: 20.0,
            led_power: 15.0,
            averaging_secs: 0.5,
            data_out_file: "bioreactor_data.csv".into(),
            sensor_labels: labels
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl Default for LightCycleConfig {
    fn default() -> Self {
        LightCycleConfig {
            power: 20.0,
            on_secs: 43_200.0,
            off_secs: 43_200.0,
            check_period_secs: 1.0,
        }
    }
}

impl Default for BioreactorConfig {
    fn default() -> Self {
        let enabled = [
            Component::I2c,
            Component::TempSensor,
            Component::PeltierDriver,
            Component::Stirrer,
            Component::Led,
            Component::OpticalDensity,
            Component::Co2Sensor,
        ];
        let od = [("135", "A0"), ("Ref", "A1"), ("90", "A2")];
        BioreactorConfig {
            log_level: "info".into(),
            init_components: enabled
                .into_iter()
                .map(|c| (c.name().to_string(), true))
                .collect(),
            i2c_device: "/dev/i2c-1".into(),
            temp_sensor_order: None,
            peltier: PeltierConfig::default(),
            stirrer: StirrerConfig::default(),
            led: LedConfig::default(),
            od_adc_channels: od
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            co2: Co2Config::default(),
            pid: PidSettings::default(),
            pid_period_secs: 5.0,
            recording: RecordingConfig::default(),
            light_cycle: Some(LightCycleConfig::default()),
        }
    }
}

impl BioreactorConfig {
    /// Read and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: BioreactorConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn is_enabled(&self, component: Component) -> bool {
        self.init_components
            .get(component.name())
            .copied()
            .unwrap_or(false)
    }

    /// Reject values that would be unsafe or meaningless on the hardware.
    pub fn validate(&self) -> Result<()> {
        let pid = &self.pid;
        if !(0.0..=100.0).contains(&pid.max_duty) {
            return Err(Error::Config(format!(
                "pid.max_duty must be within 0..=100, got {}",
                pid.max_duty
            )));
        }
        if !(0.0..=1.0).contains(&pid.derivative_alpha) {
            return Err(Error::Config(format!(
                "pid.derivative_alpha must be within 0..=1, got {}",
                pid.derivative_alpha
            )));
        }
        for (name, value) in [
            ("pid.setpoint", pid.setpoint),
            ("pid.kp", pid.kp),
            ("pid.ki", pid.ki),
            ("pid.kd", pid.kd),
        ] {
            if !value.is_finite() {
                return Err(Error::Config(format!("{name} must be finite")));
            }
        }

        positive("pid_period_secs", self.pid_period_secs)?;
        positive("recording.period_secs", self.recording.period_secs)?;
        positive("peltier.pwm_freq", self.peltier.pwm_freq)?;
        positive("stirrer.pwm_freq", self.stirrer.pwm_freq)?;
        positive("led.pwm_freq", self.led.pwm_freq)?;
        percent("stirrer.default_duty", self.stirrer.default_duty)?;
        percent("recording.led_power", self.recording.led_power)?;
        if !(self.recording.averaging_secs >= 0.0) {
            return Err(Error::Config("recording.averaging_secs must be >= 0".into()));
        }

        if let Some(cycle) = &self.light_cycle {
            percent("light_cycle.power", cycle.power)?;
            positive("light_cycle.check_period_secs", cycle.check_period_secs)?;
            if !(cycle.on_secs >= 0.0 && cycle.off_secs >= 0.0) || cycle.on_secs + cycle.off_secs <= 0.0 {
                return Err(Error::Config(
                    "light_cycle on/off times must be >= 0 and not both zero".into(),
                ));
            }
        }

        if self.is_enabled(Component::OpticalDensity) {
            if self.od_adc_channels.is_empty() {
                return Err(Error::Config("No valid OD channels configured".into()));
            }
            for (name, pin) in &self.od_adc_channels {
                if !matches!(pin.as_str(), "A0" | "A1" | "A2" | "A3") {
                    return Err(Error::Config(format!(
                        "Invalid pin name {pin} for OD channel {name}"
                    )));
                }
            }
        }

        for key in self.init_components.keys() {
            if Component::from_name(key).is_none() {
                log::warn!("Unknown component '{key}' in init_components, ignored");
            }
        }
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(Error::Config(format!("{name} must be > 0, got {value}")))
    }
}

fn percent(name: &str, value: f64) -> Result<()> {
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::Config(format!("{name} must be within 0..=100, got {value}")))
    }
}
