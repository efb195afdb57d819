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

//! Hardware drivers.
//!
//! The 1-Wire and CO2 drivers build anywhere; everything that touches the
//! GPIO header or the ADC needs the `rpi` feature.

pub mod ds18b20;
pub mod k33;

#[cfg(feature = "rpi")]
pub mod ads1115;
#[cfg(feature = "rpi")]
pub mod pwm;

#[cfg(feature = "rpi")]
pub use self::rpi::init_bioreactor;

#[cfg(feature = "rpi")]
mod rpi {
    use std::path::Path;

    use linux_embedded_hal::I2cdev;
    use rppal::gpio::Gpio;

    use super::ads1115::OdAdc;
    use super::ds18b20::{Ds18b20Bank, W1_DEVICES};
    use super::k33::K33;
    use super::pwm::{HBridgePeltier, PwmPin};
    use crate::components::Component;
    use crate::config::BioreactorConfig;
    use crate::error::{Error, Result};
    use crate::peripherals::{
        AnalogInputs, Bioreactor, BioreactorBuilder, Co2Sensor, PeltierDriver, PwmOutput,
        TemperatureProbes,
    };

    fn missing_pin(component: &'static str, what: &str) -> Error {
        Error::Init {
            component,
            reason: format!("{what} must be set in the configuration"),
        }
    }

    /// Bring up every component enabled in `config`. Failures are recorded in
    /// the registry and leave that capability unavailable.
    pub fn init_bioreactor(config: &BioreactorConfig) -> Bioreactor {
        let mut builder = Bioreactor::builder();
        let gpio = Gpio::new().map_err(|e| e.to_string());

        let i2c_ok = if config.is_enabled(Component::I2c) {
            let probe = if Path::new(&config.i2c_device).exists() {
                Ok(())
            } else {
                Err(Error::Init {
                    component: "i2c",
                    reason: format!("{} not present", config.i2c_device),
                })
            };
            let ok = probe.is_ok();
            builder = builder.mark(Component::I2c, probe);
            ok
        } else {
            builder = builder.disabled(Component::I2c);
            false
        };

        builder = enable(builder, config, Component::TempSensor, |b| {
            let probes = Ds18b20Bank::discover(W1_DEVICES, config.temp_sensor_order.as_deref())
                .map(|bank| Box::new(bank) as Box<dyn TemperatureProbes>);
            b.temperature_probes(probes)
        });

        builder = enable(builder, config, Component::PeltierDriver, |b| {
            let driver = (|| -> Result<Box<dyn PeltierDriver>> {
                let c = &config.peltier;
                let pwm = c.pwm_pin.ok_or_else(|| missing_pin("peltier_driver", "peltier.pwm_pin"))?;
                let dir = c.dir_pin.ok_or_else(|| missing_pin("peltier_driver", "peltier.dir_pin"))?;
                let gpio = gpio.as_ref().map_err(|e| Error::Actuator(e.clone()))?;
                let driver = HBridgePeltier::claim(gpio, pwm, dir, c.pwm_freq)?;
                Ok(Box::new(driver) as Box<dyn PeltierDriver>)
            })();
            b.peltier(driver)
        });

        builder = enable(builder, config, Component::Stirrer, |b| {
            let driver = (|| -> Result<Box<dyn PwmOutput>> {
                let c = &config.stirrer;
                let pin = c.pwm_pin.ok_or_else(|| missing_pin("stirrer", "stirrer.pwm_pin"))?;
                let gpio = gpio.as_ref().map_err(|e| Error::Actuator(e.clone()))?;
                Ok(Box::new(PwmPin::claim(gpio, pin, c.pwm_freq)?) as Box<dyn PwmOutput>)
            })();
            b.stirrer(driver)
        });

        builder = enable(builder, config, Component::Led, |b| {
            let driver = (|| -> Result<Box<dyn PwmOutput>> {
                let c = &config.led;
                let pin = c.pwm_pin.ok_or_else(|| missing_pin("led", "led.pwm_pin"))?;
                let gpio = gpio.as_ref().map_err(|e| Error::Actuator(e.clone()))?;
                Ok(Box::new(PwmPin::claim(gpio, pin, c.pwm_freq)?) as Box<dyn PwmOutput>)
            })();
            b.led(driver)
        });

        builder = enable(builder, config, Component::OpticalDensity, |b| {
            let adc: Result<Box<dyn AnalogInputs>> = if i2c_ok {
                OdAdc::open(&config.i2c_device, &config.od_adc_channels)
                    .map(|adc| Box::new(adc) as Box<dyn AnalogInputs>)
            } else {
                Err(Error::Init {
                    component: "optical_density",
                    reason: "I2C initialization required for optical density sensor".into(),
                })
            };
            b.optical_density(adc)
        });

        builder = enable(builder, config, Component::Co2Sensor, |b| {
            let sensor: Result<Box<dyn Co2Sensor>> = if i2c_ok {
                I2cdev::new(&config.i2c_device)
                    .map(|i2c| Box::new(K33::new(i2c, config.co2.i2c_address)) as Box<dyn Co2Sensor>)
                    .map_err(|e| Error::Init {
                        component: "co2_sensor",
                        reason: e.to_string(),
                    })
            } else {
                Err(Error::Init {
                    component: "co2_sensor",
                    reason: "I2C initialization required for CO2 sensor".into(),
                })
            };
            b.co2_sensor(sensor)
        });

        builder.build()
    }

    fn enable<F>(
        builder: BioreactorBuilder,
        config: &BioreactorConfig,
        component: Component,
        init: F,
    ) -> BioreactorBuilder
    where
        F: FnOnce(BioreactorBuilder) -> BioreactorBuilder,
    {
        if config.is_enabled(component) {
            init(builder)
        } else {
            builder.disabled(component)
        }
    }
}
