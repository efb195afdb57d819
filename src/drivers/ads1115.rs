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

//! Optical density photodiodes on an ADS1115 ADC.

use std::collections::BTreeMap;

use ads1x1x::{channel, ic, mode, Ads1x1x, FullScaleRange, TargetAddr};
use linux_embedded_hal::I2cdev;
use log::{info, warn};
use nb::block;

use crate::error::{Error, Result};
use crate::peripherals::AnalogInputs;

const REF_VOLTAGE: f64 = 4.096; // Full scale range (V)

type Adc = Ads1x1x<I2cdev, ic::Ads1115, ic::Resolution16Bit, mode::OneShot>;

#[derive(Debug, Clone, Copy)]
enum Input {
    A0,
    A1,
    A2,
    A3,
}

impl Input {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "A0" => Some(Input::A0),
            "A1" => Some(Input::A1),
            "A2" => Some(Input::A2),
            "A3" => Some(Input::A3),
            _ => None,
        }
    }
}

pub struct OdAdc {
    adc: Adc,
    channels: BTreeMap<String, Input>,
}

impl OdAdc {
    /// Open the ADC on `device` and map channel names onto inputs.
    pub fn open(device: &str, channel_map: &BTreeMap<String, String>) -> Result<Self> {
        let i2c = I2cdev::new(device).map_err(|e| Error::Init {
            component: "optical_density",
            reason: format!("{device}: {e}"),
        })?;
        let mut adc = Ads1x1x::new_ads1115(i2c, TargetAddr::default());
        adc.set_full_scale_range(FullScaleRange::Within4_096V)
            .map_err(|e| Error::Init {
                component: "optical_density",
                reason: format!("{e:?}"),
            })?;

        let mut channels = BTreeMap::new();
        for (name, pin) in channel_map {
            match Input::parse(pin) {
                Some(input) => {
                    info!("OD channel {name} initialized on {pin}");
                    channels.insert(name.clone(), input);
                }
                None => warn!("Invalid pin name {pin} for channel {name}, skipping"),
            }
        }
        if channels.is_empty() {
            return Err(Error::Init {
                component: "optical_density",
                reason: "No valid OD channels configured".into(),
            });
        }
        Ok(OdAdc { adc, channels })
    }
}

impl AnalogInputs for OdAdc {
    fn channels(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }

    fn read_voltage(&mut self, name: &str) -> Result<f64> {
        let input = *self
            .channels
            .get(name)
            .ok_or_else(|| Error::Sensor(format!("unknown OD channel '{name}'")))?;
        let raw = match input {
            Input::A0 => block!(self.adc.read(channel::SingleA0)),
            Input::A1 => block!(self.adc.read(channel::SingleA1)),
            Input::A2 => block!(self.adc.read(channel::SingleA2)),
            Input::A3 => block!(self.adc.read(channel::SingleA3)),
        }
        .map_err(|e| Error::Sensor(format!("ADS1115 read failed: {e:?}")))?;

        // ADS1115 is 16-bit signed, -32768 to +32767
        Ok(f64::from(raw) / 32768.0 * REF_VOLTAGE)
    }
}
