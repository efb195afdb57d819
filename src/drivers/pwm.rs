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

//! Software PWM outputs on the Raspberry Pi GPIO header (rppal).
//!
//! The peltier sits behind an H-bridge: one PWM pin for power and one DIR
//! pin for the current direction. Stirrer and LED are plain PWM pins.

use rppal::gpio::{Gpio, OutputPin};

use crate::error::{Error, Result};
use crate::peripherals::{Direction, PeltierDriver, PwmOutput};

fn gpio_error(e: rppal::gpio::Error) -> Error {
    Error::Actuator(e.to_string())
}

pub struct PwmPin {
    pin: OutputPin,
    frequency: f64, // Hz
}

impl PwmPin {
    /// Claim `bcm` as an output, low, with PWM running at 0 % duty.
    pub fn claim(gpio: &Gpio, bcm: u8, frequency: f64) -> Result<Self> {
        let mut pin = gpio.get(bcm).map_err(gpio_error)?.into_output_low();
        pin.set_pwm_frequency(frequency, 0.0).map_err(gpio_error)?;
        Ok(PwmPin { pin, frequency })
    }
}

impl PwmOutput for PwmPin {
    fn set_duty(&mut self, duty: f64) -> Result<()> {
        self.pin
            .set_pwm_frequency(self.frequency, (duty / 100.0).clamp(0.0, 1.0))
            .map_err(gpio_error)
    }
}

pub struct HBridgePeltier {
    pwm: PwmPin,
    dir: OutputPin,
}

impl HBridgePeltier {
    pub fn claim(gpio: &Gpio, pwm_bcm: u8, dir_bcm: u8, frequency: f64) -> Result<Self> {
        let dir = gpio.get(dir_bcm).map_err(gpio_error)?.into_output_low();
        let pwm = PwmPin::claim(gpio, pwm_bcm, frequency)?;
        Ok(HBridgePeltier { pwm, dir })
    }
}

impl PeltierDriver for HBridgePeltier {
    fn drive(&mut self, duty: f64, direction: Direction) -> Result<()> {
        // Never reverse the bridge while current is flowing.
        let forward = direction.is_forward();
        if self.dir.is_set_high() != forward {
            self.pwm.set_duty(0.0)?;
            if forward {
                self.dir.set_high();
            } else {
                self.dir.set_low();
            }
        }
        self.pwm.set_duty(duty)
    }

    fn stop(&mut self) -> Result<()> {
        self.pwm.set_duty(0.0)?;
        self.dir.set_low();
        Ok(())
    }
}
