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

//! Senseair K33 CO2 sensor over I2C.
//!
//! The sensor speaks a RAM-read command framed in the SMBus block format:
//! write `0x22 00 08 2A`, give it a moment, then read four bytes back from
//! register `0x22`. Bytes 2..4 hold the concentration in ppm, big endian.

use std::thread;
use std::time::Duration;

use embedded_hal::i2c::{Error as _, I2c};
use log::debug;

use crate::error::{Error, Result};
use crate::peripherals::Co2Sensor;

pub const DEFAULT_ADDRESS: u8 = 0x68;

const REG_READ_CO2: u8 = 0x22;
const CMD_READ_CO2: [u8; 3] = [0x00, 0x08, 0x2A];
const REPLY_LEN: usize = 4;

pub struct K33<I2C> {
    i2c: I2C,
    address: u8,
    delay: Duration,
    retries: u8,
}

impl<I2C: I2c> K33<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Self {
        K33 {
            i2c,
            address,
            delay: Duration::from_millis(50),
            retries: 3,
        }
    }

    /// Pause between command and reply, and between retries.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn read_co2_ppm(&mut self) -> Result<u16> {
        let mut last_error = String::new();
        for attempt in 1..=self.retries {
            match self.try_read() {
                Ok(ppm) => return Ok(ppm),
                Err(e) => {
                    debug!("K33 read attempt {attempt} failed: {e}");
                    last_error = e;
                    thread::sleep(self.delay);
                }
            }
        }
        Err(Error::Sensor(format!(
            "K33 I2C read failed after {} retries: {last_error}",
            self.retries
        )))
    }

    fn try_read(&mut self) -> std::result::Result<u16, String> {
        let mut frame = [0u8; 1 + CMD_READ_CO2.len()];
        frame[0] = REG_READ_CO2;
        frame[1..].copy_from_slice(&CMD_READ_CO2);
        self.i2c
            .write(self.address, &frame)
            .map_err(|e| format!("write: {:?}", e.kind()))?;

        thread::sleep(self.delay);

        let mut reply = [0u8; REPLY_LEN];
        self.i2c
            .write_read(self.address, &[REG_READ_CO2], &mut reply)
            .map_err(|e| format!("read: {:?}", e.kind()))?;
        Ok(u16::from_be_bytes([reply[2], reply[3]]))
    }
}

impl<I2C: I2c + Send> Co2Sensor for K33<I2C> {
    fn read_ppm(&mut self) -> Result<u16> {
        self.read_co2_ppm()
    }
}
