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

//! DS18B20 1-Wire temperature probes through the kernel's `w1_therm` sysfs
//! interface (`/sys/bus/w1/devices/28-*/w1_slave`).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::info;

use crate::error::{Error, Result};
use crate::peripherals::TemperatureProbes;

pub const W1_DEVICES: &str = "/sys/bus/w1/devices";

/// DS18B20 family code prefix in the 1-Wire device name.
const FAMILY_PREFIX: &str = "28-";

pub struct Ds18b20Bank {
    devices: Vec<PathBuf>,
}

impl Ds18b20Bank {
    /// Find every DS18B20 under `root`, sorted by device id, then apply
    /// `order` (indices into the sorted list) if given.
    pub fn discover(root: impl AsRef<Path>, order: Option<&[usize]>) -> Result<Self> {
        let mut found: Vec<PathBuf> = fs::read_dir(root.as_ref())?
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|n| n.starts_with(FAMILY_PREFIX))
            })
            .map(|entry| entry.path().join("w1_slave"))
            .collect();
        found.sort();

        if found.is_empty() {
            return Err(Error::Init {
                component: "temp_sensor",
                reason: format!("no DS18B20 found under {}", root.as_ref().display()),
            });
        }

        let devices = match order {
            Some(order) => order
                .iter()
                .map(|&i| {
                    found.get(i).cloned().ok_or_else(|| Error::Init {
                        component: "temp_sensor",
                        reason: format!("sensor order index {i} out of range ({} found)", found.len()),
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            None => found,
        };
        info!("DS18B20 temperature sensors initialized ({} sensors)", devices.len());
        Ok(Ds18b20Bank { devices })
    }
}

impl TemperatureProbes for Ds18b20Bank {
    fn count(&self) -> usize {
        self.devices.len()
    }

    fn read_celsius(&mut self, index: usize) -> Result<f64> {
        let path = self
            .devices
            .get(index)
            .ok_or_else(|| Error::Sensor(format!("no DS18B20 at index {index}")))?;
        let text = fs::read_to_string(path).map_err(|e| {
            if unplugged(&e) {
                Error::Sensor(format!("{} disappeared: {e}", path.display()))
            } else {
                Error::Io(e)
            }
        })?;
        parse_w1_slave(&text)
    }
}

const ENODEV: i32 = 19;

/// The kernel removes the device directory when a probe drops off the bus,
/// or answers ENODEV while it is going away.
fn unplugged(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::NotFound || e.raw_os_error() == Some(ENODEV)
}

/// Parse the two-line `w1_slave` report:
///
/// ```text
/// 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
/// 72 01 4b 46 7f ff 0e 10 57 t=23125
/// ```
pub fn parse_w1_slave(text: &str) -> Result<f64> {
    let mut lines = text.lines();
    let crc_line = lines
        .next()
        .ok_or_else(|| Error::Sensor("empty w1_slave report".into()))?;
    if !crc_line.trim_end().ends_with("YES") {
        return Err(Error::Sensor("CRC check failed".into()));
    }
    let milli = lines
        .next()
        .and_then(|line| line.rsplit_once("t="))
        .and_then(|(_, t)| t.trim().parse::<i32>().ok())
        .ok_or_else(|| Error::Sensor("no temperature in w1_slave report".into()))?;
    Ok(f64::from(milli) / 1000.0)
}
