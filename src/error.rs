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

//! Error type shared by the peripheral drivers, the component registry and
//! the configuration loader.
//!
//! Job actions return `anyhow::Result`, so any of these converts straight
//! into the scheduler boundary with `?`.

use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Configuration file missing, unparsable or out of range.
    Config(String),
    /// A component failed to come up (missing pin, bus not present...).
    Init { component: &'static str, reason: String },
    /// Operating-system level I/O failure (sysfs, CSV file, device node).
    Io(std::io::Error),
    /// A sensor returned an error or an implausible frame.
    Sensor(String),
    /// An actuator rejected a command at the hardware level.
    Actuator(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration: {msg}"),
            Self::Init { component, reason } => {
                write!(f, "{component} initialization failed: {reason}")
            }
            Self::Io(e) => write!(f, "I/O: {e}"),
            Self::Sensor(msg) => write!(f, "sensor: {msg}"),
            Self::Actuator(msg) => write!(f, "actuator: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
