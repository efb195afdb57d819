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

//! CSV log of sensor readings, one row per recording tick.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;

struct Column {
    key: String,
    label: String,
}

pub struct SensorRecorder<W: Write> {
    out: W,
    columns: Vec<Column>,
}

impl SensorRecorder<BufWriter<File>> {
    /// Create (truncate) `path` and write the header.
    pub fn create(
        path: impl AsRef<Path>,
        keys: &[String],
        labels: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let file = File::create(path)?;
        SensorRecorder::new(BufWriter::new(file), keys, labels)
    }
}

impl<W: Write> SensorRecorder<W> {
    /// Columns are `time` followed by `keys`, each headed by its label
    /// (or by the key itself when it has none).
    pub fn new(out: W, keys: &[String], labels: &BTreeMap<String, String>) -> Result<Self> {
        let columns = keys
            .iter()
            .map(|key| Column {
                key: key.clone(),
                label: labels.get(key).cloned().unwrap_or_else(|| key.clone()),
            })
            .collect();
        let mut recorder = SensorRecorder { out, columns };
        recorder.write_header()?;
        Ok(recorder)
    }

    fn write_header(&mut self) -> Result<()> {
        write!(self.out, "time")?;
        for col in &self.columns {
            write!(self.out, ",{}", col.label)?;
        }
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }

    /// Append one row. Readings for unknown keys are dropped; missing ones
    /// are written as `nan`.
    pub fn record(&mut self, time: f64, readings: &BTreeMap<String, f64>) -> Result<()> {
        write!(self.out, "{time:.3}")?;
        for col in &self.columns {
            match readings.get(&col.key) {
                Some(v) if v.is_finite() => write!(self.out, ",{v}")?,
                _ => write!(self.out, ",nan")?,
            }
        }
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
