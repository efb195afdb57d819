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

//! Scheduler jobs: temperature regulation, sensor recording and the light
//! cycle.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::config::{BioreactorConfig, LightCycleConfig};
use crate::controller::{PidSettings, StepInputs, TemperatureController};
use crate::error::Result;
use crate::peripherals::{Bioreactor, PeltierState, Peripherals};
use crate::recorder::SensorRecorder;
use crate::scheduler::{Job, Period, RunFor};

/// PID loop as a job. The controller, and with it the loop state, is owned
/// by the job's closure.
pub fn temperature_pid_job<P>(io: Arc<P>, settings: PidSettings, period: Period, run_for: RunFor) -> Job
where
    P: Peripherals + Send + Sync + 'static,
{
    let mut controller = TemperatureController::new(settings);
    Job::new("temperature_pid", period, run_for, move |ctx| {
        let inputs = StepInputs {
            elapsed: Some(ctx.elapsed.as_secs_f64()),
            ..StepInputs::default()
        };
        controller.step(io.as_ref(), inputs)?;
        Ok(())
    })
}

/// How the recording job samples the sensors.
#[derive(Debug, Clone)]
pub struct RecordingSettings {
    pub sensor_index: usize,
    pub led_power: f64,
    pub averaging: Duration,
    pub od_channels: Vec<String>,
}

impl RecordingSettings {
    pub fn from_config(config: &BioreactorConfig) -> Self {
        RecordingSettings {
            sensor_index: config.pid.sensor_index,
            led_power: config.recording.led_power,
            averaging: Duration::from_secs_f64(config.recording.averaging_secs),
            od_channels: config.od_adc_channels.keys().cloned().collect(),
        }
    }

    /// Reading keys in CSV column order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = vec!["temperature".to_string()];
        keys.extend(self.od_channels.iter().map(|ch| od_key(ch)));
        keys.extend(["co2", "peltier_duty", "peltier_forward"].map(String::from));
        keys
    }
}

fn od_key(channel: &str) -> String {
    format!("od_{}", channel.to_lowercase())
}

/// Read every sensor once. Each reading degrades to NaN on its own; a broken
/// CO2 sensor does not cost the temperature column.
pub fn measure_sensors(reactor: &Bioreactor, settings: &RecordingSettings) -> BTreeMap<String, f64> {
    let mut readings = BTreeMap::new();

    let temperature = reactor
        .read_temperature(settings.sensor_index)
        .unwrap_or_else(|e| {
            warn!("Temperature read failed: {e}");
            f64::NAN
        });
    readings.insert("temperature".to_string(), temperature);

    let od = match reactor.measure_od(settings.led_power, settings.averaging) {
        Ok(Some(values)) => values,
        Ok(None) => {
            // No LED: fall back to dark single reads if the ADC is there.
            let mut values = BTreeMap::new();
            for ch in &settings.od_channels {
                match reactor.read_od_channel(ch) {
                    Ok(Some(v)) => {
                        values.insert(ch.clone(), v);
                    }
                    Ok(None) => break,
                    Err(e) => warn!("OD channel {ch} read failed: {e}"),
                }
            }
            values
        }
        Err(e) => {
            warn!("OD measurement failed: {e}");
            BTreeMap::new()
        }
    };
    for ch in &settings.od_channels {
        let v = od.get(ch).copied().unwrap_or(f64::NAN);
        readings.insert(od_key(ch), v);
    }

    let co2 = match reactor.read_co2_ppm() {
        Ok(Some(ppm)) => f64::from(ppm),
        Ok(None) => f64::NAN,
        Err(e) => {
            warn!("CO2 read failed: {e}");
            f64::NAN
        }
    };
    readings.insert("co2".to_string(), co2);

    let peltier = reactor.peltier_state();
    let forward = matches!(peltier, PeltierState::On { direction, .. } if direction.is_forward());
    readings.insert("peltier_duty".to_string(), peltier.duty());
    readings.insert("peltier_forward".to_string(), if forward { 1.0 } else { 0.0 });
    readings
}

fn summary(readings: &BTreeMap<String, f64>) -> String {
    let mut line = format!(
        "Sensor readings - Temp: {:.2}°C",
        readings.get("temperature").copied().unwrap_or(f64::NAN)
    );
    for (key, v) in readings.iter().filter(|(k, _)| k.starts_with("od_")) {
        line.push_str(&format!(", OD {}: {v:.4}V", &key[3..]));
    }
    if let Some(co2) = readings.get("co2") {
        line.push_str(&format!(", CO2: {co2:.0} ppm"));
    }
    line
}

/// Measure all sensors and append a row to `recorder` on every tick.
pub fn sensor_recording_job<W>(
    reactor: Arc<Bioreactor>,
    mut recorder: SensorRecorder<W>,
    settings: RecordingSettings,
    period: Period,
    run_for: RunFor,
) -> Job
where
    W: Write + Send + 'static,
{
    Job::new("sensor_recording", period, run_for, move |ctx| {
        let readings = measure_sensors(&reactor, &settings);
        recorder.record(ctx.elapsed.as_secs_f64(), &readings)?;
        info!("{}", summary(&readings));
        Ok(())
    })
}

/// Repeating on/off light schedule.
#[derive(Debug, Clone)]
pub struct LightCycle {
    pub power: f64,
    pub on: Duration,
    pub off: Duration,
}

impl LightCycle {
    pub fn from_config(config: &LightCycleConfig) -> Self {
        LightCycle {
            power: config.power,
            on: Duration::from_secs_f64(config.on_secs),
            off: Duration::from_secs_f64(config.off_secs),
        }
    }

    /// Whether the light should be on `since_start` into the schedule.
    pub fn is_on_at(&self, since_start: Duration) -> bool {
        let cycle = (self.on + self.off).as_secs_f64();
        if cycle <= 0.0 {
            return false;
        }
        since_start.as_secs_f64() % cycle < self.on.as_secs_f64()
    }
}

/// Drive the LED through `cycle`, switching only on transitions.
pub fn light_cycle_job(reactor: Arc<Bioreactor>, cycle: LightCycle, period: Period, run_for: RunFor) -> Job {
    let mut started: Option<Duration> = None;
    let mut lit: Option<bool> = None;
    Job::new("light_cycle", period, run_for, move |ctx| {
        let start = *started.get_or_insert(ctx.elapsed);
        let on = cycle.is_on_at(ctx.elapsed.saturating_sub(start));
        if lit != Some(on) {
            let power = if on { cycle.power } else { 0.0 };
            reactor.set_led(power)?;
            info!("Light cycle: LED {} ({power:.1}%)", if on { "on" } else { "off" });
            lit = Some(on);
        }
        Ok(())
    })
}

/// Jobs for a normal run: PID loop, sensor recording and, if configured,
/// the light cycle.
pub fn standard_jobs(reactor: Arc<Bioreactor>, config: &BioreactorConfig) -> Result<Vec<Job>> {
    let settings = RecordingSettings::from_config(config);
    let recorder = SensorRecorder::create(
        &config.recording.data_out_file,
        &settings.keys(),
        &config.recording.sensor_labels,
    )?;

    let mut jobs = vec![
        sensor_recording_job(
            reactor.clone(),
            recorder,
            settings,
            Period::secs(config.recording.period_secs),
            RunFor::Indefinitely,
        ),
        temperature_pid_job(
            reactor.clone(),
            config.pid,
            Period::secs(config.pid_period_secs),
            RunFor::Indefinitely,
        ),
    ];
    if let Some(cycle) = &config.light_cycle {
        jobs.push(light_cycle_job(
            reactor,
            LightCycle::from_config(cycle),
            Period::secs(cycle.check_period_secs),
            RunFor::Indefinitely,
        ));
    }
    Ok(jobs)
}
