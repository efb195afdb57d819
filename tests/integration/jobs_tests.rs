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

//! The standard jobs on a real scheduler, against the simulated vessel.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::mock_hw::{ActuatorCall, MockPeripherals};

use bioreactor::controller::PidSettings;
use bioreactor::error::Result;
use bioreactor::jobs::{
    light_cycle_job, sensor_recording_job, temperature_pid_job, LightCycle, RecordingSettings,
};
use bioreactor::peripherals::{AnalogInputs, Bioreactor, Direction, PwmOutput};
use bioreactor::recorder::SensorRecorder;
use bioreactor::scheduler::{Period, RunFor, Scheduler};
use bioreactor::thermal::{SimulatedPlant, ThermalSystem};
use parking_lot::Mutex;

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedBuf {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

#[derive(Clone, Default)]
struct RecordingPwm(Arc<Mutex<Vec<f64>>>);

impl PwmOutput for RecordingPwm {
    fn set_duty(&mut self, duty: f64) -> Result<()> {
        self.0.lock().push(duty);
        Ok(())
    }
}

struct ConstantAdc(f64);

impl AnalogInputs for ConstantAdc {
    fn channels(&self) -> Vec<String> {
        vec!["90".into(), "Ref".into()]
    }

    fn read_voltage(&mut self, _channel: &str) -> Result<f64> {
        Ok(self.0)
    }
}

#[test]
fn pid_job_drives_peltier_on_schedule() {
    let io = Arc::new(MockPeripherals::new(25.0));
    let scheduler = Scheduler::new();
    let settings = PidSettings {
        setpoint: 30.0,
        ..PidSettings::default()
    };
    scheduler
        .run(vec![temperature_pid_job(
            io.clone(),
            settings,
            Period::Every(Duration::from_millis(20)),
            RunFor::Indefinitely,
        )])
        .unwrap();
    thread::sleep(Duration::from_millis(200));
    scheduler.stop(Duration::from_secs(2));

    let calls = io.calls();
    assert!(calls.len() >= 3);
    assert!(calls.iter().all(|c| matches!(
        c,
        ActuatorCall::SetPeltier {
            direction: Direction::Heat,
            ..
        }
    )));
}

#[test]
fn recording_job_writes_csv_rows() {
    let plant = SimulatedPlant::new(ThermalSystem::bench_vessel(24.0));
    let led = RecordingPwm::default();
    let reactor = Arc::new(
        Bioreactor::builder()
            .temperature_probes(Ok(plant.probes()))
            .peltier(Ok(plant.peltier_driver()))
            .led(Ok(Box::new(led.clone())))
            .optical_density(Ok(Box::new(ConstantAdc(0.5))))
            .build(),
    );
    let settings = RecordingSettings {
        sensor_index: 0,
        led_power: 15.0,
        averaging: Duration::ZERO,
        od_channels: vec!["90".into(), "Ref".into()],
    };
    let labels: BTreeMap<String, String> = [("temperature", "temperature_C")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let out = SharedBuf::default();
    let recorder = SensorRecorder::new(out.clone(), &settings.keys(), &labels).unwrap();

    let scheduler = Scheduler::new();
    scheduler
        .run(vec![sensor_recording_job(
            reactor,
            recorder,
            settings,
            Period::Every(Duration::from_millis(20)),
            RunFor::For(Duration::from_millis(70)),
        )])
        .unwrap();
    thread::sleep(Duration::from_millis(200));
    scheduler.stop(Duration::from_secs(2));

    let text = out.text();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("time,temperature_C,od_90,od_ref,co2,peltier_duty,peltier_forward")
    );
    let rows: Vec<&str> = lines.collect();
    assert!(!rows.is_empty());
    for row in rows {
        let fields: Vec<&str> = row.split(',').collect();
        assert_eq!(&fields[1..], ["24", "0.5", "0.5", "nan", "0", "0"]);
    }
    // Every OD sample pulses the LED and puts it back.
    let duties = led.0.lock().clone();
    assert!(duties.chunks(2).all(|pair| pair == [15.0, 0.0]));
}

#[test]
fn light_cycle_switches_only_on_transitions() {
    let led = RecordingPwm::default();
    let reactor = Arc::new(Bioreactor::builder().led(Ok(Box::new(led.clone()))).build());
    let cycle = LightCycle {
        power: 20.0,
        on: Duration::from_millis(100),
        off: Duration::from_millis(100),
    };

    let scheduler = Scheduler::new();
    scheduler
        .run(vec![light_cycle_job(
            reactor.clone(),
            cycle,
            Period::Every(Duration::from_millis(10)),
            RunFor::For(Duration::from_millis(150)),
        )])
        .unwrap();
    thread::sleep(Duration::from_millis(300));
    scheduler.stop(Duration::from_secs(2));

    assert_eq!(*led.0.lock(), vec![20.0, 0.0]);
    assert_eq!(reactor.led_duty(), 0.0);
}
