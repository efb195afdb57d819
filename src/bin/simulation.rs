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

//! Bioreactor temperature loop against a simulated vessel.
//!
//! `bioreactor-simulation [setpoint] [hours]` steps the PID loop through
//! simulated time and prints a table, as fast as the CPU allows.
//!
//! `bioreactor-simulation --live [seconds]` runs the real job set on the
//! scheduler in wall-clock time instead, with the plant advancing in the
//! background. Ctrl+C stops it early.

use std::env;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use bioreactor::controller::{PidSettings, StepInputs, StepOutcome, TemperatureController};
use bioreactor::jobs::{sensor_recording_job, temperature_pid_job, RecordingSettings};
use bioreactor::peripherals::Bioreactor;
use bioreactor::recorder::SensorRecorder;
use bioreactor::scheduler::{Job, Period, RunFor, Scheduler, DEFAULT_STOP_TIMEOUT};
use bioreactor::thermal::{SimulatedPlant, ThermalSystem};
use log::info;

const INITIAL_TEMP: f64 = 21.0; // °C
const DT: f64 = 5.0; // Controller period (s)

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("--live") => {
            init_logging("info");
            let seconds = parse_arg(args.get(1), 60.0).context("invalid duration")?;
            live(Duration::from_secs_f64(seconds))
        }
        _ => {
            // Per-tick PID lines would drown the table.
            init_logging("warn");
            let setpoint = parse_arg(args.first(), 30.0).context("invalid setpoint")?;
            let hours = parse_arg(args.get(1), 4.0).context("invalid duration")?;
            offline(setpoint, hours)
        }
    }
}

fn init_logging(default: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn parse_arg(arg: Option<&String>, default: f64) -> anyhow::Result<f64> {
    let value = match arg {
        Some(s) => s.parse::<f64>()?,
        None => default,
    };
    if !value.is_finite() || value < 0.0 {
        bail!("expected a non-negative number, got {value}");
    }
    Ok(value)
}

fn offline(setpoint: f64, hours: f64) -> anyhow::Result<()> {
    let plant = SimulatedPlant::new(ThermalSystem::bench_vessel(INITIAL_TEMP));
    let reactor = Bioreactor::builder()
        .temperature_probes(Ok(plant.probes()))
        .peltier(Ok(plant.peltier_driver()))
        .build();

    let mut controller = TemperatureController::new(PidSettings {
        setpoint,
        ..PidSettings::default()
    });

    println!("Simulating {hours} h at setpoint {setpoint}°C");
    println!("Time(s) | Temperature(°C) | Output  | Duty(%)");
    println!("--------|-----------------|---------|--------");

    let steps = (hours * 3600.0 / DT) as u64;
    let mut peak = f64::MIN;
    for step in 0..=steps {
        let outcome = controller.step(
            &reactor,
            StepInputs {
                dt: Some(DT),
                ..StepInputs::default()
            },
        )?;
        let temperature = plant.temperature();
        peak = peak.max(temperature);
        if step % 120 == 0 {
            if let StepOutcome::Applied { output, duty, .. } = outcome {
                println!(
                    "{:7.0} | {:15.2} | {:7.2} | {:6.1}",
                    step as f64 * DT,
                    temperature,
                    output,
                    duty
                );
            }
        }
        plant.advance(DT);
    }

    println!();
    println!("Final temperature: {:.2}°C", plant.temperature());
    println!("Peak temperature:  {:.2}°C", peak);
    println!("Integral term:     {:.1}", controller.state().integral);
    Ok(())
}

fn live(duration: Duration) -> anyhow::Result<()> {
    let plant = SimulatedPlant::new(ThermalSystem::bench_vessel(INITIAL_TEMP));
    let reactor = Arc::new(
        Bioreactor::builder()
            .temperature_probes(Ok(plant.probes()))
            .peltier(Ok(plant.peltier_driver()))
            .build(),
    );

    let settings = RecordingSettings {
        sensor_index: 0,
        led_power: 0.0,
        averaging: Duration::ZERO,
        od_channels: Vec::new(),
    };
    let recorder = SensorRecorder::new(std::io::sink(), &settings.keys(), &Default::default())?;

    let scheduler = Arc::new(Scheduler::new());
    {
        let reactor = reactor.clone();
        scheduler.on_shutdown(move || reactor.shutdown());
    }

    let mut last = Instant::now();
    let plant_job = Job::new("plant", Period::secs(0.5), RunFor::For(duration), move |_| {
        let now = Instant::now();
        plant.advance((now - last).as_secs_f64());
        last = now;
        Ok(())
    });
    let pid = PidSettings {
        setpoint: 30.0,
        ..PidSettings::default()
    };
    scheduler.run(vec![
        plant_job,
        temperature_pid_job(reactor.clone(), pid, Period::secs(DT), RunFor::For(duration)),
        sensor_recording_job(
            reactor,
            recorder,
            settings,
            Period::secs(10.0),
            RunFor::For(duration),
        ),
    ])?;

    {
        let scheduler = scheduler.clone();
        ctrlc::set_handler(move || {
            info!("Interrupted, stopping jobs");
            scheduler.stop(DEFAULT_STOP_TIMEOUT);
        })?;
    }

    while scheduler.is_running() {
        thread::sleep(Duration::from_millis(200));
    }
    let report = scheduler.stop(DEFAULT_STOP_TIMEOUT);
    info!("Simulation finished, {} job(s) joined", report.joined.len());
    Ok(())
}
