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

//! Bioreactor controller for the Raspberry Pi.
//!
//! Usage: `rpi-bioreactor [config.json]`. Without a path the built-in rig
//! defaults are used. Runs until Ctrl+C, then stops the jobs and parks every
//! actuator.

use std::env;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use bioreactor::config::BioreactorConfig;
use bioreactor::drivers::init_bioreactor;
use bioreactor::jobs::standard_jobs;
use bioreactor::scheduler::{Scheduler, DEFAULT_STOP_TIMEOUT};
use log::{info, warn};

fn main() -> anyhow::Result<()> {
    let config = match env::args().nth(1) {
        Some(path) => BioreactorConfig::load(&path).with_context(|| format!("loading {path}"))?,
        None => {
            let config = BioreactorConfig::default();
            config.validate().context("invalid default configuration")?;
            config
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.as_str()))
        .init();

    info!("Bioreactor PID temperature controller");
    info!("Target temperature: {}°C", config.pid.setpoint);

    let reactor = Arc::new(init_bioreactor(&config));
    for (component, reason) in reactor.registry().failures() {
        warn!("{component} unavailable: {reason}");
    }
    reactor.set_stirrer_speed(config.stirrer.default_duty)?;

    let scheduler = Arc::new(Scheduler::new());
    {
        let reactor = reactor.clone();
        scheduler.on_shutdown(move || reactor.shutdown());
    }
    scheduler.run(standard_jobs(reactor, &config)?)?;

    {
        let scheduler = scheduler.clone();
        ctrlc::set_handler(move || {
            info!("Interrupted, stopping jobs");
            scheduler.stop(DEFAULT_STOP_TIMEOUT);
        })?;
    }

    while !scheduler.is_stopped() {
        thread::sleep(Duration::from_millis(500));
    }
    let report = scheduler.stop(DEFAULT_STOP_TIMEOUT);
    if !report.is_clean() {
        warn!("Jobs still running at exit: {:?}", report.still_running);
    }
    info!("Shutdown complete");
    Ok(())
}
