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

//! Peripheral hub and the collaborator traits the control loop talks to.
//!
//! Every physical resource sits behind its own mutex, so a temperature read
//! or a peltier duty/direction write is atomic with respect to the other jobs
//! running concurrently on the scheduler.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{error, info, warn};
use parking_lot::Mutex;

use crate::components::{Component, ComponentRegistry};
use crate::error::{Error, Result};

/// Peltier current direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Heat,
    Cool,
}

impl Direction {
    /// H-bridge DIR pin level: forward drives heat into the vessel.
    pub fn is_forward(self) -> bool {
        matches!(self, Direction::Heat)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Heat => "heat",
            Direction::Cool => "cool",
        }
    }
}

/// One command for the peltier, produced per controller invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActuatorCommand {
    Drive { duty: f64, direction: Direction },
    Stop,
}

/// Last command the peltier driver accepted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PeltierState {
    Off,
    On { duty: f64, direction: Direction },
}

impl PeltierState {
    pub fn duty(self) -> f64 {
        match self {
            PeltierState::Off => 0.0,
            PeltierState::On { duty, .. } => duty,
        }
    }
}

/// What the temperature controller needs from the hardware.
pub trait Peripherals {
    /// Temperature in °C, or NaN when the probe is missing or unreadable.
    fn read_temperature(&self, sensor_index: usize) -> Result<f64>;

    /// Returns `false` when no peltier driver is available or the actuators
    /// have been shut down.
    fn set_peltier(&self, duty: f64, direction: Direction) -> Result<bool>;

    fn stop_peltier(&self) -> Result<()>;

    fn is_component_initialized(&self, component: Component) -> bool;
}

/// H-bridge peltier driver: PWM duty in percent plus a direction line.
pub trait PeltierDriver: Send {
    fn drive(&mut self, duty: f64, direction: Direction) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
}

/// Bank of temperature probes addressed by index.
pub trait TemperatureProbes: Send {
    fn count(&self) -> usize;
    fn read_celsius(&mut self, index: usize) -> Result<f64>;
}

/// Single PWM output driven in percent (stirrer motor, LED).
pub trait PwmOutput: Send {
    fn set_duty(&mut self, duty: f64) -> Result<()>;
}

/// Named ADC channels returning volts.
pub trait AnalogInputs: Send {
    fn channels(&self) -> Vec<String>;
    fn read_voltage(&mut self, channel: &str) -> Result<f64>;
}

pub trait Co2Sensor: Send {
    fn read_ppm(&mut self) -> Result<u16>;
}

struct PeltierSlot {
    driver: Box<dyn PeltierDriver>,
    state: PeltierState,
}

struct LedSlot {
    driver: Box<dyn PwmOutput>,
    duty: f64,
}

impl LedSlot {
    fn set(&mut self, duty: f64) -> Result<()> {
        self.driver.set_duty(duty)?;
        self.duty = duty;
        Ok(())
    }
}

/// The bioreactor's hardware, shared between jobs.
pub struct Bioreactor {
    registry: ComponentRegistry,
    temp_probes: Option<Mutex<Box<dyn TemperatureProbes>>>,
    peltier: Option<Mutex<PeltierSlot>>,
    stirrer: Option<Mutex<Box<dyn PwmOutput>>>,
    led: Option<Mutex<LedSlot>>,
    od: Option<Mutex<Box<dyn AnalogInputs>>>,
    co2: Option<Mutex<Box<dyn Co2Sensor>>>,
    shut_down: AtomicBool,
}

impl Bioreactor {
    pub fn builder() -> BioreactorBuilder {
        BioreactorBuilder::default()
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn peltier_state(&self) -> PeltierState {
        self.peltier
            .as_ref()
            .map_or(PeltierState::Off, |slot| slot.lock().state)
    }

    pub fn set_stirrer_speed(&self, duty: f64) -> Result<bool> {
        let Some(stirrer) = &self.stirrer else {
            warn!("Stirrer not initialized; ignoring speed {duty:.1}%");
            return Ok(false);
        };
        let duty = check_duty(duty)?;
        let mut stirrer = stirrer.lock();
        if self.refuse_after_shutdown("stirrer") {
            return Ok(false);
        }
        stirrer.set_duty(duty)?;
        info!("Stirrer set to {duty:.1}%");
        Ok(true)
    }

    pub fn set_led(&self, duty: f64) -> Result<bool> {
        let Some(led) = &self.led else {
            warn!("LED not initialized; ignoring power {duty:.1}%");
            return Ok(false);
        };
        let duty = check_duty(duty)?;
        let mut led = led.lock();
        if self.refuse_after_shutdown("LED") {
            return Ok(false);
        }
        led.set(duty)?;
        Ok(true)
    }

    /// Current LED power (%), 0 when no LED is fitted.
    pub fn led_duty(&self) -> f64 {
        self.led.as_ref().map_or(0.0, |led| led.lock().duty)
    }

    /// Single voltage read of one OD channel, `None` if OD is unavailable.
    pub fn read_od_channel(&self, channel: &str) -> Result<Option<f64>> {
        let Some(od) = &self.od else {
            return Ok(None);
        };
        let voltage = od.lock().read_voltage(channel)?;
        Ok(Some(voltage))
    }

    /// Pulse the LED at `led_power`, average every OD channel over
    /// `averaging`, then put the LED back to its previous power.
    ///
    /// Returns `None` when the LED or the OD ADC is missing, or after
    /// [`shutdown`](Self::shutdown). The LED lock is always taken before the
    /// ADC lock.
    pub fn measure_od(
        &self,
        led_power: f64,
        averaging: Duration,
    ) -> Result<Option<BTreeMap<String, f64>>> {
        let (Some(led), Some(od)) = (&self.led, &self.od) else {
            return Ok(None);
        };
        let mut led = led.lock();
        if self.refuse_after_shutdown("LED") {
            return Ok(None);
        }
        let previous = led.duty;
        led.set(check_duty(led_power)?)?;

        let result = {
            let mut od = od.lock();
            average_channels(&mut **od, averaging)
        };

        // Restore the LED even when sampling failed.
        led.set(previous)?;
        result.map(Some)
    }

    pub fn read_co2_ppm(&self) -> Result<Option<u16>> {
        let Some(co2) = &self.co2 else {
            return Ok(None);
        };
        let ppm = co2.lock().read_ppm()?;
        Ok(Some(ppm))
    }

    /// Stop every actuator. Only the first call touches the hardware.
    ///
    /// Afterwards the actuator setters refuse new commands (`Ok(false)`), so a
    /// job still finishing its invocation cannot restart anything. A command
    /// already holding a resource lock completes first and is then overridden.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down actuators");
        if let Err(e) = self.stop_peltier() {
            error!("Failed to stop peltier during shutdown: {e}");
        }
        if let Some(stirrer) = &self.stirrer {
            if let Err(e) = stirrer.lock().set_duty(0.0) {
                error!("Failed to stop stirrer during shutdown: {e}");
            }
        }
        if let Some(led) = &self.led {
            if let Err(e) = led.lock().set(0.0) {
                error!("Failed to switch LED off during shutdown: {e}");
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    // Call with the resource's lock held.
    fn refuse_after_shutdown(&self, what: &str) -> bool {
        let refused = self.is_shut_down();
        if refused {
            warn!("Actuators shut down; ignoring {what} command");
        }
        refused
    }
}

impl Peripherals for Bioreactor {
    fn read_temperature(&self, sensor_index: usize) -> Result<f64> {
        let Some(probes) = &self.temp_probes else {
            return Ok(f64::NAN);
        };
        let mut probes = probes.lock();
        if sensor_index >= probes.count() {
            warn!(
                "Temperature sensor {sensor_index} not present ({} found)",
                probes.count()
            );
            return Ok(f64::NAN);
        }
        match probes.read_celsius(sensor_index) {
            Ok(t) => Ok(t),
            Err(Error::Sensor(msg)) => {
                warn!("Temperature sensor {sensor_index} read failed: {msg}");
                Ok(f64::NAN)
            }
            Err(e) => Err(e),
        }
    }

    fn set_peltier(&self, duty: f64, direction: Direction) -> Result<bool> {
        let Some(slot) = &self.peltier else {
            return Ok(false);
        };
        let duty = check_duty(duty)?;
        let mut slot = slot.lock();
        if self.refuse_after_shutdown("peltier") {
            return Ok(false);
        }
        slot.driver.drive(duty, direction)?;
        slot.state = PeltierState::On { duty, direction };
        Ok(true)
    }

    fn stop_peltier(&self) -> Result<()> {
        if let Some(slot) = &self.peltier {
            let mut slot = slot.lock();
            slot.driver.stop()?;
            slot.state = PeltierState::Off;
        }
        Ok(())
    }

    fn is_component_initialized(&self, component: Component) -> bool {
        self.registry.is_initialized(component)
    }
}

fn check_duty(duty: f64) -> Result<f64> {
    if duty.is_nan() {
        return Err(Error::Actuator("duty cycle is NaN".into()));
    }
    Ok(duty.clamp(0.0, 100.0))
}

fn average_channels(
    od: &mut dyn AnalogInputs,
    averaging: Duration,
) -> Result<BTreeMap<String, f64>> {
    let channels = od.channels();
    let mut sums: BTreeMap<String, (f64, u32)> = BTreeMap::new();
    let deadline = Instant::now() + averaging;
    loop {
        for ch in &channels {
            let v = od.read_voltage(ch)?;
            let entry = sums.entry(ch.clone()).or_insert((0.0, 0));
            entry.0 += v;
            entry.1 += 1;
        }
        if Instant::now() >= deadline {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    Ok(sums
        .into_iter()
        .map(|(ch, (sum, n))| (ch, sum / f64::from(n)))
        .collect())
}

/// Collects init results into a [`Bioreactor`], recording each outcome in
/// the component registry.
#[derive(Default)]
pub struct BioreactorBuilder {
    registry: ComponentRegistry,
    temp_probes: Option<Box<dyn TemperatureProbes>>,
    peltier: Option<Box<dyn PeltierDriver>>,
    stirrer: Option<Box<dyn PwmOutput>>,
    led: Option<Box<dyn PwmOutput>>,
    od: Option<Box<dyn AnalogInputs>>,
    co2: Option<Box<dyn Co2Sensor>>,
}

impl BioreactorBuilder {
    pub fn temperature_probes(mut self, probes: Result<Box<dyn TemperatureProbes>>) -> Self {
        self.temp_probes = self.registry.record(Component::TempSensor, probes);
        self
    }

    pub fn peltier(mut self, driver: Result<Box<dyn PeltierDriver>>) -> Self {
        self.peltier = self.registry.record(Component::PeltierDriver, driver);
        self
    }

    pub fn stirrer(mut self, driver: Result<Box<dyn PwmOutput>>) -> Self {
        self.stirrer = self.registry.record(Component::Stirrer, driver);
        self
    }

    pub fn led(mut self, driver: Result<Box<dyn PwmOutput>>) -> Self {
        self.led = self.registry.record(Component::Led, driver);
        self
    }

    pub fn optical_density(mut self, adc: Result<Box<dyn AnalogInputs>>) -> Self {
        self.od = self.registry.record(Component::OpticalDensity, adc);
        self
    }

    pub fn co2_sensor(mut self, sensor: Result<Box<dyn Co2Sensor>>) -> Self {
        self.co2 = self.registry.record(Component::Co2Sensor, sensor);
        self
    }

    /// Record the outcome of a component that has no driver of its own (I2C bus).
    pub fn mark(mut self, component: Component, outcome: Result<()>) -> Self {
        self.registry.record(component, outcome);
        self
    }

    pub fn disabled(mut self, component: Component) -> Self {
        self.registry.mark_disabled(component);
        self
    }

    pub fn build(self) -> Bioreactor {
        Bioreactor {
            registry: self.registry,
            temp_probes: self.temp_probes.map(Mutex::new),
            peltier: self.peltier.map(|driver| {
                Mutex::new(PeltierSlot {
                    driver,
                    state: PeltierState::Off,
                })
            }),
            stirrer: self.stirrer.map(Mutex::new),
            led: self.led.map(|driver| Mutex::new(LedSlot { driver, duty: 0.0 })),
            od: self.od.map(Mutex::new),
            co2: self.co2.map(Mutex::new),
            shut_down: AtomicBool::new(false),
        }
    }
}
