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

//! Temperature loop against mock peripherals: heating, cooling, saturation
//! and the degraded paths.

use crate::mock_hw::{ActuatorCall, MockPeripherals};

use bioreactor::controller::{PidSettings, StepInputs, StepOutcome, TemperatureController};
use bioreactor::error::Error;
use bioreactor::peripherals::{ActuatorCommand, Direction};

fn controller(setpoint: f64) -> TemperatureController {
    TemperatureController::new(PidSettings {
        setpoint,
        ..PidSettings::default()
    })
}

fn first_step(ctl: &mut TemperatureController, io: &MockPeripherals) -> StepOutcome {
    ctl.step(io, StepInputs::default()).unwrap()
}

#[test]
fn below_setpoint_heats() {
    let io = MockPeripherals::new(25.0);
    let mut ctl = controller(30.0);

    match first_step(&mut ctl, &io) {
        StepOutcome::Applied {
            error,
            output,
            command,
            actuated,
            ..
        } => {
            assert_eq!(error, 5.0);
            // 12 * 5 plus 0.015 * (5 * 1.0)
            assert!((output - 60.075).abs() < 1e-9);
            assert!(actuated);
            assert!(matches!(
                command,
                ActuatorCommand::Drive {
                    direction: Direction::Heat,
                    ..
                }
            ));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    match io.last_call() {
        Some(ActuatorCall::SetPeltier { duty, direction }) => {
            assert!((duty - 60.075).abs() < 1e-9);
            assert_eq!(direction, Direction::Heat);
        }
        other => panic!("unexpected call {other:?}"),
    }
    assert_eq!(ctl.state().integral, 5.0);
}

#[test]
fn above_setpoint_cools() {
    let io = MockPeripherals::new(27.0);
    let mut ctl = controller(25.0);

    first_step(&mut ctl, &io);
    match io.last_call() {
        Some(ActuatorCall::SetPeltier { duty, direction }) => {
            // |12 * -2 + 0.015 * -2|
            assert!((duty - 24.03).abs() < 1e-9);
            assert_eq!(direction, Direction::Cool);
        }
        other => panic!("unexpected call {other:?}"),
    }
}

#[test]
fn large_error_saturates_at_max_duty() {
    let io = MockPeripherals::new(5.0);
    let mut ctl = controller(30.0);

    match first_step(&mut ctl, &io) {
        StepOutcome::Applied { output, duty, .. } => {
            assert!(output > 70.0);
            assert_eq!(duty, 70.0);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(ctl.state().integral, 25.0);
}

#[test]
fn on_setpoint_with_zero_gains_stops() {
    let io = MockPeripherals::new(25.0);
    let mut ctl = TemperatureController::new(PidSettings {
        setpoint: 25.0,
        kp: 0.0,
        ki: 0.0,
        kd: 0.0,
        ..PidSettings::default()
    });

    first_step(&mut ctl, &io);
    assert_eq!(io.calls(), vec![ActuatorCall::StopPeltier]);
}

#[test]
fn nan_reading_leaves_state_and_hardware_alone() {
    let io = MockPeripherals::with_readings(&[25.0, f64::NAN, 26.0]);
    let mut ctl = controller(30.0);
    let dt = |dt| StepInputs {
        dt: Some(dt),
        ..StepInputs::default()
    };

    ctl.step(&io, dt(5.0)).unwrap();
    let before = *ctl.state();
    let outcome = ctl.step(&io, dt(5.0)).unwrap();

    assert!(matches!(outcome, StepOutcome::Skipped { current_temp } if current_temp.is_nan()));
    assert_eq!(ctl.state().integral, before.integral);
    assert_eq!(ctl.state().last_error, before.last_error);
    assert_eq!(ctl.state().last_derivative, before.last_derivative);
    assert_eq!(io.calls().len(), 1);

    ctl.step(&io, dt(5.0)).unwrap();
    assert_eq!(ctl.state().integral, 25.0 + 20.0);
    assert_eq!(io.calls().len(), 2);
}

#[test]
fn missing_peltier_still_integrates() {
    let io = MockPeripherals::new(25.0).without_peltier();
    let mut ctl = controller(30.0);

    for _ in 0..3 {
        let outcome = ctl
            .step(
                &io,
                StepInputs {
                    dt: Some(2.0),
                    ..StepInputs::default()
                },
            )
            .unwrap();
        assert!(matches!(outcome, StepOutcome::Applied { actuated: false, .. }));
    }
    assert_eq!(ctl.state().integral, 30.0);
    assert!(io.calls().is_empty());
}

#[test]
fn driver_fault_propagates_after_state_update() {
    let io = MockPeripherals::new(25.0).failing_actuator();
    let mut ctl = controller(30.0);

    let err = ctl.step(&io, StepInputs::default()).unwrap_err();
    assert!(matches!(err, Error::Actuator(_)));
    assert_eq!(ctl.state().integral, 5.0);
    assert_eq!(ctl.state().last_error, 5.0);
}

#[test]
fn elapsed_timestamps_drive_dt() {
    let io = MockPeripherals::new(29.0);
    let mut ctl = controller(30.0);
    let at = |t| StepInputs {
        elapsed: Some(t),
        ..StepInputs::default()
    };

    ctl.step(&io, at(100.0)).unwrap();
    assert_eq!(ctl.state().integral, 1.0);
    ctl.step(&io, at(105.0)).unwrap();
    assert_eq!(ctl.state().integral, 6.0);
    assert_eq!(ctl.state().last_time, Some(105.0));
}

#[test]
fn setpoint_change_flips_direction() {
    let io = MockPeripherals::new(25.0);
    let mut ctl = TemperatureController::new(PidSettings {
        setpoint: 30.0,
        ki: 0.0,
        ..PidSettings::default()
    });

    first_step(&mut ctl, &io);
    ctl.set_setpoint(20.0);
    ctl.step(&io, StepInputs::default()).unwrap();

    let directions: Vec<Direction> = io
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            ActuatorCall::SetPeltier { direction, .. } => Some(direction),
            ActuatorCall::StopPeltier => None,
        })
        .collect();
    assert_eq!(directions, vec![Direction::Heat, Direction::Cool]);
}
