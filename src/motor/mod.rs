// domed — adaptive dome tracking control core
// Copyright (C) 2024 Filip Szczerek <ga.software@yahoo.com>
//
// This file is part of domed
//
// domed is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License version 3
// as published by the Free Software Foundation.
//
// domed is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with domed.  If not, see <http://www.gnu.org/licenses/>.

// Motor subsystem. `MotorDriver` is the step/direction pulse boundary;
// `simulated` and `gpio` are the two implementations.

pub mod gpio;
pub mod simulated;

use crate::config::MotorConfig;
use crate::error::MotorFault;
use crate::ipc::motor_command::RotationDirection;
use std::time::Duration;

/// Pulses a step/direction stepper driver. `pulse()` is expected to emit one
/// full step/microstep edge and block for roughly `period`; implementations
/// that can't honor an exact period (the simulator) just advance their
/// internal position.
pub trait MotorDriver: Send {
    fn set_direction(&mut self, direction: RotationDirection) -> Result<(), MotorFault>;
    fn pulse(&mut self, period: Duration) -> Result<(), MotorFault>;
}

/// How often, in pulses, the cancellation flag is polled during a long
/// rotation.
const CANCEL_CHECK_INTERVAL: u32 = 500;

/// `steps = round(|delta| * steps_per_rev * microsteps * gear_ratio *
/// calibration_factor / 360)`.
pub fn steps_for_delta(delta_deg: f32, config: &MotorConfig) -> u64 {
    let steps = delta_deg.abs() as f64
        * config.steps_per_revolution as f64
        * config.microsteps as f64
        * config.gear_ratio
        * config.calibration_factor
        / 360.0;
    steps.round() as u64
}

pub fn direction_for_delta(delta_deg: f32) -> RotationDirection {
    if delta_deg >= 0.0 {
        RotationDirection::Cw
    } else {
        RotationDirection::Ccw
    }
}

/// Builds the per-pulse period schedule for a rotation of `total_steps`,
/// applying an S-curve-ish linear ramp up/down within the first and last
/// `ramp_steps` pulses when the total rotation is large enough to benefit
/// from an optional acceleration ramp. Below
/// `ramp_threshold_deg` worth of steps, or when `total_steps` is too small
/// to fit a full ramp, every pulse runs at `cruise_period`.
fn period_schedule(total_steps: u64, cruise_period: Duration, ramp_initial: Duration, ramp_steps: u32) -> impl Fn(u64) -> Duration {
    let ramp_steps = ramp_steps as u64;
    let usable_ramp = if total_steps >= ramp_steps * 2 { ramp_steps } else { 0 };

    move |index: u64| {
        if usable_ramp == 0 {
            return cruise_period;
        }
        let from_start = index;
        let from_end = total_steps.saturating_sub(index + 1);
        let ramp_position = from_start.min(from_end).min(usable_ramp);
        if ramp_position >= usable_ramp {
            cruise_period
        } else {
            let t = ramp_position as f64 / usable_ramp as f64;
            let period_ns = ramp_initial.as_nanos() as f64 + t * (cruise_period.as_nanos() as f64 - ramp_initial.as_nanos() as f64);
            Duration::from_nanos(period_ns.max(0.0) as u64)
        }
    }
}

/// Drives `driver` through `total_steps` pulses in `direction`, honoring the
/// configured acceleration ramp and polling `cancelled` every
/// `CANCEL_CHECK_INTERVAL` pulses. Returns the number of pulses actually
/// emitted, which is less than `total_steps` only if cancelled mid-rotation.
pub fn rotate(
    driver: &mut dyn MotorDriver,
    direction: RotationDirection,
    total_steps: u64,
    step_period: Duration,
    config: &MotorConfig,
    cancelled: &dyn Fn() -> bool,
) -> Result<u64, MotorFault> {
    driver.set_direction(direction)?;

    let cruise_period = step_period.max(Duration::from_secs_f64(config.min_step_period_s));
    let ramp_worth_steps = steps_for_delta(config.ramp_threshold_deg, config);
    let ramp_steps = if total_steps >= ramp_worth_steps { config.ramp_steps } else { 0 };
    let ramp_initial = Duration::from_secs_f64(config.ramp_initial_period_s);
    let schedule = period_schedule(total_steps, cruise_period, ramp_initial, ramp_steps);

    for i in 0..total_steps {
        if i % CANCEL_CHECK_INTERVAL as u64 == 0 && cancelled() {
            return Ok(i);
        }
        driver.pulse(schedule(i))?;
    }
    Ok(total_steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use simulated::SimulatedMotor;

    fn config() -> MotorConfig {
        MotorConfig {
            steps_per_revolution: 200,
            microsteps: 16,
            gear_ratio: 50.0,
            calibration_factor: 1.0,
            min_step_period_s: 0.0001,
            ramp_threshold_deg: 5.0,
            ramp_initial_period_s: 0.001,
            ramp_steps: 10,
        }
    }

    #[test]
    fn steps_for_delta_matches_formula() {
        let c = config();
        // 360deg of object rotation at gear_ratio 50 means 50 full output
        // revolutions, i.e. steps_per_rev * microsteps * 50 steps.
        let steps = steps_for_delta(360.0, &c);
        assert_eq!(steps, 200 * 16 * 50);
    }

    #[test]
    fn rotate_emits_requested_step_count() {
        let c = config();
        let mut motor = SimulatedMotor::new(0);
        let done = rotate(&mut motor, RotationDirection::Cw, 37, Duration::from_micros(100), &c, &|| false).unwrap();
        assert_eq!(done, 37);
        assert_eq!(motor.position_steps(), 37);
    }

    #[test]
    fn rotate_stops_early_when_cancelled() {
        let c = config();
        let mut motor = SimulatedMotor::new(0);
        let done = rotate(&mut motor, RotationDirection::Cw, 10_000, Duration::from_micros(100), &c, &|| true).unwrap();
        assert_eq!(done, 0, "cancellation is checked before the first pulse");
    }

    #[test]
    fn ccw_rotation_decrements_position() {
        let c = config();
        let mut motor = SimulatedMotor::new(100);
        rotate(&mut motor, RotationDirection::Ccw, 20, Duration::from_micros(100), &c, &|| false).unwrap();
        assert_eq!(motor.position_steps(), 80);
    }

    #[test]
    fn direction_for_delta_picks_shorter_side() {
        assert_eq!(direction_for_delta(5.0), RotationDirection::Cw);
        assert_eq!(direction_for_delta(-5.0), RotationDirection::Ccw);
    }
}
