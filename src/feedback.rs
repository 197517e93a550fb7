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

// Feedback Controller: drives the dome to a target angle within a tolerance
// by repeatedly reading the encoder and issuing bounded motor rotations,
// escaping on cancellation, timeout, stagnation or a runaway-error trip.

use crate::angle::shortest_delta;
use crate::clock::ClockSource;
use crate::config::MotorConfig;
use crate::encoder::{EncoderHealth, PositionSource};
use crate::error::ConvergeOutcome;
use crate::motor::{self, MotorDriver};
use std::collections::VecDeque;
use std::time::Duration;

const STABLE_SAMPLE_COUNT: usize = 3;
const STABLE_SAMPLE_INTERVAL: Duration = Duration::from_millis(10);
const STABLE_SPREAD_THRESHOLD_DEG: f32 = 0.2;
const SETTLE_INTERVAL: Duration = Duration::from_millis(50);

pub struct ConvergeParams {
    pub target_angle: f32,
    pub tolerance: f32,
    pub step_period: Duration,
    pub max_iterations: u32,
    pub max_duration: Duration,
    pub protection_threshold_deg: f32,
    pub stagnation_count: usize,
    pub min_movement_threshold_deg: f32,
    pub is_initial_goto: bool,
}

/// Drives `driver` toward `params.target_angle` using
/// `encoder` feedback, returning the final stable angle and iteration count
/// on success, or the escape reason otherwise. `cancel` is polled at every
/// cooperative point, both here and inside each rotation's pulse loop.
pub fn converge(
    encoder: &dyn PositionSource,
    driver: &mut dyn MotorDriver,
    motor_config: &MotorConfig,
    clock: &dyn ClockSource,
    params: &ConvergeParams,
    cancel: &dyn Fn() -> bool,
) -> Result<(f32, u32), ConvergeOutcome> {
    let start = clock.now();
    let mut recent_errors: VecDeque<f32> = VecDeque::with_capacity(params.stagnation_count + 1);

    for iteration in 0..params.max_iterations {
        if cancel() {
            return Err(ConvergeOutcome::Cancelled);
        }
        if clock.now().saturating_duration_since(start) > params.max_duration {
            return Err(ConvergeOutcome::Timeout);
        }

        let current = stable_angle(encoder, clock)?;
        let err = shortest_delta(current, params.target_angle);
        if err.abs() <= params.tolerance {
            return Ok((current, iteration));
        }

        if err.abs() > params.protection_threshold_deg && !params.is_initial_goto {
            return Err(ConvergeOutcome::ProtectionTripped);
        }

        if is_stagnant(&mut recent_errors, err.abs(), params.stagnation_count, params.min_movement_threshold_deg) {
            return Err(ConvergeOutcome::Stagnated);
        }

        let steps = motor::steps_for_delta(err, motor_config);
        let direction = motor::direction_for_delta(err);
        motor::rotate(driver, direction, steps, params.step_period, motor_config, cancel)
            .map_err(|_| ConvergeOutcome::ProtectionTripped)?;

        if cancel() {
            return Err(ConvergeOutcome::Cancelled);
        }
        clock.sleep(SETTLE_INTERVAL);
    }

    Err(ConvergeOutcome::Timeout)
}

/// `K` samples over a short settle window; if their spread exceeds
/// threshold the reading is unstable and convergence can't safely proceed
/// this iteration.
fn stable_angle(encoder: &dyn PositionSource, clock: &dyn ClockSource) -> Result<f32, ConvergeOutcome> {
    let mut readings = Vec::with_capacity(STABLE_SAMPLE_COUNT);
    for i in 0..STABLE_SAMPLE_COUNT {
        let reading = encoder.read().ok_or(ConvergeOutcome::EncoderUnavailable)?;
        if reading.health == EncoderHealth::Absent {
            return Err(ConvergeOutcome::EncoderUnavailable);
        }
        readings.push(reading.angle);
        if i + 1 < STABLE_SAMPLE_COUNT {
            clock.sleep(STABLE_SAMPLE_INTERVAL);
        }
    }

    let first = readings[0];
    let spread = readings.iter().map(|a| shortest_delta(first, *a).abs()).fold(0.0f32, f32::max);
    if spread > STABLE_SPREAD_THRESHOLD_DEG {
        return Err(ConvergeOutcome::EncoderUnavailable);
    }
    Ok(*readings.last().unwrap())
}

/// Stagnant if the last `stagnation_count` absolute errors failed to
/// decrease by at least `min_movement_threshold` at every consecutive step.
fn is_stagnant(recent_errors: &mut VecDeque<f32>, err_abs: f32, stagnation_count: usize, min_movement_threshold: f32) -> bool {
    if recent_errors.len() == stagnation_count + 1 {
        recent_errors.pop_front();
    }
    recent_errors.push_back(err_abs);

    if recent_errors.len() < stagnation_count {
        return false;
    }
    let skip = recent_errors.len() - stagnation_count;
    let tail: Vec<f32> = recent_errors.iter().skip(skip).copied().collect();
    tail.windows(2).all(|w| w[0] - w[1] < min_movement_threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::encoder::link::test_support::LoopbackPosition;
    use crate::encoder::simulated::SimulatedEncoder;
    use crate::encoder::EncoderReader;
    use crate::motor::simulated::SimulatedMotor;

    fn motor_config() -> MotorConfig {
        MotorConfig {
            steps_per_revolution: 200,
            microsteps: 16,
            gear_ratio: 1.0,
            calibration_factor: 1.0,
            min_step_period_s: 0.00001,
            ramp_threshold_deg: 5.0,
            ramp_initial_period_s: 0.0001,
            ramp_steps: 4,
        }
    }

    fn params(target: f32) -> ConvergeParams {
        ConvergeParams {
            target_angle: target,
            tolerance: 0.5,
            step_period: Duration::from_micros(1),
            max_iterations: 10,
            max_duration: Duration::from_secs(10),
            protection_threshold_deg: 20.0,
            stagnation_count: 3,
            min_movement_threshold_deg: 0.1,
            is_initial_goto: false,
        }
    }

    fn rig(initial_angle_deg: f32) -> (LoopbackPosition, SimulatedMotor) {
        let steps_per_rev = motor_config().steps_per_revolution as u64 * motor_config().microsteps as u64;
        let sim_encoder = SimulatedEncoder::new(0);
        let counter = sim_encoder.counter();
        let mut encoder = EncoderReader::new(Box::new(sim_encoder), 1, Duration::from_secs(1), Duration::from_secs(2));
        encoder.calibrate(initial_angle_deg).unwrap();
        let motor = SimulatedMotor::new(0).with_encoder_counter(counter, steps_per_rev);
        (LoopbackPosition::new(encoder), motor)
    }

    #[test]
    fn converges_to_target_within_tolerance() {
        let (encoder, mut motor) = rig(0.0);
        let clock = FakeClock::new();
        let result = converge(&encoder, &mut motor, &motor_config(), &clock, &params(10.0), &|| false);
        let (final_angle, _iterations) = result.expect("should converge");
        assert!(shortest_delta(final_angle, 10.0).abs() <= 0.5);
    }

    #[test]
    fn already_within_tolerance_converges_in_zero_iterations() {
        let (encoder, mut motor) = rig(10.1);
        let clock = FakeClock::new();
        let (final_angle, iterations) = converge(&encoder, &mut motor, &motor_config(), &clock, &params(10.0), &|| false).unwrap();
        assert_eq!(iterations, 0);
        assert!((final_angle - 10.1).abs() < 0.5);
    }

    #[test]
    fn cancellation_is_observed_immediately() {
        let (encoder, mut motor) = rig(0.0);
        let clock = FakeClock::new();
        let result = converge(&encoder, &mut motor, &motor_config(), &clock, &params(90.0), &|| true);
        assert_eq!(result.unwrap_err(), ConvergeOutcome::Cancelled);
    }

    #[test]
    fn large_error_without_initial_goto_trips_protection() {
        let (encoder, mut motor) = rig(0.0);
        let clock = FakeClock::new();
        let mut p = params(90.0);
        p.is_initial_goto = false;
        let result = converge(&encoder, &mut motor, &motor_config(), &clock, &p, &|| false);
        assert_eq!(result.unwrap_err(), ConvergeOutcome::ProtectionTripped);
    }

    #[test]
    fn large_error_on_initial_goto_is_allowed_through() {
        let (encoder, mut motor) = rig(0.0);
        let clock = FakeClock::new();
        let mut p = params(90.0);
        p.is_initial_goto = true;
        p.max_iterations = 50;
        let result = converge(&encoder, &mut motor, &motor_config(), &clock, &p, &|| false);
        assert!(result.is_ok(), "initial GOTO should bypass the protection trip");
    }
}
