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

// Simulated motor driver. Tracks a plain step count rather than real pulse
// timing; `encoder_counter` lets it drive a `SimulatedEncoder`'s shared count
// in lockstep, so dev runs and integration tests see encoder feedback that
// actually follows commanded motion.

use super::MotorDriver;
use crate::error::MotorFault;
use crate::ipc::motor_command::RotationDirection;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct SimulatedMotor {
    position_steps: i64,
    direction: RotationDirection,
    steps_per_rev: u64,
    encoder_counter: Option<Arc<AtomicU16>>,
    pulses_emitted: AtomicU64,
}

impl SimulatedMotor {
    pub fn new(initial_steps: i64) -> SimulatedMotor {
        SimulatedMotor {
            position_steps: initial_steps,
            direction: RotationDirection::Cw,
            steps_per_rev: 200 * 16 * 50,
            encoder_counter: None,
            pulses_emitted: AtomicU64::new(0),
        }
    }

    /// Wires this driver to a `SimulatedEncoder`'s shared counter
    /// (`crate::encoder::simulated::SimulatedEncoder::counter`), one encoder
    /// count per `steps_per_rev / 1024` motor steps.
    pub fn with_encoder_counter(mut self, counter: Arc<AtomicU16>, steps_per_rev: u64) -> Self {
        self.encoder_counter = Some(counter);
        self.steps_per_rev = steps_per_rev;
        self
    }

    pub fn position_steps(&self) -> i64 {
        self.position_steps
    }

    pub fn pulses_emitted(&self) -> u64 {
        self.pulses_emitted.load(Ordering::SeqCst)
    }
}

impl MotorDriver for SimulatedMotor {
    fn set_direction(&mut self, direction: RotationDirection) -> Result<(), MotorFault> {
        self.direction = direction;
        Ok(())
    }

    fn pulse(&mut self, _period: Duration) -> Result<(), MotorFault> {
        match self.direction {
            RotationDirection::Cw => self.position_steps += 1,
            RotationDirection::Ccw => self.position_steps -= 1,
        }
        self.pulses_emitted.fetch_add(1, Ordering::SeqCst);

        if let Some(counter) = &self.encoder_counter {
            let counts = crate::encoder::COUNTS_PER_REV as i64;
            let raw = ((self.position_steps * counts).div_euclid(self.steps_per_rev as i64)).rem_euclid(counts);
            counter.store(raw as u16, Ordering::SeqCst);
        }
        Ok(())
    }
}
