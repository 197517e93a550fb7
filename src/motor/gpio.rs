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

// Real hardware motor driver: toggles a step/direction stepper driver board
// via `rppal::gpio`, a single owned handle opened once at construction.

use super::MotorDriver;
use crate::config::GpioConfig;
use crate::error::MotorFault;
use crate::ipc::motor_command::RotationDirection;
use rppal::gpio::{Gpio, OutputPin};
use std::thread;
use std::time::Duration;

pub struct GpioMotor {
    dir_pin: OutputPin,
    step_pin: OutputPin,
}

impl GpioMotor {
    pub fn open(config: &GpioConfig) -> Result<GpioMotor, MotorFault> {
        let gpio = Gpio::new().map_err(|e| MotorFault::GpioUnavailable(e.to_string()))?;
        let dir_pin = gpio
            .get(config.dir_pin as u8)
            .map_err(|e| MotorFault::GpioUnavailable(e.to_string()))?
            .into_output();
        let step_pin = gpio
            .get(config.step_pin as u8)
            .map_err(|e| MotorFault::GpioUnavailable(e.to_string()))?
            .into_output();
        Ok(GpioMotor { dir_pin, step_pin })
    }

    /// True while the dome is parked over the reference microswitch, the
    /// calibration trigger.
    pub fn switch_closed(gpio: &Gpio, config: &GpioConfig) -> Result<bool, MotorFault> {
        let pin = gpio
            .get(config.switch_pin as u8)
            .map_err(|e| MotorFault::GpioError(e.to_string()))?
            .into_input_pullup();
        Ok(pin.is_low())
    }
}

impl MotorDriver for GpioMotor {
    fn set_direction(&mut self, direction: RotationDirection) -> Result<(), MotorFault> {
        match direction {
            RotationDirection::Cw => self.dir_pin.set_high(),
            RotationDirection::Ccw => self.dir_pin.set_low(),
        }
        Ok(())
    }

    fn pulse(&mut self, period: Duration) -> Result<(), MotorFault> {
        let half = period / 2;
        self.step_pin.set_high();
        thread::sleep(half);
        self.step_pin.set_low();
        thread::sleep(half);
        Ok(())
    }
}
