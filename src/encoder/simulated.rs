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

// Simulated encoder: a hardware-free stand-in driven by whoever else holds
// the shared counter (normally the simulated motor driver, see
// `crate::motor::simulated`), letting dev runs and tests exercise the full
// encoder/motor/tracking pipeline without GPIO.

use super::EncoderSource;
use crate::error::EncoderFault;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

pub struct SimulatedEncoder {
    count: Arc<AtomicU16>,
}

impl SimulatedEncoder {
    pub fn new(initial_count: u16) -> SimulatedEncoder {
        SimulatedEncoder {
            count: Arc::new(AtomicU16::new(initial_count % super::COUNTS_PER_REV as u16)),
        }
    }

    /// A cloneable handle onto the shared count, so a simulated motor driver
    /// (or a test) can advance it independently of this reader.
    pub fn counter(&self) -> Arc<AtomicU16> {
        self.count.clone()
    }

    pub fn set_count(&self, count: u16) {
        self.count.store(count % super::COUNTS_PER_REV as u16, Ordering::SeqCst);
    }
}

impl EncoderSource for SimulatedEncoder {
    fn read_count(&mut self) -> Result<u16, EncoderFault> {
        Ok(self.count.load(Ordering::SeqCst))
    }
}
