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

// Real hardware encoder source, talking to a 10-bit SPI magnetic encoder
// (e.g. an AS5048A-class chip) over `rppal::spi`: a thin struct wrapping a
// single open device handle behind the `EncoderSource` trait, opened once at
// construction and reused for every read.

use super::EncoderSource;
use crate::error::EncoderFault;
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

/// Read command for an AS5048A-class angle sensor: MSB set marks a read,
/// the next 13 bits select the angle register.
const ANGLE_READ_COMMAND: u16 = 0xFFFF;
const DATA_MASK: u16 = 0x3FFF;

pub struct SpiEncoder {
    spi: Spi,
}

impl SpiEncoder {
    pub fn open(bus_path: &str, speed_hz: u32) -> Result<SpiEncoder, EncoderFault> {
        let bus = bus_from_path(bus_path)?;
        let spi = Spi::new(bus, SlaveSelect::Ss0, speed_hz, Mode::Mode1)
            .map_err(|e| EncoderFault::HardwareUnavailable(e.to_string()))?;
        Ok(SpiEncoder { spi })
    }
}

impl EncoderSource for SpiEncoder {
    fn read_count(&mut self) -> Result<u16, EncoderFault> {
        let tx = ANGLE_READ_COMMAND.to_be_bytes();
        let mut rx = [0u8; 2];
        self.spi
            .transfer(&mut rx, &tx)
            .map_err(|e| EncoderFault::HardwareUnavailable(e.to_string()))?;
        let raw = u16::from_be_bytes(rx) & DATA_MASK;
        // The chip reports 14-bit resolution; fold down to the 10-bit count
        // space the rest of this crate works in.
        Ok((raw >> 4) & 0x03FF)
    }
}

fn bus_from_path(path: &str) -> Result<Bus, EncoderFault> {
    match path {
        "/dev/spidev0.0" | "" => Ok(Bus::Spi0),
        "/dev/spidev1.0" => Ok(Bus::Spi1),
        other => Err(EncoderFault::HardwareUnavailable(format!("unrecognized SPI bus path: {other}"))),
    }
}
