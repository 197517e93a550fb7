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

// Encoder subsystem. `EncoderSource` is the hardware boundary trait (an
// owning handle rather than a process-wide singleton); `simulated` and `spi`
// provide the two concrete implementations.

pub mod link;
pub mod simulated;
pub mod spi;

pub use link::{EncoderReading, IpcEncoderLink, PositionSource};

use crate::error::EncoderFault;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub use crate::ipc::encoder_snapshot::EncoderHealth;

pub const COUNTS_PER_REV: u32 = 1024;

/// A source of raw 10-bit incremental encoder counts (`0..1024`). Real
/// implementations talk SPI to a magnetic encoder chip; `simulated` fakes
/// counts driven by a motor's commanded rotation, for tests and dev runs
/// without hardware.
pub trait EncoderSource: Send {
    fn read_count(&mut self) -> Result<u16, EncoderFault>;
}

/// Accumulates raw counts into an absolute angle, applies a median filter to
/// suppress single-sample SPI glitches, tracks calibration against the
/// reference microswitch, and detects staleness.
pub struct EncoderReader {
    source: Box<dyn EncoderSource>,
    median_window: usize,
    recent_counts: VecDeque<u16>,

    last_count: Option<u16>,
    total_counts: i64,
    calibration_offset: Option<i64>,

    last_read_at: Option<Instant>,
    last_change_at: Option<Instant>,
    last_raw: u16,

    max_age: Duration,
    frozen_after: Duration,
}

impl EncoderReader {
    pub fn new(source: Box<dyn EncoderSource>, median_window: usize, max_age: Duration, frozen_after: Duration) -> EncoderReader {
        EncoderReader {
            source,
            median_window: median_window.max(1),
            recent_counts: VecDeque::with_capacity(median_window.max(1)),
            last_count: None,
            total_counts: 0,
            calibration_offset: None,
            last_read_at: None,
            last_change_at: None,
            last_raw: 0,
            max_age,
            frozen_after,
        }
    }

    /// Calibrates `total_counts` so that the current raw reading maps to
    /// `reference_angle_deg`, triggered when the dome crosses the reference
    /// microswitch.
    pub fn calibrate(&mut self, reference_angle_deg: f32) -> Result<(), EncoderFault> {
        let raw = self.source.read_count()?;
        let target_counts = (reference_angle_deg as f64 / 360.0 * COUNTS_PER_REV as f64).round() as i64;
        self.total_counts = target_counts;
        self.last_count = Some(raw);
        self.calibration_offset = Some(target_counts);
        self.recent_counts.clear();
        self.recent_counts.push_back(raw);
        let now = Instant::now();
        self.last_read_at = Some(now);
        self.last_change_at = Some(now);
        self.last_raw = raw;
        Ok(())
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration_offset.is_some()
    }

    /// Samples the hardware once, called at 50Hz by the owning process,
    /// folding the new count into the median filter and the running
    /// absolute count.
    pub fn sample(&mut self, motor_active: bool) -> Result<(), EncoderFault> {
        let raw = self.source.read_count()?;
        let now = Instant::now();
        self.last_read_at = Some(now);

        if raw != self.last_raw {
            self.last_change_at = Some(now);
        } else if self.last_change_at.is_none() {
            self.last_change_at = Some(now);
        }
        self.last_raw = raw;
        let _ = motor_active;

        if self.recent_counts.len() == self.median_window {
            self.recent_counts.pop_front();
        }
        self.recent_counts.push_back(raw);
        let filtered = median_count(&self.recent_counts);

        if let Some(prev) = self.last_count {
            let delta = crate::angle::shortest_count_delta(prev, filtered);
            self.total_counts += delta as i64;
        }
        self.last_count = Some(filtered);
        Ok(())
    }

    /// Current absolute angle in `[0, 360)`, or `None` if never calibrated
    /// (the angle is meaningless before the first calibration).
    pub fn angle(&self) -> Option<f32> {
        if !self.is_calibrated() {
            return None;
        }
        let deg = (self.total_counts as f64) * 360.0 / COUNTS_PER_REV as f64;
        Some(crate::angle::normalize_360(deg as f32))
    }

    pub fn raw_count(&self) -> u16 {
        self.last_count.unwrap_or(0)
    }

    pub fn total_counts(&self) -> i64 {
        self.total_counts
    }

    /// `ABSENT` once no successful read has landed for over a second;
    /// `FROZEN` if the raw count has not changed for at least two seconds
    /// while the motor was commanded active; `OK` otherwise.
    pub fn health(&self, now: Instant, motor_active: bool) -> EncoderHealth {
        match self.last_read_at {
            None => EncoderHealth::Absent,
            Some(t) if now.saturating_duration_since(t) > self.max_age => EncoderHealth::Absent,
            _ => {
                if motor_active {
                    if let Some(changed) = self.last_change_at {
                        if now.saturating_duration_since(changed) >= self.frozen_after {
                            return EncoderHealth::Frozen;
                        }
                    }
                }
                EncoderHealth::Ok
            }
        }
    }

    pub fn frozen_duration(&self, now: Instant) -> Option<Duration> {
        self.last_change_at.map(|t| now.saturating_duration_since(t))
    }
}

/// Median of a small window of raw counts; for an even-sized window, the
/// lower of the two central values, a deterministic tie-break.
fn median_count(counts: &VecDeque<u16>) -> u16 {
    let mut v: Vec<u16> = counts.iter().copied().collect();
    v.sort_unstable();
    v[(v.len() - 1) / 2]
}
