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

// Motor Service never touches the SPI bus: the Encoder Daemon solely owns
// the SPI handle, and Motor Service solely owns the GPIO handles. It
// consumes the Encoder Daemon's published position instead. `PositionSource`
// is that consumption boundary; `IpcEncoderLink` is the production
// implementation, reading `encoder_position.json`.

use super::EncoderHealth;
use crate::ipc::encoder_snapshot::EncoderSnapshot;
use chrono::Utc;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy)]
pub struct EncoderReading {
    pub angle: f32,
    pub health: EncoderHealth,
}

/// What the Feedback Controller and Command Dispatcher need from the
/// encoder. Returns `None` when there is no trustworthy angle to report at
/// all (no snapshot published yet, or the Encoder Daemon has not completed
/// its own calibration).
pub trait PositionSource: Send {
    fn read(&self) -> Option<EncoderReading>;
}

pub struct IpcEncoderLink {
    path: PathBuf,
    max_age: chrono::Duration,
}

impl IpcEncoderLink {
    pub fn new(path: PathBuf, max_age: chrono::Duration) -> IpcEncoderLink {
        IpcEncoderLink { path, max_age }
    }
}

impl PositionSource for IpcEncoderLink {
    fn read(&self) -> Option<EncoderReading> {
        let snap: EncoderSnapshot = crate::ipc::read(&self.path)?;
        if !snap.calibrated {
            return None;
        }
        let health = if snap.is_stale(Utc::now(), self.max_age) {
            EncoderHealth::Absent
        } else {
            snap.status
        };
        Some(EncoderReading { angle: snap.angle, health })
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use crate::encoder::EncoderReader;
    use std::sync::Mutex;
    use std::time::Instant;

    /// Adapts an in-process `EncoderReader` to `PositionSource` for tests:
    /// samples the shared counter directly rather than round-tripping
    /// through a published snapshot file, so feedback/dispatcher tests stay
    /// synchronous and deterministic.
    pub struct LoopbackPosition {
        reader: Mutex<EncoderReader>,
    }

    impl LoopbackPosition {
        pub fn new(reader: EncoderReader) -> LoopbackPosition {
            LoopbackPosition { reader: Mutex::new(reader) }
        }
    }

    impl PositionSource for LoopbackPosition {
        fn read(&self) -> Option<EncoderReading> {
            let mut reader = self.reader.lock().unwrap();
            reader.sample(true).ok()?;
            let angle = reader.angle()?;
            let health = reader.health(Instant::now(), true);
            Some(EncoderReading { angle, health })
        }
    }

    #[test]
    fn loopback_reports_none_before_calibration() {
        use crate::encoder::simulated::SimulatedEncoder;
        use std::time::Duration;

        let reader = EncoderReader::new(Box::new(SimulatedEncoder::new(0)), 1, Duration::from_secs(1), Duration::from_secs(2));
        let link = LoopbackPosition::new(reader);
        assert!(link.read().is_none());
    }

    #[test]
    fn loopback_reports_angle_after_calibration() {
        use crate::encoder::simulated::SimulatedEncoder;
        use std::time::Duration;

        let mut reader = EncoderReader::new(Box::new(SimulatedEncoder::new(0)), 1, Duration::from_secs(1), Duration::from_secs(2));
        reader.calibrate(0.0).unwrap();
        let link = LoopbackPosition::new(reader);
        let reading = link.read().expect("calibrated reader reports a reading");
        assert!(reading.angle.abs() < 0.5);
        assert_eq!(reading.health, EncoderHealth::Ok);
    }
}
