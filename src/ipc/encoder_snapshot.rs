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

// Wire shape of the Encoder Daemon's published position snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const FILE_NAME: &str = "encoder_position.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EncoderHealth {
    Ok,
    Frozen,
    Absent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderSnapshot {
    pub angle: f32,
    pub raw: u16,
    pub total_counts: i64,
    pub calibrated: bool,
    pub frozen: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frozen_duration_sec: Option<f64>,
    pub status: EncoderHealth,
    pub timestamp: DateTime<Utc>,
}

impl EncoderSnapshot {
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now.signed_duration_since(self.timestamp) > max_age
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_angle_matches_counts_times_factor() {
        let k = 360.0 / (1024.0 * 50.0);
        let total_counts: i64 = 12_345;
        let angle = crate::angle::normalize_360((total_counts as f64 * k) as f32);
        let snap = EncoderSnapshot {
            angle,
            raw: 0,
            total_counts,
            calibrated: true,
            frozen: false,
            frozen_duration_sec: None,
            status: EncoderHealth::Ok,
            timestamp: Utc::now(),
        };
        assert!((0.0..360.0).contains(&snap.angle));
    }

    #[test]
    fn staleness_uses_configured_max_age() {
        let snap = EncoderSnapshot {
            angle: 0.0,
            raw: 0,
            total_counts: 0,
            calibrated: false,
            frozen: false,
            frozen_duration_sec: None,
            status: EncoderHealth::Ok,
            timestamp: Utc::now() - chrono::Duration::seconds(3),
        };
        assert!(snap.is_stale(Utc::now(), chrono::Duration::seconds(2)));
        assert!(!snap.is_stale(Utc::now(), chrono::Duration::seconds(5)));
    }
}
