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

// Tracking session state: a single value that composes three cooperating
// concerns by field (state data, goto bookkeeping, and correction strategy
// for smoothing/stagnation) rather than a type hierarchy of mixins.
// `ObjectTarget` is the resolved-object half; the smoothing/stagnation
// bookkeeping is the correction-strategy half.

use crate::error::ConvergeOutcome;
use crate::tracking::TrackingMode;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// The celestial object a session is following. Stars keep fixed J2000
/// coordinates; planets are marked so the engine recomputes RA/Dec each
/// correction.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectTarget {
    pub name: String,
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub is_planet: bool,
}

const SMOOTHING_HISTORY: usize = 5;

/// One completed correction, kept for the bounded `recent_corrections` log.
#[derive(Debug, Clone)]
pub struct CorrectionRecord {
    pub at: DateTime<Utc>,
    pub mode: TrackingMode,
    pub delta_deg: f32,
    pub outcome: ConvergeOutcome,
}

/// Composes the session's bookkeeping (state data), the recent-target
/// history used for outlier smoothing (correction strategy), and the
/// counters surfaced in `motor_status.tracking_info`.
pub struct TrackingSession {
    pub target: ObjectTarget,
    pub started_at: DateTime<Utc>,
    pub next_check_at: DateTime<Utc>,
    pub position_cible: Option<f32>,
    pub encoder_offset: f32,

    pub total_corrections: u64,
    pub total_correction_deg: f64,
    pub consecutive_stagnations: u32,

    recent_targets: VecDeque<f32>,
    pub recent_corrections: VecDeque<CorrectionRecord>,
}

impl TrackingSession {
    pub fn new(target: ObjectTarget, now: DateTime<Utc>) -> TrackingSession {
        TrackingSession {
            target,
            started_at: now,
            next_check_at: now,
            position_cible: None,
            encoder_offset: 0.0,
            total_corrections: 0,
            total_correction_deg: 0.0,
            consecutive_stagnations: 0,
            recent_targets: VecDeque::with_capacity(SMOOTHING_HISTORY),
            recent_corrections: VecDeque::with_capacity(16),
        }
    }

    /// Discards a raw target reading that is likely an abaque-boundary
    /// artifact (more than `outlier_threshold` away from the median of the
    /// last few readings), otherwise adopts and remembers it.
    pub fn smooth_target(&mut self, raw_az_dome: f32, outlier_threshold_deg: f32) -> f32 {
        if let Some(current) = self.position_cible {
            if !self.recent_targets.is_empty() {
                let median = median_of(&self.recent_targets);
                if (raw_az_dome - median).abs() > outlier_threshold_deg {
                    log::warn!(
                        "tracking: discarding target {raw_az_dome:.2}\u{b0}, {:.2}\u{b0} from median {median:.2}\u{b0}",
                        (raw_az_dome - median).abs()
                    );
                    return current;
                }
            }
        }

        if self.recent_targets.len() == SMOOTHING_HISTORY {
            self.recent_targets.pop_front();
        }
        self.recent_targets.push_back(raw_az_dome);
        self.position_cible = Some(raw_az_dome);
        raw_az_dome
    }

    pub fn finish_correction(&mut self, mode: TrackingMode, delta_deg: f32, outcome: ConvergeOutcome, now: DateTime<Utc>) {
        self.total_corrections += 1;
        self.total_correction_deg += delta_deg.abs() as f64;

        if matches!(outcome, ConvergeOutcome::Stagnated | ConvergeOutcome::Timeout) {
            self.consecutive_stagnations += 1;
        } else if matches!(outcome, ConvergeOutcome::Ok) {
            self.consecutive_stagnations = 0;
        }

        if self.recent_corrections.len() == 16 {
            self.recent_corrections.pop_front();
        }
        self.recent_corrections.push_back(CorrectionRecord {
            at: now,
            mode,
            delta_deg,
            outcome,
        });
    }
}

fn median_of(values: &VecDeque<f32>) -> f32 {
    let mut v: Vec<f32> = values.iter().copied().collect();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap());
    v[v.len() / 2]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(name: &str) -> ObjectTarget {
        ObjectTarget {
            name: name.into(),
            ra_deg: 10.0,
            dec_deg: 20.0,
            is_planet: false,
        }
    }

    #[test]
    fn first_target_is_always_adopted() {
        let mut s = TrackingSession::new(t("M13"), Utc::now());
        let v = s.smooth_target(123.4, 10.0);
        assert_eq!(v, 123.4);
    }

    #[test]
    fn outlier_beyond_threshold_is_discarded() {
        let mut s = TrackingSession::new(t("M13"), Utc::now());
        s.smooth_target(100.0, 10.0);
        s.smooth_target(101.0, 10.0);
        s.smooth_target(99.0, 10.0);
        // Median of [100, 101, 99] is 100; 250 is far outside threshold.
        let v = s.smooth_target(250.0, 10.0);
        assert_eq!(v, 99.0, "should keep previous adopted target, not the outlier");
    }

    #[test]
    fn inlier_within_threshold_is_adopted() {
        let mut s = TrackingSession::new(t("M13"), Utc::now());
        s.smooth_target(100.0, 10.0);
        let v = s.smooth_target(105.0, 10.0);
        assert_eq!(v, 105.0);
    }

}
