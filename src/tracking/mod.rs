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

// Adaptive tracking engine: resolves the followed object's horizontal
// position, decides whether and how hard a correction is needed.

pub mod abaque;
pub mod catalog;
pub mod session;

use crate::config::{AdaptiveConfig, SiteConfig};
use crate::error::TrackingFault;
use abaque::Abaque;
use catalog::CatalogProvider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
pub use session::{ObjectTarget, TrackingSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrackingMode {
    Normal,
    Critical,
    Continuous,
}

/// Picks the tracking mode for the next correction interval.
pub fn select_mode(altitude_deg: f32, pending_delta_deg: f32, config: &AdaptiveConfig) -> TrackingMode {
    if altitude_deg >= config.continuous_altitude_deg || pending_delta_deg.abs() > config.continuous_delta_deg {
        TrackingMode::Continuous
    } else if altitude_deg >= config.critical_altitude_deg {
        TrackingMode::Critical
    } else {
        TrackingMode::Normal
    }
}

/// Output of one correction-step computation: everything the dispatcher
/// needs to decide whether, and how, to drive the motor, without the
/// tracking engine itself touching motor/encoder state.
pub struct CorrectionPlan {
    pub az_obj: f32,
    pub alt_obj: f32,
    pub mode: TrackingMode,
    pub delta_deg: f32,
    pub needs_move: bool,
}

/// Resolves current horizontal coordinates, looks up and smooths the abaque
/// target, computes the delta against the encoder, and selects the
/// tracking mode. Does not move the motor or touch encoder ownership; the
/// dispatcher does that with the returned plan.
pub fn plan_correction(
    session: &mut TrackingSession,
    catalog: &dyn CatalogProvider,
    abaque: &Abaque,
    site: &SiteConfig,
    config: &AdaptiveConfig,
    encoder_angle: f32,
    now: DateTime<Utc>,
) -> Result<CorrectionPlan, TrackingFault> {
    let resolved = catalog::ResolvedObject {
        ra_deg: session.target.ra_deg,
        dec_deg: session.target.dec_deg,
        is_planet: session.target.is_planet,
        object_type: None,
    };
    let (az_obj, alt_obj) = catalog::current_horizontal(catalog, &resolved, &session.target.name, site, now);

    let raw_az_dome = abaque.query(alt_obj, az_obj);
    let smoothed = session.smooth_target(raw_az_dome, config.outlier_threshold_deg);

    let target_with_offset = crate::angle::normalize_360(smoothed + session.encoder_offset);
    let delta = crate::angle::shortest_delta(crate::angle::normalize_360(encoder_angle), target_with_offset);

    let mode = select_mode(alt_obj, delta, config);
    let threshold = config.params(mode).threshold_deg;

    Ok(CorrectionPlan {
        az_obj,
        alt_obj,
        mode,
        delta_deg: delta,
        needs_move: delta.abs() > threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdaptiveConfig;

    fn config() -> AdaptiveConfig {
        AdaptiveConfig::default()
    }

    #[test]
    fn mode_selection_matches_scenario_table() {
        let c = config();
        assert_eq!(select_mode(50.0, 1.0, &c), TrackingMode::Normal);
        assert_eq!(select_mode(72.0, 1.0, &c), TrackingMode::Critical);
        assert_eq!(select_mode(80.0, 1.0, &c), TrackingMode::Continuous);
        assert_eq!(select_mode(50.0, 35.0, &c), TrackingMode::Continuous);
    }

    #[test]
    fn interval_lookup_matches_scenario_table() {
        let c = config();
        assert_eq!(c.params(TrackingMode::Normal).interval_s, 60.0);
        assert_eq!(c.params(TrackingMode::Critical).interval_s, 15.0);
        assert_eq!(c.params(TrackingMode::Continuous).interval_s, 5.0);
    }
}
