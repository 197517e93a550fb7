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

// Dome tracking control core
//
// Structured configuration loaded once at startup and immutable thereafter
// except via RELOAD (only while IDLE). Nested tables (site, motor, gpio,
// adaptive mode table, thresholds, encoder, abaque) are expressed with
// `toml` + `serde`. See DESIGN.md.

use crate::error::ConfigError;
use crate::tracking::TrackingMode;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteConfig {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    #[serde(default)]
    pub tz_offset: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MotorConfig {
    pub steps_per_revolution: u32,
    pub microsteps: u32,
    pub gear_ratio: f64,
    pub calibration_factor: f64,
    pub min_step_period_s: f64,
    #[serde(default = "defaults::ramp_threshold_deg")]
    pub ramp_threshold_deg: f32,
    #[serde(default = "defaults::ramp_initial_period_s")]
    pub ramp_initial_period_s: f64,
    #[serde(default = "defaults::ramp_steps")]
    pub ramp_steps: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GpioConfig {
    pub dir_pin: u32,
    pub step_pin: u32,
    pub switch_pin: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModeParams {
    pub interval_s: f64,
    pub threshold_deg: f32,
    pub step_period_s: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdaptiveConfig {
    #[serde(default = "defaults::normal_mode")]
    pub normal: ModeParams,
    #[serde(default = "defaults::critical_mode")]
    pub critical: ModeParams,
    #[serde(default = "defaults::continuous_mode")]
    pub continuous: ModeParams,
    #[serde(default = "defaults::critical_alt_deg")]
    pub critical_altitude_deg: f32,
    #[serde(default = "defaults::continuous_alt_deg")]
    pub continuous_altitude_deg: f32,
    #[serde(default = "defaults::continuous_delta_deg")]
    pub continuous_delta_deg: f32,
    #[serde(default = "defaults::outlier_threshold_deg")]
    pub outlier_threshold_deg: f32,
    #[serde(default = "defaults::smoothing_window")]
    pub smoothing_window: usize,
}

impl AdaptiveConfig {
    pub fn params(&self, mode: TrackingMode) -> &ModeParams {
        match mode {
            TrackingMode::Normal => &self.normal,
            TrackingMode::Critical => &self.critical,
            TrackingMode::Continuous => &self.continuous,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThresholdsConfig {
    #[serde(default = "defaults::feedback_deg")]
    pub feedback_deg: f32,
    #[serde(default = "defaults::protection_deg")]
    pub protection_deg: f32,
    #[serde(default = "defaults::tolerance_deg")]
    pub tolerance_deg: f32,
    #[serde(default = "defaults::stagnation_count")]
    pub stagnation_count: u32,
    #[serde(default = "defaults::stagnation_min_move_deg")]
    pub stagnation_min_move_deg: f32,
    #[serde(default = "defaults::max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "defaults::polish_iterations")]
    pub polish_iterations: u32,
    #[serde(default = "defaults::max_duration_s")]
    pub max_duration_s: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EncoderConfig {
    #[serde(default = "defaults::true_")]
    pub enabled: bool,
    #[serde(default)]
    pub spi_bus: String,
    #[serde(default = "defaults::spi_speed_hz")]
    pub spi_speed_hz: u32,
    #[serde(default = "defaults::median_window")]
    pub median_window: usize,
    #[serde(default = "defaults::calibration_angle_deg")]
    pub calibration_angle_deg: f32,
    #[serde(default = "defaults::max_age_ms")]
    pub max_age_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AbaqueSample {
    pub altitude: f32,
    pub az_obj: f32,
    pub az_dome: f32,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AbaqueConfig {
    #[serde(default, rename = "samples")]
    pub samples: Vec<AbaqueSample>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IpcConfig {
    #[serde(default = "defaults::ipc_dir")]
    pub dir: String,
    #[serde(default = "defaults::motor_status_max_age_s")]
    pub motor_status_max_age_s: f64,
}

/// A single named object for the built-in static catalog: the minimal
/// stand-in that lets `motor_service` run standalone without a real
/// object-resolution service wired in. See DESIGN.md.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogObject {
    pub name: String,
    pub ra_deg: f64,
    pub dec_deg: f64,
    #[serde(default)]
    pub is_planet: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub objects: Vec<CatalogObject>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub site: SiteConfig,
    pub motor: MotorConfig,
    pub gpio: GpioConfig,
    #[serde(default)]
    pub adaptive: AdaptiveConfig,
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub abaque: AbaqueConfig,
    #[serde(default)]
    pub ipc: IpcConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Config, ConfigError> {
        let cfg: Config = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(-90.0..=90.0).contains(&self.site.latitude) {
            return Err(ConfigError::OutOfRange {
                key: "site.latitude".into(),
                detail: format!("{} not in [-90, 90]", self.site.latitude),
            });
        }
        if !(-180.0..=180.0).contains(&self.site.longitude) {
            return Err(ConfigError::OutOfRange {
                key: "site.longitude".into(),
                detail: format!("{} not in [-180, 180]", self.site.longitude),
            });
        }
        if self.motor.steps_per_revolution == 0 {
            return Err(ConfigError::OutOfRange {
                key: "motor.steps_per_revolution".into(),
                detail: "must be > 0".into(),
            });
        }
        if self.motor.min_step_period_s <= 0.0 {
            return Err(ConfigError::OutOfRange {
                key: "motor.min_step_period_s".into(),
                detail: "must be > 0".into(),
            });
        }
        if self.encoder.median_window == 0 {
            return Err(ConfigError::OutOfRange {
                key: "encoder.median_window".into(),
                detail: "must be > 0".into(),
            });
        }
        if self.thresholds.stagnation_count == 0 {
            return Err(ConfigError::OutOfRange {
                key: "thresholds.stagnation_count".into(),
                detail: "must be > 0".into(),
            });
        }
        Ok(())
    }
}

mod defaults {
    use super::ModeParams;

    pub fn true_() -> bool {
        true
    }
    pub fn spi_speed_hz() -> u32 {
        1_000_000
    }
    pub fn median_window() -> usize {
        5
    }
    pub fn calibration_angle_deg() -> f32 {
        45.0
    }
    pub fn max_age_ms() -> u64 {
        2000
    }
    pub fn ipc_dir() -> String {
        "/dev/shm".to_string()
    }
    pub fn motor_status_max_age_s() -> f64 {
        5.0
    }
    pub fn feedback_deg() -> f32 {
        3.0
    }
    pub fn protection_deg() -> f32 {
        20.0
    }
    pub fn tolerance_deg() -> f32 {
        0.5
    }
    pub fn stagnation_count() -> u32 {
        3
    }
    pub fn stagnation_min_move_deg() -> f32 {
        0.1
    }
    pub fn max_iterations() -> u32 {
        10
    }
    pub fn polish_iterations() -> u32 {
        3
    }
    pub fn max_duration_s() -> f64 {
        30.0
    }
    pub fn ramp_threshold_deg() -> f32 {
        5.0
    }
    pub fn ramp_initial_period_s() -> f64 {
        0.01
    }
    pub fn ramp_steps() -> u32 {
        50
    }
    pub fn critical_alt_deg() -> f32 {
        68.0
    }
    pub fn continuous_alt_deg() -> f32 {
        75.0
    }
    pub fn continuous_delta_deg() -> f32 {
        30.0
    }
    pub fn outlier_threshold_deg() -> f32 {
        10.0
    }
    pub fn smoothing_window() -> usize {
        5
    }
    pub fn normal_mode() -> ModeParams {
        ModeParams {
            interval_s: 60.0,
            threshold_deg: 0.5,
            step_period_s: 0.002,
        }
    }
    pub fn critical_mode() -> ModeParams {
        ModeParams {
            interval_s: 15.0,
            threshold_deg: 0.25,
            step_period_s: 0.001,
        }
    }
    pub fn continuous_mode() -> ModeParams {
        ModeParams {
            interval_s: 5.0,
            threshold_deg: 0.1,
            step_period_s: 0.00015,
        }
    }
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        AdaptiveConfig {
            normal: defaults::normal_mode(),
            critical: defaults::critical_mode(),
            continuous: defaults::continuous_mode(),
            critical_altitude_deg: defaults::critical_alt_deg(),
            continuous_altitude_deg: defaults::continuous_alt_deg(),
            continuous_delta_deg: defaults::continuous_delta_deg(),
            outlier_threshold_deg: defaults::outlier_threshold_deg(),
            smoothing_window: defaults::smoothing_window(),
        }
    }
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        ThresholdsConfig {
            feedback_deg: defaults::feedback_deg(),
            protection_deg: defaults::protection_deg(),
            tolerance_deg: defaults::tolerance_deg(),
            stagnation_count: defaults::stagnation_count(),
            stagnation_min_move_deg: defaults::stagnation_min_move_deg(),
            max_iterations: defaults::max_iterations(),
            polish_iterations: defaults::polish_iterations(),
            max_duration_s: defaults::max_duration_s(),
        }
    }
}

impl Default for IpcConfig {
    fn default() -> Self {
        IpcConfig {
            dir: defaults::ipc_dir(),
            motor_status_max_age_s: defaults::motor_status_max_age_s(),
        }
    }
}
