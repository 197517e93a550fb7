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

// Wire shape of the Motor Service's published status snapshot.

use crate::tracking::TrackingMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const FILE_NAME: &str = "motor_status.json";
pub const MAX_LOG_ENTRIES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MotorState {
    Idle,
    Moving,
    Initializing,
    Tracking,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub time: DateTime<Utc>,
    #[serde(rename = "type")]
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> LogEntry {
        LogEntry {
            time: Utc::now(),
            level,
            message: message.into(),
        }
    }
}

/// Pushes `entry` onto the bounded ring, evicting the oldest entry if full.
pub fn push_log(logs: &mut Vec<LogEntry>, entry: LogEntry) {
    if logs.len() >= MAX_LOG_ENTRIES {
        logs.remove(0);
    }
    logs.push(entry);
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackingInfo {
    pub az: f32,
    pub alt: f32,
    pub next_check_in: f64,
    pub total_corrections: u64,
    pub total_correction_deg: f64,
    pub encoder_offset: f32,
    pub interval_sec: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GotoInfo {
    pub start: f32,
    pub target: f32,
    pub delta: f32,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotorStatus {
    pub state: MotorState,
    pub position: f32,
    pub target: Option<f32>,
    pub mode: Option<TrackingMode>,
    pub tracking_object: Option<String>,
    pub tracking_info: Option<TrackingInfo>,
    pub goto_info: Option<GotoInfo>,
    pub simulation: bool,
    pub logs: Vec<LogEntry>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl MotorStatus {
    pub fn idle(simulation: bool, position: f32) -> MotorStatus {
        MotorStatus {
            state: MotorState::Idle,
            position,
            target: None,
            mode: None,
            tracking_object: None,
            tracking_info: None,
            goto_info: None,
            simulation,
            logs: Vec::new(),
            updated_at: Utc::now(),
            reason: None,
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now.signed_duration_since(self.updated_at) > max_age
    }
}
