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

// Wire shape of a queued motor command. `CommandKind` is a closed sum type
// with exhaustive matching in the dispatcher, rather than a string-keyed
// command name plus an all-optional params bag; the wire format stays
// adjacently tagged (`kind` + `params`) so the JSON shape is unaffected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

pub const FILE_NAME: &str = "motor_command.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RotationDirection {
    Cw,
    Ccw,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params")]
pub enum CommandKind {
    #[serde(rename = "GOTO")]
    Goto { angle: f32, speed: Option<f64> },
    #[serde(rename = "JOG")]
    Jog { delta: f32, speed: Option<f64> },
    #[serde(rename = "CONTINUOUS")]
    Continuous { direction: RotationDirection },
    #[serde(rename = "STOP")]
    Stop,
    #[serde(rename = "START_TRACK")]
    StartTrack {
        object: String,
        #[serde(default)]
        skip_goto: bool,
    },
    #[serde(rename = "STOP_TRACK")]
    StopTrack,
    #[serde(rename = "RELOAD")]
    Reload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotorCommand {
    pub id: String,
    #[serde(flatten)]
    pub kind: CommandKind,
    pub issued_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goto_round_trips_through_json() {
        let cmd = MotorCommand {
            id: "abc-1".into(),
            kind: CommandKind::Goto {
                angle: 90.0,
                speed: None,
            },
            issued_at: Utc::now(),
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"kind\":\"GOTO\""));
        let back: MotorCommand = serde_json::from_str(&json).unwrap();
        match back.kind {
            CommandKind::Goto { angle, .. } => assert_eq!(angle, 90.0),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn start_track_defaults_skip_goto_to_false() {
        let json = r#"{"id":"x","kind":"START_TRACK","params":{"object":"M13"},"issued_at":"2024-01-01T00:00:00Z"}"#;
        let cmd: MotorCommand = serde_json::from_str(json).unwrap();
        match cmd.kind {
            CommandKind::StartTrack { object, skip_goto } => {
                assert_eq!(object, "M13");
                assert!(!skip_goto);
            }
            _ => panic!("wrong variant"),
        }
    }
}
