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
// One error enum per layer (§9 redesign note: replace ad-hoc exception types
// with tagged-variant results), plus a thin wrapper composing them for
// callers that cross layer boundaries (the dispatcher).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration key `{0}`")]
    MissingKey(String),
    #[error("value for `{key}` out of range: {detail}")]
    OutOfRange { key: String, detail: String },
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum IpcFault {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[source] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum EncoderFault {
    #[error("hardware unavailable: {0}")]
    HardwareUnavailable(String),
    #[error("no stable reading available (spread {spread:.3} exceeds threshold {threshold:.3})")]
    Unstable { spread: f32, threshold: f32 },
    #[error("encoder reading is absent")]
    Absent,
}

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum ConvergeOutcome {
    #[error("converged within tolerance")]
    Ok,
    #[error("stagnated: error failed to decrease across recent corrections")]
    Stagnated,
    #[error("cancelled")]
    Cancelled,
    #[error("encoder unavailable")]
    EncoderUnavailable,
    #[error("timed out")]
    Timeout,
    #[error("protection tripped: error exceeded runaway threshold")]
    ProtectionTripped,
}

#[derive(Debug, Error)]
pub enum MotorFault {
    #[error("GPIO acquisition failed: {0}")]
    GpioUnavailable(String),
    #[error("GPIO fault during motion: {0}")]
    GpioError(String),
    #[error("converge escape: {0}")]
    Converge(#[from] ConvergeOutcome),
}

#[derive(Debug, Error)]
pub enum TrackingFault {
    #[error("object not found: {0}")]
    ObjectNotFound(String),
    #[error("not calibrated")]
    NotCalibrated,
    #[error("encoder health: {consecutive_stagnations} consecutive stagnations")]
    EncoderHealth { consecutive_stagnations: u32 },
    #[error(transparent)]
    Motor(#[from] MotorFault),
}

#[derive(Debug, Error)]
pub enum CommandRejected {
    #[error("not calibrated")]
    NotCalibrated,
    #[error("invalid angle: {0}")]
    InvalidAngle(f32),
    #[error("command not valid in state {state}")]
    WrongState { state: &'static str },
    #[error("{0}")]
    Other(String),
}

/// Top-level error crossing the dispatcher's boundary to the IPC layer / caller.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Ipc(#[from] IpcFault),
    #[error(transparent)]
    Encoder(#[from] EncoderFault),
    #[error(transparent)]
    Motor(#[from] MotorFault),
    #[error(transparent)]
    Tracking(#[from] TrackingFault),
    #[error(transparent)]
    Rejected(#[from] CommandRejected),
}
