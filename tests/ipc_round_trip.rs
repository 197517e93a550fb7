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

// Cross-process-shaped IPC exercises: the Encoder Daemon's publish side and
// the Motor Service's consume side (`PositionSource`), talking through the
// same file a real deployment would use instead of an in-process channel.

use chrono::Utc;
use domed::encoder::{EncoderHealth, IpcEncoderLink, PositionSource};
use domed::ipc::encoder_snapshot::EncoderSnapshot;
use domed::ipc::motor_command::{CommandKind, MotorCommand};

#[test]
fn ipc_encoder_link_reads_a_published_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("encoder_position.json");

    let snapshot = EncoderSnapshot {
        angle: 123.5,
        raw: 350,
        total_counts: 987,
        calibrated: true,
        frozen: false,
        frozen_duration_sec: None,
        status: EncoderHealth::Ok,
        timestamp: Utc::now(),
    };
    domed::ipc::publish(&path, &snapshot).unwrap();

    let link = IpcEncoderLink::new(path, chrono::Duration::seconds(5));
    let reading = link.read().expect("a freshly published snapshot should be readable");
    assert!((reading.angle - 123.5).abs() < 1e-4);
    assert_eq!(reading.health, EncoderHealth::Ok);
}

#[test]
fn ipc_encoder_link_rejects_uncalibrated_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("encoder_position.json");

    let snapshot = EncoderSnapshot {
        angle: 0.0,
        raw: 0,
        total_counts: 0,
        calibrated: false,
        frozen: false,
        frozen_duration_sec: None,
        status: EncoderHealth::Ok,
        timestamp: Utc::now(),
    };
    domed::ipc::publish(&path, &snapshot).unwrap();

    let link = IpcEncoderLink::new(path, chrono::Duration::seconds(5));
    assert!(link.read().is_none(), "an uncalibrated daemon has no trustworthy angle to report");
}

#[test]
fn ipc_encoder_link_reports_absent_once_stale() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("encoder_position.json");

    let snapshot = EncoderSnapshot {
        angle: 10.0,
        raw: 0,
        total_counts: 0,
        calibrated: true,
        frozen: false,
        frozen_duration_sec: None,
        status: EncoderHealth::Ok,
        timestamp: Utc::now() - chrono::Duration::seconds(10),
    };
    domed::ipc::publish(&path, &snapshot).unwrap();

    let link = IpcEncoderLink::new(path, chrono::Duration::seconds(2));
    let reading = link.read().expect("still calibrated, just stale");
    assert_eq!(reading.health, EncoderHealth::Absent);
}

#[test]
fn missing_encoder_snapshot_is_no_data_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("encoder_position.json");
    let link = IpcEncoderLink::new(path, chrono::Duration::seconds(5));
    assert!(link.read().is_none());
}

#[test]
fn motor_command_round_trips_through_the_same_transport_as_encoder_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("motor_command.json");

    let cmd = MotorCommand {
        id: "operator-issued-1".into(),
        kind: CommandKind::Goto { angle: 200.0, speed: None },
        issued_at: Utc::now(),
    };
    domed::ipc::publish(&path, &cmd).unwrap();

    let read_back: MotorCommand = domed::ipc::read(&path).expect("command should round-trip");
    assert_eq!(read_back.id, "operator-issued-1");
    match read_back.kind {
        CommandKind::Goto { angle, .. } => assert_eq!(angle, 200.0),
        other => panic!("unexpected command kind: {other:?}"),
    }
}
