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

// End-to-end exercises of the Command Dispatcher driven the way
// `motor_service` actually drives it: commands arrive as a published
// `MotorCommand` file and results are observed through the returned
// `MotorStatus`, rather than calling the handler methods directly.

use chrono::Utc;
use domed::clock::SystemClock;
use domed::config::Config;
use domed::dispatcher::Dispatcher;
use domed::encoder::simulated::SimulatedEncoder;
use domed::encoder::{EncoderReader, EncoderReading, PositionSource};
use domed::ipc::motor_command::{CommandKind, MotorCommand};
use domed::ipc::motor_status::MotorState;
use domed::motor::simulated::SimulatedMotor;
use domed::tracking::catalog::StaticCatalog;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const CONFIG_TOML: &str = r#"
[site]
latitude = 44.0
longitude = 5.0
altitude = 600.0

[motor]
steps_per_revolution = 200
microsteps = 16
gear_ratio = 1.0
calibration_factor = 1.0
min_step_period_s = 0.00001

[gpio]
dir_pin = 1
step_pin = 2
switch_pin = 3

[encoder]
enabled = true
spi_bus = ""
median_window = 1

[[catalog.objects]]
name = "M13"
ra_deg = 250.4
dec_deg = 36.5
"#;

/// Adapts an in-process `EncoderReader` to `PositionSource`, the same role
/// `encoder_daemon` plays for real over IPC, but sampled synchronously so the
/// test stays self-contained in one process.
struct LivePosition(Mutex<EncoderReader>);

impl PositionSource for LivePosition {
    fn read(&self) -> Option<EncoderReading> {
        let mut reader = self.0.lock().unwrap();
        reader.sample(true).ok()?;
        let angle = reader.angle()?;
        let health = reader.health(Instant::now(), true);
        Some(EncoderReading { angle, health })
    }
}

fn build_dispatcher(dir: &std::path::Path, calibrated: bool) -> Dispatcher {
    let config = Config::parse(CONFIG_TOML).expect("fixture config should parse");
    let steps_per_rev = config.motor.steps_per_revolution as u64 * config.motor.microsteps as u64;

    let sim_encoder = SimulatedEncoder::new(0);
    let counter = sim_encoder.counter();
    let mut reader = EncoderReader::new(Box::new(sim_encoder), 1, Duration::from_secs(1), Duration::from_secs(2));
    if calibrated {
        reader.calibrate(0.0).unwrap();
    }
    let motor = SimulatedMotor::new(0).with_encoder_counter(counter, steps_per_rev);
    let catalog = StaticCatalog::new(&config.catalog.objects);

    Dispatcher::new(
        Box::new(LivePosition(Mutex::new(reader))),
        Box::new(motor),
        Box::new(catalog),
        Box::new(SystemClock),
        config,
        dir.join("domed.toml"),
        dir.join("motor_command.json"),
        dir.join("motor_status.json"),
        true,
    )
}

fn issue(dir: &std::path::Path, id: &str, kind: CommandKind) {
    let command_path = dir.join("motor_command.json");
    let cmd = MotorCommand {
        id: id.into(),
        kind,
        issued_at: Utc::now(),
    };
    domed::ipc::publish(&command_path, &cmd).unwrap();
}

#[test]
fn goto_command_drives_the_dome_to_target_and_publishes_idle_status() {
    let dir = tempfile::tempdir().unwrap();
    let mut dispatcher = build_dispatcher(dir.path(), true);

    issue(dir.path(), "goto-1", CommandKind::Goto { angle: 30.0, speed: None });
    let status = dispatcher.tick(Utc::now()).expect("tick should publish a status");

    assert_eq!(status.state, MotorState::Idle);
    assert!((domed::angle::shortest_delta(status.position, 30.0)).abs() <= 1.0, "dome should have reached ~30°, got {}", status.position);

    let published: domed::ipc::motor_status::MotorStatus = domed::ipc::read(&dir.path().join("motor_status.json")).expect("status file should exist");
    assert_eq!(published.state, MotorState::Idle);
}

#[test]
fn goto_before_calibration_is_rejected_and_state_stays_idle() {
    let dir = tempfile::tempdir().unwrap();
    let mut dispatcher = build_dispatcher(dir.path(), false);

    issue(dir.path(), "goto-1", CommandKind::Goto { angle: 90.0, speed: None });
    let status = dispatcher.tick(Utc::now()).unwrap();

    assert_eq!(status.state, MotorState::Idle, "a rejection must not force ERROR");
    assert!(status.logs.iter().any(|l| l.message.contains("not calibrated")));
}

#[test]
fn same_command_id_is_not_reapplied_on_the_next_tick() {
    let dir = tempfile::tempdir().unwrap();
    let mut dispatcher = build_dispatcher(dir.path(), true);

    issue(dir.path(), "dup", CommandKind::Goto { angle: 20.0, speed: None });
    let first = dispatcher.tick(Utc::now()).unwrap();
    let second = dispatcher.tick(Utc::now()).unwrap();

    assert_eq!(first.position, second.position, "the unchanged command file must not be re-dispatched");
}

#[test]
fn start_track_resolves_the_catalog_object_and_begins_tracking() {
    let dir = tempfile::tempdir().unwrap();
    let mut dispatcher = build_dispatcher(dir.path(), true);

    issue(
        dir.path(),
        "track-1",
        CommandKind::StartTrack {
            object: "M13".into(),
            skip_goto: true,
        },
    );
    let status = dispatcher.tick(Utc::now()).unwrap();

    assert_eq!(status.state, MotorState::Tracking);
    assert_eq!(status.tracking_object.as_deref(), Some("M13"));
}

#[test]
fn start_track_rejects_an_unknown_object() {
    let dir = tempfile::tempdir().unwrap();
    let mut dispatcher = build_dispatcher(dir.path(), true);

    issue(
        dir.path(),
        "track-1",
        CommandKind::StartTrack {
            object: "NGC-does-not-exist".into(),
            skip_goto: true,
        },
    );
    let status = dispatcher.tick(Utc::now()).unwrap();

    assert_eq!(status.state, MotorState::Error);
}

#[test]
fn stop_command_cancels_tracking_and_returns_to_idle() {
    let dir = tempfile::tempdir().unwrap();
    let mut dispatcher = build_dispatcher(dir.path(), true);

    issue(
        dir.path(),
        "track-1",
        CommandKind::StartTrack {
            object: "M13".into(),
            skip_goto: true,
        },
    );
    dispatcher.tick(Utc::now()).unwrap();

    issue(dir.path(), "stop-1", CommandKind::Stop);
    let status = dispatcher.tick(Utc::now()).unwrap();

    assert_eq!(status.state, MotorState::Idle);
    assert!(status.tracking_object.is_none());
}

#[test]
fn reload_is_rejected_while_not_idle() {
    let dir = tempfile::tempdir().unwrap();
    let mut dispatcher = build_dispatcher(dir.path(), true);

    issue(
        dir.path(),
        "track-1",
        CommandKind::StartTrack {
            object: "M13".into(),
            skip_goto: true,
        },
    );
    dispatcher.tick(Utc::now()).unwrap();
    assert_eq!(dispatcher.state(), MotorState::Tracking);

    issue(dir.path(), "reload-1", CommandKind::Reload);
    let status = dispatcher.tick(Utc::now()).unwrap();
    assert_eq!(status.state, MotorState::Tracking, "RELOAD outside IDLE is rejected, not a fault, and must not disturb the current state");
    assert!(status.logs.iter().any(|l| l.message.contains("not valid in state")));
}
