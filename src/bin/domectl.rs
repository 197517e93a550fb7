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

// Thin operator CLI: writes `motor_command.json` and prints
// `motor_status.json`, standing in for a full terminal UI or HTTP layer.

use clap::{Parser, Subcommand};
use domed::config::Config;
use domed::ipc::motor_command::{CommandKind, MotorCommand, RotationDirection};
use domed::ipc::motor_status::MotorStatus;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Parser, Debug)]
#[command(name = "domectl", about = "Operator CLI for the dome tracking control core", version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Path to the shared domed configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Slew to an absolute dome angle in degrees.
    Goto {
        angle: f32,
        #[arg(long)]
        speed: Option<f64>,
    },
    /// Move by a relative offset in degrees.
    Jog {
        delta: f32,
        #[arg(long)]
        speed: Option<f64>,
    },
    /// Rotate indefinitely until STOP, cw or ccw.
    Continuous { direction: String },
    /// Cancel any in-progress motion or tracking.
    Stop,
    /// Begin tracking a catalog object.
    StartTrack {
        object: String,
        /// Skip the initial GOTO and start the correction loop in place.
        #[arg(long)]
        skip_goto: bool,
    },
    /// Stop tracking and return to IDLE.
    StopTrack,
    /// Reload configuration (only accepted while IDLE).
    Reload,
    /// Print the last published motor status.
    Status,
}

fn default_config_path() -> PathBuf {
    dirs::config_dir().unwrap_or_default().join("domed").join("domed.toml")
}

/// A reasonably unique command id so retries/duplicates dedupe cleanly
/// against the dispatcher's at-most-once memoization.
fn new_command_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

fn main() {
    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(default_config_path);

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load configuration from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };
    let ipc_dir = PathBuf::from(&config.ipc.dir);
    let command_path = ipc_dir.join(domed::ipc::motor_command::FILE_NAME);
    let status_path = ipc_dir.join(domed::ipc::motor_status::FILE_NAME);

    if let Command::Status = args.command {
        print_status(&status_path);
        return;
    }

    let kind = match args.command {
        Command::Goto { angle, speed } => CommandKind::Goto { angle, speed },
        Command::Jog { delta, speed } => CommandKind::Jog { delta, speed },
        Command::Continuous { direction } => match RotationDirection::from_str(&direction.to_lowercase()) {
            Ok(direction) => CommandKind::Continuous { direction },
            Err(_) => {
                eprintln!("invalid direction `{direction}`, expected `cw` or `ccw`");
                std::process::exit(1);
            }
        },
        Command::Stop => CommandKind::Stop,
        Command::StartTrack { object, skip_goto } => CommandKind::StartTrack { object, skip_goto },
        Command::StopTrack => CommandKind::StopTrack,
        Command::Reload => CommandKind::Reload,
        Command::Status => unreachable!("handled above"),
    };

    let command = MotorCommand {
        id: new_command_id(),
        kind,
        issued_at: chrono::Utc::now(),
    };

    if let Err(e) = domed::ipc::publish(&command_path, &command) {
        eprintln!("failed to publish command: {e}");
        std::process::exit(1);
    }
    println!("issued {} ({})", command.id, command_path.display());
}

fn print_status(status_path: &std::path::Path) {
    match domed::ipc::read::<MotorStatus>(status_path) {
        Some(status) => match serde_json::to_string_pretty(&status) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("failed to format status: {e}"),
        },
        None => {
            eprintln!("no status published at {}", status_path.display());
            std::process::exit(1);
        }
    }
}
