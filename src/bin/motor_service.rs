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

// Motor Service: sole owner of the GPIO step/direction pins, the
// `MotorState` machine, the tracking session and the command-id memory.
// Reads the Encoder Daemon's published position over IPC instead of owning
// the encoder itself, reads `motor_command.json`, and publishes
// `motor_status.json` once per tick.

use clap::Parser;
use domed::clock::SystemClock;
use domed::config::Config;
use domed::dispatcher::Dispatcher;
use domed::encoder::{IpcEncoderLink, PositionSource};
use domed::ipc::motor_status::FILE_NAME as MOTOR_STATUS_FILE;
use domed::motor::gpio::GpioMotor;
use domed::motor::simulated::SimulatedMotor;
use domed::motor::MotorDriver;
use domed::tracking::catalog::StaticCatalog;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Loop body budget: one tick is roughly 50 ms.
const TICK_PERIOD: Duration = Duration::from_millis(50);

/// Watchdog heartbeats to an external supervisor are emitted at least every 2 s.
const WATCHDOG_PERIOD: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "motor_service", about = "Owns GPIO and runs the dome's command dispatcher")]
struct Args {
    /// Path to the shared domed configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Force the simulated motor and skip GPIO, regardless of hardware availability.
    #[arg(long)]
    simulate: bool,
}

fn default_config_path() -> PathBuf {
    dirs::config_dir().unwrap_or_default().join("domed").join("domed.toml")
}

fn init_logging() {
    use simplelog::{ColorChoice, Config as LogConfig, LevelFilter, TermLogger, TerminalMode};
    let _ = TermLogger::init(LevelFilter::Info, LogConfig::default(), TerminalMode::Mixed, ColorChoice::Auto);
}

fn main() {
    init_logging();
    log::info!("motor_service build {}", domed::build_commit());
    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(default_config_path);

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("failed to load configuration from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    if let Err(e) = signal_hook::flag::register(signal_hook::consts::SIGTERM, shutdown.clone()) {
        log::warn!("failed to register SIGTERM handler: {e}");
    }
    if let Err(e) = signal_hook::flag::register(signal_hook::consts::SIGINT, shutdown.clone()) {
        log::warn!("failed to register SIGINT handler: {e}");
    }

    let ipc_dir = PathBuf::from(&config.ipc.dir);
    let encoder_path = ipc_dir.join(domed::ipc::encoder_snapshot::FILE_NAME);
    let command_path = ipc_dir.join(domed::ipc::motor_command::FILE_NAME);
    let status_path = ipc_dir.join(MOTOR_STATUS_FILE);

    let simulation = args.simulate || !config.encoder.enabled;
    let driver: Box<dyn MotorDriver> = if simulation {
        log::info!("motor_service running with simulated motor");
        Box::new(SimulatedMotor::new(0))
    } else {
        match GpioMotor::open(&config.gpio) {
            Ok(m) => Box::new(m),
            Err(e) => {
                log::error!("failed to acquire GPIO: {e}");
                std::process::exit(1);
            }
        }
    };

    let encoder_max_age = chrono::Duration::milliseconds(config.encoder.max_age_ms as i64);
    let encoder: Box<dyn PositionSource> = Box::new(IpcEncoderLink::new(encoder_path, encoder_max_age));
    let catalog = Box::new(StaticCatalog::new(&config.catalog.objects));

    spawn_watchdog(status_path.clone(), config.ipc.motor_status_max_age_s, shutdown.clone());

    let mut dispatcher = Dispatcher::new(
        encoder,
        driver,
        catalog,
        Box::new(SystemClock),
        config,
        config_path,
        command_path,
        status_path,
        simulation,
    );

    log::info!("motor_service started");

    while !shutdown.load(Ordering::Relaxed) {
        let now = Instant::now();
        if let Err(e) = dispatcher.tick(chrono::Utc::now()) {
            log::error!("failed to publish motor status: {e}");
        }
        let elapsed = now.elapsed();
        if elapsed < TICK_PERIOD {
            std::thread::sleep(TICK_PERIOD - elapsed);
        }
    }

    log::info!("motor_service shutting down");
}

/// A thread that only reads `motor_status.json`'s `updated_at` and logs a
/// heartbeat; it must not touch motor or tracking state, so it never opens
/// GPIO or the dispatcher.
fn spawn_watchdog(status_path: PathBuf, max_age_s: f64, shutdown: Arc<AtomicBool>) {
    std::thread::spawn(move || {
        let max_age = chrono::Duration::milliseconds((max_age_s * 1000.0) as i64);
        while !shutdown.load(Ordering::Relaxed) {
            match domed::ipc::read::<domed::ipc::motor_status::MotorStatus>(&status_path) {
                Some(status) if status.is_stale(chrono::Utc::now(), max_age) => {
                    log::warn!("watchdog: motor_status.json is stale (last updated {})", status.updated_at);
                }
                Some(_) => log::debug!("watchdog: motor_service heartbeat OK"),
                None => log::warn!("watchdog: no motor_status.json published yet"),
            }
            std::thread::sleep(WATCHDOG_PERIOD);
        }
    });
}
