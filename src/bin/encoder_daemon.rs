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

// Encoder Daemon: exclusive owner of the SPI bus and the incremental-to-
// absolute conversion. Samples at 50 Hz, recalibrates at the reference
// microswitch, and publishes `encoder_position.json` for the Motor Service
// to read; it never touches GPIO step/direction pins or motor state, it
// alone owns the SPI handle and `total_counts`.

use clap::Parser;
use domed::config::Config;
use domed::encoder::simulated::SimulatedEncoder;
use domed::encoder::spi::SpiEncoder;
use domed::encoder::{EncoderHealth, EncoderReader, EncoderSource};
use domed::ipc::encoder_snapshot::EncoderSnapshot;
use domed::ipc::motor_status::{MotorState, MotorStatus};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long a raw count may sit unchanged before the Motor Service should
/// treat the encoder as FROZEN: 2 s while motor commands are active.
const FROZEN_AFTER: Duration = Duration::from_secs(2);

/// Sampling loop period: every 20 ms (50 Hz).
const SAMPLE_PERIOD: Duration = Duration::from_millis(20);

#[derive(Parser, Debug)]
#[command(name = "encoder_daemon", about = "Samples the dome's SPI encoder and publishes its position")]
struct Args {
    /// Path to the shared domed configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Force the simulated encoder backend regardless of `encoder.enabled`.
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
    log::info!("encoder_daemon build {}", domed::build_commit());
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

    let simulate = args.simulate || !config.encoder.enabled;
    let source: Box<dyn EncoderSource> = if simulate {
        log::info!("encoder_daemon running with simulated encoder");
        Box::new(SimulatedEncoder::new(0))
    } else {
        match SpiEncoder::open(&config.encoder.spi_bus, config.encoder.spi_speed_hz) {
            Ok(s) => Box::new(s),
            Err(e) => {
                log::error!("failed to open SPI encoder: {e}");
                std::process::exit(1);
            }
        }
    };

    let mut reader = EncoderReader::new(
        source,
        config.encoder.median_window,
        Duration::from_millis(config.encoder.max_age_ms),
        FROZEN_AFTER,
    );

    let gpio = if simulate { None } else { rppal::gpio::Gpio::new().ok() };
    let ipc_dir = PathBuf::from(&config.ipc.dir);
    let snapshot_path = ipc_dir.join(domed::ipc::encoder_snapshot::FILE_NAME);
    let status_path = ipc_dir.join(domed::ipc::motor_status::FILE_NAME);

    log::info!("encoder_daemon started, publishing to {}", snapshot_path.display());

    let mut motor_active = false;
    while !shutdown.load(Ordering::Relaxed) {
        let now = Instant::now();

        if let Some(gpio) = &gpio {
            match switch_engaged(gpio, config.gpio.switch_pin) {
                Ok(true) => {
                    if let Err(e) = reader.calibrate(config.encoder.calibration_angle_deg) {
                        log::warn!("calibration latch failed: {e}");
                    } else {
                        log::info!("calibration latched at {:.1}°", config.encoder.calibration_angle_deg);
                    }
                }
                Ok(false) => {}
                Err(e) => log::warn!("failed to read reference switch: {e}"),
            }
        }

        if let Some(status) = domed::ipc::read::<MotorStatus>(&status_path) {
            motor_active = matches!(status.state, MotorState::Moving | MotorState::Tracking | MotorState::Initializing);
        }

        if let Err(e) = reader.sample(motor_active) {
            log::warn!("encoder sample failed: {e}");
        }

        let health = reader.health(now, motor_active);
        if health == EncoderHealth::Frozen {
            log::warn!("encoder reading is FROZEN");
        }

        let snapshot = EncoderSnapshot {
            angle: reader.angle().unwrap_or(0.0),
            raw: reader.raw_count(),
            total_counts: reader.total_counts(),
            calibrated: reader.is_calibrated(),
            frozen: health == EncoderHealth::Frozen,
            frozen_duration_sec: reader.frozen_duration(now).map(|d| d.as_secs_f64()),
            status: health,
            timestamp: chrono::Utc::now(),
        };

        if let Err(e) = domed::ipc::publish(&snapshot_path, &snapshot) {
            log::error!("failed to publish encoder snapshot: {e}");
        }

        let elapsed = now.elapsed();
        if elapsed < SAMPLE_PERIOD {
            std::thread::sleep(SAMPLE_PERIOD - elapsed);
        }
    }

    log::info!("encoder_daemon shutting down");
}

/// True on the active-low reference microswitch's falling edge condition
/// (here just "currently engaged"), since `EncoderReader::calibrate` re-latching
/// on every sample while the switch stays closed is harmless: subsequent
/// engagements re-latch without resetting `calibrated`.
fn switch_engaged(gpio: &rppal::gpio::Gpio, switch_pin: u32) -> Result<bool, domed::error::EncoderFault> {
    let pin = gpio
        .get(switch_pin as u8)
        .map_err(|e| domed::error::EncoderFault::HardwareUnavailable(e.to_string()))?
        .into_input_pullup();
    Ok(pin.is_low())
}
