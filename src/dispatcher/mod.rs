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

// Command Dispatcher: the single-threaded motor_service control loop. Owns
// the `MotorState` machine and the encoder/motor/tracking handles, memoizes
// at-most-once command execution by id, and cooperatively polls for STOP by
// re-reading the command snapshot from inside blocking motor operations
// rather than waiting for the next tick.

use crate::angle::{normalize_360, shortest_delta};
use crate::clock::ClockSource;
use crate::config::Config;
use crate::encoder::PositionSource;
use crate::error::{CommandRejected, ConvergeOutcome};
use crate::feedback::{self, ConvergeParams};
use crate::ipc::motor_command::{CommandKind, MotorCommand, RotationDirection};
use crate::ipc::motor_status::{push_log, GotoInfo, LogEntry, LogLevel, MotorState, MotorStatus, TrackingInfo};
use crate::motor::{self, MotorDriver};
use crate::tracking::abaque::Abaque;
use crate::tracking::catalog::CatalogProvider;
use crate::tracking::session::{ObjectTarget, TrackingSession};
use crate::tracking::{self, TrackingMode};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// An automatic recovery timer resets to IDLE after 30s of ERROR.
const ERROR_RECOVERY_DURATION: Duration = Duration::from_secs(30);

/// Burst size between cancellation checks for an open-ended CONTINUOUS move:
/// a bounded-block loop that checks the cancel flag between step bursts.
const CONTINUOUS_BURST_STEPS: u64 = 200;

pub struct Dispatcher {
    encoder: Box<dyn PositionSource>,
    driver: Box<dyn MotorDriver>,
    catalog: Box<dyn CatalogProvider>,
    clock: Box<dyn ClockSource>,
    config: Config,
    config_path: PathBuf,
    abaque: Abaque,
    command_path: PathBuf,
    status_path: PathBuf,

    state: MotorState,
    tracking: Option<TrackingSession>,
    goto_info: Option<GotoInfo>,
    last_mode: Option<TrackingMode>,
    last_az_obj: f32,
    last_alt_obj: f32,

    last_command_id: Option<String>,
    logs: Vec<LogEntry>,
    error_reason: Option<String>,
    error_since: Option<Instant>,

    cancel_flag: Arc<AtomicBool>,
    stop_seen_id: Arc<Mutex<Option<String>>>,
    simulation: bool,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        encoder: Box<dyn PositionSource>,
        driver: Box<dyn MotorDriver>,
        catalog: Box<dyn CatalogProvider>,
        clock: Box<dyn ClockSource>,
        config: Config,
        config_path: PathBuf,
        command_path: PathBuf,
        status_path: PathBuf,
        simulation: bool,
    ) -> Dispatcher {
        let abaque = Abaque::build(&config.abaque.samples);
        Dispatcher {
            encoder,
            driver,
            catalog,
            clock,
            config,
            config_path,
            abaque,
            command_path,
            status_path,
            state: MotorState::Idle,
            tracking: None,
            goto_info: None,
            last_mode: None,
            last_az_obj: 0.0,
            last_alt_obj: 0.0,
            last_command_id: None,
            logs: Vec::new(),
            error_reason: None,
            error_since: None,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            stop_seen_id: Arc::new(Mutex::new(None)),
            simulation,
        }
    }

    pub fn state(&self) -> MotorState {
        self.state
    }

    /// Current absolute angle as last published by the Encoder Daemon, or
    /// `None` before the first calibrated snapshot lands (Motor Service
    /// reads position rather than sampling hardware itself).
    fn current_angle(&self) -> Option<f32> {
        self.encoder.read().map(|r| r.angle)
    }

    fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => log::info!("{message}"),
            LogLevel::Warn => log::warn!("{message}"),
            LogLevel::Error => log::error!("{message}"),
        }
        push_log(&mut self.logs, LogEntry::new(level, message));
    }

    fn enter_error(&mut self, reason: String) {
        self.state = MotorState::Error;
        self.error_reason = Some(reason.clone());
        self.error_since = Some(Instant::now());
        self.log(LogLevel::Error, reason);
    }

    fn maybe_recover_from_error(&mut self) {
        if self.state != MotorState::Error {
            return;
        }
        if let Some(since) = self.error_since {
            if since.elapsed() >= ERROR_RECOVERY_DURATION {
                self.state = MotorState::Idle;
                self.error_reason = None;
                self.error_since = None;
                self.log(LogLevel::Info, "auto-recovered from ERROR after 30s");
            }
        }
    }

    /// A cancellation check usable as the `cancel: &dyn Fn() -> bool`
    /// argument to `motor::rotate`/`feedback::converge`: true once the
    /// in-process flag is set, or as soon as a not-yet-seen STOP command
    /// shows up in the command snapshot. Checking the file here (not just
    /// the flag) is what makes STOP observable mid-rotation without waiting
    /// for the next tick.
    fn cancel_closure(&self) -> impl Fn() -> bool {
        let flag = self.cancel_flag.clone();
        let seen = self.stop_seen_id.clone();
        let path = self.command_path.clone();
        move || {
            if flag.load(Ordering::Relaxed) {
                return true;
            }
            if let Some(cmd) = crate::ipc::read::<MotorCommand>(&path) {
                if matches!(cmd.kind, CommandKind::Stop) {
                    let mut seen = seen.lock().unwrap();
                    if seen.as_deref() != Some(cmd.id.as_str()) {
                        *seen = Some(cmd.id);
                        flag.store(true, Ordering::Relaxed);
                        return true;
                    }
                }
            }
            false
        }
    }

    /// Dispatches `cmd` if its id differs from the last one executed
    /// (at-most-once memoization).
    pub fn handle_command(&mut self, cmd: MotorCommand, now: DateTime<Utc>) {
        if self.last_command_id.as_deref() == Some(cmd.id.as_str()) {
            return;
        }
        self.last_command_id = Some(cmd.id.clone());
        self.cancel_flag.store(false, Ordering::Relaxed);

        let result = match cmd.kind {
            CommandKind::Goto { angle, speed } => self.handle_goto(angle, speed, now),
            CommandKind::Jog { delta, speed } => self.handle_jog(delta, speed),
            CommandKind::Continuous { direction } => self.handle_continuous(direction),
            CommandKind::Stop => self.handle_stop(),
            CommandKind::StartTrack { object, skip_goto } => self.handle_start_track(&object, skip_goto, now),
            CommandKind::StopTrack => self.handle_stop_track(),
            CommandKind::Reload => self.handle_reload(),
        };

        if let Err(e) = result {
            match e {
                CommandRejected::NotCalibrated | CommandRejected::InvalidAngle(_) | CommandRejected::WrongState { .. } => {
                    self.log(LogLevel::Warn, format!("command rejected: {e}"));
                }
                CommandRejected::Other(_) => self.enter_error(e.to_string()),
            }
        }
    }

    fn converge_params(&self, target_angle: f32, max_iterations: u32, step_period: Duration, is_initial_goto: bool) -> ConvergeParams {
        let t = &self.config.thresholds;
        ConvergeParams {
            target_angle,
            tolerance: t.tolerance_deg,
            step_period,
            max_iterations,
            max_duration: Duration::from_secs_f64(t.max_duration_s),
            protection_threshold_deg: t.protection_deg,
            stagnation_count: t.stagnation_count as usize,
            min_movement_threshold_deg: t.stagnation_min_move_deg,
            is_initial_goto,
        }
    }

    /// GOTO handler: for deltas beyond the feedback threshold, a single
    /// direct rotation avoids the audible pulsing of iterated feedback,
    /// followed by a short bounded polish; small deltas go straight to the
    /// feedback controller.
    fn handle_goto(&mut self, angle: f32, speed: Option<f64>, now: DateTime<Utc>) -> Result<(), CommandRejected> {
        if angle.is_nan() || angle.is_infinite() {
            return Err(CommandRejected::InvalidAngle(angle));
        }
        let current = self.current_angle().ok_or(CommandRejected::NotCalibrated)?;
        let target = normalize_360(angle);
        let delta = shortest_delta(current, target);

        self.state = MotorState::Moving;
        self.goto_info = Some(GotoInfo {
            start: current,
            target,
            delta,
            started_at: now,
        });

        let step_period = speed
            .map(Duration::from_secs_f64)
            .unwrap_or_else(|| Duration::from_secs_f64(self.config.adaptive.continuous.step_period_s));
        let motor_config = self.config.motor.clone();
        let cancel = self.cancel_closure();

        if delta.abs() > self.config.thresholds.feedback_deg {
            let steps = motor::steps_for_delta(delta, &motor_config);
            let direction = motor::direction_for_delta(delta);
            let done = motor::rotate(self.driver.as_mut(), direction, steps, step_period, &motor_config, &cancel)
                .map_err(|e| CommandRejected::Other(e.to_string()))?;
            if done < steps {
                self.goto_info = None;
                self.state = MotorState::Idle;
                return Ok(());
            }

            let params = self.converge_params(target, self.config.thresholds.polish_iterations, step_period, true);
            match feedback::converge(self.encoder.as_ref(), self.driver.as_mut(), &motor_config, self.clock.as_ref(), &params, &cancel) {
                Ok(_) | Err(ConvergeOutcome::Cancelled) => {}
                Err(other) => return Err(CommandRejected::Other(other.to_string())),
            }
        } else {
            let params = self.converge_params(target, self.config.thresholds.max_iterations, step_period, true);
            match feedback::converge(self.encoder.as_ref(), self.driver.as_mut(), &motor_config, self.clock.as_ref(), &params, &cancel) {
                Ok(_) | Err(ConvergeOutcome::Cancelled) => {}
                Err(other) => return Err(CommandRejected::Other(other.to_string())),
            }
        }

        self.goto_info = None;
        self.state = MotorState::Idle;
        self.log(LogLevel::Info, format!("GOTO {target:.2} complete"));
        Ok(())
    }

    fn handle_jog(&mut self, delta: f32, speed: Option<f64>) -> Result<(), CommandRejected> {
        if self.current_angle().is_none() {
            return Err(CommandRejected::NotCalibrated);
        }
        self.state = MotorState::Moving;
        let step_period = speed
            .map(Duration::from_secs_f64)
            .unwrap_or_else(|| Duration::from_secs_f64(self.config.adaptive.continuous.step_period_s));
        let motor_config = self.config.motor.clone();
        let steps = motor::steps_for_delta(delta, &motor_config);
        let direction = motor::direction_for_delta(delta);
        let cancel = self.cancel_closure();
        motor::rotate(self.driver.as_mut(), direction, steps, step_period, &motor_config, &cancel)
            .map_err(|e| CommandRejected::Other(e.to_string()))?;
        self.state = MotorState::Idle;
        Ok(())
    }

    fn handle_continuous(&mut self, direction: RotationDirection) -> Result<(), CommandRejected> {
        if self.current_angle().is_none() {
            return Err(CommandRejected::NotCalibrated);
        }
        self.state = MotorState::Moving;
        let motor_config = self.config.motor.clone();
        let step_period = Duration::from_secs_f64(self.config.adaptive.continuous.step_period_s);
        let cancel = self.cancel_closure();

        loop {
            if cancel() {
                break;
            }
            motor::rotate(self.driver.as_mut(), direction, CONTINUOUS_BURST_STEPS, step_period, &motor_config, &cancel)
                .map_err(|e| CommandRejected::Other(e.to_string()))?;
        }
        self.state = MotorState::Idle;
        Ok(())
    }

    /// STOP: cancels any in-progress motion, including an active tracking
    /// session, so the resulting state is always `IDLE` rather than leaving
    /// a tracking session alive underneath it.
    fn handle_stop(&mut self) -> Result<(), CommandRejected> {
        self.cancel_flag.store(true, Ordering::Relaxed);
        self.tracking = None;
        self.goto_info = None;
        self.state = MotorState::Idle;
        Ok(())
    }

    fn handle_start_track(&mut self, object: &str, skip_goto: bool, now: DateTime<Utc>) -> Result<(), CommandRejected> {
        if self.current_angle().is_none() {
            return Err(CommandRejected::NotCalibrated);
        }
        let resolved = self.catalog.resolve_object(object).map_err(|e| CommandRejected::Other(e.to_string()))?;
        self.state = MotorState::Initializing;

        let target = ObjectTarget {
            name: object.to_string(),
            ra_deg: resolved.ra_deg,
            dec_deg: resolved.dec_deg,
            is_planet: resolved.is_planet,
        };
        let mut session = TrackingSession::new(target, now);

        if !skip_goto {
            let (az_obj, alt_obj) = tracking::catalog::current_horizontal(self.catalog.as_ref(), &resolved, object, &self.config.site, now);
            let az_dome = self.abaque.query(alt_obj, az_obj);
            session.smooth_target(az_dome, self.config.adaptive.outlier_threshold_deg);

            if let Err(e) = self.handle_goto(az_dome, None, now) {
                self.state = MotorState::Idle;
                return Err(e);
            }

            let encoder_at_handoff = self.current_angle().ok_or(CommandRejected::NotCalibrated)?;
            session.encoder_offset = shortest_delta(encoder_at_handoff, az_dome);
        }

        session.next_check_at = now;
        self.tracking = Some(session);
        self.state = MotorState::Tracking;
        self.log(LogLevel::Info, format!("tracking started: {object}"));
        Ok(())
    }

    fn handle_stop_track(&mut self) -> Result<(), CommandRejected> {
        self.tracking = None;
        self.state = MotorState::Idle;
        Ok(())
    }

    /// RELOAD: rejected outside IDLE rather than queued, any non-IDLE state
    /// is treated as a rejection. Only the soft numeric configuration
    /// (motor/thresholds/adaptive/abaque) is refreshed; GPIO/SPI handles
    /// opened at process start are not reopened.
    fn handle_reload(&mut self) -> Result<(), CommandRejected> {
        if self.state != MotorState::Idle {
            return Err(CommandRejected::WrongState { state: "not IDLE" });
        }
        let new_config = Config::load(&self.config_path).map_err(|e| CommandRejected::Other(e.to_string()))?;
        self.abaque = Abaque::build(&new_config.abaque.samples);
        self.config = new_config;
        self.log(LogLevel::Info, "configuration reloaded");
        Ok(())
    }

    /// Runs one tracking correction if due.
    fn run_tracking_tick(&mut self, now: DateTime<Utc>) {
        let encoder_angle = match self.current_angle() {
            Some(a) => a,
            None => {
                self.tracking = None;
                self.enter_error("tracking lost: encoder not calibrated".to_string());
                return;
            }
        };

        let cancel = self.cancel_closure();
        let plan = {
            let Some(session) = self.tracking.as_mut() else { return };
            if session.next_check_at > now {
                return;
            }
            match tracking::plan_correction(
                session,
                self.catalog.as_ref(),
                &self.abaque,
                &self.config.site,
                &self.config.adaptive,
                encoder_angle,
                now,
            ) {
                Ok(p) => p,
                Err(e) => {
                    self.tracking = None;
                    self.enter_error(format!("tracking: {e}"));
                    return;
                }
            }
        };

        self.last_mode = Some(plan.mode);
        self.last_az_obj = plan.az_obj;
        self.last_alt_obj = plan.alt_obj;
        let interval_s = self.config.adaptive.params(plan.mode).interval_s;
        if let Some(session) = self.tracking.as_mut() {
            session.next_check_at = now + chrono::Duration::milliseconds((interval_s * 1000.0) as i64);
        }

        if !plan.needs_move {
            return;
        }

        let motor_config = self.config.motor.clone();
        let step_period = Duration::from_secs_f64(self.config.adaptive.params(plan.mode).step_period_s);
        let target_angle = normalize_360(encoder_angle + plan.delta_deg);
        let params = self.converge_params(target_angle, self.config.thresholds.max_iterations, step_period, false);

        let outcome = match feedback::converge(self.encoder.as_ref(), self.driver.as_mut(), &motor_config, self.clock.as_ref(), &params, &cancel) {
            Ok(_) => ConvergeOutcome::Ok,
            Err(e) => e,
        };

        let delta_deg = plan.delta_deg;
        let mode = plan.mode;
        let stagnation_limit = self.config.thresholds.stagnation_count;
        let stopped_for_stagnation = if let Some(session) = self.tracking.as_mut() {
            session.finish_correction(mode, delta_deg, outcome, now);
            if session.consecutive_stagnations >= stagnation_limit {
                Some(session.consecutive_stagnations)
            } else {
                None
            }
        } else {
            None
        };

        if let Some(count) = stopped_for_stagnation {
            self.log(LogLevel::Error, format!("tracking stopped: {count} consecutive stagnations"));
            self.tracking = None;
            self.state = MotorState::Idle;
            return;
        }

        if matches!(outcome, ConvergeOutcome::ProtectionTripped) {
            self.tracking = None;
            self.enter_error("tracking: protection tripped".to_string());
        }
    }

    fn snapshot(&self, now: DateTime<Utc>) -> MotorStatus {
        let tracking_info = self.tracking.as_ref().map(|s| TrackingInfo {
            az: self.last_az_obj,
            alt: self.last_alt_obj,
            next_check_in: (s.next_check_at - now).num_milliseconds() as f64 / 1000.0,
            total_corrections: s.total_corrections,
            total_correction_deg: s.total_correction_deg,
            encoder_offset: s.encoder_offset,
            interval_sec: self.last_mode.map(|m| self.config.adaptive.params(m).interval_s).unwrap_or(0.0),
        });

        MotorStatus {
            state: self.state,
            position: self.current_angle().unwrap_or(0.0),
            target: self.goto_info.as_ref().map(|g| g.target),
            mode: self.last_mode,
            tracking_object: self.tracking.as_ref().map(|s| s.target.name.clone()),
            tracking_info,
            goto_info: self.goto_info.clone(),
            simulation: self.simulation,
            logs: self.logs.clone(),
            updated_at: now,
            reason: self.error_reason.clone(),
        }
    }

    /// Runs one iteration of the control loop and publishes the resulting
    /// status snapshot.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<MotorStatus, crate::error::IpcFault> {
        self.maybe_recover_from_error();

        if let Some(cmd) = crate::ipc::read::<MotorCommand>(&self.command_path) {
            self.handle_command(cmd, now);
        }

        if self.state == MotorState::Tracking {
            self.run_tracking_tick(now);
        }

        let status = self.snapshot(now);
        crate::ipc::publish(&self.status_path, &status)?;
        Ok(status)
    }
}
