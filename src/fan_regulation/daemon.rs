// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fancontrol project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Fan regulation daemon
//!
//! [`ControlLoop`] owns the [`ControllerState`] and runs one sensing,
//! deciding and acting pass per check interval. Every cycle ends in one of
//! the [`CycleOutcome`] branches:
//!
//! - **Stable**: the controlling adjustment is 0, the cycle counter grows and
//!   the oscillation count decays
//! - **Settling**: a ±1 adjustment is held back until the fan has stayed
//!   `settle_cycles` cycles at its current speed
//! - **Adjusted**: the adjustment is applied through the [`SpeedActuator`]
//! - **ActuationFailed**: the actuator refused, nothing changes and the same
//!   adjustment is tried again on the next cycle
//! - **NoData**: no source produced a reading, nothing changes
//!
//! [`FanRegulationDaemon`] runs the loop on its own task and forwards
//! commands to it.

use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::actuator::SpeedActuator;
use super::adjustment::{initial_speed_for_delta, AdjustmentCalculator};
use super::arbiter::{Arbitration, SourceArbiter};
use super::oscillation::Direction;
use super::sensor_reader::SensorReader;
use super::shared_state::{CyclePhase, FanDataPoint, RegulatorStatus, SharedFanState};
use super::state::ControllerState;
use super::{FanDrivers, SensorKind, TemperatureSample};
use crate::config::{FanRegulationConfig, SensorsConfig};
use crate::error::FanControlError;

/// Stable cycle counts logged at Info once the first ten cycles are over
const STABLE_LOG_MILESTONES: [u32; 4] = [10, 50, 100, 200];

/// Commands accepted by a running control loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanRegulatorCommand {
    /// Log the current state summary
    ReportStatus,
    /// Leave the loop after the current cycle
    Stop,
}

/// Branch taken by one control cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No source produced a reading
    NoData,
    /// Inside the deadband
    Stable {
        controlling: SensorKind,
        temperature: i32,
        cycles_at_speed: u32,
    },
    /// ±1 adjustment held back
    Settling {
        controlling: SensorKind,
        adjustment: i32,
        cycle: u32,
    },
    /// Speed changed
    Adjusted {
        controlling: SensorKind,
        from: u8,
        to: u8,
        adjustment: i32,
    },
    /// Actuator refused the new speed
    ActuationFailed {
        controlling: SensorKind,
        requested: i32,
        adjustment: i32,
    },
}

impl CycleOutcome {
    pub fn phase(&self) -> CyclePhase {
        match self {
            CycleOutcome::NoData => CyclePhase::NoData,
            CycleOutcome::Stable { .. } => CyclePhase::Stable,
            CycleOutcome::Settling { .. } => CyclePhase::Settling,
            CycleOutcome::Adjusted { .. } => CyclePhase::Adjusted,
            CycleOutcome::ActuationFailed { .. } => CyclePhase::ActuationFailed,
        }
    }

    pub fn controlling(&self) -> Option<SensorKind> {
        match self {
            CycleOutcome::NoData => None,
            CycleOutcome::Stable { controlling, .. }
            | CycleOutcome::Settling { controlling, .. }
            | CycleOutcome::Adjusted { controlling, .. }
            | CycleOutcome::ActuationFailed { controlling, .. } => Some(*controlling),
        }
    }
}

/// Whether a stable cycle count deserves an Info line
pub fn is_stable_milestone(cycles_at_speed: u32) -> bool {
    cycles_at_speed < 10 || STABLE_LOG_MILESTONES.contains(&cycles_at_speed)
}

/// Periodic fan regulation loop
pub struct ControlLoop {
    config: FanRegulationConfig,
    reader: SensorReader,
    arbiter: SourceArbiter,
    actuator: SpeedActuator,
    state: ControllerState,
    shared_state: SharedFanState,
}

impl ControlLoop {
    pub fn new(
        config: &FanRegulationConfig,
        sensors_config: &SensorsConfig,
        drivers: FanDrivers,
        shared_state: SharedFanState,
    ) -> Self {
        let calculator = AdjustmentCalculator::from_config(config);
        let actuator = SpeedActuator::from_config(drivers.actuator, config);
        let state = ControllerState::new(actuator.clamp(config.initial_speed_percent as i32));

        Self {
            config: config.clone(),
            reader: SensorReader::new(drivers.sensors, sensors_config),
            arbiter: SourceArbiter::new(
                calculator,
                config.cpu_target_celsius,
                config.drive_target_celsius,
            ),
            actuator,
            state,
            shared_state,
        }
    }

    /// Replace the controller state, e.g. to resume from known history
    pub fn with_state(mut self, state: ControllerState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn shared_state(&self) -> &SharedFanState {
        &self.shared_state
    }

    /// Seed, prepare and apply the starting speed
    ///
    /// # Errors
    /// * [`FanControlError::StartupActuationFailure`] when the actuator cannot
    ///   be prepared or refuses the first speed; the loop must not start
    pub async fn initialize(&mut self) -> Result<u8, FanControlError> {
        self.set_status(RegulatorStatus::Initializing).await;
        info!(
            "Initializing fan regulation: CPU target {}°C, drive target {}°C, deadband ±{}°C, speed {}-{}%, settle {} cycles, interval {}s",
            self.config.cpu_target_celsius,
            self.config.drive_target_celsius,
            self.config.deadband_celsius,
            self.config.min_speed_percent,
            self.config.max_speed_percent,
            self.config.settle_cycles,
            self.config.check_interval_secs
        );

        let speed = self.seed_speed().await;

        if let Err(e) = self.actuator.prepare().await {
            return Err(self.startup_failure(speed, format!("{:#}", e)).await);
        }
        if let Err(e) = self.actuator.apply_exact(speed).await {
            let reason = match e {
                FanControlError::ActuationFailure { reason, .. } => reason,
                other => other.to_string(),
            };
            return Err(self.startup_failure(speed, reason).await);
        }

        self.state = ControllerState::new(speed);
        info!("Initial fan speed {}% applied via {}", speed, self.actuator.describe());

        let mut shared = self.shared_state.write().await;
        shared.sync_controller(&self.state);
        shared.set_status(RegulatorStatus::Running);
        Ok(speed)
    }

    /// Starting speed from one sensing pass, or the configured fallback
    pub async fn seed_speed(&self) -> u8 {
        let (cpu, drive) = self.sense().await;
        match self.arbiter.arbitrate(&cpu, &drive, 0) {
            Some(arbitration) => {
                let controlling = &arbitration.controlling;
                let speed = initial_speed_for_delta(
                    controlling.delta(),
                    self.actuator.min_speed(),
                    self.actuator.max_speed(),
                );
                info!(
                    "Seeding from {} {}°C ({:+}°C from target): starting at {}%",
                    controlling.kind,
                    controlling.temperature,
                    controlling.delta(),
                    speed
                );
                speed
            }
            None => {
                let speed = self.actuator.clamp(self.config.initial_speed_percent as i32);
                warn!(
                    "No temperature available at startup, starting at configured {}%",
                    speed
                );
                speed
            }
        }
    }

    async fn startup_failure(&self, target: u8, reason: String) -> FanControlError {
        let err = FanControlError::StartupActuationFailure {
            target,
            context: self.actuator.describe(),
            reason,
        };
        error!("{}", err);
        self.set_status(RegulatorStatus::Error {
            message: err.to_string(),
        })
        .await;
        err
    }

    async fn sense(&self) -> (TemperatureSample, TemperatureSample) {
        let cpu = self.reader.read_max(SensorKind::Cpu).await;
        let drive = self.reader.read_max(SensorKind::Drive).await;
        (cpu, drive)
    }

    /// Run a single control cycle
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let (cpu, drive) = self.sense().await;
        self.complete_cycle(cpu, drive).await
    }

    /// Sense while still answering commands
    ///
    /// Returns `None` when a stop arrives first. Sensing is then abandoned,
    /// which kills its external tools; no speed change is in flight yet.
    async fn sense_until_stopped(
        &self,
        commands: &mut mpsc::UnboundedReceiver<FanRegulatorCommand>,
    ) -> Option<(TemperatureSample, TemperatureSample)> {
        let sensing = self.sense();
        tokio::pin!(sensing);
        loop {
            tokio::select! {
                readings = &mut sensing => return Some(readings),
                command = commands.recv() => match command {
                    Some(FanRegulatorCommand::ReportStatus) => self.report_status().await,
                    Some(FanRegulatorCommand::Stop) => {
                        info!("Received stop command while sensing, skipping this cycle");
                        return None;
                    }
                    None => {
                        debug!("Command channel closed while sensing");
                        return None;
                    }
                },
            }
        }
    }

    async fn complete_cycle(
        &mut self,
        cpu: TemperatureSample,
        drive: TemperatureSample,
    ) -> CycleOutcome {
        let outcome = match self
            .arbiter
            .arbitrate(&cpu, &drive, self.state.oscillation_count())
        {
            None => {
                warn!(
                    "No temperature readings available, fan stays at {}%",
                    self.state.current_speed
                );
                CycleOutcome::NoData
            }
            Some(arbitration) => self.decide(&arbitration).await,
        };

        self.publish(&cpu, &drive, &outcome).await;
        outcome
    }

    async fn decide(&mut self, arbitration: &Arbitration) -> CycleOutcome {
        let controlling = &arbitration.controlling;
        let adjustment = controlling.adjustment;

        if adjustment == 0 {
            self.state.cycles_at_speed += 1;
            self.state.oscillation.decay();
            let cycles = self.state.cycles_at_speed;
            if is_stable_milestone(cycles) {
                info!(
                    "Stable: {} {}°C (target {}°C), fan {}% for {} cycles",
                    controlling.kind,
                    controlling.temperature,
                    controlling.target,
                    self.state.current_speed,
                    cycles
                );
            } else {
                debug!("Stable for {} cycles at {}%", cycles, self.state.current_speed);
            }
            return CycleOutcome::Stable {
                controlling: controlling.kind,
                temperature: controlling.temperature,
                cycles_at_speed: cycles,
            };
        }

        if adjustment.abs() == 1 && self.state.cycles_at_speed < self.config.settle_cycles {
            self.state.cycles_at_speed += 1;
            info!(
                "Settling ({}/{}): {} {}°C (target {}°C), fan {}%",
                self.state.cycles_at_speed,
                self.config.settle_cycles,
                controlling.kind,
                controlling.temperature,
                controlling.target,
                self.state.current_speed
            );
            return CycleOutcome::Settling {
                controlling: controlling.kind,
                adjustment,
                cycle: self.state.cycles_at_speed,
            };
        }

        let from = self.state.current_speed;
        let requested = from as i32 + adjustment;
        match self.actuator.apply(&mut self.state, requested).await {
            Ok(to) => {
                self.state.oscillation.observe(Direction::from_adjustment(adjustment));
                info!(
                    "{} {}°C ({:+}°C from target {}°C): fan {}% -> {}% ({:+}%), oscillation {}",
                    controlling.kind,
                    controlling.temperature,
                    controlling.delta(),
                    controlling.target,
                    from,
                    to,
                    to as i32 - from as i32,
                    self.state.oscillation_count()
                );
                CycleOutcome::Adjusted {
                    controlling: controlling.kind,
                    from,
                    to,
                    adjustment,
                }
            }
            Err(e) => {
                error!("{}; keeping {}% and retrying next cycle", e, from);
                CycleOutcome::ActuationFailed {
                    controlling: controlling.kind,
                    requested,
                    adjustment,
                }
            }
        }
    }

    async fn publish(
        &self,
        cpu: &TemperatureSample,
        drive: &TemperatureSample,
        outcome: &CycleOutcome,
    ) {
        let adjustment = match outcome {
            CycleOutcome::Settling { adjustment, .. }
            | CycleOutcome::Adjusted { adjustment, .. }
            | CycleOutcome::ActuationFailed { adjustment, .. } => *adjustment,
            _ => 0,
        };

        let mut shared = self.shared_state.write().await;
        shared.sync_controller(&self.state);
        shared.record_cycle(FanDataPoint {
            timestamp: chrono::Utc::now(),
            cpu_celsius: cpu.value,
            drive_celsius: drive.value,
            controlling: outcome.controlling(),
            adjustment,
            speed_percent: self.state.current_speed,
            oscillation_count: self.state.oscillation_count(),
            phase: outcome.phase(),
        });
    }

    async fn set_status(&self, status: RegulatorStatus) {
        self.shared_state.write().await.set_status(status);
    }

    /// Log the full state summary
    pub async fn report_status(&self) {
        let shared = self.shared_state.read().await;
        info!("Fan regulation status: {}", shared.summary());
        info!("Controller state: {}", self.state);
    }

    /// Run cycles every check interval until stopped
    ///
    /// The first cycle runs one interval after the call, leaving the speed
    /// applied by [`ControlLoop::initialize`] time to take effect. A stop
    /// request received while sensing ends the loop at once; once the cycle
    /// has moved on to the actuator, the call is allowed to finish.
    ///
    /// # Returns
    /// * The final controller state
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<FanRegulatorCommand>,
        running: Arc<AtomicBool>,
    ) -> ControllerState {
        let period = self.config.check_interval();
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Fan regulation loop started, checking every {:?}", period);

        while running.load(Ordering::Relaxed) {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(FanRegulatorCommand::ReportStatus) => self.report_status().await,
                        Some(FanRegulatorCommand::Stop) => {
                            info!("Received stop command for fan regulation");
                            break;
                        }
                        None => {
                            debug!("Command channel closed, stopping fan regulation");
                            break;
                        }
                    }
                }
                _ = interval.tick() => {
                    let Some((cpu, drive)) = self.sense_until_stopped(&mut commands).await else {
                        break;
                    };
                    if !running.load(Ordering::Relaxed) {
                        info!("Shutdown requested while sensing, skipping this cycle");
                        break;
                    }
                    self.complete_cycle(cpu, drive).await;
                }
            }
        }

        self.finish().await
    }

    async fn finish(self) -> ControllerState {
        self.set_status(RegulatorStatus::Stopped).await;
        let summary = self.shared_state.read().await.summary();
        info!("Fan regulation stopped: {}", summary);
        info!(
            "Final controller state: {}. The last applied speed {}% stays in effect",
            self.state, self.state.current_speed
        );
        self.state
    }
}

/// Control loop running on its own task
pub struct FanRegulationDaemon {
    shared_state: SharedFanState,
    running: Arc<AtomicBool>,
    task_handle: Option<JoinHandle<ControllerState>>,
    command_sender: Option<mpsc::UnboundedSender<FanRegulatorCommand>>,
}

impl FanRegulationDaemon {
    pub fn new(shared_state: SharedFanState, running: Arc<AtomicBool>) -> Self {
        Self {
            shared_state,
            running,
            task_handle: None,
            command_sender: None,
        }
    }

    /// Initialize the loop and spawn it
    ///
    /// Initialization runs before this returns, so a startup actuation
    /// failure reaches the caller instead of ending a background task.
    pub async fn start(
        &mut self,
        config: &FanRegulationConfig,
        sensors_config: &SensorsConfig,
        drivers: FanDrivers,
    ) -> Result<()> {
        let mut control_loop =
            ControlLoop::new(config, sensors_config, drivers, self.shared_state.clone());
        control_loop.initialize().await?;

        let (command_tx, command_rx) = mpsc::unbounded_channel::<FanRegulatorCommand>();
        self.command_sender = Some(command_tx);

        let running = self.running.clone();
        self.task_handle = Some(tokio::spawn(async move {
            control_loop.run(command_rx, running).await
        }));
        Ok(())
    }

    fn send(&self, command: FanRegulatorCommand) -> Result<()> {
        match &self.command_sender {
            Some(sender) => sender
                .send(command)
                .map_err(|e| anyhow!("Failed to send {:?} command: {}", command, e)),
            None => Err(anyhow!("Fan regulation loop not started")),
        }
    }

    /// Ask the loop to log its state
    pub fn report_status(&self) -> Result<()> {
        self.send(FanRegulatorCommand::ReportStatus)
    }

    /// Ask the loop to stop after the current cycle
    pub fn request_stop(&self) -> Result<()> {
        self.send(FanRegulatorCommand::Stop)
    }

    /// Hand the task over to a supervisor
    pub fn take_handle(&mut self) -> Option<JoinHandle<ControllerState>> {
        self.task_handle.take()
    }

    /// Stop the loop and wait for its final state
    pub async fn stop(&mut self) -> Result<ControllerState> {
        self.request_stop()?;
        let handle = self
            .take_handle()
            .ok_or_else(|| anyhow!("Fan regulation loop not started"))?;
        Ok(handle.await?)
    }

    pub fn shared_state(&self) -> &SharedFanState {
        &self.shared_state
    }
}
