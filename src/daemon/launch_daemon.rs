// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fancontrol project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Daemon task management
//!
//! Starts the fan regulation loop and a heartbeat monitor, forwards status
//! requests, and coordinates a graceful shutdown where the regulation loop
//! finishes its current cycle before the process exits.

use anyhow::Result;
use log::{debug, error, info, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::Config;
use crate::fan_regulation::daemon::FanRegulationDaemon;
use crate::fan_regulation::shared_state::{create_shared_fan_state, SharedFanState};
use crate::fan_regulation::state::ControllerState;
use crate::fan_regulation::{create_fan_drivers, FanDrivers};

/// Period of the heartbeat log line
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);
/// Time granted to auxiliary tasks on shutdown
const TASK_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Background tasks of the fan control daemon
pub struct Daemon {
    tasks: Vec<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
    shared_state: SharedFanState,
    regulation: Option<FanRegulationDaemon>,
    regulation_join_timeout: Duration,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    /// Create a new daemon instance
    pub fn new() -> Self {
        Daemon {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            shared_state: create_shared_fan_state(),
            regulation: None,
            regulation_join_timeout: TASK_JOIN_TIMEOUT,
        }
    }

    /// Launch all tasks with the drivers selected by the configuration
    ///
    /// # Errors
    /// * Startup actuation failures, so the caller can exit before any loop runs
    pub async fn launch(&mut self, config: &Config) -> Result<()> {
        let drivers = create_fan_drivers(config)?;
        info!(
            "Using sensors from {} and fan actuator {}",
            drivers.sensors.describe(),
            drivers.actuator.describe()
        );
        self.launch_with_drivers(config, drivers).await
    }

    /// Launch all tasks with explicitly provided drivers
    pub async fn launch_with_drivers(
        &mut self,
        config: &Config,
        drivers: FanDrivers,
    ) -> Result<()> {
        self.start_fan_regulation(config, drivers).await?;
        self.start_heartbeat()?;
        Ok(())
    }

    /// Initialize and spawn the regulation loop
    async fn start_fan_regulation(&mut self, config: &Config, drivers: FanDrivers) -> Result<()> {
        info!("Starting fan regulation");

        let mut regulation =
            FanRegulationDaemon::new(self.shared_state.clone(), self.running.clone());
        regulation
            .start(&config.fan_regulation, &config.sensors, drivers)
            .await?;

        // sensing is abandoned on stop, only an actuator call can be in flight
        self.regulation_join_timeout = TASK_JOIN_TIMEOUT + config.actuator.ipmitool.timeout();
        self.regulation = Some(regulation);
        Ok(())
    }

    /// Start a heartbeat task that logs the regulator summary periodically
    fn start_heartbeat(&mut self) -> Result<()> {
        debug!("Starting heartbeat monitor");

        let running = self.running.clone();
        let shared_state = self.shared_state.clone();
        let task = tokio::spawn(async move {
            let mut interval = time::interval(HEARTBEAT_INTERVAL);
            interval.tick().await;
            while running.load(Ordering::SeqCst) {
                interval.tick().await;
                let summary = shared_state.read().await.summary();
                debug!("Daemon heartbeat: {}", summary);
            }
            Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    pub fn shared_state(&self) -> &SharedFanState {
        &self.shared_state
    }

    /// Ask the regulation loop to log its full state
    pub fn report_status(&self) -> Result<()> {
        match &self.regulation {
            Some(regulation) => regulation.report_status(),
            None => Err(anyhow::anyhow!("Fan regulation is not running")),
        }
    }

    /// Stop all running tasks
    pub fn shutdown(&self) {
        info!("Shutting down daemon tasks");
        self.running.store(false, Ordering::SeqCst);
        if let Some(regulation) = &self.regulation {
            if let Err(e) = regulation.request_stop() {
                debug!("Fan regulation already stopped: {}", e);
            }
        }
    }

    /// Wait for all tasks to complete
    ///
    /// # Returns
    /// * The final controller state when the regulation loop ended in time
    pub async fn join(mut self) -> Result<Option<ControllerState>> {
        let mut final_state = None;

        if let Some(handle) = self.regulation.as_mut().and_then(|r| r.take_handle()) {
            match time::timeout(self.regulation_join_timeout, handle).await {
                Ok(Ok(state)) => final_state = Some(state),
                Ok(Err(e)) => error!("Fan regulation task panicked: {}", e),
                Err(_) => warn!(
                    "Fan regulation did not stop within {:?}",
                    self.regulation_join_timeout
                ),
            }
        }

        for task in self.tasks {
            let abort = task.abort_handle();
            match time::timeout(TASK_JOIN_TIMEOUT, task).await {
                Ok(Ok(Err(e))) => error!("Task failed: {:#}", e),
                Ok(Err(e)) if !e.is_cancelled() => error!("Task panicked: {}", e),
                Ok(_) => {}
                Err(_) => {
                    debug!("Task did not complete within timeout period, aborting");
                    abort.abort();
                }
            }
        }

        Ok(final_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MockChassisConfig;
    use crate::fan_regulation::drivers::mock::MockChassis;
    use crate::fan_regulation::shared_state::RegulatorStatus;

    fn chassis_drivers(chassis: &Arc<MockChassis>) -> FanDrivers {
        FanDrivers {
            sensors: chassis.clone(),
            actuator: chassis.clone(),
        }
    }

    #[tokio::test]
    async fn test_launch_and_shutdown() {
        let chassis = Arc::new(MockChassis::new(&MockChassisConfig::default()));
        let mut daemon = Daemon::new();
        daemon
            .launch_with_drivers(&Config::default(), chassis_drivers(&chassis))
            .await
            .unwrap();
        daemon.report_status().unwrap();

        let shared = daemon.shared_state().clone();
        daemon.shutdown();
        let final_state = daemon.join().await.unwrap().unwrap();

        assert_eq!(chassis.applied_speeds(), vec![final_state.current_speed]);
        assert_eq!(shared.read().await.status, RegulatorStatus::Stopped);
    }

    #[tokio::test]
    async fn test_startup_failure_is_reported() {
        let chassis = Arc::new(MockChassis::new(&MockChassisConfig::default()));
        chassis.fail_next_set_speed(1);
        let mut daemon = Daemon::new();

        let err = daemon
            .launch_with_drivers(&Config::default(), chassis_drivers(&chassis))
            .await
            .unwrap_err();

        assert!(err
            .downcast_ref::<crate::error::FanControlError>()
            .is_some_and(|e| e.exit_code() == 3));
        assert!(daemon.report_status().is_err());
    }
}
