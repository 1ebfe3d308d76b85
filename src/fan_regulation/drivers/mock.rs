// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fancontrol project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulated chassis for fan regulation
//!
//! Implements both [`SensorSource`] and [`FanActuator`] on top of a first-order
//! thermal model. Each read moves the CPU and drive temperatures part of the
//! way toward their equilibrium for the current fan speed:
//!
//! ```text
//! equilibrium = ambient + heat_load - cooling_gain × speed
//! ```
//!
//! Failure injection (failed fan commands, missing CPU or drive readings)
//! lets the commissioning mode and the tests exercise the error paths without
//! hardware.

use anyhow::{bail, Result};
use async_trait::async_trait;
use log::{debug, info};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::MockChassisConfig;
use crate::fan_regulation::{DriveReading, FanActuator, SensorSource};

/// CPU cooling per percent of fan speed in °C
const CPU_COOLING_GAIN: f64 = 0.5;
/// Drive cooling per percent of fan speed in °C
const DRIVE_COOLING_GAIN: f64 = 0.25;
/// Fraction of the gap to equilibrium closed on each read
const RELAXATION: f64 = 0.5;
/// Core sensors run slightly below the package sensor
const CORE_OFFSET_CELSIUS: f64 = 3.0;
/// Each further drive bay runs slightly warmer
const DRIVE_SPREAD_CELSIUS: f64 = 0.5;
/// Fan speed the chassis runs at before the first command
const BOOT_SPEED_PERCENT: u8 = 30;

/// Simulated server chassis with one fan zone
pub struct MockChassis {
    config: MockChassisConfig,
    simulation: Arc<Mutex<ChassisSimulation>>,
}

#[derive(Debug)]
struct ChassisSimulation {
    speed: u8,
    cpu_celsius: f64,
    drive_celsius: f64,
    manual_mode: bool,
    applied: Vec<u8>,
    pending_set_failures: u32,
    fail_prepare: bool,
    cpu_available: bool,
    drives_available: bool,
}

impl MockChassis {
    pub fn new(config: &MockChassisConfig) -> Self {
        let mut simulation = ChassisSimulation {
            speed: BOOT_SPEED_PERCENT,
            cpu_celsius: 0.0,
            drive_celsius: 0.0,
            manual_mode: false,
            applied: Vec::new(),
            pending_set_failures: 0,
            fail_prepare: false,
            cpu_available: true,
            drives_available: config.drive_count > 0,
        };
        simulation.cpu_celsius = cpu_equilibrium(config, simulation.speed);
        simulation.drive_celsius = drive_equilibrium(config, simulation.speed);

        Self {
            config: config.clone(),
            simulation: Arc::new(Mutex::new(simulation)),
        }
    }

    fn simulation(&self) -> MutexGuard<'_, ChassisSimulation> {
        self.simulation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `count` speed commands fail
    pub fn fail_next_set_speed(&self, count: u32) {
        self.simulation().pending_set_failures = count;
    }

    /// Make the manual mode switch fail
    pub fn fail_prepare(&self, fail: bool) {
        self.simulation().fail_prepare = fail;
    }

    /// Report no CPU sensors while `false`
    pub fn set_cpu_available(&self, available: bool) {
        self.simulation().cpu_available = available;
    }

    /// Report every drive in standby while `false`
    pub fn set_drives_available(&self, available: bool) {
        self.simulation().drives_available = available;
    }

    /// Force both temperatures, e.g. to start a test from a known point
    pub fn set_temperatures(&self, cpu_celsius: f64, drive_celsius: f64) {
        let mut sim = self.simulation();
        sim.cpu_celsius = cpu_celsius;
        sim.drive_celsius = drive_celsius;
    }

    /// Every speed successfully applied so far
    pub fn applied_speeds(&self) -> Vec<u8> {
        self.simulation().applied.clone()
    }

    pub fn current_speed(&self) -> u8 {
        self.simulation().speed
    }

    pub fn is_manual_mode(&self) -> bool {
        self.simulation().manual_mode
    }
}

fn cpu_equilibrium(config: &MockChassisConfig, speed: u8) -> f64 {
    config.ambient_celsius + config.cpu_heat_load_celsius - CPU_COOLING_GAIN * speed as f64
}

fn drive_equilibrium(config: &MockChassisConfig, speed: u8) -> f64 {
    config.ambient_celsius + config.drive_heat_load_celsius - DRIVE_COOLING_GAIN * speed as f64
}

fn relax(current: f64, equilibrium: f64, floor: f64) -> f64 {
    (current + (equilibrium - current) * RELAXATION).max(floor)
}

#[async_trait]
impl SensorSource for MockChassis {
    async fn thermal_readings(&self) -> Result<Vec<(String, i32)>> {
        let mut sim = self.simulation();
        let equilibrium = cpu_equilibrium(&self.config, sim.speed);
        sim.cpu_celsius = relax(sim.cpu_celsius, equilibrium, self.config.ambient_celsius);

        let mut readings = vec![(
            "mock-chassis:Ambient".to_string(),
            self.config.ambient_celsius.round() as i32,
        )];
        if sim.cpu_available {
            readings.push((
                "mock-cpu:Package id 0".to_string(),
                sim.cpu_celsius.round() as i32,
            ));
            readings.push((
                "mock-cpu:Core 0".to_string(),
                (sim.cpu_celsius - CORE_OFFSET_CELSIUS).round() as i32,
            ));
        }
        debug!("Simulated CPU at {:.1}°C, fan {}%", sim.cpu_celsius, sim.speed);
        Ok(readings)
    }

    async fn drive_readings(&self) -> Result<Vec<DriveReading>> {
        let mut sim = self.simulation();
        let equilibrium = drive_equilibrium(&self.config, sim.speed);
        sim.drive_celsius = relax(sim.drive_celsius, equilibrium, self.config.ambient_celsius);

        if !sim.drives_available {
            return Ok(Vec::new());
        }
        Ok((0..self.config.drive_count)
            .map(|bay| DriveReading {
                device: format!("sd{}", (b'a' + (bay % 26) as u8) as char),
                celsius: Some(
                    (sim.drive_celsius + DRIVE_SPREAD_CELSIUS * bay as f64).round() as i32,
                ),
            })
            .collect())
    }

    fn describe(&self) -> String {
        format!(
            "simulated chassis ({} drives, ambient {:.0}°C)",
            self.config.drive_count, self.config.ambient_celsius
        )
    }
}

#[async_trait]
impl FanActuator for MockChassis {
    async fn prepare(&self) -> Result<()> {
        let mut sim = self.simulation();
        if sim.fail_prepare {
            bail!("simulated BMC refused manual fan mode");
        }
        sim.manual_mode = true;
        info!("Simulated chassis switched to manual fan control");
        Ok(())
    }

    async fn set_speed(&self, percent: u8) -> Result<()> {
        let mut sim = self.simulation();
        if sim.pending_set_failures > 0 {
            sim.pending_set_failures -= 1;
            bail!("simulated BMC did not acknowledge fan speed {}%", percent);
        }
        sim.speed = percent;
        sim.applied.push(percent);
        Ok(())
    }

    fn describe(&self) -> String {
        SensorSource::describe(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu_max(readings: &[(String, i32)]) -> Option<i32> {
        readings
            .iter()
            .filter(|(label, _)| label.starts_with("mock-cpu"))
            .map(|(_, celsius)| *celsius)
            .max()
    }

    #[tokio::test]
    async fn test_faster_fan_cools_cpu() {
        let chassis = MockChassis::new(&MockChassisConfig::default());
        let initial = cpu_max(&chassis.thermal_readings().await.unwrap()).unwrap();

        chassis.set_speed(100).await.unwrap();
        let mut cooled = initial;
        for _ in 0..10 {
            cooled = cpu_max(&chassis.thermal_readings().await.unwrap()).unwrap();
        }

        assert!(cooled < initial, "{} should be below {}", cooled, initial);
        assert_eq!(cooled, 45);
    }

    #[tokio::test]
    async fn test_set_speed_failure_injection() {
        let chassis = MockChassis::new(&MockChassisConfig::default());
        chassis.fail_next_set_speed(2);

        assert!(chassis.set_speed(50).await.is_err());
        assert!(chassis.set_speed(50).await.is_err());
        assert!(chassis.set_speed(50).await.is_ok());
        assert_eq!(chassis.applied_speeds(), vec![50]);
        assert_eq!(chassis.current_speed(), 50);
    }

    #[tokio::test]
    async fn test_unavailable_sources() {
        let chassis = MockChassis::new(&MockChassisConfig::default());
        chassis.set_cpu_available(false);
        chassis.set_drives_available(false);

        let thermal = chassis.thermal_readings().await.unwrap();
        assert_eq!(cpu_max(&thermal), None);
        assert_eq!(thermal.len(), 1);
        assert!(chassis.drive_readings().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drive_bays_are_named_and_spread() {
        let chassis = MockChassis::new(&MockChassisConfig::default());
        chassis.set_temperatures(60.0, 40.0);
        let drives = chassis.drive_readings().await.unwrap();

        let names: Vec<&str> = drives.iter().map(|d| d.device.as_str()).collect();
        assert_eq!(names, vec!["sda", "sdb", "sdc", "sdd"]);
        assert!(drives[3].celsius >= drives[0].celsius);
    }

    #[tokio::test]
    async fn test_prepare_enables_manual_mode() {
        let chassis = MockChassis::new(&MockChassisConfig::default());
        assert!(!chassis.is_manual_mode());
        chassis.prepare().await.unwrap();
        assert!(chassis.is_manual_mode());

        chassis.fail_prepare(true);
        assert!(chassis.prepare().await.is_err());
    }
}
