// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fancontrol project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Adaptive chassis fan regulation
//!
//! This module provides:
//! - Capability traits for temperature sources and the fan actuator, so the
//!   control core runs identically against real hardware or a simulation
//! - The piecewise proportional adjustment table with oscillation damping
//! - Source arbitration between CPU and drive temperatures
//! - The speed actuator with range clamping
//! - The periodic control loop with settle-time hysteresis
//! - Hardware drivers (lm-sensors, smartctl, ipmitool) and a simulated chassis

pub mod actuator;
pub mod adjustment;
pub mod arbiter;
pub mod daemon;
pub mod drivers;
pub mod oscillation;
pub mod sensor_reader;
pub mod shared_state;
pub mod state;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::config::{ActuatorDriverType, Config};

/// Kind of temperature source feeding the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Hottest CPU package/core/die sensor
    Cpu,
    /// Hottest storage device
    Drive,
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorKind::Cpu => write!(f, "CPU"),
            SensorKind::Drive => write!(f, "drive"),
        }
    }
}

/// Maximum temperature of one source for one cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemperatureSample {
    /// Temperature in °C, `None` when no reading was available
    pub value: Option<i32>,
    /// Sensor label or device identifier that produced the value
    pub source_label: String,
}

impl TemperatureSample {
    pub fn new(value: i32, source_label: impl Into<String>) -> Self {
        Self {
            value: Some(value),
            source_label: source_label.into(),
        }
    }

    /// Sentinel for "no data this cycle"
    pub fn absent() -> Self {
        Self {
            value: None,
            source_label: String::new(),
        }
    }

    pub fn is_absent(&self) -> bool {
        self.value.is_none()
    }
}

/// Temperature reported by a single storage device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveReading {
    /// Device identifier, e.g. `sda`
    pub device: String,
    /// Temperature in °C, `None` when the device did not report one
    pub celsius: Option<i32>,
}

/// Raw temperature collaborator
///
/// Implementations query hardware only; they never touch controller state.
#[async_trait::async_trait]
pub trait SensorSource: Send + Sync {
    /// All thermal sensor readings as `(label, °C)` pairs
    async fn thermal_readings(&self) -> Result<Vec<(String, i32)>>;

    /// Temperatures of storage devices, devices in standby are not listed
    async fn drive_readings(&self) -> Result<Vec<DriveReading>>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Physical fan actuator collaborator
#[async_trait::async_trait]
pub trait FanActuator: Send + Sync {
    /// Put the fan controller in a state where `set_speed` takes effect
    async fn prepare(&self) -> Result<()>;

    /// Apply a fan duty in percent; idempotent
    async fn set_speed(&self, percent: u8) -> Result<()>;

    /// Host/connectivity context for logs and fatal errors
    fn describe(&self) -> String;
}

/// Sensor source and actuator built from the configuration
pub struct FanDrivers {
    pub sensors: Arc<dyn SensorSource>,
    pub actuator: Arc<dyn FanActuator>,
}

/// Create the sensor source and actuator selected by the configuration
pub fn create_fan_drivers(config: &Config) -> Result<FanDrivers> {
    match config.actuator.driver {
        ActuatorDriverType::Ipmitool => {
            let sensors = drivers::system::SystemSensorSource::new(&config.sensors);
            let actuator = drivers::ipmitool::IpmitoolActuator::new(&config.actuator.ipmitool);
            Ok(FanDrivers {
                sensors: Arc::new(sensors),
                actuator: Arc::new(actuator),
            })
        }
        ActuatorDriverType::Mock => {
            let chassis = Arc::new(drivers::mock::MockChassis::new(&config.actuator.mock));
            Ok(FanDrivers {
                sensors: chassis.clone(),
                actuator: chassis,
            })
        }
    }
}
