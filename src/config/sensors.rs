// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fancontrol project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration for the temperature sources
//!
//! The CPU source runs lm-sensors, the drive source enumerates block devices
//! and queries them with smartctl. Disabling the drive source turns the
//! controller into its single-source variant.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Temperature source settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorsConfig {
    /// Upper bound for any single external sensing command
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// CPU temperature source
    #[serde(default)]
    pub cpu: CpuSensorConfig,

    /// Drive temperature source
    #[serde(default)]
    pub drives: DriveSensorConfig,
}

impl SensorsConfig {
    /// Timeout applied to each sensing subprocess
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// CPU sensor settings (lm-sensors)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CpuSensorConfig {
    /// Take CPU temperatures into account
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Path or name of the `sensors` binary
    #[serde(default = "default_sensors_command")]
    pub sensors_command: String,

    /// Case-insensitive substrings identifying CPU-relevant sensor labels
    #[serde(default = "default_cpu_label_patterns")]
    pub label_patterns: Vec<String>,
}

/// Drive sensor settings (lsblk + smartctl)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriveSensorConfig {
    /// Take drive temperatures into account
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Path or name of the `smartctl` binary
    #[serde(default = "default_smartctl_command")]
    pub smartctl_command: String,

    /// Path or name of the `lsblk` binary
    #[serde(default = "default_lsblk_command")]
    pub lsblk_command: String,

    /// Explicit device names (e.g. `sda`); empty means enumerate with lsblk
    #[serde(default)]
    pub devices: Vec<String>,

    /// Attribute names probed in order, first numeric match wins
    #[serde(default = "default_temperature_attributes")]
    pub temperature_attributes: Vec<String>,
}

fn default_true() -> bool {
    true
}
fn default_command_timeout() -> u64 {
    10
}
fn default_sensors_command() -> String {
    "sensors".to_string()
}
fn default_smartctl_command() -> String {
    "smartctl".to_string()
}
fn default_lsblk_command() -> String {
    "lsblk".to_string()
}
fn default_cpu_label_patterns() -> Vec<String> {
    ["package", "core", "tdie", "tctl", "die", "soc", "cpu"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_temperature_attributes() -> Vec<String> {
    [
        "Temperature_Celsius",
        "Airflow_Temperature_Cel",
        "Current Drive Temperature",
        "Temperature",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout(),
            cpu: CpuSensorConfig::default(),
            drives: DriveSensorConfig::default(),
        }
    }
}

impl Default for CpuSensorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sensors_command: default_sensors_command(),
            label_patterns: default_cpu_label_patterns(),
        }
    }
}

impl Default for DriveSensorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            smartctl_command: default_smartctl_command(),
            lsblk_command: default_lsblk_command(),
            devices: Vec::new(),
            temperature_attributes: default_temperature_attributes(),
        }
    }
}
