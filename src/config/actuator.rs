// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fancontrol project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration for the fan actuator
//!
//! The default raw byte sequences target Dell iDRAC BMCs; other vendors only
//! need different `manual_mode_raw` / `set_speed_raw` values.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Actuator settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActuatorConfig {
    /// Which driver pair to build
    #[serde(default)]
    pub driver: ActuatorDriverType,

    /// ipmitool settings, only used by the `ipmitool` driver
    #[serde(default)]
    pub ipmitool: IpmitoolConfig,

    /// Simulated chassis settings, only used by the `mock` driver
    #[serde(default)]
    pub mock: MockChassisConfig,
}

/// Driver selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorDriverType {
    /// lm-sensors and smartctl for sensing, ipmitool for the fan
    #[default]
    Ipmitool,
    /// Simulated chassis for commissioning and tests
    Mock,
}

/// ipmitool invocation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IpmitoolConfig {
    /// Path or name of the `ipmitool` binary
    #[serde(default = "default_ipmitool_command")]
    pub command: String,

    /// IPMI interface (`-I`), e.g. `lanplus`; omitted for the local BMC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,

    /// Remote BMC host (`-H`); omitted for the local BMC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// BMC user (`-U`), required with `host`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// BMC password (`-P`), required with `host`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Raw bytes switching the BMC to manual fan control
    #[serde(default = "default_manual_mode_raw")]
    pub manual_mode_raw: Vec<String>,

    /// Raw bytes preceding the speed byte when setting the fan duty
    #[serde(default = "default_set_speed_raw")]
    pub set_speed_raw: Vec<String>,

    /// Upper bound for a single ipmitool call
    #[serde(default = "default_ipmitool_timeout")]
    pub timeout_secs: u64,
}

impl IpmitoolConfig {
    /// Timeout applied to each ipmitool call
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Simulated chassis parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MockChassisConfig {
    /// Ambient air temperature
    #[serde(default = "default_ambient")]
    pub ambient_celsius: f64,

    /// CPU temperature rise over ambient with the fan stopped
    #[serde(default = "default_cpu_heat_load")]
    pub cpu_heat_load_celsius: f64,

    /// Drive temperature rise over ambient with the fan stopped
    #[serde(default = "default_drive_heat_load")]
    pub drive_heat_load_celsius: f64,

    /// Number of simulated drives
    #[serde(default = "default_drive_count")]
    pub drive_count: usize,
}

fn default_ipmitool_command() -> String {
    "ipmitool".to_string()
}
fn default_manual_mode_raw() -> Vec<String> {
    ["0x30", "0x30", "0x01", "0x00"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_set_speed_raw() -> Vec<String> {
    ["0x30", "0x30", "0x02", "0xff"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_ipmitool_timeout() -> u64 {
    15
}
fn default_ambient() -> f64 {
    25.0
}
fn default_cpu_heat_load() -> f64 {
    70.0
}
fn default_drive_heat_load() -> f64 {
    30.0
}
fn default_drive_count() -> usize {
    4
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            driver: ActuatorDriverType::default(),
            ipmitool: IpmitoolConfig::default(),
            mock: MockChassisConfig::default(),
        }
    }
}

impl Default for IpmitoolConfig {
    fn default() -> Self {
        Self {
            command: default_ipmitool_command(),
            interface: None,
            host: None,
            username: None,
            password: None,
            manual_mode_raw: default_manual_mode_raw(),
            set_speed_raw: default_set_speed_raw(),
            timeout_secs: default_ipmitool_timeout(),
        }
    }
}

impl Default for MockChassisConfig {
    fn default() -> Self {
        Self {
            ambient_celsius: default_ambient(),
            cpu_heat_load_celsius: default_cpu_heat_load(),
            drive_heat_load_celsius: default_drive_heat_load(),
            drive_count: default_drive_count(),
        }
    }
}
