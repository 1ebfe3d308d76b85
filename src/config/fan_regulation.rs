// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fancontrol project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration for the fan regulation controller
//!
//! These values are loaded once at startup and never change while the
//! daemon runs. Every field has a serde default so a partial section is valid.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Controller tunables shared by the adjustment table, the settle logic and
/// the speed actuator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FanRegulationConfig {
    /// Target for the hottest CPU sensor in degrees Celsius
    #[serde(default = "default_cpu_target")]
    pub cpu_target_celsius: i32,

    /// Target for the hottest drive in degrees Celsius
    #[serde(default = "default_drive_target")]
    pub drive_target_celsius: i32,

    /// Half-width of the stability band around each target
    #[serde(default = "default_deadband")]
    pub deadband_celsius: i32,

    /// Lowest fan speed ever applied
    #[serde(default = "default_min_speed")]
    pub min_speed_percent: u8,

    /// Highest fan speed ever applied
    #[serde(default = "default_max_speed")]
    pub max_speed_percent: u8,

    /// Largest heating step, used when the temperature is more than 10 °C over target
    #[serde(default = "default_max_step")]
    pub max_step_percent: i32,

    /// Cycles at the current speed before a ±1 adjustment may fire
    #[serde(default = "default_settle_cycles")]
    pub settle_cycles: u32,

    /// Seconds between control cycles
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Starting speed when the startup sensing pass returns nothing
    #[serde(default = "default_initial_speed")]
    pub initial_speed_percent: u8,
}

impl FanRegulationConfig {
    /// Interval between two control cycles
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

fn default_cpu_target() -> i32 {
    70
}
fn default_drive_target() -> i32 {
    40
}
fn default_deadband() -> i32 {
    1
}
fn default_min_speed() -> u8 {
    10
}
fn default_max_speed() -> u8 {
    100
}
fn default_max_step() -> i32 {
    15
}
fn default_settle_cycles() -> u32 {
    3
}
fn default_check_interval() -> u64 {
    30
}
fn default_initial_speed() -> u8 {
    30
}

impl Default for FanRegulationConfig {
    fn default() -> Self {
        Self {
            cpu_target_celsius: default_cpu_target(),
            drive_target_celsius: default_drive_target(),
            deadband_celsius: default_deadband(),
            min_speed_percent: default_min_speed(),
            max_speed_percent: default_max_speed(),
            max_step_percent: default_max_step(),
            settle_cycles: default_settle_cycles(),
            check_interval_secs: default_check_interval(),
            initial_speed_percent: default_initial_speed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_section_uses_defaults() {
        let yaml = "cpu_target_celsius: 75\nmax_speed_percent: 87\n";
        let config: FanRegulationConfig = serde_yml::from_str(yaml).unwrap();

        assert_eq!(config.cpu_target_celsius, 75);
        assert_eq!(config.max_speed_percent, 87);
        assert_eq!(config.drive_target_celsius, default_drive_target());
        assert_eq!(config.settle_cycles, default_settle_cycles());
        assert_eq!(config.check_interval(), Duration::from_secs(30));
    }
}
