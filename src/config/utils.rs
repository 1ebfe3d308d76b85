// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fancontrol project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! Schema output and the cross-field rules the JSON schema cannot express.

use anyhow::{Context, Result};
use log::{debug, warn};

use super::{ActuatorDriverType, Config};
use crate::error::FanControlError;

/// Output the embedded JSON schema to the console.
///
/// Called when the `--show-config-schema` flag is provided on the command line.
///
/// ### Example
///
/// ```bash
/// ./fancontrol --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema_str = include_str!("../../resources/config.schema.json");

    let schema: serde_json::Value =
        serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Validates the configuration against additional rules that aren't covered by the JSON schema.
///
/// ### Validation Rules
///
/// - **Speed range**: `1 ≤ min_speed_percent ≤ max_speed_percent ≤ 100`
/// - **Step and timing**: `max_step_percent ≥ 1`, `check_interval_secs ≥ 1`, `deadband_celsius ≥ 0`
/// - **Sources**: at least one of the CPU and drive sources is enabled
/// - **Remote BMC**: a configured `host` requires both `username` and `password`
/// - **Raw commands**: the set-speed prefix is not empty for the ipmitool driver
///
/// The initial speed may lie outside the speed range; it is clamped when used.
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");
    let regulation = &config.fan_regulation;

    if regulation.min_speed_percent < 1 {
        return Err(invalid("min_speed_percent must be at least 1"));
    }
    if regulation.max_speed_percent > 100 {
        return Err(invalid("max_speed_percent must not exceed 100"));
    }
    if regulation.min_speed_percent > regulation.max_speed_percent {
        return Err(invalid(&format!(
            "min_speed_percent ({}) is above max_speed_percent ({})",
            regulation.min_speed_percent, regulation.max_speed_percent
        )));
    }
    if regulation.max_step_percent < 1 {
        return Err(invalid("max_step_percent must be at least 1"));
    }
    if regulation.check_interval_secs < 1 {
        return Err(invalid("check_interval_secs must be at least 1"));
    }
    if regulation.deadband_celsius < 0 {
        return Err(invalid("deadband_celsius must not be negative"));
    }
    if regulation.initial_speed_percent < regulation.min_speed_percent
        || regulation.initial_speed_percent > regulation.max_speed_percent
    {
        warn!(
            "initial_speed_percent {} is outside [{}, {}] and will be clamped",
            regulation.initial_speed_percent,
            regulation.min_speed_percent,
            regulation.max_speed_percent
        );
    }

    if !config.sensors.cpu.enabled && !config.sensors.drives.enabled {
        return Err(invalid(
            "at least one temperature source (cpu or drives) must be enabled",
        ));
    }

    if config.actuator.driver == ActuatorDriverType::Ipmitool {
        let ipmi = &config.actuator.ipmitool;
        if let Some(host) = &ipmi.host {
            if ipmi.username.is_none() {
                return Err(FanControlError::ConfigurationMissing {
                    what: format!("actuator.ipmitool.username for BMC host {}", host),
                }
                .into());
            }
            if ipmi.password.is_none() {
                return Err(FanControlError::ConfigurationMissing {
                    what: format!("actuator.ipmitool.password for BMC host {}", host),
                }
                .into());
            }
        }
        if ipmi.set_speed_raw.is_empty() {
            return Err(invalid("actuator.ipmitool.set_speed_raw must not be empty"));
        }
    }

    Ok(())
}

fn invalid(reason: &str) -> anyhow::Error {
    FanControlError::InvalidConfiguration {
        reason: reason.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_specific_rules(&Config::default()).is_ok());
    }

    #[test]
    fn test_inverted_speed_range_is_rejected() {
        let mut config = Config::default();
        config.fan_regulation.min_speed_percent = 60;
        config.fan_regulation.max_speed_percent = 40;

        let err = validate_specific_rules(&config).unwrap_err();
        assert!(err.to_string().contains("above max_speed_percent"));
    }

    #[test]
    fn test_all_sources_disabled_is_rejected() {
        let mut config = Config::default();
        config.sensors.cpu.enabled = false;
        config.sensors.drives.enabled = false;

        assert!(validate_specific_rules(&config).is_err());
    }

    #[test]
    fn test_remote_host_requires_credentials() {
        let mut config = Config::default();
        config.actuator.ipmitool.host = Some("10.0.0.5".to_string());
        config.actuator.ipmitool.username = Some("root".to_string());

        let err = validate_specific_rules(&config).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FanControlError>(),
            Some(FanControlError::ConfigurationMissing { .. })
        ));

        config.actuator.ipmitool.password = Some("calvin".to_string());
        assert!(validate_specific_rules(&config).is_ok());
    }

    #[test]
    fn test_mock_driver_ignores_ipmi_credentials() {
        let mut config = Config::default();
        config.actuator.driver = ActuatorDriverType::Mock;
        config.actuator.ipmitool.host = Some("10.0.0.5".to_string());

        assert!(validate_specific_rules(&config).is_ok());
    }
}
