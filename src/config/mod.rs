// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fancontrol project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the fan regulation daemon
//!
//! The configuration is backed by a YAML file and validated against an
//! embedded JSON schema before being deserialized. It is loaded once at
//! startup and is immutable for the lifetime of the process.
//!
//! ## Configuration Structure
//!
//! - `fan_regulation`: controller targets and tunables
//! - `sensors`: CPU and drive temperature sources
//! - `actuator`: fan actuator driver and its connection settings
//!
//! ## Usage
//!
//! ```no_run
//! use rust_fancontrol::config::Config;
//!
//! let mut config = Config::from_file("config.yaml").unwrap();
//! config.apply_args(Some(75), None, Some(20), false).unwrap();
//! println!("CPU target: {}", config.fan_regulation.cpu_target_celsius);
//! ```

pub mod actuator;
pub mod fan_regulation;
pub mod sensors;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::error::FanControlError;

pub use actuator::{ActuatorConfig, ActuatorDriverType, IpmitoolConfig, MockChassisConfig};
pub use fan_regulation::FanRegulationConfig;
pub use sensors::{CpuSensorConfig, DriveSensorConfig, SensorsConfig};
pub use utils::{output_config_schema, validate_specific_rules};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Controller targets, speed range, step and timing parameters
    #[serde(default)]
    pub fan_regulation: FanRegulationConfig,

    /// Temperature source settings
    #[serde(default)]
    pub sensors: SensorsConfig,

    /// Fan actuator settings
    #[serde(default)]
    pub actuator: ActuatorConfig,
}

impl Config {
    /// Helper method to create a sample config file next to `path`
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Original path: {:?}, Sample path: {:?}", path, sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating parent directory: {:?}", parent);
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file
    ///
    /// A missing file is fatal: a sample is written next to the requested
    /// path and [`FanControlError::ConfigurationMissing`] is returned.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            error!("Configuration file not found at {:?}", path);
            if let Err(e) = Self::create_sample_config(path) {
                error!("Failed to create sample config: {}", e);
            }
            return Err(FanControlError::ConfigurationMissing {
                what: path.display().to_string(),
            }
            .into());
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        Self::from_yaml_str(&contents).map_err(|err| {
            error!("Configuration error in {}: {:#}", path.display(), err);
            if let Err(e) = Self::create_sample_config(path) {
                error!("Failed to create sample config: {}", e);
            }
            err
        })
    }

    /// Parse, schema-validate and rule-check a YAML document
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        // First step: convert YAML to a generic Value
        let yaml_value: serde_yml::Value =
            serde_yml::from_str(contents).context("Failed to parse YAML configuration")?;

        // Convert to JSON Value for validation
        let json_value = serde_json::to_value(&yaml_value)
            .context("Failed to convert YAML to JSON for validation")?;

        let schema_str = include_str!("../../resources/config.schema.json");
        let schema: serde_json::Value =
            serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;

        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)?;

        debug!("Validating configuration against schema");
        if let Err(error) = validator.validate(&json_value) {
            return Err(FanControlError::InvalidConfiguration {
                reason: format!("schema validation failed: {}", error),
            }
            .into());
        }

        debug!("Schema validation passed, deserializing into Config structure");
        let config: Config = serde_yml::from_str(contents).map_err(|err| {
            FanControlError::InvalidConfiguration {
                reason: format!("deserialization failed: {}", err),
            }
        })?;

        utils::validate_specific_rules(&config)?;

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only explicitly provided values override the file. Overrides are
    /// applied before the controller is built, so the configuration remains
    /// immutable once the daemon is running.
    ///
    /// # Parameters
    ///
    /// * `cpu_target` - CPU target temperature in °C
    /// * `drive_target` - Drive target temperature in °C
    /// * `check_interval` - Seconds between control cycles
    /// * `mock` - Force the simulated chassis driver
    ///
    /// # Errors
    /// * [`FanControlError::InvalidConfiguration`] when an override breaks a
    ///   configuration rule, e.g. a zero check interval
    pub fn apply_args(
        &mut self,
        cpu_target: Option<i32>,
        drive_target: Option<i32>,
        check_interval: Option<u64>,
        mock: bool,
    ) -> Result<()> {
        if let Some(target) = cpu_target {
            debug!("Overriding CPU target from command line: {}", target);
            self.fan_regulation.cpu_target_celsius = target;
        }
        if let Some(target) = drive_target {
            debug!("Overriding drive target from command line: {}", target);
            self.fan_regulation.drive_target_celsius = target;
        }
        if let Some(interval) = check_interval {
            debug!("Overriding check interval from command line: {}s", interval);
            self.fan_regulation.check_interval_secs = interval;
        }
        if mock {
            debug!("Forcing simulated chassis driver from command line");
            self.actuator.driver = ActuatorDriverType::Mock;
        }
        utils::validate_specific_rules(self)
    }
}
