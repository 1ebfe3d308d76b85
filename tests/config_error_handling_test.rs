// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fancontrol project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::Result;
use rust_fancontrol::config::{ActuatorDriverType, Config};
use rust_fancontrol::error::FanControlError;
use std::fs;
use std::path::Path;
use std::sync::Once;
use tempfile::tempdir;

static INIT: Once = Once::new();

// Setup logger for tests
fn setup() {
    INIT.call_once(|| {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

fn fan_control_error(err: &anyhow::Error) -> &FanControlError {
    err.downcast_ref::<FanControlError>()
        .unwrap_or_else(|| panic!("expected a FanControlError, got: {:#}", err))
}

#[test]
fn test_missing_config_is_fatal_and_creates_sample_file() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    let err = Config::from_file(&config_path).unwrap_err();

    assert!(matches!(
        fan_control_error(&err),
        FanControlError::ConfigurationMissing { .. }
    ));
    assert_eq!(fan_control_error(&err).exit_code(), 2);
    assert!(!config_path.exists(), "The requested file must not be created");

    let sample_path = config_path.with_extension("sample.yaml");
    assert!(Path::new(&sample_path).exists(), "Sample config file was not created");
    let sample_config = Config::from_file(&sample_path)?;
    assert_eq!(sample_config, Config::default());

    Ok(())
}

#[test]
fn test_config_deserialization_error_creates_sample_file() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    // Valid YAML with type mismatches
    let invalid_yaml = r#"
fan_regulation:
  cpu_target_celsius: "seventy"
  settle_cycles: -1
actuator:
  driver: "pwm"
"#;
    fs::write(&config_path, invalid_yaml)?;

    let err = Config::from_file(&config_path).unwrap_err();

    assert!(matches!(
        fan_control_error(&err),
        FanControlError::InvalidConfiguration { .. }
    ));
    let sample_path = config_path.with_extension("sample.yaml");
    assert!(Path::new(&sample_path).exists(), "Sample config file was not created");
    assert_eq!(
        Config::from_file(&sample_path)?.fan_regulation.cpu_target_celsius,
        70
    );

    Ok(())
}

#[test]
fn test_config_rule_violation_creates_sample_file() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("fans.yaml");

    // Schema-valid but inverted speed range
    let invalid_config = r#"
fan_regulation:
  min_speed_percent: 60
  max_speed_percent: 40
"#;
    fs::write(&config_path, invalid_config)?;

    let result = Config::from_file(&config_path);

    assert!(result.is_err(), "Config loading should have failed");
    assert!(temp_dir.path().join("fans.sample.yaml").exists());

    Ok(())
}

#[test]
fn test_remote_bmc_without_password_is_missing_configuration() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    let yaml = r#"
actuator:
  driver: ipmitool
  ipmitool:
    interface: lanplus
    host: 10.0.0.5
    username: root
"#;
    fs::write(&config_path, yaml)?;

    let err = Config::from_file(&config_path).unwrap_err();
    assert!(matches!(
        fan_control_error(&err),
        FanControlError::ConfigurationMissing { .. }
    ));

    Ok(())
}

#[test]
fn test_config_load_save_and_overrides() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    let mut config = Config::default();
    config.fan_regulation.cpu_target_celsius = 65;
    config.sensors.drives.devices = vec!["sda".to_string(), "sdb".to_string()];
    config.save_to_file(&config_path)?;

    let mut loaded = Config::from_file(&config_path)?;
    assert_eq!(loaded, config);

    loaded.apply_args(None, Some(38), Some(10), true)?;
    assert_eq!(loaded.fan_regulation.cpu_target_celsius, 65);
    assert_eq!(loaded.fan_regulation.drive_target_celsius, 38);
    assert_eq!(loaded.fan_regulation.check_interval_secs, 10);
    assert_eq!(loaded.actuator.driver, ActuatorDriverType::Mock);

    Ok(())
}

#[test]
fn test_zero_interval_from_command_line_is_rejected() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");
    Config::default().save_to_file(&config_path)?;

    let mut config = Config::from_file(&config_path)?;
    let err = config.apply_args(None, None, Some(0), true).unwrap_err();

    assert!(matches!(
        fan_control_error(&err),
        FanControlError::InvalidConfiguration { .. }
    ));
    assert_eq!(fan_control_error(&err).exit_code(), 2);

    Ok(())
}
