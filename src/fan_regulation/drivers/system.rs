// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fancontrol project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Host temperature source
//!
//! CPU temperatures come from `sensors -j` (lm-sensors JSON output). Drive
//! temperatures come from `smartctl -n standby -A`, which refuses to spin up a
//! sleeping drive; such drives are left out of the readings.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use std::time::Duration;

use super::run_command;
use crate::config::SensorsConfig;
use crate::fan_regulation::{DriveReading, SensorSource};

/// smartctl exit status bit set when the device is in the skipped power mode
const SMARTCTL_LOW_POWER_BIT: i32 = 0x02;

/// lm-sensors and smartctl backed [`SensorSource`]
pub struct SystemSensorSource {
    sensors_command: String,
    smartctl_command: String,
    lsblk_command: String,
    devices: Vec<String>,
    temperature_attributes: Vec<String>,
    timeout: Duration,
}

/// Result of probing a single drive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveProbe {
    Standby,
    Temperature(Option<i32>),
}

impl SystemSensorSource {
    pub fn new(config: &SensorsConfig) -> Self {
        Self {
            sensors_command: config.cpu.sensors_command.clone(),
            smartctl_command: config.drives.smartctl_command.clone(),
            lsblk_command: config.drives.lsblk_command.clone(),
            devices: config
                .drives
                .devices
                .iter()
                .map(|d| d.trim_start_matches("/dev/").to_string())
                .collect(),
            temperature_attributes: config.drives.temperature_attributes.clone(),
            timeout: config.command_timeout(),
        }
    }

    async fn list_disks(&self) -> Result<Vec<String>> {
        if !self.devices.is_empty() {
            return Ok(self.devices.clone());
        }

        let args = ["-d", "-n", "-o", "NAME,TYPE"].map(String::from);
        let output = run_command(&self.lsblk_command, &args, self.timeout).await?;
        if !output.status.success() {
            return Err(anyhow!(
                "{} exited with {}: {}",
                self.lsblk_command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(parse_lsblk_disks(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn probe_drive(&self, device: &str) -> Result<DriveProbe> {
        let args = vec![
            "-n".to_string(),
            "standby".to_string(),
            "-A".to_string(),
            format!("/dev/{}", device),
        ];
        let output = run_command(&self.smartctl_command, &args, self.timeout).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        Ok(interpret_smartctl(
            output.status.code(),
            &stdout,
            &self.temperature_attributes,
        ))
    }
}

#[async_trait]
impl SensorSource for SystemSensorSource {
    async fn thermal_readings(&self) -> Result<Vec<(String, i32)>> {
        let args = vec!["-j".to_string()];
        let output = run_command(&self.sensors_command, &args, self.timeout).await?;
        // sensors exits non-zero when a single chip fails but still prints the others
        if !output.status.success() && output.stdout.is_empty() {
            return Err(anyhow!(
                "{} exited with {}: {}",
                self.sensors_command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        parse_sensors_json(&String::from_utf8_lossy(&output.stdout))
    }

    async fn drive_readings(&self) -> Result<Vec<DriveReading>> {
        let disks = self.list_disks().await?;
        let mut readings = Vec::with_capacity(disks.len());

        for device in disks {
            match self.probe_drive(&device).await {
                Ok(DriveProbe::Standby) => {
                    debug!("Drive {} is in standby, not queried", device);
                }
                Ok(DriveProbe::Temperature(celsius)) => {
                    debug!("Drive {} temperature: {:?}", device, celsius);
                    readings.push(DriveReading { device, celsius });
                }
                Err(e) => {
                    debug!("Drive {} probe failed: {:#}", device, e);
                    readings.push(DriveReading {
                        device,
                        celsius: None,
                    });
                }
            }
        }

        Ok(readings)
    }

    fn describe(&self) -> String {
        format!("{} + {}", self.sensors_command, self.smartctl_command)
    }
}

/// Extract `("<chip>:<feature>", °C)` pairs from `sensors -j` output
pub fn parse_sensors_json(json: &str) -> Result<Vec<(String, i32)>> {
    let root: Value = serde_json::from_str(json).context("Invalid lm-sensors JSON output")?;
    let chips = root
        .as_object()
        .ok_or_else(|| anyhow!("lm-sensors JSON output is not an object"))?;

    let mut readings = Vec::new();
    for (chip, features) in chips {
        let Some(features) = features.as_object() else {
            continue;
        };
        for (feature, values) in features {
            let Some(values) = values.as_object() else {
                // "Adapter" and similar string entries
                continue;
            };
            for (key, value) in values {
                if !(key.starts_with("temp") && key.ends_with("_input")) {
                    continue;
                }
                if let Some(celsius) = value.as_f64() {
                    readings.push((format!("{}:{}", chip, feature), celsius.round() as i32));
                }
            }
        }
    }

    Ok(readings)
}

/// Whole-disk device names from `lsblk -d -n -o NAME,TYPE`
pub fn parse_lsblk_disks(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.next()?;
            (fields.next() == Some("disk")).then(|| name.to_string())
        })
        .collect()
}

/// Classify a `smartctl -n standby -A` run
///
/// Exit status bit 1 covers both a device in low-power mode and a device that
/// could not be opened; neither is queried further.
pub fn interpret_smartctl(
    exit_code: Option<i32>,
    stdout: &str,
    attributes: &[String],
) -> DriveProbe {
    let low_power_status = exit_code.is_some_and(|code| code & SMARTCTL_LOW_POWER_BIT != 0);
    let upper = stdout.to_uppercase();
    if low_power_status || upper.contains("STANDBY") || upper.contains("SLEEP") {
        return DriveProbe::Standby;
    }
    DriveProbe::Temperature(parse_smartctl_temperature(stdout, attributes))
}

/// First numeric temperature found, probing `attributes` in priority order
///
/// ATA attribute table rows use the RAW_VALUE column; `Name: value` lines
/// (SCSI, NVMe) use the first integer after the colon.
pub fn parse_smartctl_temperature(output: &str, attributes: &[String]) -> Option<i32> {
    attributes
        .iter()
        .find_map(|attribute| find_attribute(output, attribute))
}

fn find_attribute(output: &str, attribute: &str) -> Option<i32> {
    output.lines().find_map(|line| {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() >= 10 && tokens[1] == attribute && tokens[0].parse::<u32>().is_ok() {
            return leading_integer(tokens[9]);
        }

        let rest = line.trim_start().strip_prefix(attribute)?;
        let value = rest.trim_start().strip_prefix(':')?;
        leading_integer(value.trim_start())
    })
}

fn leading_integer(text: &str) -> Option<i32> {
    let digits: String = text
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENSORS_JSON: &str = r#"{
        "coretemp-isa-0000": {
            "Adapter": "ISA adapter",
            "Package id 0": {"temp1_input": 54.000, "temp1_max": 84.000, "temp1_crit": 100.000},
            "Core 0": {"temp2_input": 51.600, "temp2_max": 84.000},
            "Core 1": {"temp3_input": 49.400}
        },
        "nvme-pci-0100": {
            "Adapter": "PCI adapter",
            "Composite": {"temp1_input": 38.850, "temp1_alarm": 0.000}
        },
        "dell_smm-virtual-0": {
            "Adapter": "Virtual device",
            "fan1": {"fan1_input": 2400.000}
        }
    }"#;

    const ATA_ATTRIBUTES: &str = "\
smartctl 7.3 2022-02-28 r5338 [x86_64-linux-6.1.0] (local build)
=== START OF READ SMART DATA SECTION ===
SMART Attributes Data Structure revision number: 16
ID# ATTRIBUTE_NAME          FLAG     VALUE WORST THRESH TYPE      UPDATED  WHEN_FAILED RAW_VALUE
  1 Raw_Read_Error_Rate     0x000b   100   100   016    Pre-fail  Always       -       0
190 Airflow_Temperature_Cel 0x0022   064   052   045    Old_age   Always       -       36 (Min/Max 24/41)
194 Temperature_Celsius     0x0002   171   171   000    Old_age   Always       -       35 (Min/Max 20/48)
";

    const SCSI_OUTPUT: &str = "\
=== START OF READ SMART DATA SECTION ===
Current Drive Temperature:     33 C
Drive Trip Temperature:        60 C
";

    const NVME_OUTPUT: &str = "\
=== START OF SMART DATA SECTION ===
Critical Warning:                   0x00
Temperature:                        41 Celsius
Temperature Sensor 1:               44 Celsius
";

    fn attributes() -> Vec<String> {
        SensorsConfig::default().drives.temperature_attributes
    }

    #[test]
    fn test_parse_sensors_json() {
        let mut readings = parse_sensors_json(SENSORS_JSON).unwrap();
        readings.sort();

        assert_eq!(
            readings,
            vec![
                ("coretemp-isa-0000:Core 0".to_string(), 52),
                ("coretemp-isa-0000:Core 1".to_string(), 49),
                ("coretemp-isa-0000:Package id 0".to_string(), 54),
                ("nvme-pci-0100:Composite".to_string(), 39),
            ]
        );
    }

    #[test]
    fn test_parse_sensors_json_rejects_garbage() {
        assert!(parse_sensors_json("not json").is_err());
        assert!(parse_sensors_json("[1, 2]").is_err());
    }

    #[test]
    fn test_parse_lsblk_keeps_disks_only() {
        let output = "sda   disk\nsr0   rom\nnvme0n1 disk\nloop0 loop\n";
        assert_eq!(parse_lsblk_disks(output), vec!["sda", "nvme0n1"]);
    }

    #[test]
    fn test_ata_attribute_priority() {
        assert_eq!(parse_smartctl_temperature(ATA_ATTRIBUTES, &attributes()), Some(35));

        let airflow_first = vec!["Airflow_Temperature_Cel".to_string()];
        assert_eq!(parse_smartctl_temperature(ATA_ATTRIBUTES, &airflow_first), Some(36));
    }

    #[test]
    fn test_scsi_and_nvme_colon_lines() {
        assert_eq!(parse_smartctl_temperature(SCSI_OUTPUT, &attributes()), Some(33));
        assert_eq!(parse_smartctl_temperature(NVME_OUTPUT, &attributes()), Some(41));
    }

    #[test]
    fn test_no_temperature_attribute() {
        let output = "=== START OF READ SMART DATA SECTION ===\nSMART support is: Unavailable\n";
        assert_eq!(parse_smartctl_temperature(output, &attributes()), None);
    }

    #[test]
    fn test_standby_drive_is_skipped() {
        let output = "Device is in STANDBY mode, exit(2)\n";
        assert_eq!(interpret_smartctl(Some(2), output, &attributes()), DriveProbe::Standby);
        assert_eq!(
            interpret_smartctl(Some(0), "Device is in SLEEP mode\n", &attributes()),
            DriveProbe::Standby
        );
    }

    #[test]
    fn test_unopenable_drive_is_skipped() {
        let output = "Smartctl open device: /dev/sdz failed: No such device\n";
        assert_eq!(interpret_smartctl(Some(2), output, &attributes()), DriveProbe::Standby);
    }

    #[test]
    fn test_error_log_bits_still_parse() {
        // bit 6: device error log contains records
        assert_eq!(
            interpret_smartctl(Some(64), ATA_ATTRIBUTES, &attributes()),
            DriveProbe::Temperature(Some(35))
        );
    }
}
