// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fancontrol project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! BMC fan actuator through `ipmitool raw`
//!
//! The same binary drives the local BMC (no connection arguments) or a remote
//! one over the network (`-I/-H/-U/-P`). The speed is sent as a single hex
//! byte appended to the configured raw prefix.

use anyhow::{bail, Result};
use async_trait::async_trait;
use log::{debug, info};

use super::run_command;
use crate::config::IpmitoolConfig;
use crate::fan_regulation::FanActuator;

/// ipmitool backed [`FanActuator`]
pub struct IpmitoolActuator {
    config: IpmitoolConfig,
}

impl IpmitoolActuator {
    pub fn new(config: &IpmitoolConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Full argument list for a raw command
    pub fn build_args(&self, raw: &[String]) -> Vec<String> {
        let mut args = Vec::with_capacity(raw.len() + 9);
        let connection = [
            ("-I", &self.config.interface),
            ("-H", &self.config.host),
            ("-U", &self.config.username),
            ("-P", &self.config.password),
        ];
        for (flag, value) in connection {
            if let Some(value) = value {
                args.push(flag.to_string());
                args.push(value.clone());
            }
        }
        args.push("raw".to_string());
        args.extend(raw.iter().cloned());
        args
    }

    /// Arguments setting the fan duty to `percent`
    pub fn speed_args(&self, percent: u8) -> Vec<String> {
        let mut raw = self.config.set_speed_raw.clone();
        raw.push(format!("0x{:02x}", percent));
        self.build_args(&raw)
    }

    async fn run_raw(&self, args: Vec<String>) -> Result<()> {
        let output = run_command(&self.config.command, &args, self.config.timeout()).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "{} exited with {}: {}",
                self.config.command,
                output.status,
                stderr.trim()
            );
        }
        Ok(())
    }
}

#[async_trait]
impl FanActuator for IpmitoolActuator {
    async fn prepare(&self) -> Result<()> {
        if self.config.manual_mode_raw.is_empty() {
            debug!("No manual mode command configured");
            return Ok(());
        }
        self.run_raw(self.build_args(&self.config.manual_mode_raw))
            .await?;
        info!("BMC switched to manual fan control ({})", self.describe());
        Ok(())
    }

    async fn set_speed(&self, percent: u8) -> Result<()> {
        self.run_raw(self.speed_args(percent)).await
    }

    fn describe(&self) -> String {
        match &self.config.host {
            Some(host) => format!(
                "{} {}@{} via {}",
                self.config.command,
                self.config.username.as_deref().unwrap_or("?"),
                host,
                self.config.interface.as_deref().unwrap_or("default interface")
            ),
            None => format!("{} (local BMC)", self.config.command),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_config() -> IpmitoolConfig {
        IpmitoolConfig {
            interface: Some("lanplus".to_string()),
            host: Some("10.0.0.5".to_string()),
            username: Some("root".to_string()),
            password: Some("calvin".to_string()),
            ..IpmitoolConfig::default()
        }
    }

    #[test]
    fn test_local_speed_args() {
        let actuator = IpmitoolActuator::new(&IpmitoolConfig::default());
        assert_eq!(
            actuator.speed_args(42),
            vec!["raw", "0x30", "0x30", "0x02", "0xff", "0x2a"]
        );
        assert_eq!(actuator.speed_args(100).last().map(String::as_str), Some("0x64"));
    }

    #[test]
    fn test_remote_connection_args_come_first() {
        let actuator = IpmitoolActuator::new(&remote_config());
        let args = actuator.build_args(&actuator.config.manual_mode_raw.clone());
        assert_eq!(
            args,
            vec![
                "-I", "lanplus", "-H", "10.0.0.5", "-U", "root", "-P", "calvin", "raw", "0x30",
                "0x30", "0x01", "0x00"
            ]
        );
    }

    #[test]
    fn test_describe_never_leaks_password() {
        let remote = IpmitoolActuator::new(&remote_config());
        let description = remote.describe();
        assert!(description.contains("root@10.0.0.5"));
        assert!(description.contains("lanplus"));
        assert!(!description.contains("calvin"));

        let local = IpmitoolActuator::new(&IpmitoolConfig::default());
        assert_eq!(local.describe(), "ipmitool (local BMC)");
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let config = IpmitoolConfig {
            command: "/nonexistent/ipmitool".to_string(),
            ..IpmitoolConfig::default()
        };
        let actuator = IpmitoolActuator::new(&config);
        assert!(actuator.set_speed(30).await.is_err());
    }
}
