// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fancontrol project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Error taxonomy for the fan regulation daemon
//!
//! Sensing gaps and actuation failures are recovered inside the control loop
//! (the source is skipped or the same adjustment is retried next cycle).
//! Startup actuation failures and configuration problems are fatal and map to
//! a process exit status through [`FanControlError::exit_code`].

use thiserror::Error;

use crate::fan_regulation::SensorKind;

/// Errors raised by the fan regulation core and its startup sequence
#[derive(Error, Debug)]
pub enum FanControlError {
    #[error("No usable {source_kind} temperature reading this cycle")]
    SensingUnavailable { source_kind: SensorKind },

    #[error("Failed to apply fan speed {requested}%: {reason}")]
    ActuationFailure { requested: u8, reason: String },

    #[error("Initial fan speed {target}% could not be applied via {context}: {reason}")]
    StartupActuationFailure {
        target: u8,
        context: String,
        reason: String,
    },

    #[error("Required configuration missing: {what}")]
    ConfigurationMissing { what: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },
}

impl FanControlError {
    /// Process exit status used by `main` when this error ends the program
    pub fn exit_code(&self) -> i32 {
        match self {
            FanControlError::SensingUnavailable { .. } => 1,
            FanControlError::ActuationFailure { .. } => 1,
            FanControlError::StartupActuationFailure { .. } => 3,
            FanControlError::ConfigurationMissing { .. } => 2,
            FanControlError::InvalidConfiguration { .. } => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors_have_nonzero_exit_codes() {
        let startup = FanControlError::StartupActuationFailure {
            target: 40,
            context: "ipmitool (lanplus 10.0.0.5)".to_string(),
            reason: "timeout".to_string(),
        };
        let missing = FanControlError::ConfigurationMissing {
            what: "config.yaml".to_string(),
        };

        assert_ne!(startup.exit_code(), 0);
        assert_ne!(missing.exit_code(), 0);
        assert_ne!(startup.exit_code(), missing.exit_code());
    }

    #[test]
    fn test_cycle_errors_share_the_generic_exit_code() {
        let sensing = FanControlError::SensingUnavailable {
            source_kind: SensorKind::Drive,
        };
        let actuation = FanControlError::ActuationFailure {
            requested: 55,
            reason: "BMC busy".to_string(),
        };

        assert_eq!(sensing.exit_code(), 1);
        assert_eq!(actuation.exit_code(), 1);
        assert_eq!(
            actuation.to_string(),
            "Failed to apply fan speed 55%: BMC busy"
        );
    }
}
