// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fancontrol project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Speed actuator with range clamping
//!
//! Wraps a [`FanActuator`] driver: clamps every request into the configured
//! range, calls the driver and records the change in [`ControllerState`]
//! only when the driver reports success.

use log::debug;
use std::sync::Arc;

use super::state::ControllerState;
use super::FanActuator;
use crate::config::FanRegulationConfig;
use crate::error::FanControlError;

/// Clamping front-end for the fan driver
pub struct SpeedActuator {
    driver: Arc<dyn FanActuator>,
    min_speed: u8,
    max_speed: u8,
}

impl SpeedActuator {
    pub fn new(driver: Arc<dyn FanActuator>, min_speed: u8, max_speed: u8) -> Self {
        Self {
            driver,
            min_speed,
            max_speed,
        }
    }

    pub fn from_config(driver: Arc<dyn FanActuator>, config: &FanRegulationConfig) -> Self {
        Self::new(driver, config.min_speed_percent, config.max_speed_percent)
    }

    /// Clamp a requested speed into `[min_speed, max_speed]`
    pub fn clamp(&self, requested: i32) -> u8 {
        let clamped = requested.clamp(self.min_speed as i32, self.max_speed as i32) as u8;
        if clamped as i32 != requested {
            debug!(
                "Requested fan speed {}% clamped to {}%",
                requested, clamped
            );
        }
        clamped
    }

    /// Clamp and apply a speed, updating `state` on success
    ///
    /// # Returns
    /// * The applied (clamped) speed
    ///
    /// # Errors
    /// * [`FanControlError::ActuationFailure`] when the driver fails; `state` is untouched
    pub async fn apply(
        &self,
        state: &mut ControllerState,
        requested: i32,
    ) -> Result<u8, FanControlError> {
        let clamped = self.clamp(requested);
        self.apply_exact(clamped).await?;
        state.record_speed_change(clamped);
        Ok(clamped)
    }

    /// Apply an already clamped speed without touching any state
    pub(crate) async fn apply_exact(&self, speed: u8) -> Result<(), FanControlError> {
        self.driver
            .set_speed(speed)
            .await
            .map_err(|e| FanControlError::ActuationFailure {
                requested: speed,
                reason: format!("{:#}", e),
            })
    }

    /// Prepare the driver for manual control
    pub async fn prepare(&self) -> anyhow::Result<()> {
        self.driver.prepare().await
    }

    /// Host/connectivity context of the underlying driver
    pub fn describe(&self) -> String {
        self.driver.describe()
    }

    pub fn min_speed(&self) -> u8 {
        self.min_speed
    }

    pub fn max_speed(&self) -> u8 {
        self.max_speed
    }
}
