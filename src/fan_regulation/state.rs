// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fancontrol project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Mutable controller state
//!
//! A single instance is owned by the control loop and passed by exclusive
//! reference to the components that update it.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::oscillation::OscillationDetector;

/// Speed bookkeeping and oscillation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerState {
    /// Last successfully applied speed in percent
    pub current_speed: u8,
    /// Speed before the most recent successful change
    pub previous_speed: u8,
    /// Cycles since the last successful speed change
    pub cycles_at_speed: u32,
    /// Direction history and reversal counter
    pub oscillation: OscillationDetector,
}

impl ControllerState {
    /// State after the first speed was applied
    pub fn new(initial_speed: u8) -> Self {
        Self {
            current_speed: initial_speed,
            previous_speed: initial_speed,
            cycles_at_speed: 0,
            oscillation: OscillationDetector::new(),
        }
    }

    /// Record a successful speed application
    pub fn record_speed_change(&mut self, applied: u8) {
        self.previous_speed = self.current_speed;
        self.current_speed = applied;
        self.cycles_at_speed = 0;
    }

    pub fn oscillation_count(&self) -> u32 {
        self.oscillation.oscillation_count()
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "speed {}% (previous {}%), {} cycles at speed, last direction {}, oscillation {}",
            self.current_speed,
            self.previous_speed,
            self.cycles_at_speed,
            self.oscillation.last_direction().as_i8(),
            self.oscillation.oscillation_count()
        )
    }
}
