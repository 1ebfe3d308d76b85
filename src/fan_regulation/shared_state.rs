// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fancontrol project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Shared state for the fan regulation system
//!
//! The control loop owns its [`ControllerState`](super::state::ControllerState)
//! exclusively; this module only holds an observable copy published after each
//! cycle, read by the heartbeat task and status reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::oscillation::Direction;
use super::state::ControllerState;
use super::SensorKind;

/// Maximum number of cycles kept in history (12 hours at the default 30 s interval)
pub const MAX_HISTORY_SIZE: usize = 1440;

/// Current status of the regulator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegulatorStatus {
    /// Daemon not started yet
    Uninitialized,
    /// Preparing the actuator and applying the seeded speed
    Initializing,
    /// Control loop running
    Running,
    /// Startup failed
    Error { message: String },
    /// Control loop exited
    Stopped,
}

impl fmt::Display for RegulatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegulatorStatus::Uninitialized => write!(f, "uninitialized"),
            RegulatorStatus::Initializing => write!(f, "initializing"),
            RegulatorStatus::Running => write!(f, "running"),
            RegulatorStatus::Error { message } => write!(f, "error ({})", message),
            RegulatorStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// Branch taken by a control cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    NoData,
    Stable,
    Settling,
    Adjusted,
    ActuationFailed,
}

/// One control cycle in history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanDataPoint {
    pub timestamp: DateTime<Utc>,
    pub cpu_celsius: Option<i32>,
    pub drive_celsius: Option<i32>,
    pub controlling: Option<SensorKind>,
    pub adjustment: i32,
    pub speed_percent: u8,
    pub oscillation_count: u32,
    pub phase: CyclePhase,
}

/// Observable regulator state
#[derive(Debug, Clone)]
pub struct FanRegulationState {
    pub status: RegulatorStatus,
    pub started_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub current_speed: u8,
    pub cycles_at_speed: u32,
    pub last_direction: Direction,
    pub oscillation_count: u32,
    pub total_cycles: u64,
    pub adjustments: u64,
    pub actuation_failures: u64,
    pub history: VecDeque<FanDataPoint>,
}

impl FanRegulationState {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            status: RegulatorStatus::Uninitialized,
            started_at: now,
            last_update: now,
            current_speed: 0,
            cycles_at_speed: 0,
            last_direction: Direction::Hold,
            oscillation_count: 0,
            total_cycles: 0,
            adjustments: 0,
            actuation_failures: 0,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    pub fn set_status(&mut self, status: RegulatorStatus) {
        self.status = status;
        self.last_update = Utc::now();
    }

    /// Copy the controller bookkeeping after startup or a cycle
    pub fn sync_controller(&mut self, controller: &ControllerState) {
        self.current_speed = controller.current_speed;
        self.cycles_at_speed = controller.cycles_at_speed;
        self.last_direction = controller.oscillation.last_direction();
        self.oscillation_count = controller.oscillation_count();
        self.last_update = Utc::now();
    }

    /// Append a cycle to history and update counters
    pub fn record_cycle(&mut self, point: FanDataPoint) {
        self.total_cycles += 1;
        match point.phase {
            CyclePhase::Adjusted => self.adjustments += 1,
            CyclePhase::ActuationFailed => self.actuation_failures += 1,
            _ => {}
        }

        self.last_update = point.timestamp;
        self.history.push_back(point);
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
    }

    /// Last `count` cycles, oldest first
    pub fn recent(&self, count: usize) -> Vec<FanDataPoint> {
        let start = self.history.len().saturating_sub(count);
        self.history.range(start..).cloned().collect()
    }

    pub fn last_point(&self) -> Option<&FanDataPoint> {
        self.history.back()
    }

    /// One-line summary for heartbeat and status logs
    pub fn summary(&self) -> String {
        let temps = match self.last_point() {
            Some(point) => format!(
                "CPU {} / drive {}",
                format_celsius(point.cpu_celsius),
                format_celsius(point.drive_celsius)
            ),
            None => "no readings yet".to_string(),
        };
        format!(
            "status {}, fan {}% for {} cycles, {}, oscillation {}, {} cycles ({} adjustments, {} failures), up {}s",
            self.status,
            self.current_speed,
            self.cycles_at_speed,
            temps,
            self.oscillation_count,
            self.total_cycles,
            self.adjustments,
            self.actuation_failures,
            (self.last_update - self.started_at).num_seconds().max(0)
        )
    }
}

impl Default for FanRegulationState {
    fn default() -> Self {
        Self::new()
    }
}

fn format_celsius(value: Option<i32>) -> String {
    match value {
        Some(celsius) => format!("{}°C", celsius),
        None => "n/a".to_string(),
    }
}

/// Type alias for the shared fan state wrapped in Arc<RwLock<>>
pub type SharedFanState = Arc<RwLock<FanRegulationState>>;

/// Create a new shared fan state instance
pub fn create_shared_fan_state() -> SharedFanState {
    Arc::new(RwLock::new(FanRegulationState::new()))
}
