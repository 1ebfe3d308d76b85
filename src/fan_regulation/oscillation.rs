// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fancontrol project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Direction reversal tracking
//!
//! Every applied adjustment reports its direction here. A reversal raises the
//! oscillation count, a repeated direction or a stable cycle lowers it. The
//! count feeds back into the damping of the adjustment table.

use serde::{Deserialize, Serialize};

/// Sign of an adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Down,
    #[default]
    Hold,
    Up,
}

impl Direction {
    pub fn from_adjustment(adjustment: i32) -> Self {
        match adjustment.signum() {
            1 => Direction::Up,
            -1 => Direction::Down,
            _ => Direction::Hold,
        }
    }

    pub fn as_i8(self) -> i8 {
        match self {
            Direction::Down => -1,
            Direction::Hold => 0,
            Direction::Up => 1,
        }
    }
}

/// Direction history and decaying reversal counter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OscillationDetector {
    last_direction: Direction,
    oscillation_count: u32,
}

impl OscillationDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detector resuming from a known history
    pub fn with_history(last_direction: Direction, oscillation_count: u32) -> Self {
        Self {
            last_direction,
            oscillation_count,
        }
    }

    /// Record the direction of an applied adjustment
    ///
    /// `Hold` is ignored so the stable path never overwrites the history.
    pub fn observe(&mut self, direction: Direction) {
        if direction == Direction::Hold {
            return;
        }

        if self.last_direction != Direction::Hold {
            if direction != self.last_direction {
                self.oscillation_count += 1;
            } else {
                self.oscillation_count = self.oscillation_count.saturating_sub(1);
            }
        }

        self.last_direction = direction;
    }

    /// Stable cycle: decay the counter by one
    pub fn decay(&mut self) {
        self.oscillation_count = self.oscillation_count.saturating_sub(1);
    }

    pub fn oscillation_count(&self) -> u32 {
        self.oscillation_count
    }

    pub fn last_direction(&self) -> Direction {
        self.last_direction
    }
}
