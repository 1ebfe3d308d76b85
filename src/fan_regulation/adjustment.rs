// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fancontrol project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Piecewise proportional adjustment
//!
//! Two independent mappings from a temperature error to fan speed:
//! - [`AdjustmentCalculator::adjust`] turns `temp - target` into a signed
//!   step applied every cycle. Cooling steps are gentler than heating steps.
//! - [`initial_speed_for_delta`] turns the same error into an absolute
//!   starting speed, used once at startup.

use crate::config::FanRegulationConfig;

/// Oscillation count above which steps larger than 1 are halved
pub const DAMPING_THRESHOLD: u32 = 2;

/// Maps a temperature error to a signed speed step
///
/// Pure: the result depends only on the arguments and the immutable
/// deadband/max-step configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjustmentCalculator {
    deadband: i32,
    max_step: i32,
}

impl AdjustmentCalculator {
    pub fn new(deadband: i32, max_step: i32) -> Self {
        Self { deadband, max_step }
    }

    pub fn from_config(config: &FanRegulationConfig) -> Self {
        Self::new(config.deadband_celsius, config.max_step_percent)
    }

    /// Signed speed step for `temp` against `target`
    ///
    /// # Arguments
    /// * `temp` - Current temperature in °C
    /// * `target` - Target temperature in °C
    /// * `oscillation_count` - Current oscillation level, steps are damped above [`DAMPING_THRESHOLD`]
    ///
    /// # Returns
    /// * `0` inside the deadband, a positive step when too hot, a negative step when too cool
    pub fn adjust(&self, temp: i32, target: i32, oscillation_count: u32) -> i32 {
        let delta = temp - target;
        if delta.abs() <= self.deadband {
            return 0;
        }

        let step = if delta > 0 {
            self.heating_step(delta)
        } else {
            cooling_step(-delta)
        };

        damp(step, oscillation_count)
    }

    fn heating_step(&self, delta: i32) -> i32 {
        match delta {
            ..=2 => 1,
            3..=4 => 2,
            5..=6 => 4,
            7..=10 => 8,
            _ => self.max_step,
        }
    }
}

fn cooling_step(magnitude: i32) -> i32 {
    match magnitude {
        ..=2 => -1,
        3..=4 => -2,
        5..=8 => -3,
        _ => -5,
    }
}

/// Halve steps larger than 1 while oscillating, never down to 0
fn damp(step: i32, oscillation_count: u32) -> i32 {
    if oscillation_count <= DAMPING_THRESHOLD || step.abs() <= 1 {
        return step;
    }
    let halved = step / 2;
    if halved == 0 {
        step.signum()
    } else {
        halved
    }
}

/// Absolute starting speed for the controlling temperature error
///
/// Coarser than the per-cycle table: it only needs to land close enough that
/// the loop converges in a few cycles. The result is clamped to
/// `[min_speed, max_speed]`.
pub fn initial_speed_for_delta(delta: i32, min_speed: u8, max_speed: u8) -> u8 {
    let speed = match delta {
        ..=-11 => min_speed,
        -10..=-5 => 20,
        -4..=0 => 30,
        1..=5 => 40,
        6..=10 => 55,
        11..=15 => 70,
        _ => max_speed,
    };
    speed.clamp(min_speed, max_speed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calculator() -> AdjustmentCalculator {
        AdjustmentCalculator::new(1, 15)
    }

    #[test]
    fn test_deadband_returns_zero() {
        let calc = AdjustmentCalculator::new(2, 15);
        for target in [30, 45, 75] {
            for delta in -2..=2 {
                assert_eq!(calc.adjust(target + delta, target, 0), 0);
                assert_eq!(calc.adjust(target + delta, target, 5), 0);
            }
        }
    }

    #[test]
    fn test_heating_bins() {
        let calc = AdjustmentCalculator::new(0, 15);
        let expected = [
            (1, 1),
            (2, 1),
            (3, 2),
            (4, 2),
            (5, 4),
            (6, 4),
            (7, 8),
            (10, 8),
            (11, 15),
            (40, 15),
        ];
        for (delta, step) in expected {
            assert_eq!(calc.adjust(50 + delta, 50, 0), step, "delta {}", delta);
        }
    }

    #[test]
    fn test_cooling_bins_are_gentler() {
        let calc = AdjustmentCalculator::new(0, 15);
        let expected = [(1, -1), (2, -1), (3, -2), (4, -2), (5, -3), (8, -3), (9, -5), (30, -5)];
        for (magnitude, step) in expected {
            assert_eq!(calc.adjust(50 - magnitude, 50, 0), step, "delta -{}", magnitude);
            assert!(step.abs() <= calc.adjust(50 + magnitude, 50, 0));
        }
    }

    #[test]
    fn test_heating_is_monotonic() {
        let calc = calculator();
        let mut previous = 0;
        for delta in 1..=30 {
            let step = calc.adjust(60 + delta, 60, 0);
            assert!(step >= previous, "step dropped at delta {}", delta);
            previous = step;
        }
    }

    #[test]
    fn test_cooling_is_monotonic() {
        let calc = calculator();
        let mut previous = 0;
        for magnitude in 1..=30 {
            let step = calc.adjust(60 - magnitude, 60, 0);
            assert!(step <= previous, "step rose at delta -{}", magnitude);
            previous = step;
        }
    }

    #[test]
    fn test_damping_halves_toward_zero_and_keeps_sign() {
        for step in [-5, -3, -2, 2, 4, 8, 15] {
            let damped = damp(step, 3);
            assert_eq!(damped, step / 2);
            assert_ne!(damped, 0);
            assert_eq!(damped.signum(), step.signum());
        }
        assert_eq!(damp(1, 10), 1);
        assert_eq!(damp(-1, 10), -1);
        assert_eq!(damp(8, DAMPING_THRESHOLD), 8);
    }

    #[test]
    fn test_scenario_five_over_target() {
        assert_eq!(calculator().adjust(80, 75, 0), 2);
    }

    #[test]
    fn test_scenario_one_under_target_is_stable() {
        assert_eq!(calculator().adjust(74, 75, 0), 0);
    }

    #[test]
    fn test_scenario_damped_four_becomes_two() {
        // delta 6 maps to 4 before damping
        assert_eq!(calculator().adjust(81, 75, 3), 2);
    }

    #[test]
    fn test_initial_speed_table_is_clamped() {
        assert_eq!(initial_speed_for_delta(-20, 10, 100), 10);
        assert_eq!(initial_speed_for_delta(-7, 10, 100), 20);
        assert_eq!(initial_speed_for_delta(0, 10, 100), 30);
        assert_eq!(initial_speed_for_delta(3, 10, 100), 40);
        assert_eq!(initial_speed_for_delta(8, 10, 100), 55);
        assert_eq!(initial_speed_for_delta(12, 10, 100), 70);
        assert_eq!(initial_speed_for_delta(25, 10, 87), 87);
        assert_eq!(initial_speed_for_delta(-7, 25, 100), 25);
        assert_eq!(initial_speed_for_delta(12, 10, 60), 60);
    }
}
