// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fancontrol project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Controlling source selection
//!
//! Each cycle every present source proposes an adjustment against its own
//! target. The source asking for the larger change wins; on equal magnitude
//! the earlier candidate wins, and CPU is always offered first.

use super::adjustment::AdjustmentCalculator;
use super::{SensorKind, TemperatureSample};

/// A present source with its target and proposed adjustment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCandidate {
    pub kind: SensorKind,
    pub temperature: i32,
    pub source_label: String,
    pub target: i32,
    pub adjustment: i32,
}

impl SourceCandidate {
    /// Signed distance from the source target
    pub fn delta(&self) -> i32 {
        self.temperature - self.target
    }
}

/// Source winning a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arbitration {
    pub controlling: SourceCandidate,
    /// All present candidates in evaluation order
    pub candidates: Vec<SourceCandidate>,
}

/// Picks the source whose adjustment dominates
#[derive(Debug, Clone, Copy)]
pub struct SourceArbiter {
    calculator: AdjustmentCalculator,
    cpu_target: i32,
    drive_target: i32,
}

impl SourceArbiter {
    pub fn new(calculator: AdjustmentCalculator, cpu_target: i32, drive_target: i32) -> Self {
        Self {
            calculator,
            cpu_target,
            drive_target,
        }
    }

    pub fn target_for(&self, kind: SensorKind) -> i32 {
        match kind {
            SensorKind::Cpu => self.cpu_target,
            SensorKind::Drive => self.drive_target,
        }
    }

    /// Evaluate the CPU and drive samples
    ///
    /// # Returns
    /// * `None` when both samples are absent
    pub fn arbitrate(
        &self,
        cpu: &TemperatureSample,
        drive: &TemperatureSample,
        oscillation_count: u32,
    ) -> Option<Arbitration> {
        let candidates: Vec<SourceCandidate> = [(SensorKind::Cpu, cpu), (SensorKind::Drive, drive)]
            .into_iter()
            .filter_map(|(kind, sample)| {
                let temperature = sample.value?;
                let target = self.target_for(kind);
                Some(SourceCandidate {
                    kind,
                    temperature,
                    source_label: sample.source_label.clone(),
                    target,
                    adjustment: self.calculator.adjust(temperature, target, oscillation_count),
                })
            })
            .collect();

        let controlling = select_controlling(&candidates)?.clone();
        Some(Arbitration {
            controlling,
            candidates,
        })
    }
}

/// Candidate with the strictly largest absolute adjustment, first one on ties
pub fn select_controlling(candidates: &[SourceCandidate]) -> Option<&SourceCandidate> {
    let mut best: Option<&SourceCandidate> = None;
    for candidate in candidates {
        match best {
            Some(current) if candidate.adjustment.abs() <= current.adjustment.abs() => {}
            _ => best = Some(candidate),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arbiter() -> SourceArbiter {
        SourceArbiter::new(AdjustmentCalculator::new(1, 15), 70, 40)
    }

    fn cpu(celsius: i32) -> TemperatureSample {
        TemperatureSample::new(celsius, "cpu")
    }

    fn drive(celsius: i32, device: &str) -> TemperatureSample {
        TemperatureSample::new(celsius, device)
    }

    #[test]
    fn test_larger_magnitude_wins() {
        // CPU +6 -> 4, drive +2 -> 1
        let result = arbiter()
            .arbitrate(
                &TemperatureSample::new(76, "coretemp-isa-0000:Package id 0"),
                &TemperatureSample::new(42, "sda"),
                0,
            )
            .unwrap();
        assert_eq!(result.controlling.kind, SensorKind::Cpu);
        assert_eq!(result.controlling.adjustment, 4);
        assert_eq!(result.candidates.len(), 2);

        // CPU -3 -> -2, drive +8 -> 8
        let result = arbiter()
            .arbitrate(&cpu(67), &drive(48, "sdb"), 0)
            .unwrap();
        assert_eq!(result.controlling.kind, SensorKind::Drive);
        assert_eq!(result.controlling.source_label, "sdb");
        assert_eq!(result.controlling.delta(), 8);
    }

    #[test]
    fn test_cooling_can_win_over_stable() {
        let result = arbiter()
            .arbitrate(&cpu(60), &drive(40, "sda"), 0)
            .unwrap();
        assert_eq!(result.controlling.kind, SensorKind::Cpu);
        assert_eq!(result.controlling.adjustment, -5);
    }

    #[test]
    fn test_tie_goes_to_cpu() {
        // CPU +2 -> 1, drive -2 -> -1
        let result = arbiter()
            .arbitrate(&cpu(72), &drive(38, "sda"), 0)
            .unwrap();
        assert_eq!(result.controlling.kind, SensorKind::Cpu);

        // both stable
        let result = arbiter()
            .arbitrate(&cpu(70), &drive(40, "sda"), 0)
            .unwrap();
        assert_eq!(result.controlling.kind, SensorKind::Cpu);
        assert_eq!(result.controlling.adjustment, 0);
    }

    #[test]
    fn test_single_present_source_controls() {
        let result = arbiter()
            .arbitrate(&TemperatureSample::absent(), &drive(45, "nvme0"), 0)
            .unwrap();
        assert_eq!(result.controlling.kind, SensorKind::Drive);
        assert_eq!(result.candidates.len(), 1);

        let result = arbiter()
            .arbitrate(&cpu(75), &TemperatureSample::absent(), 0)
            .unwrap();
        assert_eq!(result.controlling.kind, SensorKind::Cpu);
    }

    #[test]
    fn test_no_present_source() {
        assert!(arbiter()
            .arbitrate(&TemperatureSample::absent(), &TemperatureSample::absent(), 0)
            .is_none());
        assert!(select_controlling(&[]).is_none());
    }

    #[test]
    fn test_select_generalizes_to_more_sources() {
        let candidate = |kind, adjustment| SourceCandidate {
            kind,
            temperature: 0,
            source_label: String::new(),
            target: 0,
            adjustment,
        };
        let candidates = vec![
            candidate(SensorKind::Cpu, 2),
            candidate(SensorKind::Drive, -4),
            candidate(SensorKind::Drive, 4),
        ];
        let winner = select_controlling(&candidates).unwrap();
        assert_eq!(winner.adjustment, -4);
    }
}
