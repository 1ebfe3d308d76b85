// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fancontrol project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Per-cycle maximum temperature per source
//!
//! [`SensorReader`] reduces the raw readings of a [`SensorSource`] to one
//! [`TemperatureSample`] per [`SensorKind`]. A disabled source, a failing
//! source or a source without any matching reading yields an absent sample;
//! none of these are errors for the control loop.

use log::{debug, warn};
use std::sync::Arc;

use super::{SensorKind, SensorSource, TemperatureSample};
use crate::config::SensorsConfig;
use crate::error::FanControlError;

/// Reduces raw readings to the hottest CPU and drive temperature
pub struct SensorReader {
    source: Arc<dyn SensorSource>,
    cpu_patterns: Vec<String>,
    cpu_enabled: bool,
    drives_enabled: bool,
}

impl SensorReader {
    pub fn new(source: Arc<dyn SensorSource>, config: &SensorsConfig) -> Self {
        Self {
            source,
            cpu_patterns: config
                .cpu
                .label_patterns
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            cpu_enabled: config.cpu.enabled,
            drives_enabled: config.drives.enabled,
        }
    }

    pub fn is_enabled(&self, kind: SensorKind) -> bool {
        match kind {
            SensorKind::Cpu => self.cpu_enabled,
            SensorKind::Drive => self.drives_enabled,
        }
    }

    /// Hottest reading of `kind`, or an absent sample
    pub async fn read_max(&self, kind: SensorKind) -> TemperatureSample {
        if !self.is_enabled(kind) {
            return TemperatureSample::absent();
        }

        let sample = match kind {
            SensorKind::Cpu => self.read_cpu_max().await,
            SensorKind::Drive => self.read_drive_max().await,
        };

        if sample.is_absent() {
            debug!("{}", FanControlError::SensingUnavailable { source_kind: kind });
        }
        sample
    }

    async fn read_cpu_max(&self) -> TemperatureSample {
        let readings = match self.source.thermal_readings().await {
            Ok(readings) => readings,
            Err(e) => {
                warn!("Thermal sensor query failed ({}): {:#}", self.source.describe(), e);
                return TemperatureSample::absent();
            }
        };

        readings
            .into_iter()
            .filter(|(label, _)| self.is_cpu_label(label))
            .max_by_key(|(_, celsius)| *celsius)
            .map(|(label, celsius)| TemperatureSample::new(celsius, label))
            .unwrap_or_else(TemperatureSample::absent)
    }

    async fn read_drive_max(&self) -> TemperatureSample {
        let readings = match self.source.drive_readings().await {
            Ok(readings) => readings,
            Err(e) => {
                warn!("Drive temperature query failed ({}): {:#}", self.source.describe(), e);
                return TemperatureSample::absent();
            }
        };

        readings
            .into_iter()
            .filter_map(|reading| match reading.celsius {
                Some(celsius) => Some((reading.device, celsius)),
                None => {
                    debug!("Drive {} reported no temperature, skipped", reading.device);
                    None
                }
            })
            .max_by_key(|(_, celsius)| *celsius)
            .map(|(device, celsius)| TemperatureSample::new(celsius, device))
            .unwrap_or_else(TemperatureSample::absent)
    }

    fn is_cpu_label(&self, label: &str) -> bool {
        let label = label.to_lowercase();
        self.cpu_patterns.iter().any(|pattern| label.contains(pattern))
    }
}
