// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fancontrol project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rust fan control library
//!
//! Adaptive chassis fan regulation driven by CPU and drive temperatures,
//! applied through the BMC with ipmitool.

pub mod config;
pub mod daemon;
pub mod error;
pub mod fan_regulation;
