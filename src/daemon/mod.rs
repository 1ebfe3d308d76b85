// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fancontrol project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon Module
//!
//! Runs and manages the background services of the fan controller: the fan
//! regulation loop and a heartbeat monitor.
//!
//! ## Usage
//!
//! ```no_run
//! use rust_fancontrol::{config::Config, daemon::launch_daemon::Daemon};
//!
//! async fn run() -> anyhow::Result<()> {
//!     let config = Config::from_file("config.yaml")?;
//!
//!     let mut daemon = Daemon::new();
//!     daemon.launch(&config).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!
//!     // the fan keeps its last applied speed
//!     daemon.shutdown();
//!     daemon.join().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod launch_daemon;
