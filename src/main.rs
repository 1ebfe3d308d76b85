// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fancontrol project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the adaptive chassis fan controller

use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use tokio::signal;

use rust_fancontrol::config::{self, Config};
use rust_fancontrol::daemon::launch_daemon::Daemon;
use rust_fancontrol::error::FanControlError;
use rust_fancontrol::fan_regulation::daemon::ControlLoop;
use rust_fancontrol::fan_regulation::shared_state::create_shared_fan_state;
use rust_fancontrol::fan_regulation::create_fan_drivers;

/// Adaptive chassis fan controller driven by CPU and drive temperatures
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to a configuration to validate and exit
    #[arg(long)]
    validate_config: Option<PathBuf>,

    /// Output the configuration schema as JSON and exit
    #[arg(long)]
    show_config_schema: bool,

    /// CPU target temperature in °C
    #[arg(long)]
    cpu_target: Option<i32>,

    /// Drive target temperature in °C
    #[arg(long)]
    drive_target: Option<i32>,

    /// Seconds between control cycles
    #[arg(long)]
    interval: Option<u64>,

    /// Use the simulated chassis instead of real hardware
    #[arg(long)]
    mock: bool,

    /// Apply the initial speed, run a single control cycle and exit
    #[arg(long)]
    once: bool,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Err(err) = run(args).await {
        let code = err
            .downcast_ref::<FanControlError>()
            .map(FanControlError::exit_code)
            .unwrap_or(1);
        eprintln!("Error: {:#}", err);
        std::process::exit(code);
    }
}

async fn run(args: Args) -> Result<()> {
    if args.show_config_schema {
        return config::output_config_schema();
    }

    if let Some(validate_path) = args.validate_config {
        Config::from_file(&validate_path)?;
        println!("Configuration file is valid: {}", validate_path.display());
        return Ok(());
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let mut config = Config::from_file(&config_path)?;
    config.apply_args(args.cpu_target, args.drive_target, args.interval, args.mock)?;

    if args.once {
        return run_once(&config).await;
    }

    info!("Starting in daemon mode");
    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;

    wait_for_shutdown(&daemon).await?;

    info!("Received shutdown signal, terminating daemon");
    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}

/// Initialization plus one control cycle
async fn run_once(config: &Config) -> Result<()> {
    let drivers = create_fan_drivers(config)?;
    let mut control_loop = ControlLoop::new(
        &config.fan_regulation,
        &config.sensors,
        drivers,
        create_shared_fan_state(),
    );
    control_loop.initialize().await?;
    let outcome = control_loop.run_cycle().await;
    info!("Single cycle finished: {:?}", outcome);
    control_loop.report_status().await;
    Ok(())
}

/// Wait for SIGINT or SIGTERM, answering SIGUSR1 with a status report
#[cfg(unix)]
async fn wait_for_shutdown(daemon: &Daemon) -> Result<()> {
    use tokio::signal::unix::{signal as unix_signal, SignalKind};

    let mut sigterm = unix_signal(SignalKind::terminate())?;
    let mut sigusr1 = unix_signal(SignalKind::user_defined1())?;

    loop {
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received SIGINT");
                return Ok(());
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
                return Ok(());
            }
            _ = sigusr1.recv() => {
                if let Err(e) = daemon.report_status() {
                    warn!("Status report unavailable: {}", e);
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_daemon: &Daemon) -> Result<()> {
    signal::ctrl_c().await?;
    Ok(())
}
