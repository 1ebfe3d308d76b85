// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fancontrol project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Hardware drivers for fan regulation
//!
//! - [`system`]: lm-sensors and smartctl temperature source
//! - [`ipmitool`]: BMC fan actuator through `ipmitool raw`
//! - [`mock`]: simulated chassis implementing both sides

pub mod ipmitool;
pub mod mock;
pub mod system;

use anyhow::{anyhow, Context, Result};
use log::debug;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

/// Flags whose following argument is a secret
const SECRET_FLAGS: &[&str] = &["-P"];

/// Command line for logs, secret flag values replaced by `****`
pub fn display_command(program: &str, args: &[String]) -> String {
    let mut shown = vec![program];
    let mut mask_next = false;
    for arg in args {
        if mask_next {
            shown.push("****");
            mask_next = false;
        } else {
            shown.push(arg);
            mask_next = SECRET_FLAGS.contains(&arg.as_str());
        }
    }
    shown.join(" ")
}

/// Run an external tool with a bounded runtime
///
/// The child is killed when the timeout elapses. A non-zero exit status is
/// not an error here; callers decide what the status means.
pub(crate) async fn run_command(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<Output> {
    debug!("Running {}", display_command(program, args));

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| anyhow!("{} did not finish within {}s", program, timeout.as_secs()))?
        .with_context(|| format!("Failed to run {}", program))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_display_command_masks_password() {
        let shown = display_command(
            "ipmitool",
            &args(&["-H", "10.0.0.5", "-U", "root", "-P", "calvin", "raw", "0x30"]),
        );
        assert_eq!(shown, "ipmitool -H 10.0.0.5 -U root -P **** raw 0x30");
    }

    #[test]
    fn test_display_command_without_secrets() {
        let shown = display_command("smartctl", &args(&["-n", "standby", "-A", "/dev/sda"]));
        assert_eq!(shown, "smartctl -n standby -A /dev/sda");
    }
}
