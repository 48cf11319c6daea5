//! Trigger handshake.
//!
//! Launches an external program and blocks until it exits, giving a person
//! or a script the chance to attach a debugger and arm a hardware
//! breakpoint before sampling starts. The child learns where to put the
//! breakpoint from its environment.

use crate::config::TriggerConfig;
use crate::error::{BenchError, Result};
use std::process::{Command, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const ENV_PID: &str = "BPBENCH_PID";
pub const ENV_BASE_ADDR: &str = "BPBENCH_BASE_ADDR";
pub const ENV_BREAKPOINT_ADDR: &str = "BPBENCH_BREAKPOINT_ADDR";

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Addresses handed to the trigger program.
#[derive(Debug, Clone, Copy)]
pub struct HandshakeInfo {
    pub pid: u32,
    pub base_addr: usize,
    pub breakpoint_addr: usize,
}

/// Runs the trigger program to completion, or until the configured timeout
/// elapses, in which case the child is killed.
pub fn run_trigger(config: &TriggerConfig, info: &HandshakeInfo) -> Result<ExitStatus> {
    info!("Starting trigger {}", config.program);

    let mut child = Command::new(&config.program)
        .args(&config.args)
        .env(ENV_PID, info.pid.to_string())
        .env(ENV_BASE_ADDR, format!("{:#x}", info.base_addr))
        .env(ENV_BREAKPOINT_ADDR, format!("{:#x}", info.breakpoint_addr))
        .spawn()
        .map_err(|e| BenchError::TriggerLaunchFailed {
            program: config.program.clone(),
            code: e.raw_os_error(),
        })?;

    let status = match config.timeout {
        None => child.wait(),
        Some(timeout) => {
            let started = Instant::now();
            loop {
                match child.try_wait() {
                    Ok(Some(status)) => break Ok(status),
                    Ok(None) if started.elapsed() >= timeout => {
                        if let Err(e) = child.kill() {
                            warn!("Failed to kill trigger {}: {}", config.program, e);
                        }
                        if let Err(e) = child.wait() {
                            warn!("Failed to reap trigger {}: {}", config.program, e);
                        }
                        return Err(BenchError::TriggerTimedOut {
                            program: config.program.clone(),
                            waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        });
                    }
                    Ok(None) => thread::sleep(POLL_INTERVAL),
                    Err(e) => break Err(e),
                }
            }
        }
    }
    .map_err(|e| BenchError::TriggerLaunchFailed {
        program: config.program.clone(),
        code: e.raw_os_error(),
    })?;

    if status.success() {
        debug!("Trigger {} finished", config.program);
    } else {
        warn!("Trigger {} exited with {}", config.program, status);
    }
    Ok(status)
}
