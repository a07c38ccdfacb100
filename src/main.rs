// SPDX-License-Identifier: MIT

#![cfg_attr(target_os = "windows", windows_subsystem = "windows")]

use std::process::ExitCode;

use tracing::info;

use windowfollower::{trace, FollowerConfig, FollowerError, InvocationMode, Role};

fn main() -> ExitCode {
    let mode = InvocationMode::from_env();
    trace::init(mode.verbose);
    let config = FollowerConfig::from_env();
    info!(role = ?mode.role, sandbox = mode.sandbox, "windowfollower starting");

    match run(&config, &mode) {
        Ok(code) => ExitCode::from(code.clamp(0, 255) as u8),
        Err(e) => {
            report(&e);
            ExitCode::from(1)
        }
    }
}

#[cfg(target_os = "windows")]
fn run(config: &FollowerConfig, mode: &InvocationMode) -> Result<i32, FollowerError> {
    use windowfollower::embed::win32;

    match mode.role {
        Role::Coordinator => win32::run_coordinator(config, mode),
        Role::Worker => win32::run_worker(config),
    }
}

#[cfg(not(target_os = "windows"))]
fn run(_config: &FollowerConfig, mode: &InvocationMode) -> Result<i32, FollowerError> {
    match mode.role {
        Role::Coordinator | Role::Worker => Err(FollowerError::UnsupportedPlatform),
    }
}

#[cfg(target_os = "windows")]
fn report(e: &FollowerError) {
    windowfollower::embed::win32::report_startup_failure(e);
}

#[cfg(not(target_os = "windows"))]
fn report(e: &FollowerError) {
    tracing::error!(error = %e, category = ?e.category(), "startup failed");
}
