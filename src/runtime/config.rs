// SPDX-License-Identifier: MIT

//! Run-time settings shared by both roles.
//!
//! The defaults are what the two processes agree on without talking to each
//! other (class names, identity name, inset).  A few values can be adjusted
//! through environment variables, which the worker inherits from the
//! coordinator.

use std::time::Duration;

use tracing::warn;

use super::identity::IdentityProfile;

pub const ENV_IDENTITY_NAME: &str = "WINDOWFOLLOWER_APPCONTAINER";
pub const ENV_GRACEFUL_MS: &str = "WINDOWFOLLOWER_GRACEFUL_MS";
pub const ENV_REAP_MS: &str = "WINDOWFOLLOWER_REAP_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowerConfig {
    /// Window class the worker searches for.
    pub coordinator_class: String,
    pub coordinator_title: String,
    pub worker_class: String,
    pub worker_title: String,

    pub identity_name: String,
    pub identity_display_name: String,
    pub identity_description: String,

    pub window_width: i32,
    pub window_height: i32,
    /// Gap between the coordinator's client edge and the embedded surface.
    pub inset: i32,

    /// How long the worker gets to close its surface and exit.
    pub graceful_timeout: Duration,
    /// How long to wait for the exit after a forced termination.
    pub reap_timeout: Duration,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            coordinator_class: "WindowFollower.Coordinator".to_string(),
            coordinator_title: "Main Window".to_string(),
            worker_class: "WindowFollower.Worker".to_string(),
            worker_title: "Follower Window".to_string(),
            identity_name: "WindowFollower.AppContainer.Fixed".to_string(),
            identity_display_name: "Window Follower App Container".to_string(),
            identity_description: "Low trust container for follower window".to_string(),
            window_width: 300,
            window_height: 200,
            inset: 3,
            graceful_timeout: Duration::from_millis(2000),
            reap_timeout: Duration::from_millis(1000),
        }
    }
}

impl FollowerConfig {
    /// Defaults, with the process environment's overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|k| std::env::var(k).ok())
    }

    /// Apply overrides looked up by variable name.  Unusable values are
    /// logged and leave the default in place.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup(ENV_IDENTITY_NAME) {
            let name = name.trim();
            if name.is_empty() {
                warn!(var = ENV_IDENTITY_NAME, "ignoring empty identity name");
            } else {
                self.identity_name = name.to_string();
            }
        }
        if let Some(t) = parse_millis(&lookup, ENV_GRACEFUL_MS) {
            self.graceful_timeout = t;
        }
        if let Some(t) = parse_millis(&lookup, ENV_REAP_MS) {
            self.reap_timeout = t;
        }
        self
    }

    pub fn identity_profile(&self) -> IdentityProfile {
        IdentityProfile::new(&self.identity_name, &self.identity_display_name, &self.identity_description)
    }

    /// Size the worker creates its surface with, before it is embedded.
    pub fn worker_size(&self) -> (i32, i32) {
        (
            (self.window_width - 2 * self.inset).max(0),
            (self.window_height - 2 * self.inset).max(0),
        )
    }
}

fn parse_millis<F>(lookup: &F, var: &str) -> Option<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(var)?;
    match raw.trim().parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(e) => {
            warn!(var, value = %raw, error = %e, "ignoring invalid timeout");
            None
        }
    }
}
