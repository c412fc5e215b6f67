//! Sentinel Policy Engine
//!
//! Defines how the checkup pipeline is scheduled and what the report surface
//! shows after a failed run.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shape of a checkup process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// One unbroken sample stream, consumed until a fatal error
    Perpetual,

    /// Finite runs separated by a fixed sleep, each producing a report
    Periodic,
}

/// What the report surface shows when a periodic run fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Keep serving the last completed report, flagged stale
    KeepLastGood,

    /// Replace the report with the error until the next successful run
    SurfaceError,
}

/// Sentinel operational policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentinelPolicy {
    /// Perpetual stream or periodic reports
    ///
    /// **Default:** perpetual
    pub mode: RunMode,

    /// Sleep between periodic runs, in seconds
    ///
    /// Ignored in perpetual mode.
    ///
    /// **Default:** 300 (5 minutes)
    pub interval_s: u64,

    /// Report surface behaviour after a failed periodic run
    ///
    /// **Default:** keep the last good report
    pub failure_policy: FailurePolicy,
}

impl Default for SentinelPolicy {
    fn default() -> Self {
        Self {
            mode: RunMode::Perpetual,
            interval_s: 300,
            failure_policy: FailurePolicy::KeepLastGood,
        }
    }
}

impl SentinelPolicy {
    /// Periodic policy with the given interval, other fields default
    pub fn periodic(interval_s: u64) -> Self {
        Self {
            mode: RunMode::Periodic,
            interval_s,
            ..Default::default()
        }
    }

    /// Sleep between periodic runs
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_s)
    }

    /// Validate the policy configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.mode == RunMode::Periodic && self.interval_s == 0 {
            return Err("interval_s must be greater than 0 in periodic mode".to_string());
        }

        Ok(())
    }
}
