//! Sentinel Daemon: the checkup run loop
//!
//! Drives a [`Sweep`] either as one perpetual stream or as a sequence of
//! finite runs separated by a fixed sleep, publishing each finished run to
//! the shared [`ReportSlot`].

use crate::metrics::SweepStats;
use crate::policy::{RunMode, SentinelPolicy};
use crate::report::ReportSlot;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

/// A pipeline the Sentinel can drive
#[async_trait]
pub trait Sweep: Send {
    /// Run the pipeline to a finite report
    async fn sweep(&mut self) -> Result<SweepStats>;

    /// Consume the pipeline as an unbroken stream
    ///
    /// Only returns on a fatal error or when the stream ends.
    async fn stream(&mut self) -> Result<()>;
}

/// The Sentinel: schedules checkup runs
pub struct Sentinel<S> {
    sweep: S,
    policy: SentinelPolicy,
    reports: Arc<ReportSlot>,
}

impl<S: Sweep> Sentinel<S> {
    /// Create a new Sentinel instance
    ///
    /// Fails when the policy does not validate.
    pub fn new(sweep: S, policy: SentinelPolicy) -> Result<Self> {
        policy
            .validate()
            .map_err(|e| anyhow!("Invalid Sentinel policy: {}", e))?;

        let reports = Arc::new(ReportSlot::new(policy.failure_policy));

        Ok(Self {
            sweep,
            policy,
            reports,
        })
    }

    /// Shared handle to the latest-report slot
    pub fn reports(&self) -> Arc<ReportSlot> {
        self.reports.clone()
    }

    /// The policy in force
    pub fn policy(&self) -> &SentinelPolicy {
        &self.policy
    }

    /// Main loop
    ///
    /// Perpetual mode returns when the stream ends or fails. Periodic mode
    /// runs until the future is dropped; failed runs are recorded in the
    /// report slot and the next run starts after the usual interval.
    pub async fn run(mut self) -> Result<()> {
        match self.policy.mode {
            RunMode::Perpetual => {
                info!("🛡️  Sentinel Active | Mode: perpetual");
                self.sweep.stream().await
            }
            RunMode::Periodic => {
                info!(
                    "🛡️  Sentinel Active | Mode: periodic | Interval: {}s | On failure: {:?}",
                    self.policy.interval_s, self.policy.failure_policy
                );

                loop {
                    self.run_sweep().await;
                    tokio::time::sleep(self.policy.interval()).await;
                }
            }
        }
    }

    /// Execute a single finite run and publish its outcome
    pub async fn run_sweep(&mut self) -> Option<SweepStats> {
        info!("🔭 Sentinel: Starting checkup run...");

        match self.sweep.sweep().await {
            Ok(stats) => {
                info!("📊 {}", stats.summary());

                let ratio = stats.availability_ratio();
                if ratio >= 0.99 {
                    info!("💚 Availability: Excellent ({:.1}%)", ratio * 100.0);
                } else if ratio >= 0.95 {
                    info!("💛 Availability: Good ({:.1}%)", ratio * 100.0);
                } else {
                    warn!("🔴 Availability: Poor ({:.1}%)", ratio * 100.0);
                }

                self.reports.publish(stats.clone()).await;
                Some(stats)
            }
            Err(e) => {
                error!("❌ Checkup run failed: {:#}", e);
                self.reports.fail(format!("{:#}", e)).await;
                None
            }
        }
    }
}
