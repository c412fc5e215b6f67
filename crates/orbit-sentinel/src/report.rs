//! Latest-report slot
//!
//! Holds the most recently completed [`SweepStats`] and the outcome of the
//! latest run. The [`FailurePolicy`] decides what readers see after a run
//! fails.

use crate::metrics::SweepStats;
use crate::policy::FailurePolicy;
use serde::Serialize;
use tokio::sync::RwLock;

/// What the report surface currently shows
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReportView {
    /// No run has finished yet
    Pending,

    /// The latest run completed
    Ready { report: SweepStats },

    /// The latest run failed; the report is from an earlier run
    Stale { report: SweepStats, error: String },

    /// The latest run failed and no report is being served
    Failed { error: String },
}

impl ReportView {
    /// Whether the view carries a report
    pub fn is_servable(&self) -> bool {
        matches!(self, ReportView::Ready { .. } | ReportView::Stale { .. })
    }
}

#[derive(Debug, Default)]
struct SlotState {
    latest: Option<SweepStats>,
    last_error: Option<String>,
    runs_completed: u64,
    runs_failed: u64,
}

/// Shared holder of the latest report
#[derive(Debug)]
pub struct ReportSlot {
    policy: FailurePolicy,
    state: RwLock<SlotState>,
}

impl ReportSlot {
    /// Create an empty slot
    pub fn new(policy: FailurePolicy) -> Self {
        Self {
            policy,
            state: RwLock::new(SlotState::default()),
        }
    }

    /// Store the report of a successful run, clearing any previous error
    pub async fn publish(&self, report: SweepStats) {
        let mut state = self.state.write().await;
        state.latest = Some(report);
        state.last_error = None;
        state.runs_completed += 1;
    }

    /// Record a failed run
    pub async fn fail(&self, error: impl Into<String>) {
        let mut state = self.state.write().await;
        state.last_error = Some(error.into());
        state.runs_failed += 1;
    }

    /// Current view, resolved through the failure policy
    pub async fn view(&self) -> ReportView {
        let state = self.state.read().await;

        match (&state.latest, &state.last_error) {
            (None, None) => ReportView::Pending,
            (Some(report), None) => ReportView::Ready {
                report: report.clone(),
            },
            (Some(report), Some(error)) if self.policy == FailurePolicy::KeepLastGood => {
                ReportView::Stale {
                    report: report.clone(),
                    error: error.clone(),
                }
            }
            (_, Some(error)) => ReportView::Failed {
                error: error.clone(),
            },
        }
    }

    /// Number of (successful, failed) runs seen so far
    pub async fn run_counts(&self) -> (u64, u64) {
        let state = self.state.read().await;
        (state.runs_completed, state.runs_failed)
    }

    /// The configured failure policy
    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }
}
