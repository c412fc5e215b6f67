/*!
 * AvailabilityChecker: verify each resolved sample against its peer
 *
 * Unresolved samples pass straight through. A call that fails or outlives
 * its timeout drops the sample for this run; there is no retry.
 */

use crate::error::{CheckupError, Result};
use crate::ipfs_check::Verifier;
use crate::types::Sample;
use futures::future;
use futures::stream::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default bound on one verification call
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

pub struct AvailabilityChecker {
    verifier: Arc<dyn Verifier>,
    timeout: Duration,
    concurrency: usize,
}

impl AvailabilityChecker {
    pub fn new(verifier: Arc<dyn Verifier>, timeout: Duration) -> Self {
        Self {
            verifier,
            timeout,
            concurrency: 1,
        }
    }

    /// Allow `concurrency` calls in flight; output order is unchanged
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Check every sample of `source`, dropping failed or timed-out checks
    pub fn check<'a, S>(&'a self, source: S) -> impl Stream<Item = Result<Sample>> + Send + 'a
    where
        S: Stream<Item = Result<Sample>> + Send + 'a,
    {
        source
            .map(move |item| async move {
                match item {
                    Ok(sample) => self.check_sample(sample).await.map(Ok),
                    Err(e) => Some(Err(e)),
                }
            })
            .buffered(self.concurrency)
            .filter_map(future::ready)
    }

    /// One sample; `None` when the check failed or timed out
    pub async fn check_sample(&self, sample: Sample) -> Option<Sample> {
        let Some(peer) = sample.peer().cloned() else {
            return Some(sample);
        };

        debug!("Checking sample {} @ {}", sample.cid, peer);
        match tokio::time::timeout(self.timeout, self.verifier.check(&sample.cid, &peer)).await {
            Ok(Ok(result)) => Some(sample.checked(result)),
            Ok(Err(e)) => {
                warn!("Failed to checkup on {}: {}", sample.cid, e);
                None
            }
            Err(_) => {
                let err = CheckupError::Timeout {
                    operation: format!("check {} @ {}", sample.cid, peer),
                    duration: self.timeout,
                };
                warn!("Failed to checkup on {}: {}", sample.cid, err);
                None
            }
        }
    }
}
