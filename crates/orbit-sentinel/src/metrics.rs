//! Sentinel sweep statistics
//!
//! A [`SweepStats`] is the report produced by one finite checkup run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Statistics from a single checkup run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepStats {
    /// Samples that reached the end of the pipeline
    pub total: usize,

    /// Samples fully retrievable from their peer
    pub ok: usize,

    /// Samples for which no eligible peer was found
    pub unresolved: usize,

    /// Resolved samples that failed at least one check
    pub failed: usize,

    /// Verifier could not connect to the peer
    pub connection_errors: usize,

    /// No DHT provider record for the CID
    pub missing_provider_records: usize,

    /// Peer connected but never answered the bitswap request
    pub bitswap_no_response: usize,

    /// Peer answered but did not have the block
    pub bitswap_not_found: usize,

    /// Time taken to complete the run
    pub duration: Option<Duration>,

    /// Wall-clock completion time
    pub completed_at: Option<DateTime<Utc>>,
}

impl SweepStats {
    /// Create a new empty stats object
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of resolved samples that were retrievable (0.0 - 1.0)
    pub fn availability_ratio(&self) -> f64 {
        let resolved = self.resolved();
        if resolved == 0 {
            1.0
        } else {
            self.ok as f64 / resolved as f64
        }
    }

    /// Samples that had a peer to check
    pub fn resolved(&self) -> usize {
        self.ok + self.failed
    }

    /// Format a human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "Run: {} samples | {} ok ({:.1}%) | {} failed | {} unresolved | connect errors: {} | no provider record: {} | bitswap silent: {} | bitswap missing: {}",
            self.total,
            self.ok,
            self.availability_ratio() * 100.0,
            self.failed,
            self.unresolved,
            self.connection_errors,
            self.missing_provider_records,
            self.bitswap_no_response,
            self.bitswap_not_found
        )
    }
}

/// Builder for tracking run progress
#[derive(Debug, Clone)]
pub struct SweepStatsBuilder {
    stats: SweepStats,
    start_time: Instant,
}

impl SweepStatsBuilder {
    /// Start tracking a new run
    pub fn new() -> Self {
        Self {
            stats: SweepStats::new(),
            start_time: Instant::now(),
        }
    }

    /// Record a sample without a peer
    pub fn record_unresolved(&mut self) {
        self.stats.total += 1;
        self.stats.unresolved += 1;
    }

    /// Record the verification outcome of a resolved sample
    ///
    /// `responded` and `found` are ignored when the peer was unreachable.
    pub fn record_checked(
        &mut self,
        connected: bool,
        provider_record: bool,
        responded: bool,
        found: bool,
    ) {
        self.stats.total += 1;

        if !provider_record {
            self.stats.missing_provider_records += 1;
        }

        if !connected {
            self.stats.connection_errors += 1;
            self.stats.failed += 1;
            return;
        }

        if !responded {
            self.stats.bitswap_no_response += 1;
        } else if !found {
            self.stats.bitswap_not_found += 1;
        }

        if provider_record && responded && found {
            self.stats.ok += 1;
        } else {
            self.stats.failed += 1;
        }
    }

    /// Finalize and return the stats
    pub fn finish(mut self) -> SweepStats {
        self.stats.duration = Some(self.start_time.elapsed());
        self.stats.completed_at = Some(Utc::now());
        self.stats
    }

    /// Get a reference to the current stats (without finishing)
    pub fn stats(&self) -> &SweepStats {
        &self.stats
    }
}

impl Default for SweepStatsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
