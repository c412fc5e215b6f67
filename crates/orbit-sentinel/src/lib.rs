//! Orbit Sentinel: run-shape engine for the checkup auditor
//!
//! The Sentinel decides *when* the checkup pipeline runs and *what* the
//! report surface shows. The pipeline itself is supplied by the caller as a
//! [`Sweep`].
//!
//! # Run shapes
//!
//! ```text
//! perpetual:  sample ─> resolve ─> check ─> record ─> log ─> ... (until fatal error)
//!
//! periodic:   ┌──────────────┐   ┌───────────────┐   ┌──────────────┐
//!             │ finite sweep │──>│ publish report│──>│ sleep(interval)│──┐
//!             └──────────────┘   └───────────────┘   └──────────────┘  │
//!                    ^                                                 │
//!                    └─────────────────────────────────────────────────┘
//! ```
//!
//! A failed periodic run is recorded in the [`ReportSlot`]; the
//! [`FailurePolicy`] decides whether readers keep seeing the last good
//! report or the error.
//!
//! # Example
//!
//! ```no_run
//! use orbit_sentinel::{Sentinel, SentinelPolicy, Sweep, SweepStats};
//!
//! struct Noop;
//!
//! #[async_trait::async_trait]
//! impl Sweep for Noop {
//!     async fn sweep(&mut self) -> anyhow::Result<SweepStats> {
//!         Ok(SweepStats::default())
//!     }
//!     async fn stream(&mut self) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> anyhow::Result<()> {
//! let sentinel = Sentinel::new(Noop, SentinelPolicy::periodic(300))?;
//! let reports = sentinel.reports();
//!
//! tokio::spawn(sentinel.run());
//! println!("{:?}", reports.view().await);
//! # Ok(())
//! # }
//! ```

pub mod daemon;
pub mod metrics;
pub mod policy;
pub mod report;

pub use daemon::{Sentinel, Sweep};
pub use metrics::{SweepStats, SweepStatsBuilder};
pub use policy::{FailurePolicy, RunMode, SentinelPolicy};
pub use report::{ReportSlot, ReportView};
