/*!
 * Orbit Checkup - availability auditing for pinned IPFS content
 *
 * Continuously samples content from an upload catalog, resolves a peer that
 * claims to hold it, asks a verification service whether that peer really
 * serves it, and exports the outcome as Prometheus metrics:
 *
 * - Random-id, offset and block sampling over a PostgreSQL catalog
 * - Peer resolution against IPFS Cluster with CIDv0/v1 fallback
 * - Optional secondary provider backed by S3
 * - Bounded verification calls against ipfs-check
 * - Perpetual stream or periodic runs with a served report
 */

pub mod catalog;
pub mod check;
pub mod checkup;
pub mod cluster;
pub mod config;
pub mod elastic;
pub mod error;
pub mod ipfs_check;
pub mod logging;
pub mod peer;
pub mod random;
pub mod record;
pub mod report;
pub mod sampler;
pub mod server;
pub mod testing;
pub mod types;

// Re-export commonly used types
pub use checkup::{run_checkup, start_checkup, Checkup, Collaborators, PipelineSettings};
pub use config::{CheckupConfig, SampleMethod};
pub use error::{CheckupError, Result};
pub use types::{CheckResult, Outcome, PeerAddr, Sample};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
