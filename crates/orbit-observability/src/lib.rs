//! Orbit Observability for the checkup auditor
//!
//! This crate owns the Prometheus metric families that the checkup pipeline
//! folds its outcomes into, and the text exposition served on the scrape
//! endpoint.
//!
//! ## Metric families
//!
//! | Name | Labels | Meaning |
//! |------|--------|---------|
//! | `<ns>_samples_total` | `peer` | Every sample that reached the recorder |
//! | `<ns>_connection_errors_total` | `peer` | Verification could not connect to the peer |
//! | `<ns>_dht_provider_records_total` | `peer`, `found` | Provider record lookups |
//! | `<ns>_bitswap_checks_total` | `peer`, `responded`, `found` | Bitswap HAVE checks |
//! | `<ns>_bitswap_have_duration_seconds` | `peer`, `responded`, `found` | Accumulated bitswap check time |
//!
//! The registry is an explicit instance rather than a process global, so the
//! pipeline and the scrape handler share it by `Arc`:
//!
//! ```
//! use orbit_observability::CheckupMetrics;
//! use std::sync::Arc;
//!
//! let metrics = Arc::new(CheckupMetrics::new("checkup").unwrap());
//! metrics.record_sample(Some("/p2p/12D3KooW"));
//! metrics.record_provider_record("/p2p/12D3KooW", true);
//!
//! let text = metrics.encode().unwrap();
//! assert!(text.contains("checkup_samples_total"));
//! ```

pub mod metrics;

pub use metrics::{CheckupMetrics, MetricsError, UNKNOWN_PEER};
