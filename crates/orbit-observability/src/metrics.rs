//! Prometheus metrics derived from checkup outcomes
//!
//! All families are registered on a registry owned by [`CheckupMetrics`].
//! Prometheus vectors are internally atomic, so increments from the pipeline
//! and gathers from the scrape handler never race.

use prometheus::{CounterVec, Encoder, Opts, Registry, TextEncoder};
use thiserror::Error;

/// Label used when a sample could not be matched to any peer
pub const UNKNOWN_PEER: &str = "unknown";

/// Errors raised while building or encoding the metrics registry
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Metric creation or registration failed
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// Text exposition was not valid UTF-8
    #[error("Metrics encoding error: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Counters for the sampling → resolution → verification pipeline
pub struct CheckupMetrics {
    registry: Registry,

    /// Number of random samples taken, by peer
    samples_total: CounterVec,

    /// Samples where the verifier could not connect to the peer
    connection_errors_total: CounterVec,

    /// DHT provider records found or not found, by peer
    dht_provider_records_total: CounterVec,

    /// Bitswap checks by peer and outcome flags
    bitswap_checks_total: CounterVec,

    /// Accumulated seconds spent checking the peer HAS the CID over bitswap
    bitswap_have_duration_seconds: CounterVec,
}

impl CheckupMetrics {
    /// Create a fresh registry with every checkup family registered
    ///
    /// `namespace` prefixes each metric name (`checkup` by default in the
    /// binary).
    pub fn new(namespace: &str) -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let samples_total = register_counter(
            &registry,
            namespace,
            "samples_total",
            "Number of random samples taken by peer ID.",
            &["peer"],
        )?;
        let connection_errors_total = register_counter(
            &registry,
            namespace,
            "connection_errors_total",
            "Number of samples taken where we were not able to connect to the target peer.",
            &["peer"],
        )?;
        let dht_provider_records_total = register_counter(
            &registry,
            namespace,
            "dht_provider_records_total",
            "Provider records found or not found by peer ID.",
            &["peer", "found"],
        )?;
        let bitswap_checks_total = register_counter(
            &registry,
            namespace,
            "bitswap_checks_total",
            "Bitswap HAVE checks by peer ID and whether the peer responded and had the block.",
            &["peer", "responded", "found"],
        )?;
        let bitswap_have_duration_seconds = register_counter(
            &registry,
            namespace,
            "bitswap_have_duration_seconds",
            "Time taken to check the peer HAS the sample CID over bitswap by peer ID.",
            &["peer", "responded", "found"],
        )?;

        tracing::debug!("Registered checkup metrics under namespace '{}'", namespace);

        Ok(Self {
            registry,
            samples_total,
            connection_errors_total,
            dht_provider_records_total,
            bitswap_checks_total,
            bitswap_have_duration_seconds,
        })
    }

    /// Count one sample, resolved or not
    pub fn record_sample(&self, peer: Option<&str>) {
        self.samples_total
            .with_label_values(&[peer.unwrap_or(UNKNOWN_PEER)])
            .inc();
    }

    /// Count a DHT provider record lookup
    pub fn record_provider_record(&self, peer: &str, found: bool) {
        self.dht_provider_records_total
            .with_label_values(&[peer, bool_label(found)])
            .inc();
    }

    /// Count a failed connection to `peer`
    pub fn record_connection_error(&self, peer: &str) {
        self.connection_errors_total.with_label_values(&[peer]).inc();
    }

    /// Count a bitswap check and accumulate its duration
    pub fn record_bitswap(&self, peer: &str, responded: bool, found: bool, duration_secs: f64) {
        let labels = [peer, bool_label(responded), bool_label(found)];
        self.bitswap_checks_total.with_label_values(&labels).inc();
        self.bitswap_have_duration_seconds
            .with_label_values(&labels)
            .inc_by(duration_secs);
    }

    /// Current value of `samples_total` for `peer`
    pub fn samples_total(&self, peer: Option<&str>) -> f64 {
        self.samples_total
            .with_label_values(&[peer.unwrap_or(UNKNOWN_PEER)])
            .get()
    }

    /// Current value of `connection_errors_total` for `peer`
    pub fn connection_errors_total(&self, peer: &str) -> f64 {
        self.connection_errors_total.with_label_values(&[peer]).get()
    }

    /// Current value of `dht_provider_records_total` for `peer` and `found`
    pub fn provider_records_total(&self, peer: &str, found: bool) -> f64 {
        self.dht_provider_records_total
            .with_label_values(&[peer, bool_label(found)])
            .get()
    }

    /// Current value of `bitswap_checks_total`
    pub fn bitswap_checks_total(&self, peer: &str, responded: bool, found: bool) -> f64 {
        self.bitswap_checks_total
            .with_label_values(&[peer, bool_label(responded), bool_label(found)])
            .get()
    }

    /// Current value of `bitswap_have_duration_seconds`
    pub fn bitswap_duration_seconds(&self, peer: &str, responded: bool, found: bool) -> f64 {
        self.bitswap_have_duration_seconds
            .with_label_values(&[peer, bool_label(responded), bool_label(found)])
            .get()
    }

    /// The underlying registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render every family in the Prometheus text exposition format
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Content type of [`encode`](Self::encode) output
    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }
}

fn register_counter(
    registry: &Registry,
    namespace: &str,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<CounterVec, MetricsError> {
    let counter = CounterVec::new(Opts::new(name, help).namespace(namespace), labels)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

fn bool_label(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}
