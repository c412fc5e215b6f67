/*!
 * MetricsRecorder: fold finished samples into the Prometheus families
 *
 * A tap stage. Every sample is counted; only checked samples feed the DHT,
 * connection and bitswap families. Bitswap duration is only accumulated
 * when the verifier managed to connect.
 */

use crate::error::Result;
use crate::types::{PeerAddr, Sample};
use futures::stream::{Stream, TryStreamExt};
use orbit_observability::CheckupMetrics;
use std::sync::Arc;

pub struct MetricsRecorder {
    metrics: Arc<CheckupMetrics>,
}

impl MetricsRecorder {
    pub fn new(metrics: Arc<CheckupMetrics>) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> &Arc<CheckupMetrics> {
        &self.metrics
    }

    /// Record each sample and pass it on unchanged
    pub fn tap<'a, S>(&'a self, source: S) -> impl Stream<Item = Result<Sample>> + Send + 'a
    where
        S: Stream<Item = Result<Sample>> + Send + 'a,
    {
        source.inspect_ok(move |sample| self.record(sample))
    }

    pub fn record(&self, sample: &Sample) {
        let peer = sample.peer().map(PeerAddr::as_str);
        self.metrics.record_sample(peer);

        let (Some(peer), Some(result)) = (peer, sample.result()) else {
            return;
        };

        self.metrics.record_provider_record(peer, result.cid_in_dht);

        if !result.connected() {
            self.metrics.record_connection_error(peer);
            return;
        }

        let bitswap = &result.data_available_over_bitswap;
        self.metrics.record_bitswap(
            peer,
            bitswap.responded,
            bitswap.found,
            bitswap.duration().as_secs_f64(),
        );
    }
}
