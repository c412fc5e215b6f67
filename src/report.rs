/*!
 * Terminal reporter
 *
 * Logs every finished sample with a pass/fail marker and the sub-checks
 * that contributed, and folds it into the run report in periodic mode.
 */

use crate::types::Sample;
use orbit_observability::UNKNOWN_PEER;
use orbit_sentinel::SweepStatsBuilder;
use tracing::info;

/// Log one finished sample
///
/// ```text
/// ✅ bafy... @ /p2p/12D3KooW...
///     🟢 Connect success
///     🟢 DHT provider record found
///     🟢 Bitswap responded
///     🟢 Bitswap found
/// ```
pub fn log_result(sample: &Sample) {
    let marker = if sample.outcome().is_ok() { "✅" } else { "❌" };
    let peer = sample
        .peer()
        .map(|p| p.as_str())
        .unwrap_or(UNKNOWN_PEER);
    info!("{} {} @ {}", marker, sample.cid, peer);

    let Some(result) = sample.result() else {
        return;
    };

    match &result.connection_error {
        Some(error) => info!("\t🔴 Connect success ({})", error),
        None => info!("\t🟢 Connect success"),
    }
    info!("\t{} DHT provider record found", light(result.cid_in_dht));

    if result.connected() {
        let bitswap = &result.data_available_over_bitswap;
        info!("\t{} Bitswap responded", light(bitswap.responded));
        info!("\t{} Bitswap found", light(bitswap.found));
    }
}

/// Add one finished sample to a run report
pub fn fold(stats: &mut SweepStatsBuilder, sample: &Sample) {
    match sample.result() {
        Some(result) => {
            let bitswap = &result.data_available_over_bitswap;
            stats.record_checked(
                result.connected(),
                result.cid_in_dht,
                bitswap.responded,
                bitswap.found,
            );
        }
        None => stats.record_unresolved(),
    }
}

fn light(ok: bool) -> &'static str {
    if ok {
        "🟢"
    } else {
        "🔴"
    }
}
