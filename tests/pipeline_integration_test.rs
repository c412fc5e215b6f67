//! End-to-end pipeline tests over in-memory collaborators

use orbit_checkup::cluster::PinState;
use orbit_checkup::elastic::ContentProvider;
use orbit_checkup::peer::PeerResolver;
use orbit_checkup::random::seeded;
use orbit_checkup::testing::{
    available_result, peer_status, MemoryCatalog, MemoryPinBackend, MemoryProvider,
    ScriptedSource, StubVerifier,
};
use orbit_checkup::{Checkup, Collaborators, PipelineSettings, Sample};
use orbit_observability::CheckupMetrics;
use orbit_sentinel::{ReportView, Sentinel, SentinelPolicy};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const CID_X: &str = "bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi";
const CID_Y_V0: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";
const CID_Y_V1: &str = "bafybeie5nqv6kd3qnfjupgvz34woh3oksc3iau6abmyajn7qvtf6d2ho34";

struct Harness {
    catalog: Arc<MemoryCatalog>,
    backend: Arc<MemoryPinBackend>,
    verifier: Arc<StubVerifier>,
    metrics: Arc<CheckupMetrics>,
}

impl Harness {
    fn new(catalog: MemoryCatalog, verifier: StubVerifier) -> Self {
        Self {
            catalog: Arc::new(catalog),
            backend: Arc::new(MemoryPinBackend::default()),
            verifier: Arc::new(verifier),
            metrics: Arc::new(CheckupMetrics::new("checkup").unwrap()),
        }
    }

    fn collaborators(&self) -> Collaborators {
        Collaborators {
            catalog: self.catalog.clone(),
            pin_backend: self.backend.clone(),
            verifier: self.verifier.clone(),
            secondary: None,
        }
    }

    fn checkup(&self, settings: PipelineSettings, sampler_rng: ScriptedSource) -> Checkup {
        Checkup::with_random(
            &self.collaborators(),
            settings,
            self.metrics.clone(),
            Box::new(sampler_rng),
            Box::new(seeded(7)),
        )
    }
}

fn one_sample() -> PipelineSettings {
    PipelineSettings {
        samples_per_run: 1,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_sampled_key_flows_to_verifier() {
    let catalog = MemoryCatalog::dense(1..=1000, CID_Y_V1);
    catalog.insert(500, CID_X);

    let harness = Harness::new(catalog, StubVerifier::new(available_result(1_000_000)));
    harness.backend.set(peer_status(CID_X, &[("peerA", PinState::Pinned)]));

    let mut checkup = harness.checkup(one_sample(), ScriptedSource::ints([500]));
    let stats = checkup.run_once().await.unwrap();

    assert_eq!(stats.total, 1);
    assert_eq!(stats.ok, 1);
    assert_eq!(harness.catalog.fetched_ids(), vec![500]);
    assert_eq!(
        harness.verifier.calls(),
        vec![(CID_X.to_string(), "/p2p/ipfs-peerA".to_string())]
    );
}

#[tokio::test]
async fn test_unpinned_everywhere_is_unresolved() {
    let catalog = MemoryCatalog::dense(1..=10, CID_Y_V0);
    let harness = Harness::new(catalog, StubVerifier::new(available_result(1)));
    harness.backend.set(peer_status(
        CID_Y_V0,
        &[("peerA", PinState::Remote), ("peerB", PinState::Unpinned)],
    ));
    harness
        .backend
        .set(peer_status(CID_Y_V1, &[("peerB", PinState::Unpinned)]));

    let mut checkup = harness.checkup(one_sample(), ScriptedSource::default());
    let stats = checkup.run_once().await.unwrap();

    assert_eq!(stats.total, 1);
    assert_eq!(stats.unresolved, 1);

    // Exactly one fallback query, and no verification without a peer
    assert_eq!(harness.backend.single_calls(), vec![CID_Y_V1.to_string()]);
    assert!(harness.verifier.calls().is_empty());
    assert_eq!(harness.metrics.samples_total(None), 1.0);
}

#[tokio::test]
async fn test_available_sample_metrics() {
    let catalog = MemoryCatalog::dense(1..=10, CID_Y_V1);
    let harness = Harness::new(catalog, StubVerifier::new(available_result(2_000_000_000)));
    harness
        .backend
        .set(peer_status(CID_Y_V1, &[("peerP", PinState::Pinned)]));

    let mut checkup = harness.checkup(one_sample(), ScriptedSource::default());
    checkup.run_once().await.unwrap();

    let peer = "/p2p/ipfs-peerP";
    assert_eq!(harness.metrics.samples_total(Some(peer)), 1.0);
    assert_eq!(harness.metrics.provider_records_total(peer, true), 1.0);
    assert_eq!(harness.metrics.bitswap_checks_total(peer, true, true), 1.0);
    assert_eq!(harness.metrics.bitswap_duration_seconds(peer, true, true), 2.0);
}

#[tokio::test]
async fn test_connection_error_records_no_duration() {
    let mut result = available_result(3_000_000_000);
    result.connection_error = Some("failed to dial".to_string());

    let catalog = MemoryCatalog::dense(1..=10, CID_X);
    let harness = Harness::new(catalog, StubVerifier::new(result));
    harness.backend.set(peer_status(CID_X, &[("peerA", PinState::Pinned)]));

    let settings = PipelineSettings {
        samples_per_run: 3,
        ..Default::default()
    };
    let stats = harness
        .checkup(settings, ScriptedSource::default())
        .run_once()
        .await
        .unwrap();

    let peer = "/p2p/ipfs-peerA";
    assert_eq!(stats.connection_errors, 3);
    assert_eq!(harness.metrics.connection_errors_total(peer), 3.0);
    assert_eq!(harness.metrics.bitswap_duration_seconds(peer, true, true), 0.0);
    assert_eq!(harness.metrics.bitswap_checks_total(peer, true, true), 0.0);
}

#[tokio::test]
async fn test_every_emitted_sample_counted_once() {
    let catalog = MemoryCatalog::dense(1..=20, CID_X);
    for id in 11..=20 {
        catalog.insert(id, CID_Y_V1);
    }

    let harness = Harness::new(catalog, StubVerifier::new(available_result(1)));
    harness.backend.set(peer_status(CID_X, &[("peerA", PinState::Pinned)]));
    harness
        .backend
        .set(peer_status(CID_Y_V1, &[("peerA", PinState::PinQueued)]));

    let settings = PipelineSettings {
        samples_per_run: 20,
        batch_size: 6,
        ..Default::default()
    };
    let ids = ScriptedSource::ints(1..=20);
    let stats = harness.checkup(settings, ids).run_once().await.unwrap();

    assert_eq!(stats.total, 20);
    assert_eq!(stats.unresolved, 10);
    assert_eq!(harness.metrics.samples_total(None), 10.0);
    assert_eq!(harness.metrics.samples_total(Some("/p2p/ipfs-peerA")), 10.0);

    let batch_sizes: Vec<usize> = harness.backend.bulk_calls().iter().map(|b| b.len()).collect();
    assert_eq!(batch_sizes, vec![6, 6, 6, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_slow_check_is_dropped() {
    let catalog = MemoryCatalog::dense(1..=10, CID_X);
    let harness = Harness::new(
        catalog,
        StubVerifier::new(available_result(1)).delayed_for(CID_X, Duration::from_secs(120)),
    );
    harness.backend.set(peer_status(CID_X, &[("peerA", PinState::Pinned)]));

    let settings = PipelineSettings {
        samples_per_run: 2,
        check_timeout: Duration::from_secs(30),
        ..Default::default()
    };
    let stats = harness
        .checkup(settings, ScriptedSource::default())
        .run_once()
        .await
        .unwrap();

    assert_eq!(stats.total, 0);
    assert_eq!(harness.verifier.calls().len(), 2);
    assert_eq!(harness.metrics.samples_total(Some("/p2p/ipfs-peerA")), 0.0);
}

#[tokio::test]
async fn test_peer_choice_is_uniform() {
    let backend = Arc::new(MemoryPinBackend::default());
    backend.set(peer_status(
        CID_X,
        &[
            ("peerA", PinState::Pinned),
            ("peerB", PinState::Pinned),
            ("peerC", PinState::Pinning),
            ("peerD", PinState::Pinned),
            ("peerE", PinState::Remote),
        ],
    ));

    let mut resolver = PeerResolver::new(backend, Box::new(seeded(42)), 100);
    let mut counts: HashMap<String, usize> = HashMap::new();

    for _ in 0..40 {
        let batch = (0..100).map(|_| Sample::parse(CID_X).unwrap()).collect();
        for sample in resolver.resolve_batch(batch).await.unwrap() {
            *counts
                .entry(sample.peer().unwrap().as_str().to_string())
                .or_default() += 1;
        }
    }

    assert_eq!(counts.len(), 4);
    assert!(!counts.contains_key("/p2p/ipfs-peerE"));
    for (peer, count) in counts {
        assert!((850..=1150).contains(&count), "{} chosen {} times", peer, count);
    }
}

#[tokio::test]
async fn test_secondary_provider_share() {
    let catalog = MemoryCatalog::dense(1..=10, CID_X);
    let harness = Harness::new(catalog, StubVerifier::new(available_result(1)));
    harness.backend.set(peer_status(CID_X, &[("peerA", PinState::Pinned)]));

    let provider = Arc::new(MemoryProvider::new("/dns4/elastic.example/tcp/443/wss/p2p/12D3elastic"));
    provider.insert(CID_X);

    let collaborators = Collaborators {
        secondary: Some(provider.clone() as Arc<dyn ContentProvider>),
        ..harness.collaborators()
    };
    let settings = PipelineSettings {
        samples_per_run: 2000,
        secondary_weight: 0.25,
        ..Default::default()
    };
    let mut checkup = Checkup::with_random(
        &collaborators,
        settings,
        harness.metrics.clone(),
        Box::new(ScriptedSource::default()),
        Box::new(seeded(3)),
    );

    let stats = checkup.run_once().await.unwrap();
    assert_eq!(stats.total, 2000);
    assert!((400..=600).contains(&provider.calls()), "{} provider calls", provider.calls());
    assert_eq!(
        harness
            .metrics
            .samples_total(Some("/dns4/elastic.example/tcp/443/wss/p2p/12D3elastic")),
        provider.calls() as f64
    );
}

#[tokio::test]
async fn test_periodic_run_publishes_report() {
    let catalog = MemoryCatalog::dense(1..=10, CID_X);
    let harness = Harness::new(catalog, StubVerifier::new(available_result(1)));
    harness.backend.set(peer_status(CID_X, &[("peerA", PinState::Pinned)]));

    let settings = PipelineSettings {
        samples_per_run: 10,
        ..Default::default()
    };
    let checkup = harness.checkup(settings, ScriptedSource::default());

    let mut sentinel = Sentinel::new(checkup, SentinelPolicy::periodic(60)).unwrap();
    let reports = sentinel.reports();
    assert!(matches!(reports.view().await, ReportView::Pending));

    let stats = sentinel.run_sweep().await.unwrap();
    assert_eq!(stats.total, 10);
    assert_eq!(stats.ok, 10);

    match reports.view().await {
        ReportView::Ready { report } => assert_eq!(report.total, 10),
        other => panic!("unexpected report view: {:?}", other),
    }

    // The sampler carries on where the previous run stopped
    sentinel.run_sweep().await.unwrap();
    assert_eq!(harness.verifier.calls().len(), 20);
}
