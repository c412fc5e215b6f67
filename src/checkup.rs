/*!
 * Orchestrator: wire the stages together and own the process lifecycle
 *
 * ```text
 * Sampler ─> PeerResolver ─> AvailabilityChecker ─> MetricsRecorder ─> reporter
 * ```
 *
 * [`Checkup`] is the pipeline; the Sentinel decides whether it runs as one
 * perpetual stream or as periodic finite runs. [`run_checkup`] acquires the
 * catalog and the scrape server first and releases both on every exit path.
 */

use crate::catalog::{Catalog, PgCatalog};
use crate::check::AvailabilityChecker;
use crate::cluster::{ClusterClient, PinBackend};
use crate::config::CheckupConfig;
use crate::elastic::{ContentProvider, ElasticProvider};
use crate::error::Result;
use crate::ipfs_check::{IpfsCheckClient, Verifier};
use crate::peer::{PeerResolver, DEFAULT_SECONDARY_WEIGHT, MAX_BATCH_SIZE};
use crate::random::{self, RandomSource};
use crate::record::MetricsRecorder;
use crate::report;
use crate::sampler::{Sampler, SamplerSettings};
use crate::server::{MetricsServer, ServerState};
use crate::types::Sample;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use orbit_observability::CheckupMetrics;
use orbit_sentinel::{RunMode, Sentinel, SentinelPolicy, Sweep, SweepStats, SweepStatsBuilder};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// External systems the pipeline talks to
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn Catalog>,
    pub pin_backend: Arc<dyn PinBackend>,
    pub verifier: Arc<dyn Verifier>,
    pub secondary: Option<Arc<dyn ContentProvider>>,
}

impl Collaborators {
    /// Connect to everything named in the configuration
    pub async fn connect(config: &CheckupConfig) -> Result<Self> {
        info!("Creating IPFS Cluster client...");
        let pin_backend = Arc::new(ClusterClient::new(&config.cluster_url, &config.cluster_token)?);

        info!("Creating IPFS Check client...");
        let verifier = Arc::new(IpfsCheckClient::new(&config.ipfs_check_url)?);

        // Last, so no earlier failure leaves an open pool behind
        info!("Connecting to PostgreSQL database...");
        let catalog: Arc<dyn Catalog> = Arc::new(PgCatalog::connect(&config.database_url).await?);

        let secondary: Option<Arc<dyn ContentProvider>> = match config.elastic_provider() {
            Some(elastic) => {
                info!("Creating elastic provider client for {}...", elastic.addr);
                match ElasticProvider::new(&elastic).await {
                    Ok(provider) => Some(Arc::new(provider)),
                    Err(e) => {
                        catalog.close().await;
                        return Err(e);
                    }
                }
            }
            None => None,
        };

        Ok(Self {
            catalog,
            pin_backend,
            verifier,
            secondary,
        })
    }
}

/// Pipeline tuning
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub sampler: SamplerSettings,
    pub batch_size: usize,
    pub secondary_weight: f64,
    pub check_timeout: Duration,
    pub check_concurrency: usize,
    pub samples_per_run: usize,
    pub seed: Option<u64>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            sampler: SamplerSettings::default(),
            batch_size: MAX_BATCH_SIZE,
            secondary_weight: DEFAULT_SECONDARY_WEIGHT,
            check_timeout: crate::check::DEFAULT_CHECK_TIMEOUT,
            check_concurrency: 1,
            samples_per_run: 100,
            seed: None,
        }
    }
}

impl From<&CheckupConfig> for PipelineSettings {
    fn from(config: &CheckupConfig) -> Self {
        Self {
            sampler: SamplerSettings::from(config),
            batch_size: config.effective_batch_size(),
            secondary_weight: config.secondary_provider_weight,
            check_timeout: config.check_timeout(),
            check_concurrency: config.check_concurrency,
            samples_per_run: config.samples_per_run,
            seed: config.seed,
        }
    }
}

/// The assembled pipeline
pub struct Checkup {
    sampler: Sampler,
    resolver: PeerResolver,
    checker: AvailabilityChecker,
    recorder: MetricsRecorder,
    samples_per_run: usize,
}

impl Checkup {
    pub fn new(
        collaborators: &Collaborators,
        settings: PipelineSettings,
        metrics: Arc<CheckupMetrics>,
    ) -> Self {
        let (sampler_rng, resolver_rng) = random_sources(settings.seed);
        Self::with_random(collaborators, settings, metrics, sampler_rng, resolver_rng)
    }

    /// Pipeline with explicit random sources for the sampler and resolver
    pub fn with_random(
        collaborators: &Collaborators,
        settings: PipelineSettings,
        metrics: Arc<CheckupMetrics>,
        sampler_rng: Box<dyn RandomSource>,
        resolver_rng: Box<dyn RandomSource>,
    ) -> Self {
        let sampler = Sampler::new(collaborators.catalog.clone(), sampler_rng, settings.sampler);

        let mut resolver = PeerResolver::new(
            collaborators.pin_backend.clone(),
            resolver_rng,
            settings.batch_size,
        );
        if let Some(provider) = &collaborators.secondary {
            resolver = resolver.with_secondary(provider.clone(), settings.secondary_weight);
        }

        let checker = AvailabilityChecker::new(collaborators.verifier.clone(), settings.check_timeout)
            .with_concurrency(settings.check_concurrency);

        Self {
            sampler,
            resolver,
            checker,
            recorder: MetricsRecorder::new(metrics),
            samples_per_run: settings.samples_per_run,
        }
    }

    /// Chain the stages; `limit` caps the number of samples drawn
    fn pipeline(&mut self, limit: Option<usize>) -> BoxStream<'_, Result<Sample>> {
        let samples = self.sampler.samples();
        let samples = match limit {
            Some(n) => samples.take(n).boxed(),
            None => samples.boxed(),
        };

        let resolved = self.resolver.resolve(samples);
        let checked = self.checker.check(resolved);
        self.recorder.tap(checked).boxed()
    }

    /// Consume the unbounded pipeline; returns only on a fatal error
    pub async fn run_forever(&mut self) -> Result<()> {
        let mut samples = self.pipeline(None);
        while let Some(sample) = samples.try_next().await? {
            report::log_result(&sample);
        }
        Ok(())
    }

    /// Draw `samples_per_run` samples and report on the ones that finish
    pub async fn run_once(&mut self) -> Result<SweepStats> {
        let mut stats = SweepStatsBuilder::new();
        let limit = self.samples_per_run;

        let mut samples = self.pipeline(Some(limit));
        while let Some(sample) = samples.try_next().await? {
            report::log_result(&sample);
            report::fold(&mut stats, &sample);
        }

        Ok(stats.finish())
    }
}

#[async_trait]
impl Sweep for Checkup {
    async fn sweep(&mut self) -> anyhow::Result<SweepStats> {
        Ok(self.run_once().await?)
    }

    async fn stream(&mut self) -> anyhow::Result<()> {
        Ok(self.run_forever().await?)
    }
}

/// Connect, serve metrics and run until a fatal error or ctrl-c
pub async fn start_checkup(config: CheckupConfig) -> anyhow::Result<()> {
    config.validate()?;

    let metrics = Arc::new(CheckupMetrics::new(&config.prom_namespace)?);
    let collaborators = Collaborators::connect(&config).await?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received interrupt, stopping checkup...");
    };

    run_checkup(&config, collaborators, metrics, shutdown).await
}

/// Run the pipeline under the configured run shape until it ends or
/// `shutdown` resolves
///
/// The scrape server is started before the first sample is drawn. On every
/// exit path the server is shut down and the catalog closed; failures while
/// closing are logged, never returned.
pub async fn run_checkup<F>(
    config: &CheckupConfig,
    collaborators: Collaborators,
    metrics: Arc<CheckupMetrics>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send,
{
    let policy: SentinelPolicy = config.sentinel_policy();
    let checkup = Checkup::new(&collaborators, PipelineSettings::from(config), metrics.clone());

    let sentinel = match Sentinel::new(checkup, policy.clone()) {
        Ok(sentinel) => sentinel,
        Err(e) => {
            collaborators.catalog.close().await;
            return Err(e);
        }
    };

    let reports = (policy.mode == RunMode::Periodic).then(|| sentinel.reports());
    let server = match MetricsServer::start(config.port, ServerState { metrics, reports }).await {
        Ok(server) => server,
        Err(e) => {
            collaborators.catalog.close().await;
            return Err(e.into());
        }
    };

    let outcome = tokio::select! {
        result = sentinel.run() => result,
        _ = shutdown => Ok(()),
    };

    if let Err(e) = &outcome {
        error!("❌ Checkup stopped: {:#}", e);
    }

    if let Err(e) = server.shutdown().await {
        warn!("Failed to close metrics server: {}", e);
    }

    info!("Closing DB connection...");
    collaborators.catalog.close().await;

    outcome
}

fn random_sources(seed: Option<u64>) -> (Box<dyn RandomSource>, Box<dyn RandomSource>) {
    match seed {
        Some(seed) => {
            info!("Using fixed random seed {}", seed);
            (
                Box::new(random::seeded(seed)),
                Box::new(random::seeded(seed.wrapping_add(1))),
            )
        }
        None => (Box::new(random::from_entropy()), Box::new(random::from_entropy())),
    }
}
