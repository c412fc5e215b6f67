/*!
 * Sampler: an endless stream of random catalog entries
 *
 * Three strategies approximate a uniform draw over the `upload` table:
 *
 * - `random-id`: uniform key in the cached `[MIN(id), MAX(id)]` range, fetched
 *   by key. Sparse keys miss and are simply redrawn.
 * - `offset`: uniform offset below the planner's row estimate.
 * - `block`: uniform offset, then a small contiguous block of rows, each
 *   yielded before the next draw.
 *
 * Catalog bounds are cached for a TTL and re-queried once stale, or early
 * after a run of consecutive misses. An empty catalog sleeps a backoff
 * interval instead of spinning. An offset past the real end of the table
 * (an overshooting estimate) is a miss and lowers the offset ceiling.
 */

use crate::catalog::Catalog;
use crate::config::{CheckupConfig, SampleMethod};
use crate::error::Result;
use crate::random::RandomSource;
use crate::types::Sample;
use futures::stream::{self, Stream};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Misses in a row before the cached bounds are distrusted and re-queried
pub const MAX_CONSECUTIVE_MISSES: usize = 64;

/// Sampler tuning
#[derive(Debug, Clone)]
pub struct SamplerSettings {
    pub method: SampleMethod,
    pub block_size: usize,
    pub cache_ttl: Duration,
    pub empty_backoff: Duration,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            method: SampleMethod::RandomId,
            block_size: 10,
            cache_ttl: Duration::from_secs(60),
            empty_backoff: Duration::from_secs(10),
        }
    }
}

impl From<&CheckupConfig> for SamplerSettings {
    fn from(config: &CheckupConfig) -> Self {
        Self {
            method: config.sample_method,
            block_size: config.block_size.max(1),
            cache_ttl: config.id_range_ttl(),
            empty_backoff: config.empty_backoff(),
        }
    }
}

/// A value trusted for `ttl` after it was fetched
#[derive(Debug)]
pub struct TtlCache<T> {
    ttl: Duration,
    entry: Option<(T, Instant)>,
}

impl<T: Copy> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    /// The cached value, unless older than the TTL
    pub fn get(&self) -> Option<T> {
        match &self.entry {
            Some((value, fetched_at)) if fetched_at.elapsed() <= self.ttl => Some(*value),
            _ => None,
        }
    }

    pub fn set(&mut self, value: T) {
        self.entry = Some((value, Instant::now()));
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    /// When the current value was fetched
    pub fn fetched_at(&self) -> Option<Instant> {
        self.entry.as_ref().map(|(_, at)| *at)
    }
}

/// Cached `(min, max)` primary-key bounds
pub type IdRangeCache = TtlCache<(i64, i64)>;

pub struct Sampler {
    catalog: Arc<dyn Catalog>,
    rng: Box<dyn RandomSource>,
    settings: SamplerSettings,
    id_range: IdRangeCache,
    estimate: TtlCache<i64>,
    /// Row count ceiling learned from empty or short block fetches
    observed_rows: TtlCache<i64>,
    misses: usize,
    pending: VecDeque<Sample>,
}

impl Sampler {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        rng: Box<dyn RandomSource>,
        settings: SamplerSettings,
    ) -> Self {
        Self {
            id_range: TtlCache::new(settings.cache_ttl),
            estimate: TtlCache::new(settings.cache_ttl),
            observed_rows: TtlCache::new(settings.cache_ttl),
            misses: 0,
            pending: VecDeque::new(),
            catalog,
            rng,
            settings,
        }
    }

    /// Unbounded sample stream; ends only on a catalog error
    pub fn samples(&mut self) -> impl Stream<Item = Result<Sample>> + Send + '_ {
        stream::try_unfold(self, |sampler| async move {
            let sample = sampler.next_sample().await?;
            Ok(Some((sample, sampler)))
        })
    }

    /// Draw until the catalog yields a valid sample
    pub async fn next_sample(&mut self) -> Result<Sample> {
        loop {
            if let Some(sample) = self.pending.pop_front() {
                return Ok(sample);
            }

            let drawn = match self.settings.method {
                SampleMethod::RandomId => self.draw_by_id().await?,
                SampleMethod::Offset => self.draw_at_offset(1).await?,
                SampleMethod::Block => self.draw_at_offset(self.settings.block_size).await?,
            };

            match drawn {
                Draw::Rows(rows) => {
                    self.misses = 0;
                    self.pending.extend(rows.iter().filter_map(|s| parse_row(s)));
                }
                Draw::Miss => {
                    self.misses += 1;
                    if self.misses >= MAX_CONSECUTIVE_MISSES {
                        debug!("{} misses in a row, re-querying catalog bounds", self.misses);
                        self.misses = 0;
                        self.id_range.invalidate();
                        self.estimate.invalidate();
                    }
                }
                Draw::Empty => {
                    self.misses = 0;
                    debug!(
                        "Catalog is empty, backing off for {:?}",
                        self.settings.empty_backoff
                    );
                    tokio::time::sleep(self.settings.empty_backoff).await;
                }
            }
        }
    }

    /// Cached id range, re-queried once stale
    pub async fn id_range(&mut self) -> Result<Option<(i64, i64)>> {
        if let Some(range) = self.id_range.get() {
            return Ok(Some(range));
        }

        let range = self.catalog.id_range().await?;
        match range {
            Some((min, max)) => {
                debug!("Refreshed catalog id range: [{}, {}]", min, max);
                self.id_range.set((min, max));
            }
            None => self.id_range.invalidate(),
        }
        Ok(range)
    }

    async fn estimate(&mut self) -> Result<i64> {
        if let Some(estimate) = self.estimate.get() {
            return Ok(estimate);
        }

        let estimate = self.catalog.estimate_rows().await?;
        debug!("Refreshed catalog row estimate: {}", estimate);
        self.estimate.set(estimate);
        Ok(estimate)
    }

    async fn draw_by_id(&mut self) -> Result<Draw> {
        let Some((min, max)) = self.id_range().await? else {
            return Ok(Draw::Empty);
        };

        let id = self.rng.int_inclusive(min, max);
        match self.catalog.fetch_by_id(id).await? {
            Some(row) => Ok(Draw::Rows(vec![row])),
            None => {
                debug!("No upload at id {}, redrawing", id);
                Ok(Draw::Miss)
            }
        }
    }

    async fn draw_at_offset(&mut self, block_size: usize) -> Result<Draw> {
        let estimate = self.estimate().await?;
        if estimate <= 0 {
            self.estimate.invalidate();
            return Ok(Draw::Empty);
        }

        let rows_upper = match self.observed_rows.get() {
            Some(observed) => estimate.min(observed),
            None => estimate,
        };

        let block = block_size as i64;
        let max_offset = (rows_upper - block).max(0);
        let offset = self.rng.int_inclusive(0, max_offset);

        let rows = self.catalog.fetch_block(offset, block).await?;
        if rows.is_empty() {
            if offset == 0 {
                // Stale estimate over a table that is now empty
                self.estimate.invalidate();
                self.observed_rows.invalidate();
                return Ok(Draw::Empty);
            }
            debug!(
                "No uploads at offset {} (estimate {}), redrawing below it",
                offset, estimate
            );
            self.observed_rows.set(offset);
            return Ok(Draw::Miss);
        }

        let fetched = rows.len() as i64;
        if fetched < block {
            self.observed_rows.set(offset + fetched);
        }

        Ok(Draw::Rows(rows))
    }
}

enum Draw {
    Rows(Vec<String>),
    Miss,
    Empty,
}

fn parse_row(source_cid: &str) -> Option<Sample> {
    match Sample::parse(source_cid) {
        Ok(sample) => Some(sample),
        Err(e) => {
            warn!("Skipping catalog row: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::seeded;
    use crate::testing::{MemoryCatalog, ScriptedSource};
    use futures::StreamExt;

    const CID_X: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";
    const CID_Z: &str = "bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi";

    fn sampler(catalog: Arc<MemoryCatalog>, rng: Box<dyn RandomSource>) -> Sampler {
        Sampler::new(catalog, rng, SamplerSettings::default())
    }

    #[tokio::test]
    async fn test_first_draw_fetches_by_id() {
        let catalog = Arc::new(MemoryCatalog::dense(1..=1000, CID_Z));
        catalog.insert(500, CID_X);

        let mut sampler = sampler(catalog.clone(), Box::new(ScriptedSource::ints([500])));
        let sample = sampler.next_sample().await.unwrap();

        assert_eq!(sample.cid.to_string(), CID_X);
        assert_eq!(catalog.fetched_ids(), vec![500]);
    }

    #[tokio::test]
    async fn test_miss_redraws() {
        let catalog = Arc::new(MemoryCatalog::default());
        catalog.insert(1, CID_Z);
        catalog.insert(10, CID_X);

        let mut sampler = sampler(catalog.clone(), Box::new(ScriptedSource::ints([5, 7, 10])));
        let sample = sampler.next_sample().await.unwrap();

        assert_eq!(sample.cid.to_string(), CID_X);
        assert_eq!(catalog.fetched_ids(), vec![5, 7, 10]);
    }

    #[tokio::test]
    async fn test_invalid_rows_skipped() {
        let catalog = Arc::new(MemoryCatalog::default());
        catalog.insert(1, "definitely not a cid");
        catalog.insert(2, CID_X);

        let mut sampler = sampler(catalog, Box::new(ScriptedSource::ints([1, 2])));
        let sample = sampler.next_sample().await.unwrap();
        assert_eq!(sample.cid.to_string(), CID_X);
    }

    #[tokio::test]
    async fn test_draws_stay_within_range() {
        let catalog = Arc::new(MemoryCatalog::dense(250..=750, CID_X));
        let mut sampler = sampler(catalog.clone(), Box::new(seeded(11)));

        let samples: Vec<_> = sampler.samples().take(500).collect().await;
        assert!(samples.iter().all(|s| s.is_ok()));

        let ids = catalog.fetched_ids();
        assert_eq!(ids.len(), 500);
        assert!(ids.iter().all(|id| (250..=750).contains(id)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_range_refreshed() {
        let catalog = Arc::new(MemoryCatalog::dense(1..=10, CID_X));
        let rng = ScriptedSource::ints([3, 4, 20, 20]);
        let mut sampler = sampler(catalog.clone(), Box::new(rng));

        sampler.next_sample().await.unwrap();
        sampler.next_sample().await.unwrap();
        assert_eq!(catalog.id_range_queries(), 1);

        // Still fresh: a draw of 20 is clamped to the cached max
        catalog.insert(20, CID_Z);
        tokio::time::advance(Duration::from_secs(30)).await;
        let sample = sampler.next_sample().await.unwrap();
        assert_eq!(sample.cid.to_string(), CID_X);
        assert_eq!(catalog.id_range_queries(), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        let sample = sampler.next_sample().await.unwrap();
        assert_eq!(sample.cid.to_string(), CID_Z);
        assert_eq!(catalog.id_range_queries(), 2);
        assert_eq!(catalog.fetched_ids(), vec![3, 4, 10, 20]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_emptied_catalog_stops_redrawing() {
        let catalog = Arc::new(MemoryCatalog::dense(1..=10, CID_X));
        let mut sampler = sampler(catalog.clone(), Box::new(seeded(5)));
        sampler.next_sample().await.unwrap();

        for id in 1..=10 {
            catalog.remove(id);
        }

        let result =
            tokio::time::timeout(Duration::from_secs(5), sampler.next_sample()).await;
        assert!(result.is_err());

        // Bounds re-queried after the miss run, then backoff instead of spinning
        assert_eq!(catalog.id_range_queries(), 2);
        assert_eq!(catalog.fetched_ids().len(), 1 + MAX_CONSECUTIVE_MISSES);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_catalog_backs_off() {
        let catalog = Arc::new(MemoryCatalog::default());
        let mut sampler = sampler(catalog.clone(), Box::new(seeded(1)));

        let started = Instant::now();
        let result =
            tokio::time::timeout(Duration::from_secs(35), sampler.next_sample()).await;
        assert!(result.is_err());

        // One query per 10s backoff, not a busy loop
        assert_eq!(catalog.id_range_queries(), 4);
        assert!(started.elapsed() >= Duration::from_secs(35));
    }

    #[tokio::test]
    async fn test_block_yields_whole_block() {
        let catalog = Arc::new(MemoryCatalog::dense(1..=100, CID_Z));
        catalog.insert(4, CID_X);

        let settings = SamplerSettings {
            method: SampleMethod::Block,
            block_size: 5,
            ..Default::default()
        };
        let mut sampler = Sampler::new(
            catalog.clone(),
            Box::new(ScriptedSource::ints([2, 50])),
            settings,
        );

        let samples: Vec<_> = sampler.samples().take(6).collect().await;
        let cids: Vec<String> = samples
            .into_iter()
            .map(|s| s.unwrap().cid.to_string())
            .collect();

        // Offset 2 covers ids 3..=7
        assert_eq!(cids[1], CID_X);
        assert_eq!(catalog.blocks(), vec![(2, 5), (50, 5)]);
    }

    #[tokio::test]
    async fn test_offset_uses_estimate() {
        let catalog = Arc::new(MemoryCatalog::dense(1..=100, CID_Z));
        catalog.insert(43, CID_X);

        let settings = SamplerSettings {
            method: SampleMethod::Offset,
            ..Default::default()
        };
        let mut sampler = Sampler::new(catalog.clone(), Box::new(ScriptedSource::ints([42])), settings);

        let sample = sampler.next_sample().await.unwrap();
        assert_eq!(sample.cid.to_string(), CID_X);
        assert_eq!(catalog.estimate_queries(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overshooting_estimate_redraws_below_miss() {
        let catalog = Arc::new(MemoryCatalog::dense(1..=100, CID_Z));
        catalog.insert(43, CID_X);
        catalog.set_estimate(200);

        let settings = SamplerSettings {
            method: SampleMethod::Offset,
            ..Default::default()
        };
        let rng = ScriptedSource::ints([150, 120, 42]);
        let mut sampler = Sampler::new(catalog.clone(), Box::new(rng), settings);

        let started = Instant::now();
        let sample = sampler.next_sample().await.unwrap();

        assert_eq!(sample.cid.to_string(), CID_X);
        assert_eq!(catalog.blocks(), vec![(150, 1), (120, 1), (42, 1)]);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overshooting_estimate_never_backs_off() {
        let catalog = Arc::new(MemoryCatalog::dense(1..=100, CID_Z));
        catalog.set_estimate(200);

        let settings = SamplerSettings {
            method: SampleMethod::Offset,
            ..Default::default()
        };
        let mut sampler = Sampler::new(catalog.clone(), Box::new(seeded(8)), settings);

        let started = Instant::now();
        let samples: Vec<_> = sampler.samples().take(20).collect().await;

        assert!(samples.iter().all(|s| s.is_ok()));
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(catalog.blocks().iter().all(|(offset, _)| *offset < 200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_cache() {
        let mut cache: TtlCache<i64> = TtlCache::new(Duration::from_secs(60));
        assert_eq!(cache.get(), None);

        cache.set(1000);
        assert_eq!(cache.get(), Some(1000));
        assert!(cache.fetched_at().is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get(), None);

        cache.set(2000);
        cache.invalidate();
        assert_eq!(cache.get(), None);
    }
}
