/*!
 * PeerResolver: find a peer believed to hold each sample
 *
 * Samples are batched and resolved with one bulk status query per batch.
 * For each CID:
 *
 * 1. If no peer reports anything but `unpinned` (or `remote`), retry once
 *    with the other CID version. Still nothing: emit unresolved.
 * 2. Drop peers that are `remote` or `pin_queued`.
 * 3. Pick one of the remaining peers uniformly at random.
 *
 * A configurable share of samples is routed to the secondary content
 * provider instead, skipping the bulk query.
 */

use crate::cluster::{PinBackend, PinState, PinStatus};
use crate::elastic::ContentProvider;
use crate::error::Result;
use crate::random::RandomSource;
use crate::types::{PeerAddr, Sample};
use cid::{Cid, Version};
use futures::stream::{self, Stream, TryStreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cluster rejects longer `?cids=` query strings (8k header buffer)
pub const MAX_BATCH_SIZE: usize = 120;

/// Default share of samples sent to the secondary provider
pub const DEFAULT_SECONDARY_WEIGHT: f64 = 0.25;

/// Multicodec code for dag-pb
const DAG_PB: u64 = 0x70;

enum Route {
    PinBackend,
    Secondary,
}

pub struct PeerResolver {
    backend: Arc<dyn PinBackend>,
    secondary: Option<Arc<dyn ContentProvider>>,
    secondary_weight: f64,
    rng: Box<dyn RandomSource>,
    batch_size: usize,
}

impl PeerResolver {
    /// Resolver that only consults the pin backend
    ///
    /// `batch_size` is capped at [`MAX_BATCH_SIZE`]; zero selects the cap.
    pub fn new(backend: Arc<dyn PinBackend>, rng: Box<dyn RandomSource>, batch_size: usize) -> Self {
        let batch_size = match batch_size {
            0 => MAX_BATCH_SIZE,
            n => n.min(MAX_BATCH_SIZE),
        };

        Self {
            backend,
            secondary: None,
            secondary_weight: DEFAULT_SECONDARY_WEIGHT,
            rng,
            batch_size,
        }
    }

    /// Route `weight` of all samples to `provider`
    pub fn with_secondary(mut self, provider: Arc<dyn ContentProvider>, weight: f64) -> Self {
        self.secondary = Some(provider);
        self.secondary_weight = weight.clamp(0.0, 1.0);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Resolve a sample stream batch by batch, preserving order
    pub fn resolve<'a, S>(&'a mut self, source: S) -> impl Stream<Item = Result<Sample>> + Send + 'a
    where
        S: Stream<Item = Result<Sample>> + Send + 'a,
    {
        let batches = Box::pin(source.try_chunks(self.batch_size).map_err(|e| e.1));

        stream::try_unfold(
            (self, batches, VecDeque::new()),
            |(resolver, mut batches, mut ready)| async move {
                loop {
                    if let Some(sample) = ready.pop_front() {
                        return Ok(Some((sample, (resolver, batches, ready))));
                    }

                    match batches.try_next().await? {
                        Some(batch) => ready.extend(resolver.resolve_batch(batch).await?),
                        None => return Ok(None),
                    }
                }
            },
        )
    }

    /// Resolve one batch; output has the same length and order as the input
    pub async fn resolve_batch(&mut self, batch: Vec<Sample>) -> Result<Vec<Sample>> {
        let routes: Vec<Route> = batch
            .iter()
            .map(|_| match &self.secondary {
                Some(_) if self.rng.chance(self.secondary_weight) => Route::Secondary,
                _ => Route::PinBackend,
            })
            .collect();

        let cids: Vec<String> = batch
            .iter()
            .zip(&routes)
            .filter(|(_, route)| matches!(route, Route::PinBackend))
            .map(|(sample, _)| sample.cid.to_string())
            .collect();

        let statuses = if cids.is_empty() {
            HashMap::new()
        } else {
            debug!("Retrieving cluster pin statuses for {} CIDs", cids.len());
            index_statuses(self.backend.status_all(&cids).await?)
        };

        let mut resolved = Vec::with_capacity(batch.len());
        for (sample, route) in batch.into_iter().zip(routes) {
            let sample = match route {
                Route::Secondary => self.resolve_secondary(sample).await,
                Route::PinBackend => {
                    let status = statuses
                        .get(&sample.cid)
                        .cloned()
                        .unwrap_or_else(|| PinStatus::empty(sample.cid.to_string()));
                    self.resolve_status(sample, status).await?
                }
            };
            resolved.push(sample);
        }

        Ok(resolved)
    }

    async fn resolve_status(&mut self, sample: Sample, status: PinStatus) -> Result<Sample> {
        let (cid, status) = if all_unpinned(&status) {
            warn!("⚠️ {} is not pinned on ANY peer!", sample.cid);

            let Some(other) = to_other_version(&sample.cid) else {
                debug!("{} has no other CID version", sample.cid);
                return Ok(sample);
            };

            info!("Trying other CID version: {}", other);
            let other_status = self.backend.status(&other.to_string()).await?;
            if all_unpinned(&other_status) {
                warn!("⚠️ {} is not pinned on ANY peer!", other);
                return Ok(sample);
            }

            (other, other_status)
        } else {
            (sample.cid, status)
        };

        let eligible: Vec<(PeerAddr, PinState)> = status
            .peer_map
            .values()
            .filter(|info| is_eligible(info.status) && !info.ipfs_peer_id.is_empty())
            .map(|info| (PeerAddr::from_peer_id(&info.ipfs_peer_id), info.status))
            .collect();

        if eligible.is_empty() {
            let states: Vec<&str> = status.peer_map.values().map(|i| i.status.as_str()).collect();
            warn!("⚠️ {} no eligible pin statuses: {:?}", cid, states);
            return Ok(Sample::new(cid));
        }

        let pick = self.rng.index(eligible.len()).min(eligible.len() - 1);
        let (peer, state) = eligible[pick].clone();
        debug!("Sample ready: {} @ {} ({})", cid, peer, state);

        Ok(Sample::new(cid).resolved(peer))
    }

    async fn resolve_secondary(&mut self, sample: Sample) -> Sample {
        let Some(provider) = self.secondary.clone() else {
            return sample;
        };

        match provider.has(&sample.cid).await {
            Ok(true) => {
                debug!("Sample ready: {} @ {} (elastic)", sample.cid, provider.multiaddr());
                let peer = provider.multiaddr().clone();
                sample.resolved(peer)
            }
            Ok(false) => {
                warn!("⚠️ {} not found in elastic provider", sample.cid);
                sample
            }
            Err(e) => {
                warn!("Elastic provider check failed for {}: {}", sample.cid, e);
                sample
            }
        }
    }
}

/// Peers that may be asked for the content
pub fn is_eligible(state: PinState) -> bool {
    !matches!(state, PinState::Remote | PinState::PinQueued)
}

/// No peer holds or is fetching the content
///
/// `remote` entries are peers the pin is not allocated to, so they do not
/// count as holders. An empty map is all-unpinned.
pub fn all_unpinned(status: &PinStatus) -> bool {
    status
        .peer_map
        .values()
        .all(|info| matches!(info.status, PinState::Unpinned | PinState::Remote))
}

/// The same content under the other CID version
///
/// v0 always converts to v1. v1 converts to v0 only for dag-pb content
/// hashed with sha2-256.
pub fn to_other_version(cid: &Cid) -> Option<Cid> {
    match cid.version() {
        Version::V0 => cid.into_v1().ok(),
        Version::V1 if cid.codec() == DAG_PB => Cid::new_v0(*cid.hash()).ok(),
        Version::V1 => None,
    }
}

fn index_statuses(statuses: Vec<PinStatus>) -> HashMap<Cid, PinStatus> {
    statuses
        .into_iter()
        .filter_map(|status| match Cid::try_from(status.cid.as_str()) {
            Ok(cid) => Some((cid, status)),
            Err(e) => {
                warn!("Ignoring status for unparseable CID {}: {}", status.cid, e);
                None
            }
        })
        .collect()
}
