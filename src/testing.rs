//! In-memory collaborators for tests
//!
//! Every external system the pipeline talks to has a fake here that records
//! the calls it receives, so tests can assert on traffic as well as results.

use crate::catalog::Catalog;
use crate::cluster::{PeerPinInfo, PinBackend, PinState, PinStatus};
use crate::elastic::ContentProvider;
use crate::error::{CheckupError, Result};
use crate::ipfs_check::Verifier;
use crate::random::RandomSource;
use crate::types::{BitswapResult, CheckResult, PeerAddr};
use async_trait::async_trait;
use cid::Cid;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Catalog over an ordered map of `id -> source_cid`
#[derive(Default)]
pub struct MemoryCatalog {
    rows: Mutex<BTreeMap<i64, String>>,
    fetched_ids: Mutex<Vec<i64>>,
    blocks: Mutex<Vec<(i64, i64)>>,
    id_range_queries: AtomicUsize,
    estimate_queries: AtomicUsize,
    estimate: Mutex<Option<i64>>,
    closed: AtomicBool,
}

impl MemoryCatalog {
    /// Every id in `ids` maps to `cid`
    pub fn dense(ids: RangeInclusive<i64>, cid: &str) -> Self {
        let catalog = Self::default();
        {
            let mut rows = lock(&catalog.rows);
            for id in ids {
                rows.insert(id, cid.to_string());
            }
        }
        catalog
    }

    pub fn insert(&self, id: i64, cid: &str) {
        lock(&self.rows).insert(id, cid.to_string());
    }

    pub fn remove(&self, id: i64) {
        lock(&self.rows).remove(&id);
    }

    /// Planner estimate to report instead of the true row count
    pub fn set_estimate(&self, rows: i64) {
        *lock(&self.estimate) = Some(rows);
    }

    /// Ids passed to `fetch_by_id`, in call order
    pub fn fetched_ids(&self) -> Vec<i64> {
        lock(&self.fetched_ids).clone()
    }

    /// `(offset, limit)` of every `fetch_block` call
    pub fn blocks(&self) -> Vec<(i64, i64)> {
        lock(&self.blocks).clone()
    }

    pub fn id_range_queries(&self) -> usize {
        self.id_range_queries.load(Ordering::SeqCst)
    }

    pub fn estimate_queries(&self) -> usize {
        self.estimate_queries.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn id_range(&self) -> Result<Option<(i64, i64)>> {
        self.id_range_queries.fetch_add(1, Ordering::SeqCst);
        let rows = lock(&self.rows);
        let first = rows.keys().next().copied();
        let last = rows.keys().next_back().copied();
        Ok(first.zip(last))
    }

    async fn fetch_by_id(&self, id: i64) -> Result<Option<String>> {
        lock(&self.fetched_ids).push(id);
        Ok(lock(&self.rows).get(&id).cloned())
    }

    async fn estimate_rows(&self) -> Result<i64> {
        self.estimate_queries.fetch_add(1, Ordering::SeqCst);
        let rows = lock(&self.rows).len() as i64;
        Ok(lock(&self.estimate).unwrap_or(rows))
    }

    async fn fetch_block(&self, offset: i64, limit: i64) -> Result<Vec<String>> {
        lock(&self.blocks).push((offset, limit));
        Ok(lock(&self.rows)
            .values()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Random source that replays scripted values
///
/// Values are clamped into the requested range. Once a script runs dry the
/// source answers with the low bound, index 0 and `false`.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    ints: VecDeque<i64>,
    indexes: VecDeque<usize>,
    chances: VecDeque<bool>,
}

impl ScriptedSource {
    pub fn ints(values: impl IntoIterator<Item = i64>) -> Self {
        Self::default().with_ints(values)
    }

    pub fn with_ints(mut self, values: impl IntoIterator<Item = i64>) -> Self {
        self.ints.extend(values);
        self
    }

    pub fn with_indexes(mut self, values: impl IntoIterator<Item = usize>) -> Self {
        self.indexes.extend(values);
        self
    }

    pub fn with_chances(mut self, values: impl IntoIterator<Item = bool>) -> Self {
        self.chances.extend(values);
        self
    }
}

impl RandomSource for ScriptedSource {
    fn int_inclusive(&mut self, lo: i64, hi: i64) -> i64 {
        match self.ints.pop_front() {
            Some(value) => value.clamp(lo, hi.max(lo)),
            None => lo,
        }
    }

    fn index(&mut self, len: usize) -> usize {
        let value = self.indexes.pop_front().unwrap_or(0);
        value.min(len.saturating_sub(1))
    }

    fn chance(&mut self, _p: f64) -> bool {
        self.chances.pop_front().unwrap_or(false)
    }
}

/// Pin backend answering from a fixed table of statuses
#[derive(Default)]
pub struct MemoryPinBackend {
    statuses: Mutex<HashMap<String, PinStatus>>,
    failure: Option<String>,
    bulk_calls: Mutex<Vec<Vec<String>>>,
    single_calls: Mutex<Vec<String>>,
}

impl MemoryPinBackend {
    /// Backend whose every request fails with `message`
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn set(&self, status: PinStatus) {
        lock(&self.statuses).insert(status.cid.clone(), status);
    }

    /// CID lists of every bulk query
    pub fn bulk_calls(&self) -> Vec<Vec<String>> {
        lock(&self.bulk_calls).clone()
    }

    /// CIDs of every single-CID query
    pub fn single_calls(&self) -> Vec<String> {
        lock(&self.single_calls).clone()
    }

    fn check_failure(&self) -> Result<()> {
        match &self.failure {
            Some(message) => Err(CheckupError::PinBackend(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PinBackend for MemoryPinBackend {
    async fn status_all(&self, cids: &[String]) -> Result<Vec<PinStatus>> {
        lock(&self.bulk_calls).push(cids.to_vec());
        self.check_failure()?;

        let statuses = lock(&self.statuses);
        Ok(cids
            .iter()
            .filter_map(|cid| statuses.get(cid).cloned())
            .collect())
    }

    async fn status(&self, cid: &str) -> Result<PinStatus> {
        lock(&self.single_calls).push(cid.to_string());
        self.check_failure()?;

        Ok(lock(&self.statuses)
            .get(cid)
            .cloned()
            .unwrap_or_else(|| PinStatus::empty(cid)))
    }
}

/// Cluster status for `cid` with one peer per `(name, state)`
///
/// Peer `name` is keyed as `cluster-<name>` and runs IPFS daemon `ipfs-<name>`.
pub fn peer_status(cid: &str, peers: &[(&str, PinState)]) -> PinStatus {
    let peer_map = peers
        .iter()
        .map(|(name, state)| {
            (
                format!("cluster-{}", name),
                PeerPinInfo {
                    peername: name.to_string(),
                    ipfs_peer_id: format!("ipfs-{}", name),
                    status: *state,
                    error: String::new(),
                },
            )
        })
        .collect();

    PinStatus {
        cid: cid.to_string(),
        peer_map,
    }
}

/// Secondary provider holding a fixed set of CIDs
pub struct MemoryProvider {
    addr: PeerAddr,
    cids: Mutex<HashSet<String>>,
    failing: bool,
    calls: AtomicUsize,
}

impl MemoryProvider {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: PeerAddr::new(addr),
            cids: Mutex::new(HashSet::new()),
            failing: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Provider whose every lookup fails
    pub fn failing(addr: &str) -> Self {
        Self {
            failing: true,
            ..Self::new(addr)
        }
    }

    pub fn insert(&self, cid: &str) {
        lock(&self.cids).insert(cid.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentProvider for MemoryProvider {
    fn multiaddr(&self) -> &PeerAddr {
        &self.addr
    }

    async fn has(&self, cid: &Cid) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(CheckupError::Storage("bucket unreachable".to_string()));
        }
        Ok(lock(&self.cids).contains(&cid.to_string()))
    }
}

/// Verifier returning one canned result
pub struct StubVerifier {
    result: CheckResult,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<(String, String)>>,
}

impl StubVerifier {
    pub fn new(result: CheckResult) -> Self {
        Self {
            result,
            failing: HashSet::new(),
            delays: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Checks of `cid` fail
    pub fn failing_for(mut self, cid: &str) -> Self {
        self.failing.insert(cid.to_string());
        self
    }

    /// Checks of `cid` sleep for `delay` before answering
    pub fn delayed_for(mut self, cid: &str, delay: Duration) -> Self {
        self.delays.insert(cid.to_string(), delay);
        self
    }

    /// `(cid, multiaddr)` of every check, in call order
    pub fn calls(&self) -> Vec<(String, String)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl Verifier for StubVerifier {
    async fn check(&self, cid: &Cid, peer: &PeerAddr) -> Result<CheckResult> {
        let cid = cid.to_string();
        lock(&self.calls).push((cid.clone(), peer.as_str().to_string()));

        if let Some(delay) = self.delays.get(&cid) {
            tokio::time::sleep(*delay).await;
        }

        if self.failing.contains(&cid) {
            return Err(CheckupError::Verification(format!(
                "500 Internal Server Error: could not check {}",
                cid
            )));
        }

        Ok(self.result.clone())
    }
}

/// A check where every step passed, taking `duration_nanos` over bitswap
pub fn available_result(duration_nanos: u64) -> CheckResult {
    CheckResult {
        connection_error: None,
        peer_found_in_dht: None,
        cid_in_dht: true,
        data_available_over_bitswap: BitswapResult {
            duration_nanos,
            found: true,
            responded: true,
            error: None,
        },
    }
}
