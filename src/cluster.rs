/*!
 * IPFS Cluster pin backend
 *
 * The resolver only needs two calls from the cluster REST API:
 *
 * - `GET /pins?cids=a,b,c` - status of a batch of CIDs
 * - `GET /pins/{cid}`      - status of one CID
 *
 * Depending on the cluster version the body is a JSON array, a single
 * object, or newline-delimited objects. All three are accepted.
 */

use crate::error::{CheckupError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// A peer's state for one pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PinState {
    Pinned,
    Pinning,
    PinQueued,
    Unpinned,
    Unpinning,
    UnpinQueued,
    /// Allocated to other peers; this peer does not hold it
    Remote,
    PinError,
    UnpinError,
    ClusterError,
    Undefined,
    Sharded,
    /// Any status this client does not know
    Other,
}

impl PinState {
    pub fn as_str(self) -> &'static str {
        match self {
            PinState::Pinned => "pinned",
            PinState::Pinning => "pinning",
            PinState::PinQueued => "pin_queued",
            PinState::Unpinned => "unpinned",
            PinState::Unpinning => "unpinning",
            PinState::UnpinQueued => "unpin_queued",
            PinState::Remote => "remote",
            PinState::PinError => "pin_error",
            PinState::UnpinError => "unpin_error",
            PinState::ClusterError => "cluster_error",
            PinState::Undefined => "undefined",
            PinState::Sharded => "sharded",
            PinState::Other => "other",
        }
    }
}

impl From<String> for PinState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pinned" => PinState::Pinned,
            "pinning" => PinState::Pinning,
            "pin_queued" => PinState::PinQueued,
            "unpinned" => PinState::Unpinned,
            "unpinning" => PinState::Unpinning,
            "unpin_queued" => PinState::UnpinQueued,
            "remote" => PinState::Remote,
            "pin_error" => PinState::PinError,
            "unpin_error" => PinState::UnpinError,
            "cluster_error" => PinState::ClusterError,
            "undefined" => PinState::Undefined,
            "sharded" => PinState::Sharded,
            _ => PinState::Other,
        }
    }
}

impl From<PinState> for String {
    fn from(state: PinState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for PinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cluster peer's view of a pin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerPinInfo {
    #[serde(default)]
    pub peername: String,

    /// libp2p ID of the IPFS daemon behind the cluster peer
    #[serde(default)]
    pub ipfs_peer_id: String,

    pub status: PinState,

    #[serde(default)]
    pub error: String,
}

/// Cluster-wide status of one CID, keyed by cluster peer ID
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PinStatus {
    #[serde(deserialize_with = "cid_or_link")]
    pub cid: String,

    #[serde(default)]
    pub peer_map: BTreeMap<String, PeerPinInfo>,
}

impl PinStatus {
    /// Status with no peers, used for CIDs the cluster did not report
    pub fn empty(cid: impl Into<String>) -> Self {
        Self {
            cid: cid.into(),
            peer_map: BTreeMap::new(),
        }
    }
}

/// Status queries the resolver makes against the pin backend
#[async_trait]
pub trait PinBackend: Send + Sync {
    /// Statuses for a batch of CIDs, in whatever order the backend returns them
    async fn status_all(&self, cids: &[String]) -> Result<Vec<PinStatus>>;

    /// Status for a single CID
    async fn status(&self, cid: &str) -> Result<PinStatus>;
}

/// REST client for an IPFS Cluster
pub struct ClusterClient {
    http: reqwest::Client,
    base_url: String,
}

impl ClusterClient {
    /// Client authenticating with `Authorization: Basic <token>`
    pub fn new(base_url: &str, basic_auth_token: &str) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Basic {}", basic_auth_token))
            .map_err(|e| CheckupError::Config(format!("Invalid cluster auth token: {}", e)))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| CheckupError::Config(format!("Failed to build cluster client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, url: String, query: &[(&str, String)]) -> Result<String> {
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| CheckupError::PinBackend(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CheckupError::PinBackend(format!("GET {} body: {}", url, e)))?;

        if !status.is_success() {
            return Err(CheckupError::PinBackend(format!(
                "GET {} returned {}: {}",
                url,
                status,
                body.trim()
            )));
        }

        Ok(body)
    }
}

#[async_trait]
impl PinBackend for ClusterClient {
    async fn status_all(&self, cids: &[String]) -> Result<Vec<PinStatus>> {
        if cids.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Cluster status for {} CIDs", cids.len());
        let body = self
            .get(format!("{}/pins", self.base_url), &[("cids", cids.join(","))])
            .await?;

        parse_statuses(&body)
    }

    async fn status(&self, cid: &str) -> Result<PinStatus> {
        let body = self
            .get(format!("{}/pins/{}", self.base_url, cid), &[])
            .await?;

        parse_statuses(&body)?
            .into_iter()
            .next()
            .ok_or_else(|| CheckupError::PinBackend(format!("empty status response for {}", cid)))
    }
}

/// Accept an array, a single object, or newline-delimited objects
pub fn parse_statuses(body: &str) -> Result<Vec<PinStatus>> {
    let body = body.trim();
    if body.starts_with('[') {
        return serde_json::from_str(body)
            .map_err(|e| CheckupError::PinBackend(format!("unreadable status body: {}", e)));
    }

    serde_json::Deserializer::from_str(body)
        .into_iter::<PinStatus>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| CheckupError::PinBackend(format!("unreadable status body: {}", e)))
}

fn cid_or_link<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum CidField {
        Plain(String),
        Link {
            #[serde(rename = "/")]
            link: String,
        },
    }

    Ok(match CidField::deserialize(deserializer)? {
        CidField::Plain(cid) => cid,
        CidField::Link { link } => link,
    })
}
