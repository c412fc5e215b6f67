/*!
 * ipfs-check backend client
 *
 * One `POST {endpoint}?cid=<cid>&multiaddr=<peer>` per check. The backend
 * dials the peer, looks up provider records in the DHT and asks the peer
 * for the root block over bitswap.
 */

use crate::error::{CheckupError, Result};
use crate::types::{CheckResult, PeerAddr};
use async_trait::async_trait;
use cid::Cid;
use std::time::Duration;

/// Verifies that a peer actually serves a CID
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn check(&self, cid: &Cid, peer: &PeerAddr) -> Result<CheckResult>;
}

pub struct IpfsCheckClient {
    http: reqwest::Client,
    endpoint: String,
}

impl IpfsCheckClient {
    /// The checker stage bounds each call, so no request timeout is set here
    pub fn new(endpoint: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                CheckupError::Config(format!("Failed to build ipfs-check client: {}", e))
            })?;

        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Verifier for IpfsCheckClient {
    async fn check(&self, cid: &Cid, peer: &PeerAddr) -> Result<CheckResult> {
        let failed = |reason: String| {
            CheckupError::Verification(format!("failed to check {} @ {}: {}", cid, peer, reason))
        };

        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("cid", cid.to_string()), ("multiaddr", peer.to_string())])
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(failed(format!("{}: {}", status, body.trim())));
        }

        response
            .json::<CheckResult>()
            .await
            .map_err(|e| failed(format!("unreadable response: {}", e)))
    }
}
