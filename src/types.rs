/*!
 * Pipeline data model
 *
 * A [`Sample`] travels the whole pipeline. Each stage fills in one of its
 * tagged fields:
 *
 * ```text
 * Sampler          Sample { cid, Unresolved,       Unchecked }
 * PeerResolver     Sample { cid, Resolved{peer} | Unresolved, Unchecked }
 * Checker          Sample { cid, Resolved{peer},   Checked{result} }
 *                  Sample { cid, Unresolved,       Unchecked }      (passed through)
 * ```
 */

use crate::error::{CheckupError, Result};
use cid::Cid;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Multiaddr of a peer believed to hold a CID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerAddr(String);

impl PeerAddr {
    /// Wrap a full multiaddr
    pub fn new(multiaddr: impl Into<String>) -> Self {
        Self(multiaddr.into())
    }

    /// `/p2p/<peer id>` address for a bare libp2p peer ID
    pub fn from_peer_id(peer_id: &str) -> Self {
        Self(format!("/p2p/{}", peer_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a peer was found for the sample
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// No eligible holder was found
    Unresolved,

    /// Believed retrievable from `peer` (not a guarantee)
    Resolved { peer: PeerAddr },
}

/// Whether the verification service has looked at the sample
#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    Unchecked,
    Checked { result: CheckResult },
}

/// One candidate drawn from the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub cid: Cid,
    pub resolution: Resolution,
    pub verification: Verification,
}

impl Sample {
    /// Fresh sample straight out of the catalog
    pub fn new(cid: Cid) -> Self {
        Self {
            cid,
            resolution: Resolution::Unresolved,
            verification: Verification::Unchecked,
        }
    }

    /// Parse a catalog `source_cid` value
    pub fn parse(source_cid: &str) -> Result<Self> {
        let cid = Cid::try_from(source_cid.trim())
            .map_err(|e| CheckupError::invalid_cid(source_cid, e))?;
        Ok(Self::new(cid))
    }

    /// Attach the peer believed to hold this CID
    pub fn resolved(self, peer: PeerAddr) -> Self {
        Self {
            resolution: Resolution::Resolved { peer },
            ..self
        }
    }

    /// Attach a verification result
    pub fn checked(self, result: CheckResult) -> Self {
        Self {
            verification: Verification::Checked { result },
            ..self
        }
    }

    pub fn peer(&self) -> Option<&PeerAddr> {
        match &self.resolution {
            Resolution::Resolved { peer } => Some(peer),
            Resolution::Unresolved => None,
        }
    }

    pub fn result(&self) -> Option<&CheckResult> {
        match &self.verification {
            Verification::Checked { result } => Some(result),
            Verification::Unchecked => None,
        }
    }

    /// Classify the sample once it has left the pipeline
    ///
    /// A failed check is classified by the first failing step.
    pub fn outcome(&self) -> Outcome {
        let result = match (self.peer(), self.result()) {
            (None, _) => return Outcome::Unresolved,
            (Some(_), None) => return Outcome::Unchecked,
            (Some(_), Some(result)) => result,
        };

        let bitswap = &result.data_available_over_bitswap;
        if !result.connected() {
            Outcome::ConnectFailed
        } else if !result.cid_in_dht {
            Outcome::NoProviderRecord
        } else if !bitswap.responded {
            Outcome::BitswapNoResponse
        } else if !bitswap.found {
            Outcome::BitswapNotFound
        } else {
            Outcome::Ok
        }
    }
}

/// Final classification of a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No peer to check
    Unresolved,
    /// Peer found but never verified
    Unchecked,
    /// Connected, provider record present, bitswap responded and found
    Ok,
    ConnectFailed,
    NoProviderRecord,
    BitswapNoResponse,
    BitswapNotFound,
}

impl Outcome {
    pub fn is_ok(self) -> bool {
        self == Outcome::Ok
    }
}

/// Result of asking the verification service about a (cid, peer) pair
///
/// Field names follow the ipfs-check JSON body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CheckResult {
    /// Why the service could not connect to the peer; absent on success
    #[serde(default, deserialize_with = "empty_as_none")]
    pub connection_error: Option<String>,

    /// Addresses of the peer found in the DHT
    #[serde(rename = "PeerFoundInDHT", default)]
    pub peer_found_in_dht: Option<BTreeMap<String, i64>>,

    /// A DHT provider record exists for the CID
    #[serde(rename = "CidInDHT", default)]
    pub cid_in_dht: bool,

    #[serde(default)]
    pub data_available_over_bitswap: BitswapResult,
}

impl CheckResult {
    pub fn connected(&self) -> bool {
        self.connection_error.is_none()
    }

    /// Every check passed
    pub fn is_available(&self) -> bool {
        self.connected()
            && self.cid_in_dht
            && self.data_available_over_bitswap.responded
            && self.data_available_over_bitswap.found
    }
}

/// Bitswap sub-result of a check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BitswapResult {
    /// Go `time.Duration`, nanoseconds
    #[serde(rename = "Duration", default)]
    pub duration_nanos: u64,

    #[serde(default)]
    pub found: bool,

    #[serde(default)]
    pub responded: bool,

    #[serde(default, deserialize_with = "empty_as_none")]
    pub error: Option<String>,
}

impl BitswapResult {
    pub fn duration(&self) -> Duration {
        Duration::from_nanos(self.duration_nanos)
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CID_V0: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";

    #[test]
    fn test_parse_sample() {
        let sample = Sample::parse(CID_V0).unwrap();
        assert_eq!(sample.cid.to_string(), CID_V0);
        assert_eq!(sample.outcome(), Outcome::Unresolved);

        assert!(Sample::parse("not-a-cid").is_err());
    }

    #[test]
    fn test_stage_transitions() {
        let peer = PeerAddr::from_peer_id("12D3KooWpeer");
        assert_eq!(peer.as_str(), "/p2p/12D3KooWpeer");

        let sample = Sample::parse(CID_V0).unwrap().resolved(peer.clone());
        assert_eq!(sample.peer(), Some(&peer));
        assert_eq!(sample.outcome(), Outcome::Unchecked);

        let checked = sample.checked(CheckResult::default());
        assert!(checked.result().is_some());
        assert_eq!(checked.outcome(), Outcome::NoProviderRecord);
    }

    #[test]
    fn test_check_result_wire_format() {
        let body = r#"{
            "ConnectionError": "",
            "PeerFoundInDHT": {"/ip4/1.2.3.4/tcp/4001": 1},
            "CidInDHT": true,
            "DataAvailableOverBitswap": {
                "Duration": 2000000000,
                "Found": true,
                "Responded": true,
                "Error": ""
            }
        }"#;

        let result: CheckResult = serde_json::from_str(body).unwrap();
        assert!(result.connected());
        assert!(result.cid_in_dht);
        assert!(result.is_available());
        assert_eq!(
            result.data_available_over_bitswap.duration(),
            Duration::from_secs(2)
        );
        assert_eq!(result.data_available_over_bitswap.error, None);
    }

    #[test]
    fn test_check_result_connection_error() {
        let body = r#"{
            "ConnectionError": "failed to dial",
            "PeerFoundInDHT": null,
            "CidInDHT": false,
            "DataAvailableOverBitswap": {"Duration": 0, "Found": false, "Responded": false, "Error": ""}
        }"#;

        let result: CheckResult = serde_json::from_str(body).unwrap();
        assert_eq!(result.connection_error.as_deref(), Some("failed to dial"));
        assert!(!result.is_available());
        assert_eq!(result.peer_found_in_dht, None);
    }

    #[test]
    fn test_outcome_first_failing_step() {
        let peer = PeerAddr::from_peer_id("12D3KooWpeer");
        let sample = Sample::parse(CID_V0).unwrap().resolved(peer);

        let mut result = CheckResult {
            cid_in_dht: true,
            ..Default::default()
        };
        result.data_available_over_bitswap.responded = true;
        result.data_available_over_bitswap.found = true;
        assert!(sample.clone().checked(result.clone()).outcome().is_ok());

        result.data_available_over_bitswap.found = false;
        assert_eq!(
            sample.clone().checked(result.clone()).outcome(),
            Outcome::BitswapNotFound
        );

        result.data_available_over_bitswap.responded = false;
        assert_eq!(
            sample.clone().checked(result.clone()).outcome(),
            Outcome::BitswapNoResponse
        );

        result.connection_error = Some("dial backoff".to_string());
        assert_eq!(sample.checked(result).outcome(), Outcome::ConnectFailed);
    }
}
