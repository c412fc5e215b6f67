/*!
 * Elastic provider: a secondary content provider backed by S3
 *
 * The provider serves blocks straight out of a bucket with two layouts:
 *
 * - `raw/<cid>...`        - blocks uploaded individually
 * - `complete/<cid>.car`  - a packaged CAR of the whole DAG
 *
 * A CID is held when either layout has it.
 */

use crate::config::ElasticProviderConfig;
use crate::error::{CheckupError, Result};
use crate::types::PeerAddr;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client as S3Client;
use cid::Cid;
use std::time::Duration;
use tracing::debug;

/// A provider that can answer "do you hold this CID?" without a status API
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Address the verification service should dial
    fn multiaddr(&self) -> &PeerAddr;

    /// Whether the provider holds `cid`
    async fn has(&self, cid: &Cid) -> Result<bool>;
}

pub struct ElasticProvider {
    addr: PeerAddr,
    bucket: String,
    client: S3Client,
}

impl ElasticProvider {
    pub async fn new(config: &ElasticProviderConfig) -> Result<Self> {
        let client = Self::build_s3_client(config).await;

        Ok(Self {
            addr: PeerAddr::new(config.addr.clone()),
            bucket: config.bucket.clone(),
            client,
        })
    }

    async fn build_s3_client(config: &ElasticProviderConfig) -> S3Client {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        let region_provider = if let Some(region) = &config.region {
            RegionProviderChain::first_try(Region::new(region.clone()))
        } else {
            RegionProviderChain::default_provider()
        };
        loader = loader.region(region_provider);

        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let credentials =
                Credentials::new(access_key, secret_key, None, None, "orbit-checkup-elastic");
            loader = loader.credentials_provider(credentials);
        }

        let shared = loader.load().await;

        let timeout_config = aws_sdk_s3::config::timeout::TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(30))
            .build();
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .timeout_config(timeout_config)
            .build();

        S3Client::from_conf(s3_config)
    }

    async fn has_raw(&self, cid: &Cid) -> Result<bool> {
        let prefix = raw_prefix(cid);
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&prefix)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| {
                CheckupError::Storage(format!(
                    "ListObjectsV2 {}/{}: {}",
                    self.bucket,
                    prefix,
                    DisplayErrorContext(&e)
                ))
            })?;

        Ok(!response.contents().is_empty())
    }

    async fn has_complete(&self, cid: &Cid) -> Result<bool> {
        let key = complete_key(cid);
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service = e.into_service_error();
                if service.is_not_found() {
                    Ok(false)
                } else {
                    Err(CheckupError::Storage(format!(
                        "HeadObject {}/{}: {}",
                        self.bucket,
                        key,
                        DisplayErrorContext(&service)
                    )))
                }
            }
        }
    }
}

#[async_trait]
impl ContentProvider for ElasticProvider {
    fn multiaddr(&self) -> &PeerAddr {
        &self.addr
    }

    async fn has(&self, cid: &Cid) -> Result<bool> {
        if self.has_raw(cid).await? {
            debug!("{} found under raw/ in {}", cid, self.bucket);
            return Ok(true);
        }

        let found = self.has_complete(cid).await?;
        debug!(
            "{} {} under complete/ in {}",
            cid,
            if found { "found" } else { "not found" },
            self.bucket
        );
        Ok(found)
    }
}

/// Listing prefix for individually uploaded blocks
pub fn raw_prefix(cid: &Cid) -> String {
    format!("raw/{}", cid)
}

/// Object key of the packaged CAR
pub fn complete_key(cid: &Cid) -> String {
    format!("complete/{}.car", cid)
}
