/*!
 * Configuration for the checkup process
 *
 * Every option is a command-line flag with an environment-variable fallback,
 * so a `.env` file (loaded by the binary) is enough to run the auditor.
 */

use crate::error::{CheckupError, Result};
use crate::peer::MAX_BATCH_SIZE;
use clap::{Parser, ValueEnum};
use orbit_sentinel::{FailurePolicy, RunMode, SentinelPolicy};
use std::time::Duration;

/// How the sampler picks rows from the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SampleMethod {
    /// Uniform draw over the cached `[MIN(id), MAX(id)]` range
    #[default]
    RandomId,
    /// Uniform offset over the planner's row estimate
    Offset,
    /// Uniform offset, then a contiguous block of rows
    Block,
}

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Orbit Checkup - continuous availability audit of pinned IPFS content.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct CheckupConfig {
    /// PostgreSQL connection string for the upload catalog
    #[arg(long, env = "DATABASE_CONNECTION", hide_env_values = true)]
    pub database_url: String,

    /// ipfs-check backend URL
    #[arg(long, env = "IPFS_CHECK_API_URL")]
    pub ipfs_check_url: String,

    /// IPFS Cluster REST API URL
    #[arg(long, env = "CLUSTER_API_URL")]
    pub cluster_url: String,

    /// IPFS Cluster basic auth token
    #[arg(long, env = "CLUSTER_BASIC_AUTH_TOKEN", hide_env_values = true)]
    pub cluster_token: String,

    /// CIDs per bulk status request (capped at 120, 0 means 120)
    #[arg(long, env = "CLUSTER_STATUS_BATCH_SIZE", default_value_t = MAX_BATCH_SIZE)]
    pub batch_size: usize,

    /// Sampling strategy
    #[arg(long, env = "SAMPLE_METHOD", value_enum, default_value_t = SampleMethod::RandomId)]
    pub sample_method: SampleMethod,

    /// Rows fetched per draw with the block strategy
    #[arg(long, env = "SAMPLE_BLOCK_SIZE", default_value_t = 10)]
    pub block_size: usize,

    /// Seconds before cached catalog bounds are re-queried
    #[arg(long, env = "ID_RANGE_TTL_SECS", default_value_t = 60)]
    pub id_range_ttl_secs: u64,

    /// Seconds to wait before re-sampling an empty catalog
    #[arg(long, env = "EMPTY_CATALOG_BACKOFF_SECS", default_value_t = 10)]
    pub empty_backoff_secs: u64,

    /// Seed for the random source (reproducible runs)
    #[arg(long, env = "SAMPLE_SEED")]
    pub seed: Option<u64>,

    /// Metrics server port
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Prometheus metric namespace
    #[arg(long, env = "PROM_NAMESPACE", default_value = "checkup")]
    pub prom_namespace: String,

    /// Seconds allowed for one verification call
    #[arg(long, env = "CHECK_TIMEOUT_SECS", default_value_t = 30)]
    pub check_timeout_secs: u64,

    /// Verification calls in flight at once
    #[arg(long, env = "CHECK_CONCURRENCY", default_value_t = 1)]
    pub check_concurrency: usize,

    /// Multiaddr of the elastic provider
    #[arg(long, env = "ELASTIC_PROVIDER_ADDR")]
    pub elastic_provider_addr: Option<String>,

    /// S3 bucket backing the elastic provider
    #[arg(long, env = "ELASTIC_PROVIDER_S3_BUCKET")]
    pub elastic_provider_bucket: Option<String>,

    #[arg(long, env = "ELASTIC_PROVIDER_S3_REGION")]
    pub elastic_provider_region: Option<String>,

    #[arg(long, env = "ELASTIC_PROVIDER_S3_ACCESS_KEY_ID", hide_env_values = true)]
    pub elastic_provider_access_key_id: Option<String>,

    #[arg(long, env = "ELASTIC_PROVIDER_S3_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub elastic_provider_secret_access_key: Option<String>,

    /// Fraction of samples resolved against the elastic provider
    #[arg(long, env = "SECONDARY_PROVIDER_WEIGHT", default_value_t = 0.25)]
    pub secondary_provider_weight: f64,

    /// perpetual | periodic
    #[arg(long, env = "RUN_MODE", value_parser = parse_run_mode, default_value = "perpetual")]
    pub run_mode: RunMode,

    /// Samples drawn per periodic run
    #[arg(long, env = "SAMPLES_PER_RUN", default_value_t = 100)]
    pub samples_per_run: usize,

    /// Seconds between periodic runs
    #[arg(long, env = "RUN_INTERVAL_SECS", default_value_t = 300)]
    pub run_interval_secs: u64,

    /// keep-last-good | surface-error
    #[arg(
        long,
        env = "REPORT_FAILURE_POLICY",
        value_parser = parse_failure_policy,
        default_value = "keep-last-good"
    )]
    pub report_failure_policy: FailurePolicy,

    /// Log line format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Connection details for the S3-backed elastic provider
#[derive(Debug, Clone, PartialEq)]
pub struct ElasticProviderConfig {
    pub addr: String,
    pub bucket: String,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl CheckupConfig {
    /// Reject combinations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.secondary_provider_weight) {
            return Err(CheckupError::Config(format!(
                "secondary provider weight must be within [0, 1], got {}",
                self.secondary_provider_weight
            )));
        }

        if self.check_timeout_secs == 0 {
            return Err(CheckupError::Config(
                "check timeout must be at least 1 second".to_string(),
            ));
        }

        if self.check_concurrency == 0 {
            return Err(CheckupError::Config(
                "check concurrency must be at least 1".to_string(),
            ));
        }

        if self.block_size == 0 {
            return Err(CheckupError::Config(
                "sample block size must be at least 1".to_string(),
            ));
        }

        if self.samples_per_run == 0 {
            return Err(CheckupError::Config(
                "samples per run must be at least 1".to_string(),
            ));
        }

        if self.run_mode == RunMode::Periodic && self.run_interval_secs == 0 {
            return Err(CheckupError::Config(
                "run interval must be at least 1 second".to_string(),
            ));
        }

        match (&self.elastic_provider_addr, &self.elastic_provider_bucket) {
            (Some(_), None) => {
                return Err(CheckupError::Config(
                    "elastic provider address set without an S3 bucket".to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(CheckupError::Config(
                    "elastic provider S3 bucket set without an address".to_string(),
                ))
            }
            _ => {}
        }

        if self.elastic_provider_access_key_id.is_some()
            != self.elastic_provider_secret_access_key.is_some()
        {
            return Err(CheckupError::Config(
                "elastic provider access key id and secret must be set together".to_string(),
            ));
        }

        Ok(())
    }

    /// Batch size after applying the pin backend's request limit
    pub fn effective_batch_size(&self) -> usize {
        match self.batch_size {
            0 => MAX_BATCH_SIZE,
            n => n.min(MAX_BATCH_SIZE),
        }
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }

    pub fn id_range_ttl(&self) -> Duration {
        Duration::from_secs(self.id_range_ttl_secs)
    }

    pub fn empty_backoff(&self) -> Duration {
        Duration::from_secs(self.empty_backoff_secs)
    }

    /// Run shape handed to the Sentinel
    pub fn sentinel_policy(&self) -> SentinelPolicy {
        SentinelPolicy {
            mode: self.run_mode,
            interval_s: self.run_interval_secs,
            failure_policy: self.report_failure_policy,
        }
    }

    /// Elastic provider settings, when configured
    pub fn elastic_provider(&self) -> Option<ElasticProviderConfig> {
        let addr = self.elastic_provider_addr.clone()?;
        let bucket = self.elastic_provider_bucket.clone()?;

        Some(ElasticProviderConfig {
            addr,
            bucket,
            region: self.elastic_provider_region.clone(),
            access_key_id: self.elastic_provider_access_key_id.clone(),
            secret_access_key: self.elastic_provider_secret_access_key.clone(),
        })
    }
}

fn parse_run_mode(s: &str) -> std::result::Result<RunMode, String> {
    match s.to_ascii_lowercase().as_str() {
        "perpetual" => Ok(RunMode::Perpetual),
        "periodic" => Ok(RunMode::Periodic),
        other => Err(format!(
            "unknown run mode '{}' (expected perpetual or periodic)",
            other
        )),
    }
}

fn parse_failure_policy(s: &str) -> std::result::Result<FailurePolicy, String> {
    match s.to_ascii_lowercase().as_str() {
        "keep-last-good" => Ok(FailurePolicy::KeepLastGood),
        "surface-error" => Ok(FailurePolicy::SurfaceError),
        other => Err(format!(
            "unknown failure policy '{}' (expected keep-last-good or surface-error)",
            other
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 9] = [
        "orbit-checkup",
        "--database-url",
        "postgres://localhost/uploads",
        "--ipfs-check-url",
        "http://localhost:3333",
        "--cluster-url",
        "http://localhost:9094",
        "--cluster-token",
        "dXNlcjpwYXNz",
    ];

    fn parse(extra: &[&str]) -> CheckupConfig {
        let args: Vec<&str> = REQUIRED.iter().chain(extra.iter()).copied().collect();
        CheckupConfig::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--samples-per-run", "100"]);

        assert_eq!(config.effective_batch_size(), 120);
        assert_eq!(config.sample_method, SampleMethod::RandomId);
        assert_eq!(config.check_timeout(), Duration::from_secs(30));
        assert_eq!(config.check_concurrency, 1);
        assert_eq!(config.secondary_provider_weight, 0.25);
        assert_eq!(config.run_mode, RunMode::Perpetual);
        assert_eq!(config.report_failure_policy, FailurePolicy::KeepLastGood);
        assert!(config.elastic_provider().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_batch_size_capped() {
        assert_eq!(parse(&["--batch-size", "500"]).effective_batch_size(), 120);
        assert_eq!(parse(&["--batch-size", "0"]).effective_batch_size(), 120);
        assert_eq!(parse(&["--batch-size", "16"]).effective_batch_size(), 16);
    }

    #[test]
    fn test_periodic_policy() {
        let config = parse(&[
            "--run-mode",
            "periodic",
            "--run-interval-secs",
            "60",
            "--report-failure-policy",
            "surface-error",
        ]);

        let policy = config.sentinel_policy();
        assert_eq!(policy.mode, RunMode::Periodic);
        assert_eq!(policy.interval(), Duration::from_secs(60));
        assert_eq!(policy.failure_policy, FailurePolicy::SurfaceError);
    }

    #[test]
    fn test_unknown_run_mode_rejected() {
        let args: Vec<&str> = REQUIRED
            .iter()
            .chain(["--run-mode", "sometimes"].iter())
            .copied()
            .collect();
        assert!(CheckupConfig::try_parse_from(args).is_err());
    }

    #[test]
    fn test_weight_out_of_range() {
        let config = parse(&["--secondary-provider-weight", "1.5"]);
        assert!(matches!(config.validate(), Err(CheckupError::Config(_))));
    }

    #[test]
    fn test_elastic_provider_needs_bucket() {
        let config = parse(&["--elastic-provider-addr", "/dns4/elastic.example/tcp/3000/ws"]);
        assert!(config.validate().is_err());

        let config = parse(&[
            "--elastic-provider-addr",
            "/dns4/elastic.example/tcp/3000/ws",
            "--elastic-provider-bucket",
            "blocks",
        ]);
        assert!(config.validate().is_ok());

        let elastic = config.elastic_provider().unwrap();
        assert_eq!(elastic.bucket, "blocks");
        assert_eq!(elastic.region, None);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = parse(&["--check-concurrency", "0"]);
        assert!(config.validate().is_err());
    }
}
