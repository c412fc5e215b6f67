/*!
 * Upload catalog access
 *
 * The catalog is the `upload` table: a numeric primary key and the
 * `source_cid` string each upload was admitted under.
 */

use crate::error::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{info, warn};

/// Read-only queries the sampler needs from the catalog
#[async_trait]
pub trait Catalog: Send + Sync {
    /// `(MIN(id), MAX(id))`, or `None` for an empty table
    async fn id_range(&self) -> Result<Option<(i64, i64)>>;

    /// `source_cid` of the row with this key, `None` on a miss
    async fn fetch_by_id(&self, id: i64) -> Result<Option<String>>;

    /// Planner row estimate, may be stale or zero
    async fn estimate_rows(&self) -> Result<i64>;

    /// `limit` contiguous rows in key order starting at `offset`
    async fn fetch_block(&self, offset: i64, limit: i64) -> Result<Vec<String>>;

    /// Release connections; called once on shutdown
    async fn close(&self) {}
}

/// PostgreSQL catalog
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub async fn connect(database_url: &str) -> Result<Self> {
        info!("Connecting to catalog: {}", mask_database_url(database_url));

        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await
            .map_err(|e| {
                warn!("Failed to connect to catalog: {}", e);
                e
            })?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn id_range(&self) -> Result<Option<(i64, i64)>> {
        let (min, max): (Option<i64>, Option<i64>) =
            sqlx::query_as("SELECT MIN(id)::bigint, MAX(id)::bigint FROM upload")
                .fetch_one(&self.pool)
                .await?;

        Ok(min.zip(max))
    }

    async fn fetch_by_id(&self, id: i64) -> Result<Option<String>> {
        let cid = sqlx::query_scalar("SELECT source_cid FROM upload WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(cid)
    }

    async fn estimate_rows(&self) -> Result<i64> {
        let estimate: Option<i64> = sqlx::query_scalar(
            "SELECT reltuples::bigint AS estimate FROM pg_class WHERE relname = 'upload'",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(estimate.unwrap_or(0))
    }

    async fn fetch_block(&self, offset: i64, limit: i64) -> Result<Vec<String>> {
        let cids = sqlx::query_scalar("SELECT source_cid FROM upload ORDER BY id OFFSET $1 LIMIT $2")
            .bind(offset)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(cids)
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Catalog connection pool closed");
    }
}

/// Hide the password part of a connection string
fn mask_database_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let rest = &url[scheme_end + 3..];

    match (rest.find(':'), rest.find('@')) {
        (Some(colon), Some(at)) if colon < at => {
            format!("{}{}:****{}", &url[..scheme_end + 3], &rest[..colon], &rest[at..])
        }
        _ => url.to_string(),
    }
}
