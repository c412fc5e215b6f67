//! Orbit Checkup - audits that pinned content is actually retrievable.

use anyhow::Result;
use clap::Parser;
use orbit_checkup::{logging, start_checkup, CheckupConfig, VERSION};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = CheckupConfig::parse();

    logging::init_logging(&config)?;
    info!("🚀 Orbit Checkup v{}", VERSION);

    start_checkup(config).await
}
