//! One-shot maintenance tool: republishes a `summary` stat check for every
//! Active sequence event so the workers refresh each listing's payload and
//! trade status. The usual way to repair listings whose fan-out was cut
//! short by a publish failure.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use nft_market_indexer::config::{Config, STAT_QUEUE};
use nft_market_indexer::db::{self, queries};
use nft_market_indexer::error::Result;
use nft_market_indexer::ingest::stat_check_job;
use nft_market_indexer::queue::{JobSink, RedisQueue};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    let pool = db::connect(&cfg.db_path).await?;
    let queue = Arc::new(RedisQueue::connect(&cfg.redis_url, STAT_QUEUE).await?);

    // No exists-check here: the point is to refresh even recorded summaries.
    let active = queries::active_listings_with_class(&pool).await?;
    info!(listings = active.len(), "republishing summary checks");

    for (seq, transport_id, class) in &active {
        queue
            .publish(&stat_check_job(&cfg, "summary", *seq, transport_id, *class))
            .await?;
    }

    info!("status update complete");
    Ok(())
}
