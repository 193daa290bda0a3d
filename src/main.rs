use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use nft_market_indexer::completion::CompletionDetector;
use nft_market_indexer::config::{
    Config, INGEST_INTERVAL_SECS, RATE_REFRESH_INTERVAL_SECS, STAT_QUEUE,
};
use nft_market_indexer::db;
use nft_market_indexer::error::{AppError, Result};
use nft_market_indexer::fetcher;
use nft_market_indexer::ingest::ListingIngester;
use nft_market_indexer::queue::RedisQueue;
use nft_market_indexer::rates::RateCache;

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
    info!(instance = %cfg.instance, db = %cfg.db_path, "indexer starting");

    let client = fetcher::http_client()?;
    let queue = Arc::new(RedisQueue::connect(&cfg.redis_url, STAT_QUEUE).await?);
    let rates = Arc::new(RateCache::new());

    // Load the rate series before the first completion check can need it.
    rates.refresh(&client, &cfg).await?;

    let ingester = ListingIngester::new(cfg.clone(), pool.clone(), client.clone(), queue);
    let detector =
        CompletionDetector::new(cfg.clone(), pool.clone(), client.clone(), Arc::clone(&rates));

    // Two cooperative tick loops. Each awaits its own body, so a tick never
    // overlaps itself; a failed tick aborts the process (crash-and-restart).
    let fast = async {
        let mut ticker = interval(Duration::from_secs(INGEST_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            // Ingestion commits fully before completion detection looks at
            // storage; the ordering within one tick is load-bearing.
            ingester.run_cycle().await?;
            detector.check_completions().await?;
        }
        #[allow(unreachable_code)]
        Ok::<(), AppError>(())
    };

    let slow = async {
        let mut ticker = interval(Duration::from_secs(RATE_REFRESH_INTERVAL_SECS));
        ticker.tick().await; // skip immediate first tick — refreshed above
        loop {
            ticker.tick().await;
            rates.refresh(&client, &cfg).await?;
        }
        #[allow(unreachable_code)]
        Ok::<(), AppError>(())
    };

    tokio::try_join!(fast, slow)?;
    Ok(())
}
