//! Stat-check consumer. Any number of these can run against the same queue
//! and store; coordination is entirely through at-least-once delivery and
//! per-statement upsert atomicity.

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use nft_market_indexer::config::{Config, STAT_QUEUE};
use nft_market_indexer::db;
use nft_market_indexer::error::Result;
use nft_market_indexer::fetcher;
use nft_market_indexer::queue::RedisQueue;
use nft_market_indexer::worker::StatCheckWorker;

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
    info!(instance = %cfg.instance, "stat worker starting");

    let client = fetcher::http_client()?;
    let queue = RedisQueue::connect(&cfg.redis_url, STAT_QUEUE).await?;
    let mut consumer = queue.consumer(&cfg.instance).await?;

    StatCheckWorker::new(pool, client).run(&mut consumer).await
}
