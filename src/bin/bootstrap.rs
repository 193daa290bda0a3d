//! One-shot catch-up: walks the sale feed oldest-first until the upstream
//! reports no more pages, then exits. Run once before starting the indexer
//! on a fresh or long-stopped store.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use nft_market_indexer::config::{Config, STAT_QUEUE};
use nft_market_indexer::db;
use nft_market_indexer::error::Result;
use nft_market_indexer::fetcher;
use nft_market_indexer::ingest::BootstrapIngester;
use nft_market_indexer::queue::RedisQueue;

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
    info!(instance = %cfg.instance, "bootstrap starting");

    let client = fetcher::http_client()?;
    let queue = Arc::new(RedisQueue::connect(&cfg.redis_url, STAT_QUEUE).await?);

    BootstrapIngester::new(cfg, pool, client, queue)
        .run_to_completion()
        .await
}
