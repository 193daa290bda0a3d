use std::collections::HashMap;
use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::config::Config;
use crate::db::queries;
use crate::error::{AppError, Result};
use crate::fetcher;
use crate::rates::{round2, RateCache};
use crate::types::RecentSale;

/// Detects listings that moved from Active to Sold. Snapshots the pending
/// set from storage, intersects it with the recent-activity feed, and writes
/// the Sold transition with a USD valuation from the rate cache.
pub struct CompletionDetector {
    cfg: Config,
    pool: SqlitePool,
    client: reqwest::Client,
    rates: Arc<RateCache>,
}

impl CompletionDetector {
    pub fn new(
        cfg: Config,
        pool: SqlitePool,
        client: reqwest::Client,
        rates: Arc<RateCache>,
    ) -> Self {
        Self { cfg, pool, client, rates }
    }

    pub async fn check_completions(&self) -> Result<()> {
        // Snapshot first: an event ingested later in this tick cannot be in
        // the snapshot, so it cannot be marked Sold prematurely.
        let pending = queries::pending_sales(&self.pool).await?;
        if pending.is_empty() {
            return Ok(());
        }
        let recent = fetcher::fetch_recent_sales(&self.client, &self.cfg).await?;
        let completed = self.mark_completed(&pending, &recent).await?;
        if completed > 0 {
            info!(completed, pending = pending.len(), "completed sales recorded");
        }
        Ok(())
    }

    async fn mark_completed(
        &self,
        pending: &HashMap<i64, String>,
        recent: &[RecentSale],
    ) -> Result<usize> {
        let mut completed = 0;
        for sale in recent {
            if !pending.contains_key(&sale.seq) {
                continue;
            }
            let rate = self
                .rates
                .rate_at(sale.trade_ts)
                .await
                .ok_or(AppError::RateUnavailable)?;
            let usd_price = round2(sale.price * rate);
            debug!(seq = sale.seq, usd_price, "marking listing sold");
            queries::mark_sold(&self.pool, sale.seq, usd_price).await?;
            completed += 1;
        }
        Ok(completed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_memory;
    use crate::ingest::ingest_listings;
    use crate::queue::testing::MemorySink;
    use crate::types::{FeedListing, RateEntry, TradeType};

    fn test_config() -> Config {
        Config {
            market_api_url: "https://market.test/nft".to_string(),
            wallet_api_url: "https://wallet.test/daily".to_string(),
            redis_url: "redis://unused".to_string(),
            log_level: "info".to_string(),
            db_path: ":memory:".to_string(),
            instance: "test".to_string(),
        }
    }

    fn listing(seq: i64, transport_id: &str) -> FeedListing {
        FeedListing {
            seq,
            transport_id: transport_id.to_string(),
            nft_id: "0xnft".to_string(),
            sealed_dt: 1_675_000_000,
            character_name: "Karnin".to_string(),
            class: 3,
            level: 80,
            power_score: 105_000,
            price: 100.0,
            mirage_score: 0,
            mira_x: 0,
            reinforce: 0,
        }
    }

    async fn detector_with(pool: &SqlitePool, series: Vec<RateEntry>) -> CompletionDetector {
        let rates = Arc::new(RateCache::new());
        rates.set_series(series).await;
        CompletionDetector::new(
            test_config(),
            pool.clone(),
            reqwest::Client::new(),
            rates,
        )
    }

    #[tokio::test]
    async fn pending_sale_in_recent_feed_becomes_sold_with_usd_price() {
        let cfg = test_config();
        let pool = connect_memory().await;
        let sink = MemorySink::new();
        ingest_listings(&cfg, &pool, &sink, vec![listing(7, "T1")], 0).await.unwrap();

        let detector =
            detector_with(&pool, vec![RateEntry { ts: 1_000, usd_rate: 0.5 }]).await;
        let pending = queries::pending_sales(&pool).await.unwrap();
        let recent = vec![RecentSale { seq: 7, price: 100.0, trade_ts: 2_000 }];

        let completed = detector.mark_completed(&pending, &recent).await.unwrap();
        assert_eq!(completed, 1);

        let row = queries::get_sequence(&pool, 7).await.unwrap().unwrap();
        assert_eq!(row.trade_type, TradeType::Sold.code());
        assert_eq!(row.usd_price, Some(50.0));
    }

    #[tokio::test]
    async fn entries_outside_pending_snapshot_are_ignored() {
        let cfg = test_config();
        let pool = connect_memory().await;
        let sink = MemorySink::new();
        ingest_listings(&cfg, &pool, &sink, vec![listing(7, "T1")], 0).await.unwrap();

        let detector =
            detector_with(&pool, vec![RateEntry { ts: 1_000, usd_rate: 0.5 }]).await;
        let pending = queries::pending_sales(&pool).await.unwrap();
        // seq 99 was never ingested here; some other instance owns it.
        let recent = vec![RecentSale { seq: 99, price: 100.0, trade_ts: 2_000 }];

        let completed = detector.mark_completed(&pending, &recent).await.unwrap();
        assert_eq!(completed, 0);
        let row = queries::get_sequence(&pool, 7).await.unwrap().unwrap();
        assert_eq!(row.trade_type, TradeType::Active.code());
    }

    #[tokio::test]
    async fn missing_rate_series_fails_the_check() {
        let cfg = test_config();
        let pool = connect_memory().await;
        let sink = MemorySink::new();
        ingest_listings(&cfg, &pool, &sink, vec![listing(7, "T1")], 0).await.unwrap();

        let detector = detector_with(&pool, Vec::new()).await;
        let pending = queries::pending_sales(&pool).await.unwrap();
        let recent = vec![RecentSale { seq: 7, price: 100.0, trade_ts: 2_000 }];

        let result = detector.mark_completed(&pending, &recent).await;
        assert!(matches!(result, Err(AppError::RateUnavailable)));
        // The event stays Active; the next tick retries after a refresh.
        let row = queries::get_sequence(&pool, 7).await.unwrap().unwrap();
        assert_eq!(row.trade_type, TradeType::Active.code());
    }
}
