use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::config::{Config, STAT_CATEGORIES};
use crate::db::queries;
use crate::error::Result;
use crate::fetcher;
use crate::queue::JobSink;
use crate::types::{FeedListing, StatCheckJob};

/// Per-tick driver for the live sale feed. Reads the watermark from storage,
/// fetches the newest page, and ingests whatever lies above the watermark.
pub struct ListingIngester {
    cfg: Config,
    pool: SqlitePool,
    client: reqwest::Client,
    sink: Arc<dyn JobSink>,
}

impl ListingIngester {
    pub fn new(
        cfg: Config,
        pool: SqlitePool,
        client: reqwest::Client,
        sink: Arc<dyn JobSink>,
    ) -> Self {
        Self { cfg, pool, client, sink }
    }

    pub async fn run_cycle(&self) -> Result<()> {
        let watermark = queries::max_seq(&self.pool).await?;
        let page = fetcher::fetch_sale_page(&self.client, &self.cfg, "latest", 1).await?;
        let ingested =
            ingest_listings(&self.cfg, &self.pool, self.sink.as_ref(), page.lists, watermark)
                .await?;
        if ingested > 0 {
            let watermark = queries::max_seq(&self.pool).await?;
            info!(ingested, watermark, "ingest cycle complete");
        }
        Ok(())
    }
}

/// One-shot catch-up for a fresh or recovering store: walks the sale feed
/// oldest-first from page 1 until the feed reports no further pages. Each
/// page goes through the same per-listing path as the live poll, filtered
/// against the watermark recomputed from storage, so re-runs are harmless.
pub struct BootstrapIngester {
    cfg: Config,
    pool: SqlitePool,
    client: reqwest::Client,
    sink: Arc<dyn JobSink>,
}

impl BootstrapIngester {
    pub fn new(
        cfg: Config,
        pool: SqlitePool,
        client: reqwest::Client,
        sink: Arc<dyn JobSink>,
    ) -> Self {
        Self { cfg, pool, client, sink }
    }

    pub async fn run_to_completion(&self) -> Result<()> {
        let mut page_no = 1u32;
        loop {
            info!(page = page_no, "bootstrapping listings page");
            let watermark = queries::max_seq(&self.pool).await?;
            let page =
                fetcher::fetch_sale_page(&self.client, &self.cfg, "oldest", page_no).await?;
            let more = page.more;
            ingest_listings(&self.cfg, &self.pool, self.sink.as_ref(), page.lists, watermark)
                .await?;
            if !more {
                break;
            }
            page_no += 1;
        }
        info!("bootstrap complete");
        Ok(())
    }
}

/// Ingest every listing above the watermark, in ascending seq order. The feed
/// delivers newest-first on the live poll and oldest-first on bootstrap; the
/// explicit sort makes downstream inserts and published jobs observe
/// monotonically increasing seq either way. Each listing fully commits before
/// the next begins, so a mid-run failure leaves a consistent prefix applied.
pub async fn ingest_listings(
    cfg: &Config,
    pool: &SqlitePool,
    sink: &dyn JobSink,
    listings: Vec<FeedListing>,
    watermark: i64,
) -> Result<usize> {
    let mut fresh: Vec<FeedListing> =
        listings.into_iter().filter(|l| l.seq > watermark).collect();
    fresh.sort_by_key(|l| l.seq);

    for listing in &fresh {
        process_listing(cfg, pool, sink, listing).await?;
    }
    Ok(fresh.len())
}

async fn process_listing(
    cfg: &Config,
    pool: &SqlitePool,
    sink: &dyn JobSink,
    listing: &FeedListing,
) -> Result<()> {
    debug!(
        seq = listing.seq,
        transport_id = %listing.transport_id,
        "ingesting listing"
    );
    queries::upsert_transport(pool, listing).await?;
    // A new Active event supersedes whatever was Active for this transport.
    queries::demote_active(pool, &listing.transport_id).await?;
    queries::upsert_sequence(pool, listing).await?;

    let published =
        fanout(cfg, pool, sink, listing.seq, &listing.transport_id, listing.class).await?;
    debug!(
        seq = listing.seq,
        published,
        "stat checks published"
    );
    Ok(())
}

/// Idempotent enrichment fan-out: one job per stat category whose record is
/// not yet stored. `summary` is keyed by seq, everything else by transport.
/// A publish failure aborts the remaining categories for this listing; the
/// exists-check makes the eventual retry skip what already landed.
pub async fn fanout(
    cfg: &Config,
    pool: &SqlitePool,
    sink: &dyn JobSink,
    seq: i64,
    transport_id: &str,
    class: i64,
) -> Result<usize> {
    let mut published = 0;
    for category in STAT_CATEGORIES {
        if queries::stat_record_exists(pool, category, seq, transport_id).await? {
            continue;
        }
        sink.publish(&stat_check_job(cfg, category, seq, transport_id, class))
            .await?;
        published += 1;
    }
    Ok(published)
}

pub fn stat_check_job(
    cfg: &Config,
    category: &str,
    seq: i64,
    transport_id: &str,
    class: i64,
) -> StatCheckJob {
    StatCheckJob {
        seq,
        transport_id: transport_id.to_string(),
        stat_check: category.to_string(),
        stat_url: cfg.stat_url(category, seq, transport_id, class),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
