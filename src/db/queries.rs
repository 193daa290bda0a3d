//! SQL access for all tables. Every write is an upsert or a guarded update,
//! so redoing a step after a crash is a no-op or a harmless overwrite.

use std::collections::HashMap;

use sqlx::SqlitePool;

use crate::config::STAT_CATEGORIES;
use crate::error::{AppError, Result};
use crate::types::{FeedListing, TradeType};

use super::models::{SequenceRow, TransportRow};

// ── Transports ───────────────────────────────────────────────────

pub async fn upsert_transport(pool: &SqlitePool, l: &FeedListing) -> Result<()> {
    sqlx::query(
        "INSERT INTO transports (transport_id, nft_id, sealed_dt, character_name, class, lv, power_score)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (transport_id) DO UPDATE SET
             nft_id = excluded.nft_id,
             sealed_dt = excluded.sealed_dt,
             character_name = excluded.character_name,
             class = excluded.class,
             lv = excluded.lv,
             power_score = excluded.power_score",
    )
    .bind(&l.transport_id)
    .bind(&l.nft_id)
    .bind(l.sealed_dt)
    .bind(&l.character_name)
    .bind(l.class)
    .bind(l.level)
    .bind(l.power_score)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_transport(pool: &SqlitePool, transport_id: &str) -> Result<Option<TransportRow>> {
    let row = sqlx::query_as::<_, TransportRow>("SELECT * FROM transports WHERE transport_id = ?")
        .bind(transport_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

// ── Sequence events ──────────────────────────────────────────────

/// Demote whatever event is currently Active for this transport. Called
/// before inserting a new Active event so the single-Active invariant holds.
pub async fn demote_active(pool: &SqlitePool, transport_id: &str) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE sequence SET trade_type = ? WHERE transport_id = ? AND trade_type = ?",
    )
    .bind(TradeType::Superseded.code())
    .bind(transport_id)
    .bind(TradeType::Active.code())
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Insert a sequence event as Active, or refresh the price/score columns if
/// the seq was already ingested. A conflict deliberately leaves trade_type
/// alone: replaying an old page must not resurrect a Sold or Superseded row.
pub async fn upsert_sequence(pool: &SqlitePool, l: &FeedListing) -> Result<()> {
    sqlx::query(
        "INSERT INTO sequence (seq, transport_id, price, mirage_score, mira_x, reinforce, trade_type)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (seq) DO UPDATE SET
             price = excluded.price,
             mirage_score = excluded.mirage_score,
             mira_x = excluded.mira_x,
             reinforce = excluded.reinforce",
    )
    .bind(l.seq)
    .bind(&l.transport_id)
    .bind(l.price)
    .bind(l.mirage_score)
    .bind(l.mira_x)
    .bind(l.reinforce)
    .bind(TradeType::Active.code())
    .execute(pool)
    .await?;
    Ok(())
}

/// The ingest watermark: highest seq ever stored, 0 for an empty store.
/// Recomputed from storage at the start of every cycle rather than held in
/// memory, which is what makes restarts safe.
pub async fn max_seq(pool: &SqlitePool) -> Result<i64> {
    let max: Option<i64> = sqlx::query_scalar("SELECT MAX(seq) FROM sequence")
        .fetch_one(pool)
        .await?;
    Ok(max.unwrap_or(0))
}

/// Snapshot of every Active event, seq → transport_id. Taken at the start of
/// each completion check and discarded after use.
pub async fn pending_sales(pool: &SqlitePool) -> Result<HashMap<i64, String>> {
    let rows: Vec<(i64, String)> =
        sqlx::query_as("SELECT seq, transport_id FROM sequence WHERE trade_type = ?")
            .bind(TradeType::Active.code())
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().collect())
}

/// Active events joined with their transport's class, in seq order. Used by
/// the one-shot status updater to rebuild detail URLs.
pub async fn active_listings_with_class(pool: &SqlitePool) -> Result<Vec<(i64, String, i64)>> {
    let rows = sqlx::query_as(
        "SELECT s.seq, s.transport_id, t.class
         FROM sequence s JOIN transports t ON t.transport_id = s.transport_id
         WHERE s.trade_type = ? ORDER BY s.seq",
    )
    .bind(TradeType::Active.code())
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn mark_sold(pool: &SqlitePool, seq: i64, usd_price: f64) -> Result<()> {
    sqlx::query("UPDATE sequence SET trade_type = ?, usd_price = ? WHERE seq = ?")
        .bind(TradeType::Sold.code())
        .bind(usd_price)
        .bind(seq)
        .execute(pool)
        .await?;
    Ok(())
}

/// Apply a worker-reported trade status, but only to a row still Active.
/// Worker-derived status is advisory: it may arrive out of order with the
/// completion detector's own Sold transition and must never clobber it.
pub async fn set_trade_type_if_active(
    pool: &SqlitePool,
    seq: i64,
    trade_type: i64,
) -> Result<u64> {
    let result = sqlx::query("UPDATE sequence SET trade_type = ? WHERE seq = ? AND trade_type = ?")
        .bind(trade_type)
        .bind(seq)
        .bind(TradeType::Active.code())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn get_sequence(pool: &SqlitePool, seq: i64) -> Result<Option<SequenceRow>> {
    let row = sqlx::query_as::<_, SequenceRow>("SELECT * FROM sequence WHERE seq = ?")
        .bind(seq)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

// ── Stat-check records ───────────────────────────────────────────

/// Table names cannot be bound as parameters, so the category is validated
/// against the fixed list before being interpolated.
fn checked_category(category: &str) -> Result<&str> {
    STAT_CATEGORIES
        .iter()
        .find(|c| **c == category)
        .copied()
        .ok_or_else(|| AppError::Config(format!("unknown stat category: {category}")))
}

/// Whether an enrichment payload was already recorded for this key. Presence
/// is the fan-out idempotency signal.
pub async fn stat_record_exists(
    pool: &SqlitePool,
    category: &str,
    seq: i64,
    transport_id: &str,
) -> Result<bool> {
    let category = checked_category(category)?;
    let count: i64 = if category == "summary" {
        sqlx::query_scalar("SELECT COUNT(1) FROM summary WHERE seq = ?")
            .bind(seq)
            .fetch_one(pool)
            .await?
    } else {
        sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM {category} WHERE transport_id = ?"
        ))
        .bind(transport_id)
        .fetch_one(pool)
        .await?
    };
    Ok(count > 0)
}

pub async fn upsert_stat_record(
    pool: &SqlitePool,
    category: &str,
    seq: i64,
    transport_id: &str,
    json: &str,
) -> Result<()> {
    let category = checked_category(category)?;
    if category == "summary" {
        sqlx::query(
            "INSERT INTO summary (seq, json) VALUES (?, ?)
             ON CONFLICT (seq) DO UPDATE SET json = excluded.json",
        )
        .bind(seq)
        .bind(json)
        .execute(pool)
        .await?;
    } else {
        sqlx::query(&format!(
            "INSERT INTO {category} (transport_id, json) VALUES (?, ?)
             ON CONFLICT (transport_id) DO UPDATE SET json = excluded.json"
        ))
        .bind(transport_id)
        .bind(json)
        .execute(pool)
        .await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_memory;

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
            price: 170_000.0,
            mirage_score: 12,
            mira_x: 4,
            reinforce: 2,
        }
    }

    #[tokio::test]
    async fn upsert_transport_latest_values_win() {
        let pool = connect_memory().await;
        upsert_transport(&pool, &listing(1, "T1")).await.unwrap();

        let mut relisted = listing(2, "T1");
        relisted.level = 95;
        relisted.power_score = 130_000;
        upsert_transport(&pool, &relisted).await.unwrap();

        let row = get_transport(&pool, "T1").await.unwrap().unwrap();
        assert_eq!(row.lv, 95);
        assert_eq!(row.power_score, 130_000);
    }

    #[tokio::test]
    async fn max_seq_is_zero_on_empty_store() {
        let pool = connect_memory().await;
        assert_eq!(max_seq(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upsert_sequence_conflict_keeps_trade_type() {
        let pool = connect_memory().await;
        upsert_sequence(&pool, &listing(7, "T1")).await.unwrap();
        mark_sold(&pool, 7, 50.0).await.unwrap();

        // Replaying the same listing refreshes the price but not the state.
        let mut replay = listing(7, "T1");
        replay.price = 160_000.0;
        upsert_sequence(&pool, &replay).await.unwrap();

        let row = get_sequence(&pool, 7).await.unwrap().unwrap();
        assert_eq!(row.trade_type, TradeType::Sold.code());
        assert_eq!(row.usd_price, Some(50.0));
        assert!((row.price - 160_000.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn demote_active_only_touches_active_rows() {
        let pool = connect_memory().await;
        upsert_sequence(&pool, &listing(1, "T1")).await.unwrap();
        mark_sold(&pool, 1, 10.0).await.unwrap();
        upsert_sequence(&pool, &listing(2, "T1")).await.unwrap();

        assert_eq!(demote_active(&pool, "T1").await.unwrap(), 1);
        let sold = get_sequence(&pool, 1).await.unwrap().unwrap();
        assert_eq!(sold.trade_type, TradeType::Sold.code());
        let demoted = get_sequence(&pool, 2).await.unwrap().unwrap();
        assert_eq!(demoted.trade_type, TradeType::Superseded.code());
    }

    #[tokio::test]
    async fn set_trade_type_if_active_never_overwrites_sold() {
        let pool = connect_memory().await;
        upsert_sequence(&pool, &listing(9, "T9")).await.unwrap();
        mark_sold(&pool, 9, 42.0).await.unwrap();

        let changed = set_trade_type_if_active(&pool, 9, TradeType::Superseded.code())
            .await
            .unwrap();
        assert_eq!(changed, 0);
        let row = get_sequence(&pool, 9).await.unwrap().unwrap();
        assert_eq!(row.trade_type, TradeType::Sold.code());
    }

    #[tokio::test]
    async fn stat_record_exists_keys_summary_by_seq() {
        let pool = connect_memory().await;
        upsert_stat_record(&pool, "summary", 5, "T1", "{}").await.unwrap();
        upsert_stat_record(&pool, "stats", 5, "T1", "{}").await.unwrap();

        assert!(stat_record_exists(&pool, "summary", 5, "ignored").await.unwrap());
        assert!(!stat_record_exists(&pool, "summary", 6, "ignored").await.unwrap());
        assert!(stat_record_exists(&pool, "stats", 0, "T1").await.unwrap());
        assert!(!stat_record_exists(&pool, "stats", 0, "T2").await.unwrap());
    }

    #[tokio::test]
    async fn unknown_category_is_rejected() {
        let pool = connect_memory().await;
        let err = stat_record_exists(&pool, "transports; DROP TABLE sequence", 1, "T1").await;
        assert!(err.is_err());
    }
}
