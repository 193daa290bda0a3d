use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::queue::QueueConsumer;
use crate::types::{StatCheckJob, TradeType};

/// Consumes stat-check jobs: fetches the detail payload, stores it raw under
/// the category's table, and for `summary` feeds the reported trade status
/// back onto the sequence event. Acks only after every write has landed.
pub struct StatCheckWorker {
    pool: SqlitePool,
    client: reqwest::Client,
}

impl StatCheckWorker {
    pub fn new(pool: SqlitePool, client: reqwest::Client) -> Self {
        Self { pool, client }
    }

    /// Consume until the queue connection fails. A failed job is logged and
    /// left unacked for broker redelivery; it never kills the process.
    pub async fn run(&self, consumer: &mut QueueConsumer) -> Result<()> {
        let recovered = consumer.recover().await?;
        if recovered > 0 {
            info!(recovered, "requeued in-flight jobs from a previous run");
        }

        loop {
            let delivery = match consumer.receive().await {
                Ok(Some(d)) => d,
                Ok(None) => continue,
                // Malformed bodies are already dropped by the consumer.
                Err(AppError::Json(_)) => continue,
                Err(e) => return Err(e),
            };

            match self.on_job(&delivery.job).await {
                Ok(()) => consumer.ack(&delivery).await?,
                Err(e) => {
                    warn!(
                        seq = delivery.job.seq,
                        stat_check = %delivery.job.stat_check,
                        "stat check failed, leaving unacked: {e}"
                    );
                }
            }
        }
    }

    pub async fn on_job(&self, job: &StatCheckJob) -> Result<()> {
        debug!(seq = job.seq, stat_check = %job.stat_check, "fetching stat check");
        let payload = self
            .client
            .get(&job.stat_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        queries::upsert_stat_record(
            &self.pool,
            &job.stat_check,
            job.seq,
            &job.transport_id,
            &payload,
        )
        .await?;

        if job.stat_check == "summary" {
            self.apply_summary_status(job.seq, &payload).await?;
        }
        Ok(())
    }

    /// Propagate the trade status reported by the summary payload, guarded
    /// so it only ever transitions an event out of Active. The completion
    /// detector's Sold write (with its USD valuation) always wins a race.
    async fn apply_summary_status(&self, seq: i64, payload: &str) -> Result<()> {
        let Some(code) = summary_trade_type(payload) else {
            return Ok(());
        };
        if TradeType::from_code(code).is_none() {
            warn!(seq, code, "summary reported an unknown trade status");
            return Ok(());
        }
        let changed = queries::set_trade_type_if_active(&self.pool, seq, code).await?;
        if changed > 0 {
            debug!(seq, code, "trade status updated from summary");
        }
        Ok(())
    }
}

/// Extract `data.tradeType` from a summary payload. Absent or unparseable
/// values mean "nothing to propagate", not an error — the raw payload is
/// stored either way.
pub fn summary_trade_type(payload: &str) -> Option<i64> {
    let v: serde_json::Value = serde_json::from_str(payload).ok()?;
    let t = v.get("data")?.get("tradeType")?;
    t.as_i64().or_else(|| t.as_str().and_then(|s| s.parse().ok()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
