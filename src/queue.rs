use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::config::QUEUE_POP_TIMEOUT_SECS;
use crate::error::{AppError, Result};
use crate::types::StatCheckJob;

/// Publish seam for the fan-out path. The ingesters only ever push jobs, so
/// this is all they see; tests substitute an in-memory sink.
#[async_trait]
pub trait JobSink: Send + Sync {
    async fn publish(&self, job: &StatCheckJob) -> Result<()>;
}

/// Redis-list realization of the `stat_checker` queue.
///
/// At-least-once contract: publish = LPUSH onto the queue list; consume =
/// BRPOPLPUSH into a per-consumer processing list; ack = LREM from that list
/// after the job's writes land. Each consumer instance owns its processing
/// list, so recovery never steals a live sibling's in-flight deliveries;
/// messages a worker died holding are pushed back onto the queue by
/// `recover()` when an instance with the same label restarts.
pub struct RedisQueue {
    client: redis::Client,
    con: MultiplexedConnection,
    queue: String,
}

fn processing_key(queue: &str, instance: &str) -> String {
    format!("{queue}:processing:{instance}")
}

impl RedisQueue {
    pub async fn connect(url: &str, queue: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let con = client.get_multiplexed_async_connection().await?;
        Ok(Self { client, con, queue: queue.to_string() })
    }

    /// Open a dedicated consumer connection for this instance. Blocking pops
    /// must not share the multiplexed publish connection.
    pub async fn consumer(&self, instance: &str) -> Result<QueueConsumer> {
        let con = self.client.get_async_connection().await?;
        Ok(QueueConsumer {
            con,
            queue: self.queue.clone(),
            processing: processing_key(&self.queue, instance),
        })
    }
}

#[async_trait]
impl JobSink for RedisQueue {
    async fn publish(&self, job: &StatCheckJob) -> Result<()> {
        let body = serde_json::to_string(job)?;
        let mut con = self.con.clone();
        let _: i64 = con
            .lpush(&self.queue, body)
            .await
            .map_err(|e| AppError::Publish(e.to_string()))?;
        debug!(seq = job.seq, stat_check = %job.stat_check, "published stat check");
        Ok(())
    }
}

/// One in-flight message: the parsed job plus the exact raw body needed to
/// remove it from the processing list on ack.
pub struct Delivery {
    pub job: StatCheckJob,
    raw: String,
}

pub struct QueueConsumer {
    con: redis::aio::Connection,
    queue: String,
    processing: String,
}

impl QueueConsumer {
    /// Requeue messages left in this instance's processing list by a
    /// previous run.
    pub async fn recover(&mut self) -> Result<usize> {
        let mut moved = 0;
        loop {
            let item: Option<String> = self.con.rpoplpush(&self.processing, &self.queue).await?;
            if item.is_none() {
                break;
            }
            moved += 1;
        }
        Ok(moved)
    }

    /// Block for the next job, up to the pop timeout. A malformed body is
    /// dropped from the processing list before the error is returned, so it
    /// cannot wedge the queue through endless redelivery.
    pub async fn receive(&mut self) -> Result<Option<Delivery>> {
        let raw: Option<String> = self
            .con
            .brpoplpush(&self.queue, &self.processing, QUEUE_POP_TIMEOUT_SECS)
            .await?;
        let Some(raw) = raw else { return Ok(None) };

        match serde_json::from_str::<StatCheckJob>(&raw) {
            Ok(job) => Ok(Some(Delivery { job, raw })),
            Err(e) => {
                warn!("dropping malformed queue message: {e}");
                let _: i64 = self.con.lrem(&self.processing, 1, &raw).await?;
                Err(e.into())
            }
        }
    }

    /// Acknowledge after all writes succeeded. An unacked message survives in
    /// the processing list for recovery.
    pub async fn ack(&mut self, delivery: &Delivery) -> Result<()> {
        let _: i64 = self.con.lrem(&self.processing, 1, &delivery.raw).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Test sink
// ---------------------------------------------------------------------------

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Collects published jobs in memory; optionally fails after N publishes
    /// to exercise abort-on-publish-failure paths.
    #[derive(Default)]
    pub struct MemorySink {
        pub published: Mutex<Vec<StatCheckJob>>,
        pub fail_after: Option<usize>,
    }

    impl MemorySink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_after(n: usize) -> Self {
            Self { published: Mutex::new(Vec::new()), fail_after: Some(n) }
        }

        pub fn count(&self) -> usize {
            self.published.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl JobSink for MemorySink {
        async fn publish(&self, job: &StatCheckJob) -> Result<()> {
            let mut published = self.published.lock().unwrap();
            if let Some(n) = self.fail_after {
                if published.len() >= n {
                    return Err(AppError::Publish("sink full".into()));
                }
            }
            published.push(job.clone());
            Ok(())
        }
    }

    #[test]
    fn pop_timeout_is_fractional_seconds() {
        // BRPOPLPUSH takes its timeout as float seconds.
        let timeout: f64 = QUEUE_POP_TIMEOUT_SECS;
        assert!(timeout > 0.0);
    }

    #[test]
    fn processing_list_is_per_instance() {
        assert_eq!(processing_key("stat_checker", "0"), "stat_checker:processing:0");
        assert_ne!(
            processing_key("stat_checker", "a"),
            processing_key("stat_checker", "b"),
        );
    }

    #[test]
    fn job_wire_format_matches_workers() {
        let job = StatCheckJob {
            seq: 7,
            transport_id: "T1".to_string(),
            stat_check: "summary".to_string(),
            stat_url: "https://example.test/character/summary".to_string(),
        };
        let body = serde_json::to_string(&job).unwrap();
        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["transportID"], "T1");
        assert_eq!(v["stat_check"], "summary");
        let back: StatCheckJob = serde_json::from_str(&body).unwrap();
        assert_eq!(back, job);
    }
}
