use tokio::sync::RwLock;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::fetcher;
use crate::types::RateEntry;

/// Process-local cache of the daily USD rate series. Rebuilt wholesale on
/// every refresh — never merged, never persisted. A restart simply waits for
/// the first slow tick to repopulate it.
pub struct RateCache {
    /// Strictly descending by timestamp. Lookup depends on this ordering.
    series: RwLock<Vec<RateEntry>>,
}

impl RateCache {
    pub fn new() -> Self {
        Self { series: RwLock::new(Vec::new()) }
    }

    /// Fetch the daily rate feed and replace the stored series. Incoming
    /// order is not trusted; the series is re-sorted newest-first.
    pub async fn refresh(&self, client: &reqwest::Client, cfg: &Config) -> Result<()> {
        let mut series = fetcher::fetch_rate_series(client, cfg).await?;
        series.sort_by(|a, b| b.ts.cmp(&a.ts));
        info!(points = series.len(), "exchange-rate series refreshed");
        *self.series.write().await = series;
        Ok(())
    }

    /// The most recent rate in effect at or before `ts`. If `ts` predates
    /// every entry the oldest known rate is returned — a deliberate policy:
    /// a stale-but-real rate beats refusing to value an old trade. Returns
    /// None only when the series has never been loaded.
    pub async fn rate_at(&self, ts: i64) -> Option<f64> {
        let series = self.series.read().await;
        for entry in series.iter() {
            if ts >= entry.ts {
                return Some(entry.usd_rate);
            }
        }
        series.last().map(|e| e.usd_rate)
    }

    #[cfg(test)]
    pub async fn set_series(&self, mut series: Vec<RateEntry>) {
        series.sort_by(|a, b| b.ts.cmp(&a.ts));
        *self.series.write().await = series;
    }
}

impl Default for RateCache {
    fn default() -> Self {
        Self::new()
    }
}

/// USD valuation of a trade: listed price times the rate in effect at the
/// trade timestamp, rounded to cents.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
