use crate::error::Result;

pub const MARKET_API_URL: &str = "https://webapi.mir4global.com/nft";
pub const WALLET_API_URL: &str = "https://api.mir4global.com/wallet/prices/draco/daily";
pub const REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Fast tick: one listings page + completion check (seconds).
pub const INGEST_INTERVAL_SECS: u64 = 15;

/// Slow tick: exchange-rate series refresh (seconds).
pub const RATE_REFRESH_INTERVAL_SECS: u64 = 300;

/// HTTP client timeout for all upstream calls (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Queue the stat-check fan-out publishes to and the workers consume from.
pub const STAT_QUEUE: &str = "stat_checker";

/// Blocking-pop timeout for the consumer side (seconds, fractional per the
/// Redis command). Bounded so the worker loop can notice shutdown signals
/// between polls.
pub const QUEUE_POP_TIMEOUT_SECS: f64 = 5.0;

/// The 14 per-listing enrichment categories. `summary` is keyed by seq in
/// storage; every other category is keyed by transport_id.
pub const STAT_CATEGORIES: &[&str] = &[
    "summary", "inven", "skills", "stats", "spirit",
    "magicorb", "magicstone", "mysticalpiece", "building",
    "training", "holystuff", "assets", "potential", "codex",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub market_api_url: String,
    pub wallet_api_url: String,
    pub redis_url: String,
    pub log_level: String,
    pub db_path: String,
    /// Label distinguishing parallel instances in diagnostics. First
    /// positional argument; purely informational.
    pub instance: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            market_api_url: std::env::var("MARKET_API_URL")
                .unwrap_or_else(|_| MARKET_API_URL.to_string()),
            wallet_api_url: std::env::var("WALLET_API_URL")
                .unwrap_or_else(|_| WALLET_API_URL.to_string()),
            redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| REDIS_URL.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "indexer.db".to_string()),
            instance: std::env::args().nth(1).unwrap_or_else(|| "0".to_string()),
        })
    }

    /// Listings page URL. `sort` is "latest" for the live poll and "oldest"
    /// for the bootstrap walk; the numeric range filters are left wide open.
    pub fn lists_url(&self, sort: &str, page: u32) -> String {
        format!(
            "{}/lists?listType=sale&class=0&levMin=0&levMax=0&powerMin=0&powerMax=0\
             &priceMin=0&priceMax=0&sort={sort}&page={page}&languageCode=en",
            self.market_api_url,
        )
    }

    /// Recent-activity feed: mixed trade types, page 1 only.
    pub fn recent_url(&self) -> String {
        format!(
            "{}/lists?listType=recent&page=1&class=0&levMin=0&levMax=0&powerMin=0\
             &powerMax=0&priceMin=0&priceMax=0&languageCode=en",
            self.market_api_url,
        )
    }

    /// Per-category character detail endpoint.
    pub fn stat_url(&self, category: &str, seq: i64, transport_id: &str, class: i64) -> String {
        format!(
            "{}/character/{category}?seq={seq}&transportID={transport_id}&class={class}&languageCode=en",
            self.market_api_url,
        )
    }
}
