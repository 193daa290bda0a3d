use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Trade lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle state of a sequence event. Stored as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeType {
    /// Currently listed for sale.
    Active = 1,
    /// Replaced by a newer active listing for the same transport.
    Superseded = 2,
    /// Completed trade with a recorded USD value.
    Sold = 3,
}

impl TradeType {
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(TradeType::Active),
            2 => Some(TradeType::Superseded),
            3 => Some(TradeType::Sold),
            _ => None,
        }
    }
}

impl std::fmt::Display for TradeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TradeType::Active => "active",
            TradeType::Superseded => "superseded",
            TradeType::Sold => "sold",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Sale feed
// ---------------------------------------------------------------------------

/// One entry of the for-sale listings feed, validated at the boundary.
/// `seq` is the strictly increasing event id assigned upstream;
/// `transport_id` identifies the item independent of its listing history.
#[derive(Debug, Clone)]
pub struct FeedListing {
    pub seq: i64,
    pub transport_id: String,
    pub nft_id: String,
    pub sealed_dt: i64,
    pub character_name: String,
    pub class: i64,
    pub level: i64,
    pub power_score: i64,
    pub price: f64,
    pub mirage_score: i64,
    pub mira_x: i64,
    pub reinforce: i64,
}

/// One page of the sale feed plus the upstream "more pages" flag.
#[derive(Debug, Clone)]
pub struct FeedPage {
    pub lists: Vec<FeedListing>,
    pub more: bool,
}

/// A recent-activity entry reduced to the fields completion detection needs.
/// `trade_ts` is the Unix timestamp of the trade.
#[derive(Debug, Clone)]
pub struct RecentSale {
    pub seq: i64,
    pub price: f64,
    pub trade_ts: i64,
}

// ---------------------------------------------------------------------------
// Stat-check fan-out
// ---------------------------------------------------------------------------

/// Queue message body for one enrichment job. Field names match the wire
/// format the workers were built against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatCheckJob {
    pub seq: i64,
    #[serde(rename = "transportID")]
    pub transport_id: String,
    pub stat_check: String,
    pub stat_url: String,
}

// ---------------------------------------------------------------------------
// Exchange rates
// ---------------------------------------------------------------------------

/// One point of the daily USD rate series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateEntry {
    /// Unix timestamp the rate took effect.
    pub ts: i64,
    pub usd_rate: f64,
}
