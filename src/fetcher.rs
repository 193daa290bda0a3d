use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::config::{Config, HTTP_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::types::{FeedListing, FeedPage, RateEntry, RecentSale};

pub fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()?)
}

/// Fetch one page of the for-sale listings feed. `sort` is "latest" for the
/// live poll, "oldest" for the bootstrap walk.
pub async fn fetch_sale_page(
    client: &reqwest::Client,
    cfg: &Config,
    sort: &str,
    page: u32,
) -> Result<FeedPage> {
    let url = cfg.lists_url(sort, page);
    debug!(%url, "fetching sale page");
    let resp: serde_json::Value = client.get(&url).send().await?.json().await?;
    parse_feed_page(&resp)
}

/// Fetch the recent-activity feed (mixed trade types, page 1).
pub async fn fetch_recent_sales(client: &reqwest::Client, cfg: &Config) -> Result<Vec<RecentSale>> {
    let url = cfg.recent_url();
    debug!(%url, "fetching recent activity");
    let resp: serde_json::Value = client.get(&url).send().await?.json().await?;
    parse_recent_sales(&resp)
}

/// Fetch the daily exchange-rate series from the wallet API.
pub async fn fetch_rate_series(client: &reqwest::Client, cfg: &Config) -> Result<Vec<RateEntry>> {
    debug!(url = %cfg.wallet_api_url, "fetching rate series");
    let resp: serde_json::Value = client
        .post(&cfg.wallet_api_url)
        .header("Content-Type", "application/json")
        .send()
        .await?
        .json()
        .await?;
    parse_rate_series(&resp)
}

/// Validate and parse a sale-feed page: `{ data: { lists: [...], more: bool } }`.
/// Any entry missing a required field fails the whole page — a malformed feed
/// is an upstream problem, not something to half-ingest.
pub fn parse_feed_page(v: &serde_json::Value) -> Result<FeedPage> {
    let data = v
        .get("data")
        .ok_or_else(|| AppError::Shape("sale feed missing data".into()))?;
    let items = data
        .get("lists")
        .and_then(|l| l.as_array())
        .ok_or_else(|| AppError::Shape("sale feed missing data.lists array".into()))?;
    let more = data.get("more").and_then(|m| m.as_bool()).unwrap_or(false);

    let mut lists = Vec::with_capacity(items.len());
    for item in items {
        lists.push(parse_feed_listing(item)?);
    }
    Ok(FeedPage { lists, more })
}

fn parse_feed_listing(v: &serde_json::Value) -> Result<FeedListing> {
    let field = |name: &str| {
        v.get(name)
            .ok_or_else(|| AppError::Shape(format!("listing missing {name}")))
    };
    Ok(FeedListing {
        seq: as_i64(field("seq")?)
            .ok_or_else(|| AppError::Shape("listing seq not an integer".into()))?,
        transport_id: as_id(field("transportID")?)
            .ok_or_else(|| AppError::Shape("listing transportID unusable".into()))?,
        nft_id: as_id(field("nftID")?)
            .ok_or_else(|| AppError::Shape("listing nftID unusable".into()))?,
        sealed_dt: as_timestamp(field("sealedDT")?)
            .ok_or_else(|| AppError::Shape("listing sealedDT unusable".into()))?,
        character_name: field("characterName")?
            .as_str()
            .unwrap_or_default()
            .to_string(),
        class: as_i64(field("class")?)
            .ok_or_else(|| AppError::Shape("listing class not an integer".into()))?,
        level: as_i64(field("lv")?)
            .ok_or_else(|| AppError::Shape("listing lv not an integer".into()))?,
        power_score: as_i64(field("powerScore")?)
            .ok_or_else(|| AppError::Shape("listing powerScore not an integer".into()))?,
        price: as_f64(field("price")?)
            .ok_or_else(|| AppError::Shape("listing price not numeric".into()))?,
        mirage_score: as_i64(field("MirageScore")?).unwrap_or(0),
        mira_x: as_i64(field("MiraX")?).unwrap_or(0),
        reinforce: as_i64(field("Reinforce")?).unwrap_or(0),
    })
}

/// Validate and parse the recent-activity page. The completion-relevant
/// fields live under each entry's `info` object; entries without an
/// `info.seq` are other listing types and are skipped.
pub fn parse_recent_sales(v: &serde_json::Value) -> Result<Vec<RecentSale>> {
    let items = v
        .get("data")
        .and_then(|d| d.get("lists"))
        .and_then(|l| l.as_array())
        .ok_or_else(|| AppError::Shape("recent feed missing data.lists array".into()))?;

    let mut sales = Vec::new();
    for item in items {
        let Some(info) = item.get("info") else { continue };
        let Some(seq) = info.get("seq").and_then(as_i64) else { continue };
        let price = info
            .get("price")
            .and_then(as_f64)
            .ok_or_else(|| AppError::Shape(format!("recent entry {seq} missing price")))?;
        let trade_ts = info
            .get("tradeDT")
            .and_then(as_timestamp)
            .ok_or_else(|| AppError::Shape(format!("recent entry {seq} missing tradeDT")))?;
        sales.push(RecentSale { seq, price, trade_ts });
    }
    Ok(sales)
}

/// Validate and parse the rate feed: `{ Data: [ { CreatedDT, USDWemixRate } ] }`.
/// Entries with an unparseable timestamp or rate fail the refresh.
pub fn parse_rate_series(v: &serde_json::Value) -> Result<Vec<RateEntry>> {
    let items = v
        .get("Data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| AppError::Shape("rate feed missing Data array".into()))?;

    let mut series = Vec::with_capacity(items.len());
    for item in items {
        let ts = item
            .get("CreatedDT")
            .and_then(as_timestamp)
            .ok_or_else(|| AppError::Shape("rate entry missing CreatedDT".into()))?;
        let usd_rate = item
            .get("USDWemixRate")
            .and_then(as_f64)
            .ok_or_else(|| AppError::Shape("rate entry missing USDWemixRate".into()))?;
        series.push(RateEntry { ts, usd_rate });
    }
    Ok(series)
}

// ---------------------------------------------------------------------------
// Lenient scalar extraction — the upstream feed serializes numbers as both
// JSON numbers and digit strings depending on the field and the day.
// ---------------------------------------------------------------------------

fn as_i64(v: &serde_json::Value) -> Option<i64> {
    v.as_i64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

fn as_f64(v: &serde_json::Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Identifiers arrive as numbers or strings; normalize to a string key.
fn as_id(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Timestamps arrive either as Unix seconds or as `"YYYY-MM-DD HH:MM:SS"`
/// (UTC) strings.
fn as_timestamp(v: &serde_json::Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    let s = v.as_str()?.trim();
    if let Ok(n) = s.parse::<i64>() {
        return Some(n);
    }
    parse_upstream_dt(s)
}

/// Parse an upstream `"YYYY-MM-DD HH:MM:SS"` (or date-only) string as UTC
/// Unix seconds.
pub fn parse_upstream_dt(s: &str) -> Option<i64> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc().timestamp());
    }
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn feed_page_parses_mixed_number_and_string_fields() {
        let v = json!({
            "data": {
                "lists": [{
                    "seq": "101",
                    "transportID": 555,
                    "nftID": "0xabc",
                    "sealedDT": 1675227600,
                    "characterName": "Karnin",
                    "class": 3,
                    "lv": "80",
                    "powerScore": 105000,
                    "price": "170000",
                    "MirageScore": 12,
                    "MiraX": 4,
                    "Reinforce": 2
                }],
                "more": true
            }
        });
        let page = parse_feed_page(&v).unwrap();
        assert!(page.more);
        assert_eq!(page.lists.len(), 1);
        let l = &page.lists[0];
        assert_eq!(l.seq, 101);
        assert_eq!(l.transport_id, "555");
        assert_eq!(l.level, 80);
        assert!((l.price - 170000.0).abs() < 1e-9);
    }

    #[test]
    fn feed_page_missing_lists_is_shape_error() {
        let v = json!({ "data": { "count": 3 } });
        assert!(matches!(parse_feed_page(&v), Err(AppError::Shape(_))));
    }

    #[test]
    fn feed_listing_missing_seq_is_shape_error() {
        let v = json!({
            "data": { "lists": [{ "transportID": "1" }], "more": false }
        });
        assert!(matches!(parse_feed_page(&v), Err(AppError::Shape(_))));
    }

    #[test]
    fn recent_sales_skip_entries_without_info_seq() {
        let v = json!({
            "data": {
                "lists": [
                    { "seq": 1 },
                    { "info": { "seq": 7, "price": 100, "tradeDT": "2023-02-01 05:00:00" } }
                ],
                "more": false
            }
        });
        let sales = parse_recent_sales(&v).unwrap();
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].seq, 7);
        assert!((sales[0].price - 100.0).abs() < 1e-9);
        assert_eq!(sales[0].trade_ts, 1675227600);
    }

    #[test]
    fn rate_series_parses_datetime_strings() {
        let v = json!({
            "Data": [
                { "CreatedDT": "2023-02-02 00:00:00", "USDWemixRate": "1.25" },
                { "CreatedDT": "2023-02-01 00:00:00", "USDWemixRate": 1.10 }
            ]
        });
        let series = parse_rate_series(&v).unwrap();
        assert_eq!(series.len(), 2);
        assert!((series[0].usd_rate - 1.25).abs() < 1e-9);
        assert!(series[0].ts > series[1].ts);
    }

    #[test]
    fn upstream_dt_parses_date_only() {
        assert_eq!(parse_upstream_dt("1970-01-02"), Some(86400));
    }
}
