//! Database row types used by the typed queries.

#[derive(Debug, sqlx::FromRow)]
pub struct TransportRow {
    pub transport_id: String,
    pub nft_id: String,
    pub sealed_dt: i64,
    pub character_name: String,
    pub class: i64,
    pub lv: i64,
    pub power_score: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct SequenceRow {
    pub seq: i64,
    pub transport_id: String,
    pub price: f64,
    pub mirage_score: i64,
    pub mira_x: i64,
    pub reinforce: i64,
    pub trade_type: i64,
    pub usd_price: Option<f64>,
}
