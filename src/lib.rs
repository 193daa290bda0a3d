pub mod completion;
pub mod config;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod ingest;
pub mod queue;
pub mod rates;
pub mod types;
pub mod worker;
