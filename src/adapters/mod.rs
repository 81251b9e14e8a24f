// Adapters layer: concrete implementations for external systems (files, http).

pub mod database;
pub mod http;
pub mod storage;

pub use database::Database;
pub use http::{default_sources, CoinGeckoClient, ExchangeRateApiClient};
pub use storage::LocalStorage;
