use crate::adapters::database::Database;
use crate::domain::ports::{RatesSource, Storage};
use crate::domain::rates::{RatesSnapshot, SourceRates};
use crate::utils::error::{Result, ValutaError};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateReport {
    pub pairs_count: usize,
    pub last_refresh: DateTime<Utc>,
    pub sources: Vec<String>,
    pub errors: Vec<String>,
}

/// 依序向每個來源抓取匯率，合併後寫入快取與歷史
pub struct RatesUpdater {
    sources: Vec<Box<dyn RatesSource>>,
}

impl RatesUpdater {
    pub fn new(sources: Vec<Box<dyn RatesSource>>) -> Self {
        Self { sources }
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub async fn run<S: Storage>(&self, db: &Database<S>) -> Result<UpdateReport> {
        tracing::info!("🚀 Starting rates update from {} sources", self.sources.len());

        let mut collected = Vec::new();
        let mut errors = Vec::new();

        for source in &self.sources {
            match source.fetch_rates().await {
                Ok(rates) if !rates.is_empty() => {
                    tracing::info!("📥 Got {} rates from {}", rates.rates.len(), source.name());
                    collected.push(rates);
                }
                Ok(_) => {
                    tracing::warn!("⚠️ {} returned no rates", source.name());
                    errors.push(format!("{}: no data", source.name()));
                }
                Err(e) => {
                    tracing::warn!("⚠️ Error from {}: {}", source.name(), e);
                    errors.push(format!("{}: {}", source.name(), e));
                }
            }
        }

        if collected.is_empty() {
            return Err(ValutaError::api(format!(
                "failed to get rates from any source: {}",
                errors.join("; ")
            )));
        }

        let snapshot = merge_rates(&collected, Utc::now());
        db.save_rates_snapshot(&snapshot).await?;
        db.append_history(&snapshot).await?;

        tracing::info!("✅ Updated {} rates", snapshot.pairs.len());
        Ok(UpdateReport {
            pairs_count: snapshot.pairs.len(),
            last_refresh: snapshot.last_refresh,
            sources: collected.into_iter().map(|r| r.source).collect(),
            errors,
        })
    }
}

/// 後面的來源覆蓋相同的匯率對
pub fn merge_rates(sources: &[SourceRates], now: DateTime<Utc>) -> RatesSnapshot {
    let mut pairs = BTreeMap::new();
    for source in sources {
        pairs.extend(source.rates.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    RatesSnapshot {
        last_refresh: now,
        source: "merged".to_string(),
        pairs,
    }
}
