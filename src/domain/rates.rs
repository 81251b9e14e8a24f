use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `FROM_TO`：1 單位 FROM 等於 rate 單位 TO
pub fn pair_key(from: &str, to: &str) -> String {
    format!(
        "{}_{}",
        from.trim().to_ascii_uppercase(),
        to.trim().to_ascii_uppercase()
    )
}

pub fn split_pair_key(key: &str) -> Option<(&str, &str)> {
    let (from, to) = key.split_once('_')?;
    if from.is_empty() || to.is_empty() {
        return None;
    }
    Some((from, to))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatePair {
    pub rate: f64,
    pub updated_at: DateTime<Utc>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatesSnapshot {
    pub last_refresh: DateTime<Utc>,
    pub source: String,
    #[serde(default)]
    pub pairs: BTreeMap<String, RatePair>,
}

impl RatesSnapshot {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            last_refresh: now,
            source: "system".to_string(),
            pairs: BTreeMap::new(),
        }
    }

    pub fn pair(&self, from: &str, to: &str) -> Option<&RatePair> {
        self.pairs.get(&pair_key(from, to))
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, ttl_seconds: u64) -> bool {
        if self.pairs.is_empty() {
            return false;
        }
        match i64::try_from(ttl_seconds) {
            Ok(ttl) => now.signed_duration_since(self.last_refresh).num_seconds() <= ttl,
            Err(_) => true,
        }
    }

    /// 快取中出現過的所有貨幣代碼
    pub fn currencies(&self) -> Vec<String> {
        let mut codes: Vec<String> = self
            .pairs
            .keys()
            .filter_map(|key| split_pair_key(key))
            .flat_map(|(from, to)| [from.to_string(), to.to_string()])
            .collect();
        codes.sort();
        codes.dedup();
        codes
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub data: RatesSnapshot,
}

/// 單一 API 來源的抓取結果
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRates {
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub rates: BTreeMap<String, RatePair>,
}

impl SourceRates {
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}
