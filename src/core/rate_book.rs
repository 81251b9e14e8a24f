use crate::domain::rates::{pair_key, RatePair, RatesSnapshot};
use crate::utils::error::{Result, ValutaError};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub const PIVOT_CURRENCY: &str = "USD";

#[derive(Debug, Clone, PartialEq)]
pub struct RateQuote {
    pub from: String,
    pub to: String,
    pub rate: f64,
    pub source: String,
    pub updated_at: DateTime<Utc>,
}

/// 匯率查詢：新鮮快取 -> 預設匯率表 -> 經 USD 交叉換算
pub struct RateBook {
    cached: Option<RatesSnapshot>,
    defaults: BTreeMap<String, f64>,
    now: DateTime<Utc>,
}

impl RateBook {
    /// 過期的快取完全不使用
    pub fn new(
        snapshot: RatesSnapshot,
        defaults: BTreeMap<String, f64>,
        ttl_seconds: u64,
        now: DateTime<Utc>,
    ) -> Self {
        let cached = snapshot.is_fresh(now, ttl_seconds).then_some(snapshot);
        if cached.is_none() {
            tracing::debug!("📉 Rate cache is stale or empty, using default rates");
        }
        Self {
            cached,
            defaults,
            now,
        }
    }

    pub fn is_cache_fresh(&self) -> bool {
        self.cached.is_some()
    }

    pub fn resolve(&self, from: &str, to: &str) -> Result<RateQuote> {
        let from = from.trim().to_ascii_uppercase();
        let to = to.trim().to_ascii_uppercase();

        if from == to {
            return Ok(self.quote(&from, &to, 1.0, "identity", self.now));
        }

        if let Some(quote) = self.direct(&from, &to) {
            return Ok(quote);
        }

        if from != PIVOT_CURRENCY && to != PIVOT_CURRENCY {
            if let (Some(first), Some(second)) = (
                self.direct(&from, PIVOT_CURRENCY),
                self.direct(PIVOT_CURRENCY, &to),
            ) {
                let updated_at = first.updated_at.min(second.updated_at);
                return Ok(self.quote(
                    &from,
                    &to,
                    first.rate * second.rate,
                    &format!("cross:{}", PIVOT_CURRENCY),
                    updated_at,
                ));
            }
        }

        Err(ValutaError::CurrencyNotFound {
            code: format!("{}->{}", from, to),
        })
    }

    /// 轉換失敗時回傳 `None`，供估值使用
    pub fn rate(&self, from: &str, to: &str) -> Option<f64> {
        self.resolve(from, to).ok().map(|q| q.rate)
    }

    fn direct(&self, from: &str, to: &str) -> Option<RateQuote> {
        if let Some(snapshot) = &self.cached {
            if let Some(pair) = usable(snapshot.pair(from, to)) {
                return Some(self.quote(from, to, pair.rate, &pair.source, pair.updated_at));
            }
            if let Some(pair) = usable(snapshot.pair(to, from)) {
                return Some(self.quote(
                    from,
                    to,
                    1.0 / pair.rate,
                    "reverse_calculation",
                    pair.updated_at,
                ));
            }
        }

        if let Some(rate) = self.defaults.get(&pair_key(from, to)).filter(|r| **r > 0.0) {
            return Some(self.quote(from, to, *rate, "default", self.now));
        }
        if let Some(rate) = self.defaults.get(&pair_key(to, from)).filter(|r| **r > 0.0) {
            return Some(self.quote(from, to, 1.0 / rate, "default", self.now));
        }
        None
    }

    fn quote(
        &self,
        from: &str,
        to: &str,
        rate: f64,
        source: &str,
        updated_at: DateTime<Utc>,
    ) -> RateQuote {
        RateQuote {
            from: from.to_string(),
            to: to.to_string(),
            rate,
            source: source.to_string(),
            updated_at,
        }
    }
}

fn usable(pair: Option<&RatePair>) -> Option<&RatePair> {
    pair.filter(|p| p.rate.is_finite() && p.rate > 0.0)
}
