use crate::config::ParserConfig;
use crate::domain::ports::RatesSource;
use crate::domain::rates::{pair_key, RatePair, SourceRates};
use crate::utils::error::{Result, ValutaError};
use crate::utils::retry::retry_on_failure;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;

pub const USER_AGENT: &str = "ValutatradeHub/1.0";

/// 兩個匯率 API 共用的 HTTP 行為：標頭、逾時、重試、錯誤轉換
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl ApiClient {
    pub fn new(config: &ParserConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            retry_attempts: config.retry_attempts,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    pub async fn get_json(
        &self,
        label: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value> {
        retry_on_failure(label, self.retry_attempts, self.retry_delay, move || {
            self.request_once(url, query)
        })
        .await
    }

    async fn request_once(&self, url: &str, query: &[(&str, String)]) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        tracing::debug!("📡 API response status: {}", status);

        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            // ExchangeRate-API 錯誤時仍回傳 JSON，帶有 error-type
            let detail = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("error-type").and_then(|t| t.as_str()).map(str::to_string));
            return Err(match detail {
                Some(kind) => ValutaError::api(format!("HTTP error {} ({})", status.as_u16(), kind)),
                None => ValutaError::api(format!("HTTP error {}", status.as_u16())),
            });
        }

        serde_json::from_str(&body).map_err(|e| ValutaError::api(format!("invalid JSON: {}", e)))
    }
}

fn transport_error(e: reqwest::Error) -> ValutaError {
    if e.is_timeout() {
        ValutaError::api("request timed out")
    } else {
        ValutaError::api(format!("request failed: {}", e))
    }
}

/// CoinGecko simple/price：加密貨幣對 USD
pub struct CoinGeckoClient {
    api: ApiClient,
    url: String,
    crypto_ids: BTreeMap<String, String>,
}

impl CoinGeckoClient {
    pub fn new(config: &ParserConfig) -> Result<Self> {
        Ok(Self {
            api: ApiClient::new(config)?,
            url: config.coingecko_url.clone(),
            crypto_ids: config.crypto_ids.clone(),
        })
    }

    fn parse(&self, data: &serde_json::Value) -> Result<SourceRates> {
        let Some(prices) = data.as_object() else {
            return Err(ValutaError::api("CoinGecko: unexpected response shape"));
        };

        let timestamp = Utc::now();
        let mut rates = BTreeMap::new();

        for (code, gecko_id) in &self.crypto_ids {
            let usd = prices
                .get(gecko_id)
                .and_then(|entry| entry.get("usd"))
                .and_then(|v| v.as_f64());
            match usd {
                Some(rate) if rate > 0.0 => {
                    rates.insert(
                        pair_key(code, "USD"),
                        RatePair {
                            rate,
                            updated_at: timestamp,
                            source: self.name().to_string(),
                            from: None,
                            to: None,
                        },
                    );
                }
                _ => tracing::debug!("🪙 CoinGecko returned no USD price for {}", gecko_id),
            }
        }

        Ok(SourceRates {
            source: self.name().to_string(),
            timestamp,
            rates,
        })
    }
}

#[async_trait]
impl RatesSource for CoinGeckoClient {
    fn name(&self) -> &str {
        "coingecko"
    }

    async fn fetch_rates(&self) -> Result<SourceRates> {
        let ids = self
            .crypto_ids
            .values()
            .cloned()
            .collect::<Vec<_>>()
            .join(",");

        tracing::debug!("📡 Requesting CoinGecko prices for: {}", ids);
        let query = [("ids", ids), ("vs_currencies", "usd".to_string())];
        let data = self.api.get_json("CoinGecko", &self.url, &query).await?;
        self.parse(&data)
    }
}

/// ExchangeRate-API v6 latest：法幣對基準貨幣，同時產生反向匯率
pub struct ExchangeRateApiClient {
    api: ApiClient,
    base_url: String,
    api_key: Option<String>,
    base_currency: String,
}

impl ExchangeRateApiClient {
    pub fn new(config: &ParserConfig) -> Result<Self> {
        Ok(Self {
            api: ApiClient::new(config)?,
            base_url: config.exchangerate_api_url.trim_end_matches('/').to_string(),
            api_key: config.exchangerate_api_key.clone(),
            base_currency: config.base_currency.trim().to_ascii_uppercase(),
        })
    }

    fn parse(&self, data: &serde_json::Value) -> Result<SourceRates> {
        let result = data.get("result").and_then(|v| v.as_str());
        if result != Some("success") {
            let error_type = data
                .get("error-type")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            return Err(ValutaError::api(format!("ExchangeRate-API: {}", error_type)));
        }

        let Some(conversion_rates) = data.get("conversion_rates").and_then(|v| v.as_object())
        else {
            return Err(ValutaError::api("ExchangeRate-API: missing conversion_rates"));
        };

        let timestamp = Utc::now();
        let base = &self.base_currency;
        let mut rates = BTreeMap::new();

        for (code, value) in conversion_rates {
            let code = code.to_ascii_uppercase();
            let Some(rate) = value.as_f64() else {
                continue;
            };
            if code == *base || !rate.is_finite() || rate < 0.0 {
                continue;
            }

            rates.insert(
                pair_key(base, &code),
                self.pair(rate, timestamp, base, &code),
            );
            if rate != 0.0 {
                rates.insert(
                    pair_key(&code, base),
                    self.pair(1.0 / rate, timestamp, &code, base),
                );
            }
        }

        Ok(SourceRates {
            source: self.name().to_string(),
            timestamp,
            rates,
        })
    }

    fn pair(&self, rate: f64, at: chrono::DateTime<Utc>, from: &str, to: &str) -> RatePair {
        RatePair {
            rate,
            updated_at: at,
            source: self.name().to_string(),
            from: Some(from.to_string()),
            to: Some(to.to_string()),
        }
    }
}

#[async_trait]
impl RatesSource for ExchangeRateApiClient {
    fn name(&self) -> &str {
        "exchangerate-api"
    }

    async fn fetch_rates(&self) -> Result<SourceRates> {
        let Some(key) = self.api_key.as_deref() else {
            return Err(ValutaError::ConfigError {
                message: format!(
                    "ExchangeRate-API key is not set (use {} or parser.exchangerate_api_key)",
                    crate::config::settings::API_KEY_ENV
                ),
            });
        };

        let url = format!("{}/{}/latest/{}", self.base_url, key, self.base_currency);
        tracing::debug!(
            "📡 Requesting ExchangeRate-API: {}/***/latest/{}",
            self.base_url,
            self.base_currency
        );
        let data = self.api.get_json("ExchangeRate-API", &url, &[]).await?;
        self.parse(&data)
    }
}

/// 依設定建立所有匯率來源，順序即合併順序
pub fn default_sources(config: &ParserConfig) -> Result<Vec<Box<dyn RatesSource>>> {
    Ok(vec![
        Box::new(CoinGeckoClient::new(config)?),
        Box::new(ExchangeRateApiClient::new(config)?),
    ])
}
