use crate::utils::error::{Result, ValutaError};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// 目前目錄下自動載入的設定檔
pub const DEFAULT_CONFIG_FILE: &str = "valutatrade.toml";

/// 覆蓋 `parser.exchangerate_api_key` 的環境變數
pub const API_KEY_ENV: &str = "EXCHANGERATE_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub users_file: String,
    pub portfolios_file: String,
    pub rates_file: String,
    pub history_file: String,
    pub session_file: String,
    pub backups_dir: String,
    pub default_base_currency: String,
    pub supported_currencies: Vec<String>,
    pub rates_ttl_seconds: u64,
    pub password_min_length: usize,
    pub session_timeout_minutes: u64,
    pub history_limit: usize,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub default_rates: BTreeMap<String, f64>,
    pub parser: ParserConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub coingecko_url: String,
    pub exchangerate_api_url: String,
    pub exchangerate_api_key: Option<String>,
    pub base_currency: String,
    pub request_timeout_seconds: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    /// 貨幣代碼 -> CoinGecko id
    pub crypto_ids: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        let default_rates = [
            ("BTC_USD", 59337.21),
            ("EUR_USD", 1.0786),
            ("RUB_USD", 0.01016),
            ("ETH_USD", 3720.00),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            data_dir: PathBuf::from("data"),
            users_file: "users.json".to_string(),
            portfolios_file: "portfolios.json".to_string(),
            rates_file: "rates.json".to_string(),
            history_file: "exchange_rates.json".to_string(),
            session_file: "session.json".to_string(),
            backups_dir: "backups".to_string(),
            default_base_currency: "USD".to_string(),
            supported_currencies: ["USD", "EUR", "BTC", "ETH", "RUB"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            rates_ttl_seconds: 300,
            password_min_length: 4,
            session_timeout_minutes: 30,
            history_limit: 1000,
            log_dir: PathBuf::from("logs"),
            log_level: "info".to_string(),
            default_rates,
            parser: ParserConfig::default(),
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        let crypto_ids = [("BTC", "bitcoin"), ("ETH", "ethereum"), ("SOL", "solana")]
            .into_iter()
            .map(|(code, id)| (code.to_string(), id.to_string()))
            .collect();

        Self {
            coingecko_url: "https://api.coingecko.com/api/v3/simple/price".to_string(),
            exchangerate_api_url: "https://v6.exchangerate-api.com/v6".to_string(),
            exchangerate_api_key: None,
            base_currency: "USD".to_string(),
            request_timeout_seconds: 10,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            crypto_ids,
        }
    }
}

impl Settings {
    /// 依序嘗試：指定的設定檔、目前目錄的 valutatrade.toml、內建預設值
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut settings = match explicit {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => Self::default(),
        };
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ValutaError::ConfigError {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        let mut settings: Self =
            toml::from_str(&processed_content).map_err(|e| ValutaError::ConfigError {
                message: format!("TOML parsing error: {}", e),
            })?;

        // 未設定的環境變數會保留 ${...}，視同沒有金鑰
        if let Some(key) = &settings.parser.exchangerate_api_key {
            if key.trim().is_empty() || key.contains("${") {
                settings.parser.exchangerate_api_key = None;
            }
        }
        Ok(settings)
    }

    /// 替換環境變數 (例如 ${API_KEY})
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ValutaError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.parser.exchangerate_api_key = Some(key);
            }
        }
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_path("data_dir", &self.data_dir.to_string_lossy())?;
        validation::validate_path("log_dir", &self.log_dir.to_string_lossy())?;
        for (field, value) in [
            ("users_file", &self.users_file),
            ("portfolios_file", &self.portfolios_file),
            ("rates_file", &self.rates_file),
            ("history_file", &self.history_file),
            ("session_file", &self.session_file),
            ("backups_dir", &self.backups_dir),
        ] {
            validation::validate_path(field, value)?;
        }

        validation::validate_range("rates_ttl_seconds", self.rates_ttl_seconds, 1, u64::MAX)?;
        validation::validate_range("password_min_length", self.password_min_length, 1, 128)?;
        validation::validate_range(
            "session_timeout_minutes",
            self.session_timeout_minutes,
            1,
            u64::MAX,
        )?;
        validation::validate_range("history_limit", self.history_limit, 1, usize::MAX)?;

        validation::normalize_currency_code("default_base_currency", &self.default_base_currency)
            .map_err(|e| as_config_error("default_base_currency", &self.default_base_currency, e))?;

        for (key, rate) in &self.default_rates {
            if crate::domain::rates::split_pair_key(key).is_none() {
                return Err(ValutaError::InvalidConfigValue {
                    field: "default_rates".to_string(),
                    value: key.clone(),
                    reason: "keys must look like FROM_TO".to_string(),
                });
            }
            if !rate.is_finite() || *rate <= 0.0 {
                return Err(ValutaError::InvalidConfigValue {
                    field: format!("default_rates.{}", key),
                    value: rate.to_string(),
                    reason: "rate must be a positive number".to_string(),
                });
            }
        }

        self.parser.validate()
    }
}

fn as_config_error(field: &str, value: &str, err: ValutaError) -> ValutaError {
    ValutaError::InvalidConfigValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: err.to_string(),
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

impl Validate for ParserConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_url("parser.coingecko_url", &self.coingecko_url)?;
        validation::validate_url("parser.exchangerate_api_url", &self.exchangerate_api_url)?;
        validation::normalize_currency_code("parser.base_currency", &self.base_currency)
            .map_err(|e| as_config_error("parser.base_currency", &self.base_currency, e))?;
        validation::validate_range(
            "parser.request_timeout_seconds",
            self.request_timeout_seconds,
            1,
            300,
        )?;
        validation::validate_range("parser.retry_attempts", self.retry_attempts, 1, 10)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.default_rates.get("BTC_USD"), Some(&59337.21));
        assert_eq!(settings.default_rates.get("USD_BTC"), None);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml_content = r#"
data_dir = "/tmp/valuta-data"
rates_ttl_seconds = 60

[default_rates]
GBP_USD = 1.27

[parser]
retry_attempts = 1
"#;

        let settings = Settings::from_toml_str(toml_content).unwrap();

        assert_eq!(settings.data_dir, PathBuf::from("/tmp/valuta-data"));
        assert_eq!(settings.rates_ttl_seconds, 60);
        assert_eq!(settings.users_file, "users.json");
        assert_eq!(settings.default_rates.get("GBP_USD"), Some(&1.27));
        // 整個表格被覆蓋
        assert_eq!(settings.default_rates.get("BTC_USD"), None);
        assert_eq!(settings.parser.retry_attempts, 1);
        assert_eq!(settings.parser.request_timeout_seconds, 10);
        assert_eq!(settings.parser.crypto_ids.get("SOL").unwrap(), "solana");
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("VALUTA_TEST_COINGECKO", "https://gecko.test/price");

        let toml_content = r#"
[parser]
coingecko_url = "${VALUTA_TEST_COINGECKO}"
exchangerate_api_key = "${VALUTA_TEST_UNSET_KEY}"
"#;

        let settings = Settings::from_toml_str(toml_content).unwrap();
        assert_eq!(settings.parser.coingecko_url, "https://gecko.test/price");
        assert_eq!(settings.parser.exchangerate_api_key, None);

        std::env::remove_var("VALUTA_TEST_COINGECKO");
    }

    #[test]
    fn test_api_key_env_override() {
        let mut settings =
            Settings::from_toml_str("[parser]\nexchangerate_api_key = \"from-file\"\n").unwrap();

        std::env::set_var(API_KEY_ENV, "   ");
        settings.apply_env_overrides();
        assert_eq!(settings.parser.exchangerate_api_key.as_deref(), Some("from-file"));

        std::env::set_var(API_KEY_ENV, "from-env");
        settings.apply_env_overrides();
        std::env::remove_var(API_KEY_ENV);
        assert_eq!(settings.parser.exchangerate_api_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_config_validation() {
        let bad_url = Settings::from_toml_str("[parser]\ncoingecko_url = \"invalid-url\"\n").unwrap();
        assert!(bad_url.validate().is_err());

        let bad_rate = Settings::from_toml_str("[default_rates]\nBTC_USD = -1.0\n").unwrap();
        assert!(bad_rate.validate().is_err());

        let bad_key = Settings::from_toml_str("[default_rates]\nBTCUSD = 1.0\n").unwrap();
        assert!(bad_key.validate().is_err());

        let bad_timeout = Settings::from_toml_str("[parser]\nrequest_timeout_seconds = 0\n").unwrap();
        assert!(bad_timeout.validate().is_err());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Settings::from_toml_str("data_dir = [").unwrap_err();
        assert!(matches!(err, ValutaError::ConfigError { .. }));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"default_base_currency = \"EUR\"\nsession_timeout_minutes = 5\n")
            .unwrap();

        let settings = Settings::from_file(temp_file.path()).unwrap();
        assert_eq!(settings.default_base_currency, "EUR");
        assert_eq!(settings.session_timeout_minutes, 5);
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let result = Settings::load(Some(Path::new("/definitely/not/here.toml")));
        assert!(matches!(result, Err(ValutaError::ConfigError { .. })));
    }
}
