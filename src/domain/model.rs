use crate::utils::error::{Result, ValutaError};
use crate::utils::validation::validate_non_empty_string;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    user_id: u64,
    username: String,
    hashed_password: String,
    salt: String,
    registration_date: DateTime<Utc>,
}

impl User {
    pub fn new(user_id: u64, username: &str, password: &str) -> Result<Self> {
        validate_non_empty_string("username", username)?;
        let username = username.trim();

        let salt = hex::encode(rand::thread_rng().gen::<[u8; 8]>());
        Ok(Self {
            user_id,
            username: username.to_string(),
            hashed_password: hash_password(password, &salt),
            salt,
            registration_date: Utc::now(),
        })
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn hashed_password(&self) -> &str {
        &self.hashed_password
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }

    pub fn registration_date(&self) -> DateTime<Utc> {
        self.registration_date
    }

    pub fn verify_password(&self, password: &str) -> bool {
        hash_password(password, &self.salt) == self.hashed_password
    }

    /// 更換密碼，沿用原本的 salt
    pub fn change_password(&mut self, new_password: &str, min_length: usize) -> Result<()> {
        if new_password.chars().count() < min_length {
            return Err(ValutaError::validation(
                "password",
                format!("password must be at least {} characters", min_length),
            ));
        }
        self.hashed_password = hash_password(new_password, &self.salt);
        Ok(())
    }

    pub fn info(&self) -> String {
        format!(
            "ID: {}, Name: {}, Registered: {}",
            self.user_id,
            self.username,
            self.registration_date.format("%Y-%m-%d %H:%M")
        )
    }
}

/// sha256(password + salt) 的十六進位字串
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    currency_code: String,
    balance: f64,
}

impl Wallet {
    pub fn new(currency_code: &str, balance: f64) -> Result<Self> {
        let code = currency_code.trim().to_ascii_uppercase();
        if code.is_empty() {
            return Err(ValutaError::validation(
                "currency_code",
                "currency code cannot be empty",
            ));
        }
        if !balance.is_finite() || balance < 0.0 {
            return Err(ValutaError::validation(
                "balance",
                "balance cannot be negative",
            ));
        }
        Ok(Self {
            currency_code: code,
            balance,
        })
    }

    pub fn currency_code(&self) -> &str {
        &self.currency_code
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn deposit(&mut self, amount: f64) -> Result<()> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(ValutaError::validation(
                "amount",
                "deposit amount must be positive",
            ));
        }
        let new_balance = self.balance + amount;
        if !new_balance.is_finite() {
            return Err(ValutaError::validation(
                "amount",
                "deposit would exceed the maximum balance",
            ));
        }
        self.balance = new_balance;
        Ok(())
    }

    pub fn withdraw(&mut self, amount: f64) -> Result<()> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(ValutaError::validation(
                "amount",
                "withdrawal amount must be positive",
            ));
        }
        if amount > self.balance {
            return Err(ValutaError::InsufficientFunds {
                available: self.balance,
                required: amount,
                code: self.currency_code.clone(),
            });
        }
        // 浮點誤差不應讓餘額變成負數
        self.balance = (self.balance - amount).max(0.0);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    user_id: u64,
    #[serde(default)]
    wallets: BTreeMap<String, Wallet>,
}

/// 單一錢包在基準貨幣下的估值
#[derive(Debug, Clone, PartialEq)]
pub struct ValuationLine {
    pub currency: String,
    pub balance: f64,
    pub rate: Option<f64>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Valuation {
    pub base: String,
    pub lines: Vec<ValuationLine>,
    pub total: f64,
}

impl Portfolio {
    pub fn new(user_id: u64) -> Self {
        Self {
            user_id,
            wallets: BTreeMap::new(),
        }
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn wallets(&self) -> &BTreeMap<String, Wallet> {
        &self.wallets
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    /// 取得錢包，不存在時以零餘額建立
    pub fn add_currency(&mut self, currency_code: &str) -> Result<&mut Wallet> {
        let code = currency_code.trim().to_ascii_uppercase();
        if !self.wallets.contains_key(&code) {
            let wallet = Wallet::new(&code, 0.0)?;
            self.wallets.insert(code.clone(), wallet);
        }
        self.wallets
            .get_mut(&code)
            .ok_or(ValutaError::WalletNotFound { code })
    }

    pub fn wallet(&self, currency_code: &str) -> Option<&Wallet> {
        self.wallets.get(&currency_code.trim().to_ascii_uppercase())
    }

    pub fn wallet_mut(&mut self, currency_code: &str) -> Option<&mut Wallet> {
        self.wallets.get_mut(&currency_code.trim().to_ascii_uppercase())
    }

    pub fn remove_currency(&mut self, currency_code: &str) -> bool {
        self.wallets
            .remove(&currency_code.trim().to_ascii_uppercase())
            .is_some()
    }

    /// 以 `rate_of(from, to)` 換算每個錢包；查不到匯率的錢包計為 0
    pub fn valuation<F>(&self, base: &str, mut rate_of: F) -> Valuation
    where
        F: FnMut(&str, &str) -> Option<f64>,
    {
        let base = base.trim().to_ascii_uppercase();
        let mut lines = Vec::with_capacity(self.wallets.len());
        let mut total = 0.0;

        for (code, wallet) in &self.wallets {
            let rate = if *code == base {
                Some(1.0)
            } else {
                rate_of(code, &base)
            };
            let value = rate.map(|r| wallet.balance * r).unwrap_or(0.0);
            total += value;
            lines.push(ValuationLine {
                currency: code.clone(),
                balance: wallet.balance,
                rate,
                value,
            });
        }

        Valuation { base, lines, total }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: u64,
    pub username: String,
    pub login_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn start(user: &User, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user.user_id(),
            username: user.username().to_string(),
            login_time: now,
            last_activity: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, timeout_minutes: u64) -> bool {
        // 超出 i64 範圍的逾時視為永不過期
        let Some(limit) = i64::try_from(timeout_minutes)
            .ok()
            .and_then(|m| m.checked_mul(60))
        else {
            return false;
        };
        now.signed_duration_since(self.last_activity).num_seconds() > limit
    }
}
