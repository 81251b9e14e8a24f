use crate::adapters::database::Database;
use crate::config::Settings;
use crate::core::rate_book::{RateBook, RateQuote, PIVOT_CURRENCY};
use crate::core::updater::{RatesUpdater, UpdateReport};
use crate::domain::model::{Portfolio, Session, User, Valuation};
use crate::domain::ports::Storage;
use crate::domain::rates::{split_pair_key, RatePair};
use crate::utils::error::{Result, ValutaError};
use crate::utils::validation::{
    normalize_currency_code, validate_amount, validate_non_empty_string,
};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeReceipt {
    pub side: TradeSide,
    pub currency: String,
    pub amount: f64,
    pub rate: f64,
    pub rate_source: String,
    /// 買入為花費，賣出為收入 (USD)
    pub usd_value: f64,
    pub new_balance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioReport {
    pub user_id: u64,
    pub username: String,
    pub valuation: Valuation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedRates {
    pub last_refresh: DateTime<Utc>,
    pub fresh: bool,
    pub pairs: Vec<(String, RatePair)>,
}

pub struct UseCases<S: Storage> {
    settings: Settings,
    db: Database<S>,
    session: Option<Session>,
}

impl<S: Storage> UseCases<S> {
    /// 建立資料檔並還原上次的登入狀態
    pub async fn load(storage: S, settings: Settings) -> Result<Self> {
        let db = Database::new(storage, &settings);
        db.initialize().await?;

        let mut session = db.load_session().await?;
        if let Some(existing) = &session {
            if existing.is_expired(Utc::now(), settings.session_timeout_minutes) {
                tracing::info!("⌛ Session of '{}' expired", existing.username);
                db.clear_session().await?;
                session = None;
            }
        }

        Ok(Self {
            settings,
            db,
            session,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn database(&self) -> &Database<S> {
        &self.db
    }

    pub fn is_authenticated(&self) -> bool {
        self.current_session().is_some()
    }

    /// 閒置超過逾時的 session 視為未登入
    pub fn current_session(&self) -> Option<&Session> {
        let timeout = self.settings.session_timeout_minutes;
        self.session
            .as_ref()
            .filter(|session| !session.is_expired(Utc::now(), timeout))
    }

    /// 需要登入的操作都經過這裡，並更新 last_activity
    async fn require_session(&mut self) -> Result<Session> {
        let now = Utc::now();
        let timeout = self.settings.session_timeout_minutes;

        let Some(session) = self.session.as_mut() else {
            return Err(ValutaError::auth("Please log in first"));
        };

        if session.is_expired(now, timeout) {
            self.session = None;
            self.db.clear_session().await?;
            return Err(ValutaError::auth("Session expired, please log in again"));
        }

        session.last_activity = now;
        let session = session.clone();
        self.db.save_session(&session).await?;
        Ok(session)
    }

    #[tracing::instrument(skip(self, password), err(level = "info"))]
    pub async fn register(&self, username: &str, password: &str) -> Result<User> {
        validate_non_empty_string("username", username)?;
        let username = username.trim();

        let min_length = self.settings.password_min_length;
        if password.chars().count() < min_length {
            return Err(ValutaError::validation(
                "password",
                format!("password must be at least {} characters", min_length),
            ));
        }

        if self.db.username_exists(username).await? {
            return Err(ValutaError::validation(
                "username",
                format!("username '{}' is already taken", username),
            ));
        }

        let user_id = self.db.next_user_id().await?;
        let user = User::new(user_id, username, password)?;
        self.db.save_user(&user).await?;
        self.db.save_portfolio(&Portfolio::new(user_id)).await?;

        tracing::info!("👤 Registered user '{}' with id {}", username, user_id);
        Ok(user)
    }

    /// 使用者名稱與註冊時一樣先去除前後空白，之後精確比對
    #[tracing::instrument(skip(self, password), err(level = "info"))]
    pub async fn login(&mut self, username: &str, password: &str) -> Result<Session> {
        let username = username.trim();
        let user = self
            .db
            .user_by_username(username)
            .await?
            .ok_or_else(|| ValutaError::UserNotFound {
                username: username.to_string(),
            })?;

        if !user.verify_password(password) {
            return Err(ValutaError::auth("Invalid password"));
        }

        let session = Session::start(&user, Utc::now());
        self.db.save_session(&session).await?;
        self.session = Some(session.clone());
        Ok(session)
    }

    #[tracing::instrument(skip(self), err(level = "info"))]
    pub async fn logout(&mut self) -> Result<()> {
        self.session = None;
        self.db.clear_session().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, old_password, new_password), err(level = "info"))]
    pub async fn change_password(&mut self, old_password: &str, new_password: &str) -> Result<()> {
        let session = self.require_session().await?;
        let mut user = self
            .db
            .user_by_id(session.user_id)
            .await?
            .ok_or_else(|| ValutaError::UserNotFound {
                username: session.username.clone(),
            })?;

        if !user.verify_password(old_password) {
            return Err(ValutaError::auth("Invalid password"));
        }

        user.change_password(new_password, self.settings.password_min_length)?;
        self.db.save_user(&user).await
    }

    pub async fn rate_book(&self) -> Result<RateBook> {
        let snapshot = self.db.rates_snapshot().await?;
        Ok(RateBook::new(
            snapshot,
            self.settings.default_rates.clone(),
            self.settings.rates_ttl_seconds,
            Utc::now(),
        ))
    }

    pub async fn portfolio(&mut self) -> Result<Portfolio> {
        let session = self.require_session().await?;
        self.db.portfolio(session.user_id).await
    }

    #[tracing::instrument(skip(self), err(level = "info"))]
    pub async fn portfolio_report(&mut self, base: Option<&str>) -> Result<PortfolioReport> {
        let base = match base {
            Some(code) => normalize_currency_code("base", code)?,
            None => self.settings.default_base_currency.to_ascii_uppercase(),
        };

        let session = self.require_session().await?;
        let portfolio = self.db.portfolio(session.user_id).await?;
        let book = self.rate_book().await?;

        Ok(PortfolioReport {
            user_id: session.user_id,
            username: session.username,
            valuation: portfolio.valuation(&base, |from, to| book.rate(from, to)),
        })
    }

    pub async fn wallet_balance(&mut self, currency: &str) -> Result<f64> {
        let code = normalize_currency_code("currency", currency)?;
        let portfolio = self.portfolio().await?;
        Ok(portfolio.wallet(&code).map(|w| w.balance()).unwrap_or(0.0))
    }

    /// 以 USD 買入；買 USD 本身等同入金
    #[tracing::instrument(skip(self), err(level = "info"))]
    pub async fn buy(&mut self, currency: &str, amount: f64) -> Result<TradeReceipt> {
        let session = self.require_session().await?;
        validate_amount("amount", amount)?;
        let code = normalize_currency_code("currency", currency)?;

        let quote = self.rate_book().await?.resolve(&code, PIVOT_CURRENCY)?;
        let cost = amount * quote.rate;

        let mut portfolio = self.db.portfolio(session.user_id).await?;

        if code != PIVOT_CURRENCY {
            let available = portfolio
                .wallet(PIVOT_CURRENCY)
                .map(|w| w.balance())
                .unwrap_or(0.0);
            if available < cost {
                return Err(ValutaError::InsufficientFunds {
                    available,
                    required: cost,
                    code: PIVOT_CURRENCY.to_string(),
                });
            }
            portfolio
                .wallet_mut(PIVOT_CURRENCY)
                .ok_or_else(|| ValutaError::WalletNotFound {
                    code: PIVOT_CURRENCY.to_string(),
                })?
                .withdraw(cost)?;
        }

        let wallet = portfolio.add_currency(&code)?;
        wallet.deposit(amount)?;
        let new_balance = wallet.balance();

        self.db.save_portfolio(&portfolio).await?;
        tracing::info!("💱 Bought {:.4} {} for {:.2} USD", amount, code, cost);

        Ok(TradeReceipt {
            side: TradeSide::Buy,
            currency: code,
            amount,
            rate: quote.rate,
            rate_source: quote.source,
            usd_value: cost,
            new_balance,
        })
    }

    /// 賣出換回 USD
    #[tracing::instrument(skip(self), err(level = "info"))]
    pub async fn sell(&mut self, currency: &str, amount: f64) -> Result<TradeReceipt> {
        let session = self.require_session().await?;
        validate_amount("amount", amount)?;
        let code = normalize_currency_code("currency", currency)?;

        let mut portfolio = self.db.portfolio(session.user_id).await?;

        let available = portfolio
            .wallet(&code)
            .map(|w| w.balance())
            .ok_or_else(|| ValutaError::WalletNotFound { code: code.clone() })?;
        if available < amount {
            return Err(ValutaError::InsufficientFunds {
                available,
                required: amount,
                code,
            });
        }

        let quote = self.rate_book().await?.resolve(&code, PIVOT_CURRENCY)?;
        let revenue = amount * quote.rate;

        let wallet = portfolio
            .wallet_mut(&code)
            .ok_or_else(|| ValutaError::WalletNotFound { code: code.clone() })?;
        wallet.withdraw(amount)?;
        let new_balance = wallet.balance();

        if code != PIVOT_CURRENCY {
            portfolio.add_currency(PIVOT_CURRENCY)?.deposit(revenue)?;
        }

        self.db.save_portfolio(&portfolio).await?;
        tracing::info!("💱 Sold {:.4} {} for {:.2} USD", amount, code, revenue);

        Ok(TradeReceipt {
            side: TradeSide::Sell,
            currency: code,
            amount,
            rate: quote.rate,
            rate_source: quote.source,
            usd_value: revenue,
            new_balance,
        })
    }

    /// 不需要登入
    pub async fn exchange_rate(&self, from: &str, to: &str) -> Result<RateQuote> {
        let from = normalize_currency_code("from", from)?;
        let to = normalize_currency_code("to", to)?;
        self.rate_book().await?.resolve(&from, &to)
    }

    pub async fn supported_currencies(&self) -> Result<Vec<String>> {
        let snapshot = self.db.rates_snapshot().await?;
        let mut codes: Vec<String> = self
            .settings
            .supported_currencies
            .iter()
            .map(|c| c.trim().to_ascii_uppercase())
            .chain(snapshot.currencies())
            .collect();
        codes.sort();
        codes.dedup();
        Ok(codes)
    }

    pub async fn cached_rates(&self, currency: Option<&str>) -> Result<CachedRates> {
        let filter = currency
            .map(|c| normalize_currency_code("currency", c))
            .transpose()?;
        let snapshot = self.db.rates_snapshot().await?;
        let fresh = snapshot.is_fresh(Utc::now(), self.settings.rates_ttl_seconds);

        let pairs = snapshot
            .pairs
            .iter()
            .filter(|(key, _)| match (&filter, split_pair_key(key)) {
                (None, _) => true,
                (Some(code), Some((from, to))) => from == code || to == code,
                (Some(_), None) => false,
            })
            .map(|(key, pair)| (key.clone(), pair.clone()))
            .collect();

        Ok(CachedRates {
            last_refresh: snapshot.last_refresh,
            fresh,
            pairs,
        })
    }

    #[tracing::instrument(skip(self, updater), err(level = "info"))]
    pub async fn update_rates(&self, updater: &RatesUpdater) -> Result<UpdateReport> {
        updater.run(&self.db).await
    }

    pub async fn backup(&self) -> Result<(PathBuf, usize)> {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let (relative, copied) = self.db.backup(&stamp).await?;
        Ok((self.settings.data_dir.join(relative), copied))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::LocalStorage;
    use chrono::Duration;
    use tempfile::TempDir;

    async fn logged_in(temp_dir: &TempDir) -> UseCases<LocalStorage> {
        let settings = Settings {
            data_dir: temp_dir.path().to_path_buf(),
            ..Settings::default()
        };
        let mut usecases = UseCases::load(LocalStorage::new(temp_dir.path()), settings)
            .await
            .unwrap();
        usecases.register("alice", "secret").await.unwrap();
        usecases.login("alice", "secret").await.unwrap();
        usecases
    }

    fn idle_for(usecases: &mut UseCases<LocalStorage>, minutes: i64) {
        let session = usecases.session.as_mut().unwrap();
        session.last_activity = Utc::now() - Duration::minutes(minutes);
    }

    #[tokio::test]
    async fn test_idle_session_reads_as_logged_out() {
        let temp_dir = TempDir::new().unwrap();
        let mut usecases = logged_in(&temp_dir).await;
        assert!(usecases.is_authenticated());

        idle_for(&mut usecases, 31);

        assert!(usecases.current_session().is_none());
        assert!(!usecases.is_authenticated());
    }

    #[tokio::test]
    async fn test_expired_session_is_cleared_on_next_action() {
        let temp_dir = TempDir::new().unwrap();
        let mut usecases = logged_in(&temp_dir).await;
        idle_for(&mut usecases, 31);

        let err = usecases.buy("USD", 10.0).await.unwrap_err();

        assert!(matches!(err, ValutaError::Authentication { .. }));
        assert_eq!(err.to_string(), "Session expired, please log in again");
        assert!(usecases.session.is_none());
        assert!(!temp_dir.path().join("session.json").exists());

        // 之後的操作回到一般的未登入錯誤
        let again = usecases.buy("USD", 10.0).await.unwrap_err();
        assert_eq!(again.to_string(), "Please log in first");
    }

    #[tokio::test]
    async fn test_activity_refreshes_last_activity() {
        let temp_dir = TempDir::new().unwrap();
        let mut usecases = logged_in(&temp_dir).await;
        idle_for(&mut usecases, 20);

        usecases.buy("USD", 10.0).await.unwrap();

        let session = usecases.current_session().unwrap();
        assert!(Utc::now() - session.last_activity < Duration::minutes(1));
    }
}
