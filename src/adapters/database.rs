use crate::config::Settings;
use crate::domain::model::{Portfolio, Session, User};
use crate::domain::ports::Storage;
use crate::domain::rates::{HistoryEntry, RatesSnapshot};
use crate::utils::error::Result;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// 資料目錄內各 JSON 檔案的相對路徑
#[derive(Debug, Clone)]
pub struct DataFiles {
    pub users: String,
    pub portfolios: String,
    pub rates: String,
    pub history: String,
    pub session: String,
    pub backups_dir: String,
}

impl From<&Settings> for DataFiles {
    fn from(settings: &Settings) -> Self {
        Self {
            users: settings.users_file.clone(),
            portfolios: settings.portfolios_file.clone(),
            rates: settings.rates_file.clone(),
            history: settings.history_file.clone(),
            session: settings.session_file.clone(),
            backups_dir: settings.backups_dir.clone(),
        }
    }
}

/// JSON 檔案儲存庫：使用者、投資組合、匯率快取與歷史、登入 session
pub struct Database<S: Storage> {
    storage: S,
    files: DataFiles,
    history_limit: usize,
}

impl<S: Storage> Database<S> {
    pub fn new(storage: S, settings: &Settings) -> Self {
        Self {
            storage,
            files: DataFiles::from(settings),
            history_limit: settings.history_limit,
        }
    }

    /// 讀取 JSON；解析失敗時把原檔改名為 .bak 並視為空
    async fn read_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let Some(data) = self.storage.read_file(path).await? else {
            return Ok(None);
        };

        match serde_json::from_slice(&data) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                let backup = format!("{}.bak", path);
                tracing::warn!(
                    "⚠️ {} is malformed ({}), moved to {} and starting empty",
                    path,
                    e,
                    backup
                );
                self.storage.write_file(&backup, &data).await?;
                self.storage.remove_file(path).await?;
                Ok(None)
            }
        }
    }

    async fn write_json<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> Result<()> {
        let data = serde_json::to_vec_pretty(value)?;
        self.storage.write_file(path, &data).await
    }

    /// 建立缺少的資料檔
    pub async fn initialize(&self) -> Result<()> {
        for path in [&self.files.users, &self.files.portfolios, &self.files.history] {
            if self.storage.read_file(path).await?.is_none() {
                self.write_json(path, &Vec::<serde_json::Value>::new()).await?;
            }
        }
        if self.storage.read_file(&self.files.rates).await?.is_none() {
            self.write_json(&self.files.rates, &RatesSnapshot::empty(Utc::now()))
                .await?;
        }
        Ok(())
    }

    // ---- users ----

    pub async fn all_users(&self) -> Result<Vec<User>> {
        Ok(self.read_json(&self.files.users).await?.unwrap_or_default())
    }

    pub async fn save_user(&self, user: &User) -> Result<()> {
        let mut users = self.all_users().await?;
        match users.iter_mut().find(|u| u.user_id() == user.user_id()) {
            Some(existing) => *existing = user.clone(),
            None => users.push(user.clone()),
        }
        self.write_json(&self.files.users, &users).await
    }

    pub async fn user_by_id(&self, user_id: u64) -> Result<Option<User>> {
        let users = self.all_users().await?;
        Ok(users.into_iter().find(|u| u.user_id() == user_id))
    }

    pub async fn user_by_username(&self, username: &str) -> Result<Option<User>> {
        let users = self.all_users().await?;
        Ok(users.into_iter().find(|u| u.username() == username))
    }

    pub async fn username_exists(&self, username: &str) -> Result<bool> {
        Ok(self.user_by_username(username).await?.is_some())
    }

    pub async fn next_user_id(&self) -> Result<u64> {
        let users = self.all_users().await?;
        Ok(users.iter().map(User::user_id).max().unwrap_or(0) + 1)
    }

    // ---- portfolios ----

    async fn all_portfolios(&self) -> Result<Vec<Portfolio>> {
        Ok(self
            .read_json(&self.files.portfolios)
            .await?
            .unwrap_or_default())
    }

    pub async fn save_portfolio(&self, portfolio: &Portfolio) -> Result<()> {
        let mut portfolios = self.all_portfolios().await?;
        match portfolios
            .iter_mut()
            .find(|p| p.user_id() == portfolio.user_id())
        {
            Some(existing) => *existing = portfolio.clone(),
            None => portfolios.push(portfolio.clone()),
        }
        self.write_json(&self.files.portfolios, &portfolios).await
    }

    /// 不存在時回傳空的投資組合
    pub async fn portfolio(&self, user_id: u64) -> Result<Portfolio> {
        let portfolios = self.all_portfolios().await?;
        Ok(portfolios
            .into_iter()
            .find(|p| p.user_id() == user_id)
            .unwrap_or_else(|| Portfolio::new(user_id)))
    }

    pub async fn delete_portfolio(&self, user_id: u64) -> Result<bool> {
        let mut portfolios = self.all_portfolios().await?;
        let before = portfolios.len();
        portfolios.retain(|p| p.user_id() != user_id);
        if portfolios.len() == before {
            return Ok(false);
        }
        self.write_json(&self.files.portfolios, &portfolios).await?;
        Ok(true)
    }

    // ---- rates ----

    pub async fn rates_snapshot(&self) -> Result<RatesSnapshot> {
        Ok(self
            .read_json(&self.files.rates)
            .await?
            .unwrap_or_else(|| RatesSnapshot::empty(Utc::now())))
    }

    pub async fn save_rates_snapshot(&self, snapshot: &RatesSnapshot) -> Result<()> {
        self.write_json(&self.files.rates, snapshot).await
    }

    pub async fn history(&self) -> Result<Vec<HistoryEntry>> {
        Ok(self.read_json(&self.files.history).await?.unwrap_or_default())
    }

    /// 追加一筆歷史，超過上限時丟棄最舊的紀錄
    pub async fn append_history(&self, snapshot: &RatesSnapshot) -> Result<()> {
        let mut history = self.history().await?;
        history.push(HistoryEntry {
            timestamp: Utc::now(),
            data: snapshot.clone(),
        });
        if history.len() > self.history_limit {
            let excess = history.len() - self.history_limit;
            history.drain(..excess);
        }
        self.write_json(&self.files.history, &history).await
    }

    // ---- session ----

    /// 損壞的 session 檔直接刪除
    pub async fn load_session(&self) -> Result<Option<Session>> {
        let Some(data) = self.storage.read_file(&self.files.session).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&data) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!("⚠️ Discarding unreadable session file: {}", e);
                self.storage.remove_file(&self.files.session).await?;
                Ok(None)
            }
        }
    }

    pub async fn save_session(&self, session: &Session) -> Result<()> {
        self.write_json(&self.files.session, session).await
    }

    pub async fn clear_session(&self) -> Result<bool> {
        self.storage.remove_file(&self.files.session).await
    }

    // ---- backups ----

    /// 複製所有現有資料檔到 `<backups_dir>/<stamp>/`，回傳該相對目錄
    pub async fn backup(&self, stamp: &str) -> Result<(String, usize)> {
        let target_dir = format!("{}/{}", self.files.backups_dir, stamp);
        let mut copied = 0;

        for path in [
            &self.files.users,
            &self.files.portfolios,
            &self.files.rates,
            &self.files.history,
        ] {
            if let Some(data) = self.storage.read_file(path).await? {
                let file_name = std::path::Path::new(path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.clone());
                self.storage
                    .write_file(&format!("{}/{}", target_dir, file_name), &data)
                    .await?;
                copied += 1;
            }
        }

        tracing::info!("💾 Backed up {} data files to {}", copied, target_dir);
        Ok((target_dir, copied))
    }
}
