use tempfile::TempDir;
use valutatrade_hub::core::TradeSide;
use valutatrade_hub::utils::error::ErrorSeverity;
use valutatrade_hub::{LocalStorage, Settings, UseCases, ValutaError};

fn settings_for(temp_dir: &TempDir) -> Settings {
    Settings {
        data_dir: temp_dir.path().to_path_buf(),
        log_dir: temp_dir.path().join("logs"),
        ..Settings::default()
    }
}

async fn usecases(temp_dir: &TempDir) -> UseCases<LocalStorage> {
    let settings = settings_for(temp_dir);
    UseCases::load(LocalStorage::new(temp_dir.path()), settings)
        .await
        .unwrap()
}

async fn logged_in(temp_dir: &TempDir) -> UseCases<LocalStorage> {
    let mut app = usecases(temp_dir).await;
    app.register("alice", "secret").await.unwrap();
    app.login("alice", "secret").await.unwrap();
    app
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

#[tokio::test]
async fn test_register_and_login() {
    let temp_dir = TempDir::new().unwrap();
    let mut app = usecases(&temp_dir).await;

    let first = app.register("alice", "secret").await.unwrap();
    let second = app.register("bob", "hunter22").await.unwrap();
    assert_eq!(first.user_id(), 1);
    assert_eq!(second.user_id(), 2);

    // 每位新使用者都有一個空的投資組合
    let portfolios = std::fs::read_to_string(temp_dir.path().join("portfolios.json")).unwrap();
    let portfolios: serde_json::Value = serde_json::from_str(&portfolios).unwrap();
    assert_eq!(portfolios.as_array().unwrap().len(), 2);

    let session = app.login("alice", "secret").await.unwrap();
    assert_eq!(session.user_id, 1);
    assert!(app.is_authenticated());
    assert!(temp_dir.path().join("session.json").exists());
}

#[tokio::test]
async fn test_register_rejects_duplicates_and_short_passwords() {
    let temp_dir = TempDir::new().unwrap();
    let app = usecases(&temp_dir).await;

    app.register("alice", "secret").await.unwrap();

    let duplicate = app.register("alice", "another").await.unwrap_err();
    assert!(matches!(duplicate, ValutaError::Validation { .. }));
    assert!(duplicate.to_string().contains("already taken"));

    let short = app.register("carol", "abc").await.unwrap_err();
    assert!(short.to_string().contains("at least 4 characters"));

    let blank = app.register("   ", "secret").await.unwrap_err();
    assert!(matches!(blank, ValutaError::Validation { .. }));
}

#[tokio::test]
async fn test_login_failures() {
    let temp_dir = TempDir::new().unwrap();
    let mut app = usecases(&temp_dir).await;
    app.register("alice", "secret").await.unwrap();

    let unknown = app.login("nobody", "secret").await.unwrap_err();
    assert!(matches!(unknown, ValutaError::UserNotFound { .. }));

    let wrong = app.login("alice", "wrong").await.unwrap_err();
    assert!(matches!(wrong, ValutaError::Authentication { .. }));
    assert!(!app.is_authenticated());
}

#[tokio::test]
async fn test_actions_require_login() {
    let temp_dir = TempDir::new().unwrap();
    let mut app = usecases(&temp_dir).await;

    let err = app.buy("BTC", 1.0).await.unwrap_err();
    assert!(matches!(err, ValutaError::Authentication { .. }));
    assert!(err.to_string().contains("Please log in first"));

    assert!(app.portfolio_report(None).await.is_err());
    // 查匯率不需要登入
    assert!(app.exchange_rate("BTC", "USD").await.is_ok());
}

#[tokio::test]
async fn test_session_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    {
        logged_in(&temp_dir).await;
    }

    let app = usecases(&temp_dir).await;
    let session = app.current_session().unwrap();
    assert_eq!(session.username, "alice");
}

#[tokio::test]
async fn test_expired_session_is_discarded_on_load() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join("session.json"),
        r#"{
            "user_id": 1,
            "username": "alice",
            "login_time": "2020-01-01T00:00:00Z",
            "last_activity": "2020-01-01T00:00:00Z"
        }"#,
    )
    .unwrap();

    let app = usecases(&temp_dir).await;

    assert!(!app.is_authenticated());
    assert!(!temp_dir.path().join("session.json").exists());
}

#[tokio::test]
async fn test_corrupt_session_file_is_removed() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("session.json"), "{not json").unwrap();

    let app = usecases(&temp_dir).await;

    assert!(!app.is_authenticated());
    assert!(!temp_dir.path().join("session.json").exists());
}

#[tokio::test]
async fn test_buy_then_sell_restores_usd() {
    let temp_dir = TempDir::new().unwrap();
    let mut app = logged_in(&temp_dir).await;

    let deposit = app.buy("usd", 1000.0).await.unwrap();
    assert_eq!(deposit.currency, "USD");
    assert_eq!(deposit.rate, 1.0);
    assert_eq!(deposit.new_balance, 1000.0);

    let bought = app.buy("BTC", 0.01).await.unwrap();
    assert_eq!(bought.side, TradeSide::Buy);
    assert_eq!(bought.rate, 59337.21);
    assert_eq!(bought.rate_source, "default");
    assert!(approx(bought.usd_value, 593.3721));
    assert!(approx(app.wallet_balance("USD").await.unwrap(), 406.6279));

    let sold = app.sell("btc", 0.01).await.unwrap();
    assert_eq!(sold.side, TradeSide::Sell);
    assert!(approx(sold.new_balance, 0.0));
    assert!(approx(app.wallet_balance("USD").await.unwrap(), 1000.0));
}

#[tokio::test]
async fn test_failed_trade_leaves_portfolio_unchanged() {
    let temp_dir = TempDir::new().unwrap();
    let mut app = logged_in(&temp_dir).await;
    app.buy("USD", 100.0).await.unwrap();

    let before = std::fs::read_to_string(temp_dir.path().join("portfolios.json")).unwrap();

    let err = app.buy("BTC", 1.0).await.unwrap_err();
    match &err {
        ValutaError::InsufficientFunds {
            available,
            required,
            code,
        } => {
            assert_eq!(*available, 100.0);
            assert_eq!(*required, 59337.21);
            assert_eq!(code, "USD");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.severity(), ErrorSeverity::High);
    assert_eq!(err.exit_code(), 1);

    let not_held = app.sell("EUR", 1.0).await.unwrap_err();
    assert!(matches!(not_held, ValutaError::WalletNotFound { .. }));

    let too_much = app.sell("USD", 500.0).await.unwrap_err();
    assert!(matches!(too_much, ValutaError::InsufficientFunds { .. }));

    let unknown = app.buy("XYZ", 1.0).await.unwrap_err();
    assert!(matches!(unknown, ValutaError::CurrencyNotFound { .. }));

    let negative = app.buy("BTC", -1.0).await.unwrap_err();
    assert!(matches!(negative, ValutaError::Validation { .. }));

    let after = std::fs::read_to_string(temp_dir.path().join("portfolios.json")).unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_portfolio_report_in_other_base() {
    let temp_dir = TempDir::new().unwrap();
    let mut app = logged_in(&temp_dir).await;
    app.buy("USD", 1078.6).await.unwrap();
    app.buy("EUR", 100.0).await.unwrap();

    let report = app.portfolio_report(Some("eur")).await.unwrap();

    assert_eq!(report.username, "alice");
    assert_eq!(report.valuation.base, "EUR");
    let eur = report
        .valuation
        .lines
        .iter()
        .find(|l| l.currency == "EUR")
        .unwrap();
    assert_eq!(eur.rate, Some(1.0));
    assert!(approx(eur.value, 100.0));
    // 剩下的 USD 為 1078.6 - 107.86
    assert!(approx(report.valuation.total, 100.0 + 970.74 / 1.0786));
}

#[tokio::test]
async fn test_change_password() {
    let temp_dir = TempDir::new().unwrap();
    let mut app = logged_in(&temp_dir).await;

    let err = app.change_password("wrong", "newsecret").await.unwrap_err();
    assert!(matches!(err, ValutaError::Authentication { .. }));

    app.change_password("secret", "newsecret").await.unwrap();
    app.logout().await.unwrap();

    assert!(app.login("alice", "secret").await.is_err());
    assert!(app.login("alice", "newsecret").await.is_ok());
}

#[tokio::test]
async fn test_logout_clears_session_file() {
    let temp_dir = TempDir::new().unwrap();
    let mut app = logged_in(&temp_dir).await;

    app.logout().await.unwrap();

    assert!(!app.is_authenticated());
    assert!(!temp_dir.path().join("session.json").exists());
}

#[tokio::test]
async fn test_backup_copies_data_files() {
    let temp_dir = TempDir::new().unwrap();
    let app = logged_in(&temp_dir).await;

    let (path, copied) = app.backup().await.unwrap();

    assert_eq!(copied, 4);
    assert!(path.starts_with(temp_dir.path().join("backups")));
    assert!(path.join("users.json").exists());
    assert!(path.join("exchange_rates.json").exists());
}

#[tokio::test]
async fn test_supported_currencies_are_sorted() {
    let temp_dir = TempDir::new().unwrap();
    let app = usecases(&temp_dir).await;

    let codes = app.supported_currencies().await.unwrap();
    assert_eq!(codes, vec!["BTC", "ETH", "EUR", "RUB", "USD"]);
}

#[tokio::test]
async fn test_login_trims_username_like_register() {
    let temp_dir = TempDir::new().unwrap();
    let mut app = usecases(&temp_dir).await;
    app.register("  alice ", "secret").await.unwrap();

    let session = app.login(" alice  ", "secret").await.unwrap();
    assert_eq!(session.username, "alice");

    // 大小寫仍需完全相同
    let err = app.login("Alice", "secret").await.unwrap_err();
    assert!(matches!(err, ValutaError::UserNotFound { .. }));
}

#[tokio::test]
async fn test_overflowing_deposit_keeps_other_portfolios() {
    let temp_dir = TempDir::new().unwrap();
    let mut app = usecases(&temp_dir).await;
    app.register("bob", "secret").await.unwrap();
    app.register("eve", "secret").await.unwrap();

    app.login("bob", "secret").await.unwrap();
    app.buy("USD", 500.0).await.unwrap();

    app.login("eve", "secret").await.unwrap();
    app.buy("USD", 1.7e308).await.unwrap();
    let err = app.buy("USD", 1.7e308).await.unwrap_err();
    assert!(matches!(err, ValutaError::Validation { .. }));

    let portfolios = std::fs::read_to_string(temp_dir.path().join("portfolios.json")).unwrap();
    assert!(!portfolios.contains("null"));
    assert!(!temp_dir.path().join("portfolios.json.bak").exists());

    app.login("bob", "secret").await.unwrap();
    assert_eq!(app.wallet_balance("USD").await.unwrap(), 500.0);
}
