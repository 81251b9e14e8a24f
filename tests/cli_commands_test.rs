use tempfile::TempDir;
use valutatrade_hub::app::{handle_line, App, LineOutcome};
use valutatrade_hub::{LocalStorage, RatesUpdater, Settings, UseCases};

async fn app(temp_dir: &TempDir) -> App<LocalStorage> {
    let settings = Settings {
        data_dir: temp_dir.path().to_path_buf(),
        log_dir: temp_dir.path().join("logs"),
        ..Settings::default()
    };
    let usecases = UseCases::load(LocalStorage::new(temp_dir.path()), settings)
        .await
        .unwrap();
    App::with_updater(usecases, RatesUpdater::new(vec![]))
}

/// 執行一行輸入，回傳 (stdout, stderr)
async fn run(app: &mut App<LocalStorage>, line: &str) -> (String, String) {
    let mut out = Vec::new();
    let mut err = Vec::new();
    let outcome = handle_line(app, line, &mut out, &mut err).await.unwrap();
    assert_eq!(outcome, LineOutcome::Continue);
    (
        String::from_utf8(out).unwrap(),
        String::from_utf8(err).unwrap(),
    )
}

#[tokio::test]
async fn test_interactive_session() {
    let temp_dir = TempDir::new().unwrap();
    let mut app = app(&temp_dir).await;

    let (out, _) = run(&mut app, "register --username alice --password secret").await;
    assert!(out.starts_with("User 'alice' registered (ID: 1)\n"));

    let (out, _) = run(&mut app, "login -u alice -p secret").await;
    assert!(out.starts_with("Logged in as 'alice'\nUser ID: 1\nLogin time: "));

    let (out, _) = run(&mut app, "status").await;
    assert!(out.starts_with("Logged in as: alice\n"));

    let (out, _) = run(&mut app, "buy -c USD -a 1000").await;
    assert!(out.starts_with("Bought 1000.0000 USD for 1000.00 USD\n"));

    let (out, _) = run(&mut app, "buy --currency btc --amount 0.01").await;
    assert!(out.contains("Bought 0.0100 BTC for 593.37 USD"));
    assert!(out.contains("Rate: 59337.2100 (default)"));
    assert!(out.contains("New BTC balance: 0.0100"));

    let (out, _) = run(&mut app, "show-portfolio").await;
    assert!(out.contains("BTC: 0.0100 (rate: 59337.2100) → 593.37 USD"));
    assert!(out.contains("USD: 406.6279 → 406.63 USD"));
    assert!(out.ends_with("TOTAL: 1000.00 USD\n"));

    let (out, _) = run(&mut app, "sell -c BTC -a 0.01").await;
    assert!(out.starts_with("Sold 0.0100 BTC for 593.37 USD\n"));
    assert!(out.contains("Revenue: 593.37 USD"));

    let (out, _) = run(&mut app, "logout").await;
    assert_eq!(out, "Logged out\n");
}

#[tokio::test]
async fn test_errors_do_not_stop_the_loop() {
    let temp_dir = TempDir::new().unwrap();
    let mut app = app(&temp_dir).await;

    let (out, err) = run(&mut app, "buy -c BTC -a 1").await;
    assert!(out.is_empty());
    assert_eq!(err, "Error: Please log in first\n");

    let (_, err) = run(&mut app, "get-rate -f XYZ -t USD").await;
    assert_eq!(err, "Error: Unknown currency 'XYZ->USD'\n");

    let (_, err) = run(&mut app, "update-rates").await;
    assert!(err.starts_with("Error: External API request failed: failed to get rates"));

    // clap 的解析錯誤也只印出訊息
    let (out, err) = run(&mut app, "buy --currency").await;
    assert!(out.is_empty());
    assert!(err.contains("--currency"));

    let (_, err) = run(&mut app, "frobnicate").await;
    assert!(err.contains("frobnicate"));
}

#[tokio::test]
async fn test_get_rate_and_show_rates() {
    let temp_dir = TempDir::new().unwrap();
    let mut app = app(&temp_dir).await;

    let (out, _) = run(&mut app, "get-rate --from EUR --to USD").await;
    assert!(out.starts_with("Rate EUR → USD: 1.078600\nSource: default\n"));

    let (out, _) = run(&mut app, "show-rates").await;
    assert_eq!(out, "No cached rates. Run 'update-rates' first\n");

    let (out, _) = run(&mut app, "currencies").await;
    assert_eq!(out, "Known currencies: BTC, ETH, EUR, RUB, USD\n");
}

#[tokio::test]
async fn test_help_blank_and_exit() {
    let temp_dir = TempDir::new().unwrap();
    let mut app = app(&temp_dir).await;

    let (out, err) = run(&mut app, "   ").await;
    assert!(out.is_empty() && err.is_empty());

    let (out, _) = run(&mut app, "help").await;
    assert!(out.starts_with("Commands:\n"));
    assert!(out.contains("show-portfolio"));

    for word in ["exit", "quit", "q"] {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let outcome = handle_line(&mut app, word, &mut out, &mut err).await.unwrap();
        assert_eq!(outcome, LineOutcome::Exit);
    }
}
