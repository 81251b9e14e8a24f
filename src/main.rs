use clap::Parser;
use valutatrade_hub::app::{run_interactive, App};
use valutatrade_hub::config::{Cli, Settings};
use valutatrade_hub::utils::{logger, validation::Validate};
use valutatrade_hub::{LocalStorage, UseCases, ValutaError};

/// 錯誤只在終端印一次，細節寫進檔案日誌，再依嚴重程度結束程式
fn fail(context: &str, e: ValutaError) -> ! {
    tracing::info!(
        "❌ {}: {} (Category: {:?}, Severity: {:?})",
        context,
        e,
        e.category(),
        e.severity()
    );
    tracing::info!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("Error: {}", e);
    eprintln!("Hint: {}", e.recovery_suggestion());

    std::process::exit(e.exit_code());
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            // 設定檔讀不到時日誌還沒初始化，先用預設目錄
            logger::init_cli_logger(cli.verbose, &Settings::default().log_dir, "info");
            fail("Configuration load failed", e);
        }
    };

    logger::init_cli_logger(cli.verbose, &settings.log_dir, &settings.log_level);
    tracing::info!("Starting valutatrade-hub");
    tracing::debug!(
        "Data directory: {}, rates TTL: {}s",
        settings.data_dir.display(),
        settings.rates_ttl_seconds
    );

    if let Err(e) = settings.validate() {
        fail("Configuration validation failed", e);
    }

    let storage = LocalStorage::new(settings.data_dir.clone());
    let usecases = match UseCases::load(storage, settings).await {
        Ok(usecases) => usecases,
        Err(e) => fail("Startup failed", e),
    };

    let mut app = match App::new(usecases) {
        Ok(app) => app,
        Err(e) => fail("Startup failed", e),
    };

    let result = match cli.command {
        None => run_interactive(&mut app).await,
        Some(command) => app.execute(command, &mut std::io::stdout()).await,
    };

    if let Err(e) = result {
        fail("Command failed", e);
    }
}
