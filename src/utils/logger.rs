use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const LOG_FILE_NAME: &str = "app.log";

/// 同時涵蓋 library (`valutatrade_hub`) 與執行檔 (`valutatrade`) 的 target 前綴
const TARGET_PREFIX: &str = "valutatrade";

fn console_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{}=debug,warn", TARGET_PREFIX)))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{}=warn", TARGET_PREFIX)))
    }
}

/// 初始化 CLI 日誌：終端輸出到 stderr，另外寫入 `<log_dir>/app.log`
pub fn init_cli_logger(verbose: bool, log_dir: &Path, file_level: &str) {
    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_filter(console_filter(verbose));

    // 日誌目錄無法建立時只保留終端輸出
    let file_layer = open_log_file(log_dir).map(|file| {
        tracing_subscriber::fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(EnvFilter::new(format!("{}={}", TARGET_PREFIX, file_level)))
    });

    let _ = tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init();
}

fn open_log_file(log_dir: &Path) -> Option<std::fs::File> {
    std::fs::create_dir_all(log_dir).ok()?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE_NAME))
        .ok()
}
