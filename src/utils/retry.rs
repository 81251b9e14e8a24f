use crate::utils::error::Result;
use std::future::Future;
use std::time::Duration;

/// 失敗時重試，最多 `attempts` 次，每次間隔 `delay`
pub async fn retry_on_failure<T, F, Fut>(
    label: &str,
    attempts: u32,
    delay: Duration,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                tracing::warn!("🔄 {}: attempt {}/{} failed: {}", label, attempt, attempts, e);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::debug!("❌ {}: all {} attempts failed", label, attempts);
                return Err(e);
            }
        }
    }
}
