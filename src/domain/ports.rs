use crate::domain::rates::SourceRates;
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    /// 檔案不存在時回傳 `None`
    fn read_file(
        &self,
        path: &str,
    ) -> impl std::future::Future<Output = Result<Option<Vec<u8>>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn remove_file(&self, path: &str) -> impl std::future::Future<Output = Result<bool>> + Send;
}

#[async_trait]
pub trait RatesSource: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch_rates(&self) -> Result<SourceRates>;
}
