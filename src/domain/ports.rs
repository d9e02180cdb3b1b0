use crate::core::cleaner::CleanerOptions;
use crate::domain::model::Dataset;
use crate::utils::error::{EpiError, Result};
use async_trait::async_trait;
use chrono::Duration;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn remove_file(&self, path: &str) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn primary_url(&self) -> &str;
    fn fallback_url(&self) -> Option<&str>;
    fn cache_enabled(&self) -> bool;
    fn cache_key(&self) -> &str;
    fn cache_ttl(&self) -> Duration;
    fn synthetic_fallback(&self) -> bool;
    fn cleaner_options(&self) -> CleanerOptions;
}

/// Parsed dataset plus the source it actually came from.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub dataset: Dataset,
    pub source: String,
    pub skipped_rows: usize,
}

#[async_trait]
pub trait DataFetcher: Send + Sync {
    /// Reads one source: an `http(s)://` URL, a `file://` URL or a local path.
    async fn fetch_source(&self, source: &str) -> Result<Fetched>;

    /// Tries `primary`, then `fallback`. When both fail, a schema mismatch is
    /// reported in preference to `DataUnavailable`.
    async fn fetch(&self, primary: &str, fallback: Option<&str>) -> Result<Fetched> {
        let mut attempts = Vec::new();
        let mut schema_error = None;

        for source in std::iter::once(primary).chain(fallback) {
            match self.fetch_source(source).await {
                Ok(fetched) => {
                    if !attempts.is_empty() {
                        tracing::info!("Recovered using fallback source {}", source);
                    }
                    return Ok(fetched);
                }
                Err(e) => {
                    tracing::warn!("Source {} failed: {}", source, e);
                    attempts.push(format!("{}: {}", source, e));
                    if schema_error.is_none() && matches!(e, EpiError::SchemaError { .. }) {
                        schema_error = Some(e);
                    }
                }
            }
        }

        Err(schema_error.unwrap_or(EpiError::DataUnavailable { attempts }))
    }
}
